//! Per-request gate outcomes.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::auth::UserId;
use crate::ratelimit::RateLimitDecision;

/// `X-RateLimit-Limit`
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// `X-RateLimit-Remaining`
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// `X-RateLimit-Reset`, epoch milliseconds
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// What the gate does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Hand the request to its handler
    Pass,
    /// Send the browser to sign-in
    Redirect,
    /// 401 JSON
    Unauthorized,
    /// 429 JSON
    RateLimited,
}

/// The result of evaluating one request.
#[derive(Debug, Clone)]
pub struct GateDecision {
    /// Terminal action
    pub action: GateAction,
    /// Headers to attach to whatever response goes out
    pub headers: HeaderMap,
    /// Sign-in location for `Redirect`
    pub redirect_target: Option<String>,
    /// The authenticated user, when one was looked up
    pub user: Option<UserId>,
}

impl GateDecision {
    /// Pass with no extra headers.
    pub fn pass(user: Option<UserId>) -> Self {
        Self {
            action: GateAction::Pass,
            headers: HeaderMap::new(),
            redirect_target: None,
            user,
        }
    }

    /// Redirect to `target`.
    pub fn redirect(target: String) -> Self {
        Self {
            action: GateAction::Redirect,
            headers: HeaderMap::new(),
            redirect_target: Some(target),
            user: None,
        }
    }

    /// Build an API decision carrying the rate limit headers, if any.
    pub fn api(action: GateAction, rate: Option<&RateLimitDecision>, user: Option<UserId>) -> Self {
        Self {
            action,
            headers: rate.map(rate_limit_headers).unwrap_or_default(),
            redirect_target: None,
            user,
        }
    }

    /// Whether the request proceeds to its handler.
    pub fn is_pass(&self) -> bool {
        self.action == GateAction::Pass
    }
}

/// Render a rate limit decision as `X-RateLimit-*` headers.
pub fn rate_limit_headers(rate: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(rate.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(rate.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(rate.reset_at));
    headers
}
