//! Request gate evaluation.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::decision::{GateAction, GateDecision};
use crate::auth::{AuthProvider, UserId};
use crate::ratelimit::{Clock, RateLimitRules, RateLimiter, SystemClock, UNKNOWN_IDENTIFIER};
use crate::routes::{matches_prefix, RouteClass, RouteTable};

/// Default bound on one session lookup.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_millis(500);
/// Default sign-in page.
pub const DEFAULT_SIGN_IN_PATH: &str = "/auth/signin";

/// The parts of an inbound request the gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    /// Decoded request path
    pub path: &'a str,
    /// Socket peer address, if known
    pub client_addr: Option<IpAddr>,
    /// Request headers
    pub headers: &'a HeaderMap,
}

/// Decides pass, redirect, 401 or 429 for each request.
///
/// Evaluation never fails: a failing session lookup counts as anonymous and a
/// failing rate store lets the request through without rate headers.
pub struct RequestGate {
    routes: RouteTable,
    rules: RwLock<RateLimitRules>,
    limiter: RateLimiter,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    sign_in_path: String,
    auth_timeout: Duration,
    trust_forwarded_headers: bool,
}

impl RequestGate {
    /// Create a gate with the system clock and default timeouts.
    pub fn new(
        routes: RouteTable,
        rules: RateLimitRules,
        limiter: RateLimiter,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            routes,
            rules: RwLock::new(rules),
            limiter,
            auth,
            clock: Arc::new(SystemClock),
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            trust_forwarded_headers: false,
        }
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the sign-in page that protected pages redirect to.
    pub fn with_sign_in_path(mut self, path: impl Into<String>) -> Self {
        self.sign_in_path = path.into();
        self
    }

    /// Set the session lookup timeout.
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Identify anonymous clients by `X-Forwarded-For` / `X-Real-IP`.
    ///
    /// Only enable behind a proxy that overwrites these headers.
    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    /// The route table in use.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Swap in new rate limit rules. Live counters are kept.
    pub fn reload_rules(&self, rules: RateLimitRules) {
        info!(windows = rules.windows.len(), routes = rules.routes.len(), "Rate limit rules reloaded");
        *self.rules.write() = rules;
    }

    /// Re-read `path` every `every` and swap in changed rules.
    ///
    /// A missing or invalid file is logged and the current rules stay in force.
    pub fn spawn_rules_reloader(self: Arc<Self>, path: PathBuf, every: Duration) -> JoinHandle<()> {
        info!(path = %path.display(), interval = ?every, "Watching rate limit rules file");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match RateLimitRules::load(&path).await {
                    Ok(rules) if rules != self.rules() => self.reload_rules(rules),
                    Ok(_) => {}
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Failed to reload rate limit rules")
                    }
                }
            }
        })
    }

    /// Snapshot of the rules in use.
    pub fn rules(&self) -> RateLimitRules {
        self.rules.read().clone()
    }

    /// Evaluate one request.
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn evaluate(&self, request: &GateRequest<'_>) -> GateDecision {
        let class = self.classify(request.path);

        let decision = if class.is_api() {
            self.evaluate_api(class, request).await
        } else if class == RouteClass::Public {
            GateDecision::pass(None)
        } else {
            match self.lookup_user(request.headers).await {
                Some(user) => GateDecision::pass(Some(user)),
                None => GateDecision::redirect(self.sign_in_target(request.path)),
            }
        };

        debug!(class = ?class, action = ?decision.action, "Gate decision made");
        decision
    }

    /// Route class, with the sign-in page always public so it cannot redirect to itself.
    fn classify(&self, path: &str) -> RouteClass {
        match self.routes.classify(path) {
            RouteClass::ProtectedPage if matches_prefix(path, &self.sign_in_path) => RouteClass::Public,
            class => class,
        }
    }

    async fn evaluate_api(&self, class: RouteClass, request: &GateRequest<'_>) -> GateDecision {
        let user = self.lookup_user(request.headers).await;
        let identifier = self.identifier(request, user.as_ref());
        let (window_name, window) = {
            let rules = self.rules.read();
            let (name, window) = rules.select(request.path);
            (name.to_string(), window)
        };
        let now = self.clock.now_millis();

        let rate = match self.limiter.check(&identifier, &window_name, &window, now).await {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!(error = %e, identifier = %identifier, "Rate limit store unavailable, allowing request");
                None
            }
        };

        let action = match (&rate, class, &user) {
            (Some(rate), _, _) if !rate.allowed => GateAction::RateLimited,
            (_, RouteClass::ProtectedApi, None) => GateAction::Unauthorized,
            _ => GateAction::Pass,
        };

        if action == GateAction::RateLimited {
            debug!(identifier = %identifier, window = %window_name, "Request rate limited");
        }

        GateDecision::api(action, rate.as_ref(), user)
    }

    /// Look the session up, treating failures and timeouts as anonymous.
    async fn lookup_user(&self, headers: &HeaderMap) -> Option<UserId> {
        match tokio::time::timeout(self.auth_timeout, self.auth.authenticate(headers)).await {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                warn!(error = %e, "Session lookup failed, treating request as anonymous");
                None
            }
            Err(_) => {
                warn!(timeout = ?self.auth_timeout, "Session lookup timed out, treating request as anonymous");
                None
            }
        }
    }

    /// Rate limit bucket for a request.
    fn identifier(&self, request: &GateRequest<'_>, user: Option<&UserId>) -> String {
        if let Some(user) = user {
            return format!("user:{}", user);
        }

        let forwarded = if self.trust_forwarded_headers {
            forwarded_client(request.headers)
        } else {
            None
        };

        match forwarded.or(request.client_addr) {
            Some(addr) => format!("ip:{}", addr),
            None => UNKNOWN_IDENTIFIER.to_string(),
        }
    }

    /// `<sign-in>?callbackUrl=<path>`
    fn sign_in_target(&self, path: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("callbackUrl", path)
            .finish();
        format!("{}?{}", self.sign_in_path, query)
    }
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("routes", &self.routes)
            .field("rules", &*self.rules.read())
            .field("limiter", &self.limiter)
            .field("sign_in_path", &self.sign_in_path)
            .field("auth_timeout", &self.auth_timeout)
            .field("trust_forwarded_headers", &self.trust_forwarded_headers)
            .finish_non_exhaustive()
    }
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_client(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
}
