//! Session endpoints under `/api/auth`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use super::AppState;
use crate::auth::{authorize, Credentials, JwtSessionProvider, UserDirectory, UserId};

/// What the sign-in endpoints need.
pub struct SignInService {
    /// Account lookup and password check
    pub directory: Arc<dyn UserDirectory>,
    /// Session issuer
    pub sessions: Arc<JwtSessionProvider>,
    /// Add `Secure` to the session cookie
    pub secure_cookie: bool,
}

impl SignInService {
    fn session_cookie(&self, token: &str, max_age_secs: u64) -> Option<HeaderValue> {
        let secure = if self.secure_cookie { "; Secure" } else { "" };
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            self.sessions.cookie_name(),
            token,
            max_age_secs,
            secure
        ))
        .ok()
    }
}

impl std::fmt::Debug for SignInService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInService")
            .field("sessions", &self.sessions)
            .field("secure_cookie", &self.secure_cookie)
            .finish_non_exhaustive()
    }
}

fn invalid_credentials() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Invalid credentials",
            "message": "The email or password is incorrect",
        })),
    )
        .into_response()
}

/// `GET /api/auth/session`
///
/// Reports the user the gate authenticated, or `null`.
pub async fn current_session(request: Request) -> Json<serde_json::Value> {
    let user = request.extensions().get::<UserId>().cloned();
    Json(json!({ "user": user.map(|id| json!({ "id": id })) }))
}

/// `POST /api/auth/signin`
pub async fn sign_in(
    State(state): State<AppState>,
    body: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Response {
    let Some(service) = state.sign_in.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let Json(credentials) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable sign-in body");
            return invalid_credentials();
        }
    };

    let user = match authorize(service.directory.as_ref(), &credentials).await {
        Ok(user) => user,
        Err(_) => return invalid_credentials(),
    };

    let (token, expires_at) = match service.sessions.issue(&user.id) {
        Ok(issued) => issued,
        Err(e) => {
            error!(error = %e, "Failed to issue session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    if let Some(cookie) = service.session_cookie(&token, service.sessions.max_age().as_secs()) {
        headers.insert(header::SET_COOKIE, cookie);
    }

    (
        StatusCode::OK,
        headers,
        Json(json!({
            "token": token,
            "expiresAt": expires_at.to_rfc3339(),
            "user": user,
        })),
    )
        .into_response()
}

/// `POST /api/auth/signout`
pub async fn sign_out(State(state): State<AppState>) -> Response {
    let Some(service) = state.sign_in.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut headers = HeaderMap::new();
    if let Some(cookie) = service.session_cookie("", 0) {
        headers.insert(header::SET_COOKIE, cookie);
    }

    (StatusCode::OK, headers, Json(json!({ "ok": true }))).into_response()
}
