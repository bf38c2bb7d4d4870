//! Axum adapter for the request gate.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use super::AppState;
use crate::gate::{GateAction, GateDecision, GateRequest};

/// Run the gate in front of every route.
///
/// On pass the authenticated user, if any, is stored in the request
/// extensions and the gate's headers are copied onto the handler's response.
pub async fn gate_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    // Classify the raw path, the same string the router matches on, so an
    // encoded slash cannot route to one handler while classifying as another.
    let path = request.uri().path().to_string();

    if state.gate.routes().bypasses_gate(&path) {
        return next.run(request).await;
    }

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let decision = state
        .gate
        .evaluate(&GateRequest {
            path: &path,
            client_addr,
            headers: request.headers(),
        })
        .await;

    match decision.action {
        GateAction::Pass => {
            if let Some(user) = decision.user.clone() {
                request.extensions_mut().insert(user);
            }
            let mut response = next.run(request).await;
            response.headers_mut().extend(decision.headers);
            response
        }
        _ => rejection(decision),
    }
}

/// Render a non-pass decision.
fn rejection(decision: GateDecision) -> Response {
    match decision.action {
        GateAction::Redirect => {
            let target = decision.redirect_target.as_deref().unwrap_or("/");
            Redirect::temporary(target).into_response()
        }
        GateAction::Unauthorized => json_error(
            StatusCode::UNAUTHORIZED,
            decision.headers,
            "Authentication required",
            "Please authenticate to access this resource",
        ),
        GateAction::RateLimited => json_error(
            StatusCode::TOO_MANY_REQUESTS,
            decision.headers,
            "Rate limit exceeded",
            "Too many requests, please try again later",
        ),
        GateAction::Pass => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn json_error(status: StatusCode, headers: HeaderMap, error: &str, message: &str) -> Response {
    (
        status,
        headers,
        Json(json!({
            "error": error,
            "message": message,
        })),
    )
        .into_response()
}
