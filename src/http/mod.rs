//! HTTP surface: router, gate middleware, health and session endpoints.

mod health;
mod middleware;
mod server;
mod session;

pub use health::{DatabaseProbe, DatabaseStatus, HealthReport, HealthReporter, TcpDatabaseProbe};
pub use middleware::gate_middleware;
pub use server::HttpServer;
pub use session::SignInService;

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::gate::RequestGate;

/// State shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The per-request gate
    pub gate: Arc<RequestGate>,
    /// Health report builder
    pub health: Arc<HealthReporter>,
    /// Sign-in endpoints, when a user directory is wired in
    pub sign_in: Option<Arc<SignInService>>,
}

impl AppState {
    /// Create state without sign-in endpoints.
    pub fn new(gate: RequestGate, health: HealthReporter) -> Self {
        Self {
            gate: Arc::new(gate),
            health: Arc::new(health),
            sign_in: None,
        }
    }

    /// Enable `POST /api/auth/signin` and `/api/auth/signout`.
    pub fn with_sign_in(mut self, service: SignInService) -> Self {
        self.sign_in = Some(Arc::new(service));
        self
    }
}

/// Generates a v4 uuid per request.
#[derive(Debug, Clone, Copy, Default)]
struct RequestUuid;

impl MakeRequestId for RequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "message": "No handler for this route",
        })),
    )
}

/// Build the application router with the gate in front of every route.
pub fn router(state: AppState) -> Router {
    let mut routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/auth/session", get(session::current_session));

    if state.sign_in.is_some() {
        routes = routes
            .route("/api/auth/signin", post(session::sign_in))
            .route("/api/auth/signout", post(session::sign_out));
    }

    routes
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(state.clone(), gate_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(RequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
