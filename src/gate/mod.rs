//! Per-request gating: route classification, rate limiting and session checks.

mod decision;
mod engine;

pub use decision::{
    rate_limit_headers, GateAction, GateDecision, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
    X_RATELIMIT_RESET,
};
pub use engine::{GateRequest, RequestGate, DEFAULT_AUTH_TIMEOUT, DEFAULT_SIGN_IN_PATH};
