//! Emma Gate - request gating for the Emma Companionship service
//!
//! Every inbound request is classified by path, charged against a fixed-window
//! rate budget when it targets the API, and checked for a session when the
//! route is protected. The outcome is one of pass, redirect to sign-in, 401 or
//! 429, with `X-RateLimit-*` headers on every API response that was charged.

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod ratelimit;
pub mod routes;
