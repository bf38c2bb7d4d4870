//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::backend::{InMemoryStore, RateLimitStore};
use super::counter::{RateLimitDecision, RateLimitWindow};
use super::key::CounterKey;
use crate::error::{GateError, Result};

/// Default bound on a single store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Fixed-window rate limiter over an injected counter store.
///
/// This struct is cheap to clone and can be shared across request tasks.
#[derive(Clone)]
pub struct RateLimiter {
    /// Counter store, in-process or external
    store: Arc<dyn RateLimitStore>,
    /// Upper bound on one store operation
    timeout: Duration,
}

impl RateLimiter {
    /// Create a rate limiter over the given store.
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Create a rate limiter backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Set the store timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Charge one request from `identifier` against the named window.
    ///
    /// Returns `RateStoreUnavailable` if the store fails or does not answer
    /// within the timeout. Callers decide how to degrade.
    pub async fn check(
        &self,
        identifier: &str,
        window_name: &str,
        window: &RateLimitWindow,
        now: u64,
    ) -> Result<RateLimitDecision> {
        let key = CounterKey::new(identifier, window_name);

        trace!(
            key = %key,
            limit = window.limit,
            window_ms = window.window_ms,
            "Checking rate limit"
        );

        let counter = match tokio::time::timeout(self.timeout, self.store.increment(&key, window, now)).await {
            Ok(Ok(counter)) => counter,
            Ok(Err(e @ GateError::RateStoreUnavailable(_))) => return Err(e),
            Ok(Err(e)) => return Err(GateError::RateStoreUnavailable(e.to_string())),
            Err(_) => {
                return Err(GateError::RateStoreUnavailable(format!(
                    "store did not respond within {:?}",
                    self.timeout
                )))
            }
        };

        let decision = RateLimitDecision::from_counter(window, &counter);

        if !decision.allowed {
            debug!(
                key = %key,
                count = counter.count(),
                limit = window.limit,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Get the current count for an identifier and window without charging it.
    pub async fn current_count(&self, identifier: &str, window_name: &str) -> Result<Option<u64>> {
        let key = CounterKey::new(identifier, window_name);
        Ok(self.store.get(&key).await?.map(|c| c.count()))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
