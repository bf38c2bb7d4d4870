//! Counter storage for rate limit state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::counter::{RateLimitWindow, WindowCounter};
use super::key::CounterKey;
use crate::error::Result;

/// Trait for rate limit counter stores.
///
/// Implementations must apply the increment and read back the charged
/// counter as one atomic step per key. Keys are independent of each other.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Charge one request to `key` and return the counter after the charge.
    async fn increment(
        &self,
        key: &CounterKey,
        window: &RateLimitWindow,
        now: u64,
    ) -> Result<WindowCounter>;

    /// Read the counter for `key` without charging it.
    async fn get(&self, key: &CounterKey) -> Result<Option<WindowCounter>>;
}

/// In-process counter store.
///
/// Each entry is guarded by its DashMap shard lock while it is charged, and
/// the charge never awaits, so a cancelled caller cannot leave a torn update.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Counters with the window length they were charged under
    counters: DashMap<CounterKey, (WindowCounter, u64)>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove counters whose window has fully elapsed.
    ///
    /// Returns the number of counters removed.
    pub fn purge_expired(&self, now: u64) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, (counter, window_ms)| {
            now.saturating_sub(counter.window_start()) < *window_ms
        });
        let removed = before.saturating_sub(self.counters.len());

        if removed > 0 {
            debug!(removed, remaining = self.counters.len(), "Purged expired counters");
        }
        removed
    }

    /// Purge expired counters every `every` until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, clock: Arc<dyn Clock>, every: Duration) -> JoinHandle<()> {
        info!(interval = ?every, "Starting rate limit counter sweeper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.purge_expired(clock.now_millis());
            }
        })
    }

    /// Get the number of live counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether the store holds no counters.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn increment(
        &self,
        key: &CounterKey,
        window: &RateLimitWindow,
        now: u64,
    ) -> Result<WindowCounter> {
        let mut entry = self.counters.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                limit = window.limit,
                window_ms = window.window_ms,
                "Creating new rate limit counter"
            );
            (WindowCounter::new(now), window.window_ms)
        });

        let (counter, window_ms) = entry.value_mut();
        counter.hit(window, now);
        *window_ms = window.window_ms;
        Ok(*counter)
    }

    async fn get(&self, key: &CounterKey) -> Result<Option<WindowCounter>> {
        Ok(self.counters.get(key).map(|entry| entry.value().0))
    }
}
