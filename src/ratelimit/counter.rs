//! Fixed-window counter implementation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default request budget per window.
pub const DEFAULT_LIMIT: u64 = 100;
/// Default window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// An immutable rate limit budget: `limit` requests per `window_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    /// Maximum requests allowed in one window
    pub limit: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitWindow {
    /// Create a new window.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window_ms: window.as_millis() as u64,
        }
    }

    /// `limit` requests per second.
    pub fn per_second(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    /// `limit` requests per minute.
    pub fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Get the duration of this window.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Both the limit and the window length must be positive.
    pub fn is_valid(&self) -> bool {
        self.limit > 0 && self.window_ms > 0
    }
}

impl Default for RateLimitWindow {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Counter state for one (identifier, window name) pair.
///
/// Timestamps are epoch milliseconds supplied by the caller, so the counter
/// itself never reads a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    count: u64,
    window_start: u64,
}

impl WindowCounter {
    /// Create an empty counter whose window starts at `now`.
    pub fn new(now: u64) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Charge one request against the window.
    ///
    /// An expired window is restarted at `now` before the charge is applied.
    /// Every attempt is charged, including ones that end up over the limit.
    pub fn hit(&mut self, window: &RateLimitWindow, now: u64) {
        if self.is_expired(window, now) {
            self.count = 0;
            self.window_start = now;
        }
        self.count = self.count.saturating_add(1);
    }

    /// Whether the window that started at `window_start` has fully elapsed.
    ///
    /// A clock that steps backwards never expires a window.
    pub fn is_expired(&self, window: &RateLimitWindow, now: u64) -> bool {
        now.saturating_sub(self.window_start) >= window.window_ms
    }

    /// Requests observed in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window began, in epoch milliseconds.
    pub fn window_start(&self) -> u64 {
        self.window_start
    }
}

/// Outcome of charging one request against a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request fits in the budget
    pub allowed: bool,
    /// The configured limit
    pub limit: u64,
    /// Requests still available in this window
    pub remaining: u64,
    /// When the window resets, in epoch milliseconds
    pub reset_at: u64,
}

impl RateLimitDecision {
    /// Derive the decision from a counter that has already been charged.
    pub fn from_counter(window: &RateLimitWindow, counter: &WindowCounter) -> Self {
        Self {
            allowed: counter.count() <= window.limit,
            limit: window.limit,
            remaining: window.limit.saturating_sub(counter.count()),
            reset_at: counter.window_start().saturating_add(window.window_ms),
        }
    }
}
