//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod key;
mod limiter;
mod rules;

pub use backend::{InMemoryStore, RateLimitStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{RateLimitDecision, RateLimitWindow, WindowCounter};
pub use key::{CounterKey, UNKNOWN_IDENTIFIER};
pub use limiter::{RateLimiter, DEFAULT_STORE_TIMEOUT};
pub use rules::{RateLimitRules, WindowRoute, API_WINDOW, AUTH_WINDOW};
