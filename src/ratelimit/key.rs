//! Counter key generation and handling.

/// Identifier used when no client address or user is known.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// A key that uniquely identifies one rate limit counter.
///
/// The key is composed of the client identifier and the name of the
/// window the request is charged against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Client identifier (`user:<id>`, `ip:<addr>` or `unknown`)
    pub identifier: String,
    /// Name of the rate limit window
    pub window: String,
}

impl CounterKey {
    /// Create a new counter key. An empty identifier falls back to `unknown`.
    pub fn new(identifier: &str, window: &str) -> Self {
        let identifier = if identifier.trim().is_empty() {
            UNKNOWN_IDENTIFIER
        } else {
            identifier
        };

        Self {
            identifier: identifier.to_string(),
            window: window.to_string(),
        }
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.window, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_key_creation() {
        let key = CounterKey::new("ip:10.0.0.1", "api");

        assert_eq!(key.identifier, "ip:10.0.0.1");
        assert_eq!(key.window, "api");
        assert_eq!(key.to_string(), "api:ip:10.0.0.1");
    }

    #[test]
    fn test_empty_identifier_falls_back() {
        assert_eq!(CounterKey::new("", "api").identifier, UNKNOWN_IDENTIFIER);
        assert_eq!(CounterKey::new("   ", "auth").identifier, UNKNOWN_IDENTIFIER);
    }

    #[test]
    fn test_counter_key_equality() {
        assert_eq!(CounterKey::new("a", "api"), CounterKey::new("a", "api"));
        assert_ne!(CounterKey::new("a", "api"), CounterKey::new("a", "auth"));
    }
}
