//! Route classification.
//!
//! Decides from the request path alone whether a route is public, and whether
//! it belongs to the JSON API. The allow-lists are configuration; nothing here
//! holds state.

use serde::{Deserialize, Serialize};

/// Classification of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// A page anyone may load (home, sign-in, sign-out ...)
    Public,
    /// An API route that needs no session (health, auth endpoints)
    PublicApi,
    /// An API route that requires a session
    ProtectedApi,
    /// A page that requires a session
    ProtectedPage,
}

impl RouteClass {
    /// Whether the route is served under the API prefix.
    pub fn is_api(&self) -> bool {
        matches!(self, RouteClass::PublicApi | RouteClass::ProtectedApi)
    }

    /// Whether the route requires an authenticated session.
    pub fn is_protected(&self) -> bool {
        matches!(self, RouteClass::ProtectedApi | RouteClass::ProtectedPage)
    }
}

/// Static route allow-lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    /// Prefix under which all API routes live
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Pages that never require a session
    #[serde(default = "default_public_pages")]
    pub public_pages: Vec<String>,

    /// API prefixes that never require a session
    #[serde(default = "default_public_api")]
    pub public_api: Vec<String>,

    /// Paths the gate does not run on at all (static assets)
    #[serde(default = "default_bypass")]
    pub bypass: Vec<String>,
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_public_pages() -> Vec<String> {
    vec![
        "/".to_string(),
        "/auth/signin".to_string(),
        "/auth/signout".to_string(),
        "/auth/error".to_string(),
        "/auth/verify-request".to_string(),
    ]
}

fn default_public_api() -> Vec<String> {
    vec!["/api/health".to_string(), "/api/auth".to_string()]
}

fn default_bypass() -> Vec<String> {
    vec![
        "/static".to_string(),
        "/public".to_string(),
        "/favicon.ico".to_string(),
    ]
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            api_prefix: default_api_prefix(),
            public_pages: default_public_pages(),
            public_api: default_public_api(),
            bypass: default_bypass(),
        }
    }
}

impl RouteTable {
    /// Classify a decoded request path.
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.is_api(path) {
            if self.public_api.iter().any(|prefix| matches_prefix(path, prefix)) {
                RouteClass::PublicApi
            } else {
                RouteClass::ProtectedApi
            }
        } else if self.public_pages.iter().any(|page| matches_prefix(path, page)) {
            RouteClass::Public
        } else {
            RouteClass::ProtectedPage
        }
    }

    /// Whether the path lives under the API prefix.
    pub fn is_api(&self, path: &str) -> bool {
        matches_prefix(path, &self.api_prefix)
    }

    /// Whether the gate should skip the path entirely.
    pub fn bypasses_gate(&self, path: &str) -> bool {
        self.bypass.iter().any(|prefix| matches_prefix(path, prefix))
    }
}

/// Segment-aware prefix match.
///
/// `path` matches `prefix` when it is equal to it or continues it with a `/`.
/// The root `/` only matches itself, since every path would otherwise be
/// below it. `/api/healthcheck` does not match `/api/health`.
pub fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = if prefix.len() > 1 {
        prefix.trim_end_matches('/')
    } else {
        prefix
    };

    if prefix == "/" || prefix.is_empty() {
        return path == "/";
    }

    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_pages() {
        let table = RouteTable::default();

        for path in ["/", "/auth/signin", "/auth/signout", "/auth/error", "/auth/verify-request"] {
            assert_eq!(table.classify(path), RouteClass::Public, "{}", path);
        }
        assert_eq!(table.classify("/auth/signin/credentials"), RouteClass::Public);
    }

    #[test]
    fn test_home_matches_exactly() {
        let table = RouteTable::default();

        assert_eq!(table.classify("/members"), RouteClass::ProtectedPage);
        assert_eq!(table.classify("/companionships/42"), RouteClass::ProtectedPage);
    }

    #[test]
    fn test_public_api() {
        let table = RouteTable::default();

        assert_eq!(table.classify("/api/health"), RouteClass::PublicApi);
        assert_eq!(table.classify("/api/auth"), RouteClass::PublicApi);
        assert_eq!(table.classify("/api/auth/session"), RouteClass::PublicApi);
        assert_eq!(table.classify("/api/auth/callback/credentials"), RouteClass::PublicApi);
    }

    #[test]
    fn test_protected_api() {
        let table = RouteTable::default();

        assert_eq!(table.classify("/api/members"), RouteClass::ProtectedApi);
        assert_eq!(table.classify("/api"), RouteClass::ProtectedApi);
        assert_eq!(table.classify("/api/healthcheck-unrelated"), RouteClass::ProtectedApi);
        assert_eq!(table.classify("/api/authors"), RouteClass::ProtectedApi);
    }

    #[test]
    fn test_api_prefix_is_segment_aware() {
        let table = RouteTable::default();

        assert!(table.is_api("/api/members"));
        assert!(!table.is_api("/apiary"));
        assert_eq!(table.classify("/apiary"), RouteClass::ProtectedPage);
    }

    #[test]
    fn test_bypass() {
        let table = RouteTable::default();

        assert!(table.bypasses_gate("/favicon.ico"));
        assert!(table.bypasses_gate("/static/app.css"));
        assert!(!table.bypasses_gate("/statistics"));
        assert!(!table.bypasses_gate("/api/health"));
    }

    #[test]
    fn test_matches_prefix() {
        assert!(matches_prefix("/api/health", "/api/health"));
        assert!(matches_prefix("/api/health/db", "/api/health"));
        assert!(matches_prefix("/api/health", "/api/health/"));
        assert!(!matches_prefix("/api/healthz", "/api/health"));
        assert!(matches_prefix("/", "/"));
        assert!(!matches_prefix("/anything", "/"));
    }

    #[test]
    fn test_route_class_flags() {
        assert!(RouteClass::PublicApi.is_api());
        assert!(!RouteClass::PublicApi.is_protected());
        assert!(RouteClass::ProtectedApi.is_api());
        assert!(RouteClass::ProtectedPage.is_protected());
        assert!(!RouteClass::Public.is_api());
    }
}
