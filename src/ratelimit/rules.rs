//! Rate limit rules configuration and matching.
//!
//! This module handles loading named windows and the path prefixes that select
//! them. A request is charged against the window of the longest matching
//! prefix, or the default window when nothing matches.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::counter::RateLimitWindow;
use crate::error::{GateError, Result};
use crate::routes::matches_prefix;

/// Name of the window applied to general API traffic.
pub const API_WINDOW: &str = "api";
/// Name of the stricter window applied to authentication endpoints.
pub const AUTH_WINDOW: &str = "auth";

/// Named windows and the routes that select them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRules {
    /// Window name to budget
    #[serde(default = "default_windows")]
    pub windows: HashMap<String, RateLimitWindow>,

    /// Prefix to window name
    #[serde(default = "default_routes")]
    pub routes: Vec<WindowRoute>,

    /// Window used when no route matches
    #[serde(default = "default_window_name")]
    pub default_window: String,
}

/// Maps a path prefix to a named window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRoute {
    /// The path prefix to match
    pub prefix: String,
    /// The window to charge
    pub window: String,
}

fn default_windows() -> HashMap<String, RateLimitWindow> {
    let mut windows = HashMap::new();
    windows.insert(API_WINDOW.to_string(), RateLimitWindow::per_minute(100));
    windows.insert(AUTH_WINDOW.to_string(), RateLimitWindow::per_minute(10));
    windows
}

fn default_routes() -> Vec<WindowRoute> {
    vec![WindowRoute {
        prefix: "/api/auth".to_string(),
        window: AUTH_WINDOW.to_string(),
    }]
}

fn default_window_name() -> String {
    API_WINDOW.to_string()
}

impl Default for RateLimitRules {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            routes: default_routes(),
            default_window: default_window_name(),
        }
    }
}

impl RateLimitRules {
    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML file without blocking the runtime.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: RateLimitRules = serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse rate limit rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check that every referenced window exists and every budget is positive.
    pub fn validate(&self) -> Result<()> {
        for (name, window) in &self.windows {
            if !window.is_valid() {
                return Err(GateError::Config(format!(
                    "window '{}' must have a positive limit and window_ms",
                    name
                )));
            }
        }

        if !self.windows.contains_key(&self.default_window) {
            return Err(GateError::Config(format!(
                "default window '{}' is not defined",
                self.default_window
            )));
        }

        for route in &self.routes {
            if !self.windows.contains_key(&route.window) {
                return Err(GateError::Config(format!(
                    "route '{}' references undefined window '{}'",
                    route.prefix, route.window
                )));
            }
        }

        Ok(())
    }

    /// Select the window a path is charged against.
    ///
    /// The longest matching prefix wins.
    pub fn select(&self, path: &str) -> (&str, RateLimitWindow) {
        let name = self
            .routes
            .iter()
            .filter(|route| matches_prefix(path, &route.prefix))
            .max_by_key(|route| route.prefix.len())
            .map(|route| route.window.as_str())
            .unwrap_or(self.default_window.as_str());

        let window = self.windows.get(name).copied().unwrap_or_default();
        (name, window)
    }
}
