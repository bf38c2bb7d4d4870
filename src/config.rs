//! Configuration management for the gate service.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `EMMA__`-prefixed environment variables (`EMMA__SERVER__HTTP_ADDR=...`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::{AccountConfig, DEFAULT_SESSION_COOKIE, DEFAULT_SESSION_MAX_AGE};
use crate::error::{GateError, Result};
use crate::gate::DEFAULT_SIGN_IN_PATH;
use crate::ratelimit::RateLimitRules;
use crate::routes::{RouteClass, RouteTable};

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; an ephemeral session secret is allowed
    #[default]
    Development,
    /// Automated test runs
    Test,
    /// Live deployment
    Production,
}

impl Environment {
    /// Whether secrets and secure cookies are mandatory.
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Parse `development`, `test` or `production`, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "development" => Some(Environment::Development),
            "test" => Some(Environment::Test),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Main configuration for the gate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    /// Application database, used only by the health check
    #[serde(default)]
    pub database_url: Option<String>,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Session configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Route allow-lists
    #[serde(default)]
    pub routes: RouteTable,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            trust_forwarded_headers: false,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Session configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret. Required in production.
    #[serde(default)]
    pub secret: Option<String>,

    /// Cookie that carries the session token
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Lifetime of issued sessions
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,

    /// Page protected pages redirect to
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,

    /// Bound on one session lookup
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,

    /// Accounts allowed to sign in with email and password
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            session_cookie: default_session_cookie(),
            session_max_age_secs: default_session_max_age(),
            sign_in_path: default_sign_in_path(),
            lookup_timeout_ms: default_lookup_timeout(),
            accounts: Vec::new(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("session_cookie", &self.session_cookie)
            .field("session_max_age_secs", &self.session_max_age_secs)
            .field("sign_in_path", &self.sign_in_path)
            .field("lookup_timeout_ms", &self.lookup_timeout_ms)
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

fn default_session_max_age() -> u64 {
    DEFAULT_SESSION_MAX_AGE.as_secs()
}

fn default_sign_in_path() -> String {
    DEFAULT_SIGN_IN_PATH.to_string()
}

fn default_lookup_timeout() -> u64 {
    500
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a rate limit rules file. Overrides `rules` when set.
    #[serde(default)]
    pub rules_path: Option<String>,

    /// Inline rules
    #[serde(default)]
    pub rules: RateLimitRules,

    /// Bound on one counter store round trip
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// How often expired counters are purged
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// How often `rules_path` is re-read
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            rules: RateLimitRules::default(),
            store_timeout_ms: default_store_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            reload_interval_secs: default_reload_interval(),
        }
    }
}

fn default_store_timeout() -> u64 {
    250
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_reload_interval() -> u64 {
    60
}

impl GateConfig {
    /// Load layered configuration.
    ///
    /// `DATABASE_URL`, `SESSION_SECRET` (or `NEXTAUTH_SECRET`) and `NODE_ENV`
    /// fill in `database_url`, `auth.secret` and `environment` when no other
    /// layer set them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }

        let layered = builder
            .add_source(
                ::config::Environment::with_prefix("EMMA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let environment_set = layered.get_string("environment").is_ok();

        let mut config: GateConfig = layered.try_deserialize()?;
        config.apply_fallbacks(environment_set, non_empty_var);

        debug!(config = ?config, "Configuration loaded");
        Ok(config)
    }

    /// Fill unset settings from conventional variables looked up by `var`.
    fn apply_fallbacks<F>(&mut self, environment_set: bool, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.database_url.is_none() {
            self.database_url = var("DATABASE_URL");
        }
        if self.auth.secret.is_none() {
            self.auth.secret = var("SESSION_SECRET").or_else(|| var("NEXTAUTH_SECRET"));
        }
        if !environment_set {
            if let Some(name) = var("NODE_ENV") {
                match Environment::from_name(&name) {
                    Some(environment) => self.environment = environment,
                    None => warn!(node_env = %name, "Ignoring unknown NODE_ENV"),
                }
            }
        }
    }

    /// Load configuration from a single YAML file, without other layers.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GateConfig =
            serde_yaml::from_str(&contents).map_err(|e| GateError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Check settings that cannot be caught by deserialization.
    pub fn validate(&self) -> Result<()> {
        let secret_missing = self.auth.secret.as_deref().map_or(true, |s| s.trim().is_empty());
        if self.environment.is_production() && secret_missing {
            return Err(GateError::ConfigurationMissing("auth.secret"));
        }

        let positive = [
            ("auth.lookup_timeout_ms", self.auth.lookup_timeout_ms),
            ("auth.session_max_age_secs", self.auth.session_max_age_secs),
            ("rate_limiting.store_timeout_ms", self.rate_limiting.store_timeout_ms),
            ("rate_limiting.sweep_interval_secs", self.rate_limiting.sweep_interval_secs),
            ("rate_limiting.reload_interval_secs", self.rate_limiting.reload_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(GateError::Config(format!("{} must be greater than zero", name)));
            }
        }

        if !self.routes.api_prefix.starts_with('/') {
            return Err(GateError::Config(format!(
                "routes.api_prefix '{}' must start with '/'",
                self.routes.api_prefix
            )));
        }

        if self.routes.classify(&self.auth.sign_in_path) != RouteClass::Public {
            return Err(GateError::Config(format!(
                "auth.sign_in_path '{}' must be listed in routes.public_pages",
                self.auth.sign_in_path
            )));
        }

        self.rate_limiting.rules.validate()
    }

    /// Rules from `rules_path` if set, else the inline rules.
    pub fn rate_limit_rules(&self) -> Result<RateLimitRules> {
        match &self.rate_limiting.rules_path {
            Some(path) => RateLimitRules::from_file(path),
            None => Ok(self.rate_limiting.rules.clone()),
        }
    }

    /// Bound on one session lookup.
    pub fn auth_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.auth.lookup_timeout_ms)
    }

    /// Bound on one counter store round trip.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.rate_limiting.store_timeout_ms)
    }

    /// Period of the expired counter sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limiting.sweep_interval_secs)
    }

    /// Period of the rules file re-read.
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limiting.reload_interval_secs)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::API_WINDOW;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.http_addr, "127.0.0.1:3000".parse().unwrap());
        assert!(!config.server.trust_forwarded_headers);
        assert_eq!(config.auth.sign_in_path, "/auth/signin");
        assert_eq!(config.auth.session_max_age_secs, 30 * 24 * 60 * 60);
        assert_eq!(config.auth_lookup_timeout(), Duration::from_millis(500));
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let file = yaml_file(
            r#"
environment: test
server:
  http_addr: "0.0.0.0:8080"
  trust_forwarded_headers: true
rate_limiting:
  store_timeout_ms: 50
  rules:
    windows:
      api:
        limit: 20
        window_ms: 1000
    routes: []
"#,
        );

        let config = GateConfig::from_file(file.path()).unwrap();

        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.server.http_addr.port(), 8080);
        assert!(config.server.trust_forwarded_headers);
        assert_eq!(config.rate_limiting.store_timeout_ms, 50);
        assert_eq!(config.rate_limiting.rules.windows[API_WINDOW].limit, 20);
        assert_eq!(config.auth.session_cookie, DEFAULT_SESSION_COOKIE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_layers_file_over_defaults() {
        let file = yaml_file(
            r#"
environment: production
auth:
  secret: "layered-secret"
  sign_in_path: /login
routes:
  public_pages: ["/", "/login"]
"#,
        );

        let config = GateConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.auth.secret.as_deref(), Some("layered-secret"));
        assert_eq!(config.auth.sign_in_path, "/login");
        assert_eq!(config.rate_limiting.sweep_interval_secs, 60);
        assert_eq!(config.routes.public_pages, vec!["/", "/login"]);
        assert_eq!(config.routes.api_prefix, "/api");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sign_in_path_must_be_public() {
        let mut config = GateConfig::default();
        config.auth.sign_in_path = "/login".to_string();
        assert!(matches!(config.validate(), Err(GateError::Config(_))));

        config.routes.public_pages.push("/login".to_string());
        assert!(config.validate().is_ok());

        config.auth.sign_in_path = "/api/auth/signin".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file() {
        assert!(GateConfig::load(None).is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        let mut config = GateConfig::default();
        config.environment = Environment::Production;

        assert!(matches!(
            config.validate(),
            Err(GateError::ConfigurationMissing("auth.secret"))
        ));

        config.auth.secret = Some("   ".to_string());
        assert!(config.validate().is_err());

        config.auth.secret = Some("s3cret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = GateConfig::default();
        config.rate_limiting.store_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(GateError::Config(_))));

        let mut config = GateConfig::default();
        config.auth.lookup_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let mut config = GateConfig::default();
        config.rate_limiting.rules.default_window = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_rules_prefers_file() {
        let rules = yaml_file(
            r#"
windows:
  api:
    limit: 3
    window_ms: 1000
routes: []
"#,
        );

        let mut config = GateConfig::default();
        assert_eq!(config.rate_limit_rules().unwrap(), RateLimitRules::default());

        config.rate_limiting.rules_path = Some(rules.path().display().to_string());
        let loaded = config.rate_limit_rules().unwrap();
        assert_eq!(loaded.windows[API_WINDOW].limit, 3);
    }

    #[test]
    fn test_secret_redacted_in_debug() {
        let mut config = GateConfig::default();
        config.auth.secret = Some("hunter2hunter2".to_string());

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_fallback_variables_fill_unset_settings() {
        let mut config = GateConfig::default();
        config.apply_fallbacks(
            false,
            vars(&[
                ("DATABASE_URL", "postgres://db/emma"),
                ("NEXTAUTH_SECRET", "next-secret"),
                ("NODE_ENV", "production"),
            ]),
        );

        assert_eq!(config.database_url.as_deref(), Some("postgres://db/emma"));
        assert_eq!(config.auth.secret.as_deref(), Some("next-secret"));
        assert_eq!(config.environment, Environment::Production);
    }

    #[test]
    fn test_fallback_variables_do_not_override() {
        let mut config = GateConfig::default();
        config.environment = Environment::Test;
        config.auth.secret = Some("configured".to_string());
        config.apply_fallbacks(
            true,
            vars(&[
                ("SESSION_SECRET", "session-secret"),
                ("NEXTAUTH_SECRET", "next-secret"),
                ("NODE_ENV", "production"),
            ]),
        );

        assert_eq!(config.auth.secret.as_deref(), Some("configured"));
        assert_eq!(config.environment, Environment::Test);

        let mut config = GateConfig::default();
        config.apply_fallbacks(
            false,
            vars(&[
                ("SESSION_SECRET", "session-secret"),
                ("NEXTAUTH_SECRET", "next-secret"),
                ("NODE_ENV", "staging"),
            ]),
        );
        assert_eq!(config.auth.secret.as_deref(), Some("session-secret"));
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_accounts_from_file() {
        let file = yaml_file(
            r#"
auth:
  accounts:
    - id: admin
      email: admin@example.com
      name: Administrator
      password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c29tZXNhbHQ$aGFzaGhhc2hoYXNoaGFzaA"
"#,
        );

        let config = GateConfig::from_file(file.path()).unwrap();
        assert_eq!(config.auth.accounts.len(), 1);
        assert_eq!(config.auth.accounts[0].email, "admin@example.com");
        assert!(config.auth.accounts[0].image.is_none());
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(serde_json::to_value(Environment::Test).unwrap(), "test");
        assert_eq!(Environment::from_name(" Production "), Some(Environment::Production));
        assert_eq!(Environment::from_name("staging"), None);
    }
}
