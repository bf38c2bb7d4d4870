//! Health check endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tracing::{error, warn};

use super::AppState;
use crate::config::Environment;
use crate::error::{GateError, Result};

/// Default bound on the database connectivity check.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default bound on one full database check in a health report.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connectivity check against the application database.
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    /// Whether the database answers.
    async fn ping(&self) -> Result<bool>;

    /// Optional row counts or similar figures to publish.
    async fn stats(&self) -> Result<Option<Value>>;
}

/// Checks that the database host accepts TCP connections.
#[derive(Debug, Clone)]
pub struct TcpDatabaseProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpDatabaseProbe {
    /// Build a probe from a `postgres://` or `mysql://` connection url.
    pub fn from_url(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)
            .map_err(|e| GateError::Config(format!("invalid database url: {}", e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| GateError::Config("database url has no host".to_string()))?
            .to_string();

        let port = url
            .port()
            .or_else(|| match url.scheme() {
                "postgres" | "postgresql" => Some(5432),
                "mysql" => Some(3306),
                _ => None,
            })
            .ok_or_else(|| {
                GateError::Config(format!("no port for database scheme '{}'", url.scheme()))
            })?;

        Ok(Self {
            host,
            port,
            timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }

    /// Set the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DatabaseProbe for TcpDatabaseProbe {
    async fn ping(&self) -> Result<bool> {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                warn!(host = %self.host, port = self.port, error = %e, "Database connection failed");
                Ok(false)
            }
            Err(_) => {
                warn!(host = %self.host, port = self.port, "Database connection timed out");
                Ok(false)
            }
        }
    }

    async fn stats(&self) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Database state as reported by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStatus {
    /// No database url is configured
    NotConfigured,
    /// The database answered
    Connected,
    /// The database did not accept a connection
    ConnectionFailed,
    /// The check itself failed or timed out
    Error,
}

/// Per-service status block.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Always `healthy` while the process serves requests
    pub api: &'static str,
    /// `configured` or `not_configured`
    pub auth: &'static str,
    /// Same as the top-level database status
    pub database: DatabaseStatus,
}

/// Body of a healthy response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Always `ok`
    pub status: &'static str,
    /// RFC 3339 time the report was built
    pub timestamp: String,
    /// Deployment environment
    pub environment: Environment,
    /// Database connectivity
    pub database: DatabaseStatus,
    /// Crate version
    pub version: &'static str,
    /// Seconds since the process started
    pub uptime: f64,
    /// Per-service status
    pub services: ServiceStatus,
    /// Database figures, present only when connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
}

/// Assembles health reports.
pub struct HealthReporter {
    environment: Environment,
    database: Option<Arc<dyn DatabaseProbe>>,
    auth_configured: bool,
    timeout: Duration,
    started: Instant,
}

impl HealthReporter {
    /// Create a reporter with no database and unconfigured auth.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            database: None,
            auth_configured: false,
            timeout: DEFAULT_REPORT_TIMEOUT,
            started: Instant::now(),
        }
    }

    /// Check this database on every report.
    pub fn with_database(mut self, probe: Arc<dyn DatabaseProbe>) -> Self {
        self.database = Some(probe);
        self
    }

    /// Mark session auth as configured.
    pub fn with_auth_configured(mut self, configured: bool) -> Self {
        self.auth_configured = configured;
        self
    }

    /// Bound the whole database check.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a report.
    ///
    /// Probe errors and timeouts are folded into the report as
    /// `DatabaseStatus::Error`. A probe that panics is an internal fault and
    /// fails the report.
    pub async fn report(&self) -> Result<HealthReport> {
        let (database, stats) = match &self.database {
            None => (DatabaseStatus::NotConfigured, None),
            Some(probe) => self.check_database(probe.clone()).await?,
        };

        Ok(HealthReport {
            status: "ok",
            timestamp: now_rfc3339(),
            environment: self.environment,
            database,
            version: env!("CARGO_PKG_VERSION"),
            uptime: self.started.elapsed().as_secs_f64(),
            services: ServiceStatus {
                api: "healthy",
                auth: if self.auth_configured { "configured" } else { "not_configured" },
                database,
            },
            stats,
        })
    }

    async fn check_database(&self, probe: Arc<dyn DatabaseProbe>) -> Result<(DatabaseStatus, Option<Value>)> {
        let mut task = tokio::spawn(async move {
            match probe.ping().await {
                Ok(true) => match probe.stats().await {
                    Ok(stats) => (DatabaseStatus::Connected, stats),
                    Err(e) => {
                        error!(error = %e, "Database stats query failed");
                        (DatabaseStatus::Error, None)
                    }
                },
                Ok(false) => (DatabaseStatus::ConnectionFailed, None),
                Err(e) => {
                    error!(error = %e, "Database health check failed");
                    (DatabaseStatus::Error, None)
                }
            }
        });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(GateError::Internal(format!("database check failed: {}", e))),
            Err(_) => {
                task.abort();
                warn!(timeout = ?self.timeout, "Database health check timed out");
                Ok((DatabaseStatus::Error, None))
            }
        }
    }
}

impl std::fmt::Debug for HealthReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthReporter")
            .field("environment", &self.environment)
            .field("database", &self.database.is_some())
            .field("auth_configured", &self.auth_configured)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `GET /api/health`
pub async fn health_check(State(state): State<AppState>) -> Response {
    let body = state.health.report().await.and_then(|report| {
        serde_json::to_value(&report).map_err(|e| GateError::Internal(e.to_string()))
    });

    match body {
        Ok(body) => {
            let mut response = (StatusCode::OK, Json(body)).into_response();
            let headers = response.headers_mut();
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            );
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
            response
        }
        Err(e) => {
            error!(error = %e, "Health check endpoint error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "timestamp": now_rfc3339(),
                    "error": "Internal server error during health check",
                })),
            )
                .into_response()
        }
    }
}
