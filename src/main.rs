use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use emma_gate::auth::{hash_password, JwtSessionProvider, StaticUserDirectory};
use emma_gate::config::GateConfig;
use emma_gate::gate::RequestGate;
use emma_gate::http::{AppState, HealthReporter, HttpServer, SignInService, TcpDatabaseProbe};
use emma_gate::ratelimit::{Clock, InMemoryStore, RateLimiter, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Request gate for the Emma Companionship service.
#[derive(Debug, Parser)]
#[command(name = "emma-gate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "EMMA_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print an Argon2 hash for an `auth.accounts` entry and exit
    HashPassword {
        /// Password to hash
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(Command::HashPassword { password }) = &args.command {
        println!("{}", hash_password(password)?);
        return Ok(());
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init(),
    }

    info!("Starting Emma request gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GateConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.http_addr = bind;
    }
    config.validate()?;
    info!(
        http_addr = %config.server.http_addr,
        environment = %config.environment,
        "Configuration loaded"
    );

    let secret = match config.auth.secret.clone() {
        Some(secret) => secret,
        None => {
            warn!("No session secret configured, using an ephemeral one; sessions will not survive a restart");
            format!("{}{}", Uuid::new_v4(), Uuid::new_v4())
        }
    };
    let sessions = Arc::new(
        JwtSessionProvider::new(secret.as_bytes())
            .with_cookie_name(config.auth.session_cookie.clone())
            .with_max_age(std::time::Duration::from_secs(config.auth.session_max_age_secs)),
    );

    let directory = StaticUserDirectory::from_accounts(&config.auth.accounts)?;
    if directory.is_empty() {
        warn!("No accounts configured under auth.accounts; every sign-in will be rejected");
    }

    // Counter store and its sweeper
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryStore::new());
    let sweeper = store.clone().spawn_sweeper(clock.clone(), config.sweep_interval());
    let limiter = RateLimiter::new(store).with_timeout(config.store_timeout());

    let rules = config.rate_limit_rules()?;
    info!(windows = rules.windows.len(), routes = rules.routes.len(), "Rate limit rules loaded");

    let gate = RequestGate::new(config.routes.clone(), rules, limiter, sessions.clone())
        .with_clock(clock)
        .with_sign_in_path(config.auth.sign_in_path.clone())
        .with_auth_timeout(config.auth_lookup_timeout())
        .trust_forwarded_headers(config.server.trust_forwarded_headers);

    let mut health = HealthReporter::new(config.environment).with_auth_configured(config.auth.secret.is_some());
    if let Some(url) = config.database_url.as_deref() {
        health = health.with_database(Arc::new(TcpDatabaseProbe::from_url(url)?));
    }

    let state = AppState::new(gate, health).with_sign_in(SignInService {
        directory: Arc::new(directory),
        sessions,
        secure_cookie: config.environment.is_production(),
    });
    let reloader = config
        .rate_limiting
        .rules_path
        .as_ref()
        .map(|path| state.gate.clone().spawn_rules_reloader(PathBuf::from(path), config.reload_interval()));

    info!("Starting HTTP server on {}", config.server.http_addr);

    // Run the server with graceful shutdown on Ctrl+C
    let served = HttpServer::new(config.server.http_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    if let Some(reloader) = reloader {
        reloader.abort();
    }
    served?;

    info!("Emma request gate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
