//! coach-eval - Evaluation job service
//!
//! Tracks asynchronous scoring of practice sessions: creates jobs, accepts
//! exactly one finalization per job, mirrors results onto sessions, and
//! serves status to polling and streaming consumers.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use coach_common::config::{load_toml_config, resolve_config_path};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coach_eval::config::{ConfigOverrides, ServiceConfig, TomlConfig};
use coach_eval::db::init_database_pool;
use coach_eval::{build_router, AppState};

const CONFIG_FILE_NAME: &str = "coach-eval.toml";
const CONFIG_ENV_VAR: &str = "COACH_CONFIG";

/// Command-line arguments for coach-eval
#[derive(Parser, Debug)]
#[command(name = "coach-eval")]
#[command(about = "Evaluation job lifecycle service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "COACH_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "COACH_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "COACH_DATABASE")]
    database: Option<PathBuf>,

    /// Shared secret expected from the external scorer
    #[arg(long, env = "COACH_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,

    /// HS256 secret for verifying bearer tokens
    #[arg(long, env = "COACH_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// External scorer endpoint
    #[arg(long, env = "COACH_SCORER_URL")]
    scorer_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let toml_config: TomlConfig =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;
    let default_level = toml_config.logging.level.clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("coach_eval={lvl},coach_common={lvl},tower_http=info", lvl = default_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting coach-eval v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("No configuration file; using defaults"),
    }

    let overrides = ConfigOverrides {
        host: args.host,
        port: args.port,
        database_path: args.database,
        webhook_secret: args.webhook_secret,
        jwt_secret: args.jwt_secret,
        scorer_url: args.scorer_url,
    };
    let config = ServiceConfig::resolve(toml_config, overrides).context("Invalid configuration")?;

    info!("Log level: {}", config.log_level);
    info!("Database path: {}", config.database.path.display());
    let pool = init_database_pool(&config.database.path, config.database.max_connections)
        .await
        .context("Failed to initialize database")?;
    info!("✓ Database ready");

    match &config.scorer.url {
        Some(url) => info!("External scorer: {}", url),
        None => info!("External scorer not configured; jobs wait for callers to dispatch"),
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;

    let state = AppState::new(pool, config).context("Failed to build scorer client")?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("coach-eval listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
