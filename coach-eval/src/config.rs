//! Service configuration
//!
//! Priority (highest first): command line, environment (both via clap),
//! TOML file, built-in defaults. The resolved [`ServiceConfig`] is passed
//! explicitly to every component that needs it.

use coach_common::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// TOML bootstrap configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub evaluation: EvaluationPolicy,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Upper bound for lock-contention retries on writes
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

/// Shared secret expected from the external scorer
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebhookConfig {
    #[serde(default)]
    pub secret: String,
}

/// Bearer token verification settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IdentityConfig {
    /// HS256 signing secret of the identity service
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

/// External scorer dispatch settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    /// Dispatch disabled when unset; callers forward request_id themselves
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_scorer_timeout_ms")]
    pub timeout_ms: u64,
    /// Webhook URL handed to the scorer
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_scorer_timeout_ms(),
            callback_url: None,
        }
    }
}

impl ScorerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Scoring policy applied by the finalizers
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationPolicy {
    /// Minimum overall score counted as passed
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: i64,
}

impl Default for EvaluationPolicy {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
        }
    }
}

/// Bounded poll loop parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_attempts: default_poll_max_attempts(),
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("coach").join("coach.db"))
        .unwrap_or_else(|| PathBuf::from("./coach.db"))
}

fn default_max_connections() -> u32 {
    8
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_scorer_timeout_ms() -> u64 {
    30_000
}

fn default_pass_threshold() -> i64 {
    70
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line (and environment) overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub webhook_secret: Option<String>,
    pub jwt_secret: Option<String>,
    pub scorer_url: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub webhook_secret: String,
    pub identity: IdentityConfig,
    pub scorer: ScorerConfig,
    pub evaluation: EvaluationPolicy,
    pub poll: PollSettings,
    pub log_level: String,
}

impl ServiceConfig {
    /// Apply overrides on top of the TOML file and validate
    pub fn resolve(toml: TomlConfig, overrides: ConfigOverrides) -> Result<Self> {
        let TomlConfig {
            server,
            mut database,
            webhook,
            mut identity,
            mut scorer,
            evaluation,
            poll,
            logging,
        } = toml;

        if let Some(path) = overrides.database_path {
            database.path = path;
        }
        if let Some(secret) = overrides.jwt_secret {
            identity.jwt_secret = secret;
        }
        if overrides.scorer_url.is_some() {
            scorer.url = overrides.scorer_url;
        }

        let config = Self {
            host: overrides.host.unwrap_or(server.host),
            port: overrides.port.unwrap_or(server.port),
            database,
            webhook_secret: overrides.webhook_secret.unwrap_or(webhook.secret),
            identity,
            scorer,
            evaluation,
            poll,
            log_level: logging.level,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.webhook_secret.trim().is_empty() {
            return Err(Error::Config(
                "webhook secret must be set ([webhook] secret or COACH_WEBHOOK_SECRET)".into(),
            ));
        }
        if self.identity.jwt_secret.trim().is_empty() {
            return Err(Error::Config(
                "identity secret must be set ([identity] jwt_secret or COACH_JWT_SECRET)".into(),
            ));
        }
        if !(0..=100).contains(&self.evaluation.pass_threshold) {
            return Err(Error::Config(format!(
                "pass_threshold must be within 0..=100, got {}",
                self.evaluation.pass_threshold
            )));
        }
        if self.poll.max_attempts == 0 || self.poll.interval_ms == 0 {
            return Err(Error::Config(
                "poll interval_ms and max_attempts must be positive".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(Error::Config("max_connections must be positive".into()));
        }
        Ok(())
    }

    /// Minimal valid configuration for tests and embedding
    pub fn for_secrets(webhook_secret: &str, jwt_secret: &str) -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: DatabaseConfig::default(),
            webhook_secret: webhook_secret.to_string(),
            identity: IdentityConfig {
                jwt_secret: jwt_secret.to_string(),
                issuer: None,
                audience: None,
            },
            scorer: ScorerConfig::default(),
            evaluation: EvaluationPolicy::default(),
            poll: PollSettings::default(),
            log_level: default_log_level(),
        }
    }
}
