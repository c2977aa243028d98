//! Database layer for coach-eval
//!
//! SQLite through sqlx. Tables are created idempotently at startup.

pub mod evaluations;
pub mod retry;
pub mod sessions;
pub mod users;

pub use evaluations::{FinalOutcome, JobStore, SessionClaim, SqliteJobStore, Transition};
pub use retry::retry_on_lock;
pub use sessions::{SessionMirror, SessionRecord, SessionStore, SqliteSessionStore};

use coach_common::EvaluationStatus;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Storage-level errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// request_id already exists
    #[error("Duplicate request_id: {0}")]
    DuplicateKey(Uuid),

    #[error("Evaluation not found: {0}")]
    NotFound(Uuid),

    /// Conditional update lost: the row is no longer in an expected status
    #[error("Evaluation {request_id} is already {current}")]
    Conflict {
        request_id: Uuid,
        current: EvaluationStatus,
    },

    /// Requested transition is not part of the state machine
    #[error("Invalid transition to {target}")]
    InvalidTransition { target: EvaluationStatus },

    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Lock contention outlasted the retry budget
    #[error("Database busy: {0}")]
    Busy(String),

    /// Row content could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Open (creating if needed) the service database and ensure tables exist
pub async fn init_database_pool(path: &Path, max_connections: u32) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Corrupt(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    tracing::info!(path = %path.display(), "Database initialized");
    Ok(pool)
}

/// Single-connection in-memory database with tables created
///
/// One connection keeps every query on the same in-memory database.
pub async fn init_memory_pool() -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn init_tables(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            auth_id TEXT NOT NULL UNIQUE,
            email TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_roles (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            PRIMARY KEY (user_id, role)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            status TEXT NOT NULL DEFAULT 'in_progress',
            score INTEGER,
            passed INTEGER,
            processed_feedback TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // session_id is a weak reference: no foreign key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluations (
            request_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES users(id),
            session_id TEXT,
            status TEXT NOT NULL
                CHECK (status IN ('pending', 'processing', 'complete', 'error')),
            result TEXT,
            score INTEGER,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT,
            CHECK ((status = 'complete') = (result IS NOT NULL)),
            CHECK ((status = 'error') = (error_message IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evaluations_session ON evaluations(session_id, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evaluations_owner ON evaluations(owner_id)")
        .execute(pool)
        .await?;

    Ok(())
}
