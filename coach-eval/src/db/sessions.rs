//! Practice session rows (denormalized evaluation mirror)
//!
//! The session row is owned by the practice flow; this service only reads
//! its owner and writes the evaluation summary onto it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::users::parse_uuid;
use super::StoreError;

/// Session status written once an evaluation is mirrored
pub const SESSION_COMPLETED: &str = "completed";

/// Session row as read by the evaluation service
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub score: Option<i64>,
    pub passed: Option<bool>,
    pub processed_feedback: Option<Value>,
    pub ended_at: Option<String>,
}

/// Evaluation summary copied onto a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMirror {
    pub score: i64,
    pub passed: bool,
    pub processed_feedback: Option<Value>,
    pub ended_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError>;

    /// Write the mirror; `Ok(false)` when no such session exists
    async fn apply_mirror(&self, session_id: Uuid, mirror: &SessionMirror) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a session for a user (practice-flow side, used for seeding)
    pub async fn insert(&self, user_id: Uuid) -> Result<SessionRecord, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO voice_sessions (id, user_id, status, started_at, updated_at)
             VALUES (?, ?, 'in_progress', ?, ?)",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(SessionRecord {
            id,
            user_id,
            status: "in_progress".to_string(),
            score: None,
            passed: None,
            processed_feedback: None,
            ended_at: None,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, session_id: Uuid) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, status, score, passed, processed_feedback, ended_at
             FROM voice_sessions WHERE id = ?",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.get("id");
        let user_id: String = row.get("user_id");
        let feedback: Option<String> = row.get("processed_feedback");
        let processed_feedback = feedback
            .map(|text| {
                serde_json::from_str(&text)
                    .map_err(|e| StoreError::Corrupt(format!("processed_feedback is not JSON: {}", e)))
            })
            .transpose()?;

        Ok(Some(SessionRecord {
            id: parse_uuid(&id)?,
            user_id: parse_uuid(&user_id)?,
            status: row.get("status"),
            score: row.get("score"),
            passed: row.get::<Option<i64>, _>("passed").map(|v| v != 0),
            processed_feedback,
            ended_at: row.get("ended_at"),
        }))
    }

    async fn apply_mirror(&self, session_id: Uuid, mirror: &SessionMirror) -> Result<bool, StoreError> {
        let feedback = mirror
            .processed_feedback
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("unserializable feedback: {}", e)))?;

        let result = sqlx::query(
            r#"
            UPDATE voice_sessions
            SET score = ?, passed = ?, processed_feedback = ?, status = ?,
                ended_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(mirror.score)
        .bind(mirror.passed)
        .bind(feedback)
        .bind(SESSION_COMPLETED)
        .bind(mirror.ended_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(session_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
