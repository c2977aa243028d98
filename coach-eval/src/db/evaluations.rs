//! Evaluation job store
//!
//! Every status change goes through [`JobStore::compare_and_set`], a single
//! `UPDATE ... WHERE request_id = ? AND status IN (...)` statement. Two
//! racing writers therefore produce exactly one success; the loser sees
//! `StoreError::Conflict` carrying the status that won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coach_common::events::{EvaluationEvent, EventBus};
use coach_common::{Evaluation, EvaluationStatus};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::users::parse_uuid;
use super::{retry_on_lock, StoreError};

const EVALUATION_COLUMNS: &str = "request_id, owner_id, session_id, status, result, score, \
                                  error_message, created_at, updated_at, completed_at";

const INSERT_PENDING: &str = r#"
    INSERT INTO evaluations (request_id, owner_id, session_id, status, created_at, updated_at)
    VALUES (?, ?, ?, 'pending', ?, ?)
"#;

// Inserts nothing while the session's latest job is anything but ERROR.
// One statement, so SQLite holds the write lock across the check.
const INSERT_PENDING_IF_RETRYABLE: &str = r#"
    INSERT INTO evaluations (request_id, owner_id, session_id, status, created_at, updated_at)
    SELECT ?, ?, ?, 'pending', ?, ?
    WHERE NOT EXISTS (
        SELECT 1 FROM (
            SELECT status FROM evaluations WHERE session_id = ?
            ORDER BY created_at DESC, rowid DESC LIMIT 1
        ) WHERE status != 'error'
    )
"#;

/// Terminal payload written by a finalizer
#[derive(Debug, Clone, PartialEq)]
pub enum FinalOutcome {
    Complete { result: Value, score: i64 },
    Error { message: String },
}

/// Status change applied by the conditional update
///
/// Each variant carries exactly the payload its target status requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// External scorer accepted the job
    Processing,
    Final(FinalOutcome),
}

impl Transition {
    pub fn target(&self) -> EvaluationStatus {
        match self {
            Transition::Processing => EvaluationStatus::Processing,
            Transition::Final(FinalOutcome::Complete { .. }) => EvaluationStatus::Complete,
            Transition::Final(FinalOutcome::Error { .. }) => EvaluationStatus::Error,
        }
    }
}

impl From<FinalOutcome> for Transition {
    fn from(outcome: FinalOutcome) -> Self {
        Transition::Final(outcome)
    }
}

/// Result of a guarded per-session insert
#[derive(Debug, Clone, PartialEq)]
pub enum SessionClaim {
    /// New PENDING job
    Created(Evaluation),
    /// Latest job for the session is still pending, processing or complete
    Blocked(Evaluation),
}

/// Persistent, request_id-keyed job storage
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a PENDING job; `DuplicateKey` if request_id exists
    async fn create(
        &self,
        request_id: Uuid,
        owner_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<Evaluation, StoreError>;

    async fn get_by_request_id(&self, request_id: Uuid) -> Result<Evaluation, StoreError>;

    /// Atomic compare-and-swap on status
    ///
    /// Applies `transition` only if the current status is in `expected`.
    /// Expected statuses that cannot legally reach the target are ignored,
    /// so a terminal row can never be overwritten.
    async fn compare_and_set(
        &self,
        request_id: Uuid,
        expected: &[EvaluationStatus],
        transition: Transition,
    ) -> Result<Evaluation, StoreError>;

    /// Insert a PENDING job for `session_id` unless its latest job is live or complete
    ///
    /// The check and the insert are one atomic step, so concurrent callers
    /// cannot both claim the same session.
    async fn create_if_retryable(
        &self,
        request_id: Uuid,
        owner_id: Uuid,
        session_id: Uuid,
    ) -> Result<SessionClaim, StoreError>;

    /// Most recent job created for a session
    async fn latest_for_session(&self, session_id: Uuid) -> Result<Option<Evaluation>, StoreError>;

    /// Write a terminal outcome if the job is still in `expected`
    async fn conditional_finalize(
        &self,
        request_id: Uuid,
        expected: &[EvaluationStatus],
        outcome: FinalOutcome,
    ) -> Result<Evaluation, StoreError> {
        self.compare_and_set(request_id, expected, outcome.into()).await
    }

    /// PENDING → PROCESSING
    async fn mark_processing(&self, request_id: Uuid) -> Result<Evaluation, StoreError> {
        self.compare_and_set(request_id, &[EvaluationStatus::Pending], Transition::Processing)
            .await
    }
}

/// SQLite-backed job store
///
/// Publishes every committed write on the change feed.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    feed: EventBus,
    max_lock_wait_ms: u64,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, feed: EventBus, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            feed,
            max_lock_wait_ms,
        }
    }

    /// Change feed this store publishes to
    pub fn feed(&self) -> &EventBus {
        &self.feed
    }

    /// Insert `job` as a PENDING row; false when the session guard refused it
    async fn insert_pending(&self, job: &Evaluation, session_guard: bool) -> Result<bool, StoreError> {
        let request_id = job.request_id;
        let id = request_id.to_string();
        let owner = job.owner_id.to_string();
        let session = job.session_id.map(|s| s.to_string());
        let timestamp = job.created_at.to_rfc3339();
        let (operation, sql) = if session_guard {
            ("create_evaluation_if_retryable", INSERT_PENDING_IF_RETRYABLE)
        } else {
            ("create_evaluation", INSERT_PENDING)
        };

        retry_on_lock(operation, self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let (id, owner, session, timestamp) =
                (id.clone(), owner.clone(), session.clone(), timestamp.clone());
            async move {
                let mut query = sqlx::query(sql)
                    .bind(&id)
                    .bind(&owner)
                    .bind(&session)
                    .bind(&timestamp)
                    .bind(&timestamp);
                if session_guard {
                    query = query.bind(&session);
                }
                let done = query.execute(&pool).await.map_err(|e| match e {
                    sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                        StoreError::DuplicateKey(request_id)
                    }
                    other => StoreError::Storage(other),
                })?;
                Ok(done.rows_affected() > 0)
            }
        })
        .await
    }

    fn publish_created(&self, job: &Evaluation) {
        tracing::debug!(request_id = %job.request_id, owner_id = %job.owner_id, "Evaluation row inserted");
        self.feed.emit_lossy(EvaluationEvent::EvaluationCreated {
            evaluation: job.clone(),
        });
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(
        &self,
        request_id: Uuid,
        owner_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<Evaluation, StoreError> {
        let job = Evaluation::new_pending(request_id, owner_id, session_id, Utc::now());
        self.insert_pending(&job, false).await?;
        self.publish_created(&job);
        Ok(job)
    }

    async fn create_if_retryable(
        &self,
        request_id: Uuid,
        owner_id: Uuid,
        session_id: Uuid,
    ) -> Result<SessionClaim, StoreError> {
        let job = Evaluation::new_pending(request_id, owner_id, Some(session_id), Utc::now());
        if self.insert_pending(&job, true).await? {
            self.publish_created(&job);
            return Ok(SessionClaim::Created(job));
        }

        // Rows are never deleted, so the blocking job is still there
        match self.latest_for_session(session_id).await? {
            Some(latest) => Ok(SessionClaim::Blocked(latest)),
            None => Err(StoreError::Corrupt(format!(
                "session {} refused a new job but has none",
                session_id
            ))),
        }
    }

    async fn get_by_request_id(&self, request_id: Uuid) -> Result<Evaluation, StoreError> {
        let sql = format!("SELECT {} FROM evaluations WHERE request_id = ?", EVALUATION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(request_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_evaluation(&row),
            None => Err(StoreError::NotFound(request_id)),
        }
    }

    async fn compare_and_set(
        &self,
        request_id: Uuid,
        expected: &[EvaluationStatus],
        transition: Transition,
    ) -> Result<Evaluation, StoreError> {
        let target = transition.target();
        let allowed: Vec<EvaluationStatus> = expected
            .iter()
            .copied()
            .filter(|status| status.can_transition_to(target))
            .collect();
        if allowed.is_empty() {
            return Err(StoreError::InvalidTransition { target });
        }

        let now = Utc::now().to_rfc3339();
        let (result, score, error_message, completed_at) = match &transition {
            Transition::Processing => (None, None, None, None),
            Transition::Final(FinalOutcome::Complete { result, score }) => {
                let result = serde_json::to_string(result)
                    .map_err(|e| StoreError::Corrupt(format!("unserializable result: {}", e)))?;
                (Some(result), Some(*score), None, Some(now.clone()))
            }
            Transition::Final(FinalOutcome::Error { message }) => {
                (None, None, Some(message.clone()), Some(now.clone()))
            }
        };

        let placeholders = vec!["?"; allowed.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE evaluations
            SET status = ?, result = ?, score = ?, error_message = ?,
                updated_at = ?, completed_at = ?
            WHERE request_id = ? AND status IN ({})
            RETURNING {}
            "#,
            placeholders, EVALUATION_COLUMNS
        );
        let id = request_id.to_string();

        let updated = retry_on_lock("compare_and_set", self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let sql = sql.clone();
            let (result, error_message, completed_at, now, id) = (
                result.clone(),
                error_message.clone(),
                completed_at.clone(),
                now.clone(),
                id.clone(),
            );
            let allowed = allowed.clone();
            async move {
                let mut query = sqlx::query(&sql)
                    .bind(target.as_str())
                    .bind(result)
                    .bind(score)
                    .bind(error_message)
                    .bind(now)
                    .bind(completed_at)
                    .bind(id);
                for status in &allowed {
                    query = query.bind(status.as_str());
                }
                let row = query.fetch_optional(&pool).await?;
                row.as_ref().map(row_to_evaluation).transpose()
            }
        })
        .await?;

        match updated {
            Some(job) => {
                tracing::info!(
                    request_id = %request_id,
                    status = %job.status,
                    "Evaluation status updated"
                );
                self.feed.emit_lossy(EvaluationEvent::EvaluationUpdated {
                    evaluation: job.clone(),
                });
                Ok(job)
            }
            None => {
                // Lost the race or never existed: report which
                let current = self.get_by_request_id(request_id).await?;
                tracing::debug!(
                    request_id = %request_id,
                    current = %current.status,
                    target = %target,
                    "Conditional update rejected"
                );
                Err(StoreError::Conflict {
                    request_id,
                    current: current.status,
                })
            }
        }
    }

    async fn latest_for_session(&self, session_id: Uuid) -> Result<Option<Evaluation>, StoreError> {
        let sql = format!(
            "SELECT {} FROM evaluations WHERE session_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            EVALUATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_evaluation).transpose()
    }
}

fn row_to_evaluation(row: &SqliteRow) -> Result<Evaluation, StoreError> {
    let request_id: String = row.get("request_id");
    let owner_id: String = row.get("owner_id");
    let session_id: Option<String> = row.get("session_id");
    let status: String = row.get("status");
    let result: Option<String> = row.get("result");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let completed_at: Option<String> = row.get("completed_at");

    let result = result
        .map(|text| {
            serde_json::from_str::<Value>(&text)
                .map_err(|e| StoreError::Corrupt(format!("result is not JSON: {}", e)))
        })
        .transpose()?;

    Ok(Evaluation {
        request_id: parse_uuid(&request_id)?,
        owner_id: parse_uuid(&owner_id)?,
        session_id: session_id.as_deref().map(parse_uuid).transpose()?,
        status: status
            .parse()
            .map_err(|e: coach_common::Error| StoreError::Corrupt(e.to_string()))?,
        result,
        score: row.get("score"),
        error_message: row.get("error_message"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp {:?}: {}", value, e)))
}
