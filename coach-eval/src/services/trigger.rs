//! Administrative re-evaluation
//!
//! Starts a new job for a session only when it has none yet or its latest
//! job ended in ERROR. Jobs in flight or completed are left alone; finished
//! jobs are never reopened. The check and the insert happen in one store
//! call, so concurrent triggers for a session create at most one job.

use coach_common::{Evaluation, EvaluationStatus};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{SessionClaim, SessionStore, StoreError};
use crate::services::creator::JobCreator;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// Latest job is pending, processing or complete
    #[error("Session {session_id} already has evaluation {request_id} ({status})")]
    NotRetryable {
        session_id: Uuid,
        request_id: Uuid,
        status: EvaluationStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ManualTrigger {
    sessions: Arc<dyn SessionStore>,
    creator: JobCreator,
}

impl ManualTrigger {
    pub fn new(sessions: Arc<dyn SessionStore>, creator: JobCreator) -> Self {
        Self { sessions, creator }
    }

    /// Create and dispatch a job for the session's owner
    pub async fn trigger(&self, session_id: Uuid) -> Result<Evaluation, TriggerError> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(TriggerError::SessionNotFound(session_id))?;

        match self.creator.create_if_retryable(session.user_id, session_id).await? {
            SessionClaim::Created(job) => {
                tracing::info!(
                    session_id = %session_id,
                    request_id = %job.request_id,
                    "Manual evaluation started"
                );
                Ok(job)
            }
            SessionClaim::Blocked(latest) => {
                tracing::warn!(
                    session_id = %session_id,
                    request_id = %latest.request_id,
                    status = %latest.status,
                    "Manual evaluation refused"
                );
                Err(TriggerError::NotRetryable {
                    session_id,
                    request_id: latest.request_id,
                    status: latest.status,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_pool, users, FinalOutcome, JobStore, SqliteJobStore, SqliteSessionStore};
    use crate::services::scorer_client::ScorerDispatcher;
    use coach_common::events::EventBus;
    use serde_json::json;

    struct Fixture {
        trigger: ManualTrigger,
        jobs: Arc<SqliteJobStore>,
        session_id: Uuid,
        owner_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let pool = init_memory_pool().await.unwrap();
        let owner = users::insert_user(&pool, "auth-trigger", None).await.unwrap();
        let jobs = Arc::new(SqliteJobStore::new(pool.clone(), EventBus::new(16), 1000));
        let sessions = Arc::new(SqliteSessionStore::new(pool));
        let session = sessions.insert(owner.id).await.unwrap();
        let creator = JobCreator::new(jobs.clone(), ScorerDispatcher::disabled(jobs.clone()));
        Fixture {
            trigger: ManualTrigger::new(sessions, creator),
            jobs,
            session_id: session.id,
            owner_id: owner.id,
        }
    }

    #[tokio::test]
    async fn test_first_trigger_creates_job() {
        let f = fixture().await;
        let job = f.trigger.trigger(f.session_id).await.unwrap();
        assert_eq!(job.owner_id, f.owner_id);
        assert_eq!(job.session_id, Some(f.session_id));
        assert_eq!(job.status, EvaluationStatus::Pending);
    }

    #[tokio::test]
    async fn test_trigger_refused_while_in_flight() {
        let f = fixture().await;
        f.trigger.trigger(f.session_id).await.unwrap();

        let err = f.trigger.trigger(f.session_id).await.unwrap_err();
        assert!(matches!(
            err,
            TriggerError::NotRetryable { status: EvaluationStatus::Pending, .. }
        ));
    }

    #[tokio::test]
    async fn test_trigger_refused_after_completion() {
        let f = fixture().await;
        let job = f.trigger.trigger(f.session_id).await.unwrap();
        f.jobs
            .conditional_finalize(
                job.request_id,
                &EvaluationStatus::FINALIZABLE,
                FinalOutcome::Complete { result: json!({"score": 80}), score: 80 },
            )
            .await
            .unwrap();

        assert!(matches!(
            f.trigger.trigger(f.session_id).await.unwrap_err(),
            TriggerError::NotRetryable { status: EvaluationStatus::Complete, .. }
        ));
    }

    #[tokio::test]
    async fn test_trigger_retries_after_error() {
        let f = fixture().await;
        let failed = f.trigger.trigger(f.session_id).await.unwrap();
        f.jobs
            .conditional_finalize(
                failed.request_id,
                &EvaluationStatus::FINALIZABLE,
                FinalOutcome::Error { message: "scorer down".into() },
            )
            .await
            .unwrap();

        let retry = f.trigger.trigger(f.session_id).await.unwrap();
        assert_ne!(retry.request_id, failed.request_id);

        let old = f.jobs.get_by_request_id(failed.request_id).await.unwrap();
        assert_eq!(old.status, EvaluationStatus::Error);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture().await;
        assert!(matches!(
            f.trigger.trigger(Uuid::new_v4()).await.unwrap_err(),
            TriggerError::SessionNotFound(_)
        ));
    }
}
