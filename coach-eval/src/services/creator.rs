//! Job creation
//!
//! Every job gets a fresh UUIDv4 request_id, which is its correlation token
//! with the external scorer and its idempotency key for finalization.

use coach_common::Evaluation;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{JobStore, SessionClaim, StoreError};
use crate::services::scorer_client::ScorerDispatcher;

#[derive(Clone)]
pub struct JobCreator {
    jobs: Arc<dyn JobStore>,
    dispatcher: ScorerDispatcher,
}

impl JobCreator {
    pub fn new(jobs: Arc<dyn JobStore>, dispatcher: ScorerDispatcher) -> Self {
        Self { jobs, dispatcher }
    }

    /// Persist a PENDING job, then hand it to the scorer in the background
    ///
    /// The returned job is the PENDING snapshot; dispatch outcome arrives
    /// later through the store.
    pub async fn create(
        &self,
        owner_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<Evaluation, StoreError> {
        let request_id = Uuid::new_v4();
        let job = self.jobs.create(request_id, owner_id, session_id).await?;

        tracing::info!(
            request_id = %job.request_id,
            owner_id = %owner_id,
            session_id = ?session_id,
            "Evaluation job created"
        );

        self.dispatcher.dispatch(&job);
        Ok(job)
    }

    /// Create and dispatch a job for a session whose latest job is absent or ERROR
    ///
    /// A `Blocked` claim carries the job that prevented creation; nothing
    /// is dispatched for it.
    pub async fn create_if_retryable(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
    ) -> Result<SessionClaim, StoreError> {
        let claim = self
            .jobs
            .create_if_retryable(Uuid::new_v4(), owner_id, session_id)
            .await?;

        if let SessionClaim::Created(job) = &claim {
            tracing::info!(
                request_id = %job.request_id,
                owner_id = %owner_id,
                session_id = %session_id,
                "Evaluation job created for session"
            );
            self.dispatcher.dispatch(job);
        }
        Ok(claim)
    }
}
