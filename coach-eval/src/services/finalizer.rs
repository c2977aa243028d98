//! Evaluation finalizers
//!
//! Two actors may finalize a job:
//! - The external scorer, through the webhook (shared-secret authenticated)
//! - The job owner, through the short path for sessions too brief to score
//!
//! Both go through the same conditional update expecting PENDING or
//! PROCESSING. Losing that race is reported as `AlreadyFinalized`, which
//! callers treat as success. The session mirror is written only after a
//! successful terminal write.

use coach_common::{Evaluation, EvaluationStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::EvaluationPolicy;
use crate::db::users::PlatformUser;
use crate::db::{FinalOutcome, JobStore, StoreError};
use crate::services::mirror::{MirrorStatus, MirrorUpdater};
use crate::services::scoring;

/// Feedback stored for sessions too short to evaluate
pub const INSUFFICIENT_CONTENT_FEEDBACK: &str = "The interaction was very brief and limited to an \
    initial greeting. There is not enough content to evaluate conversation technique or product \
    knowledge.";

/// Reason recorded in short-path result metadata
pub const INSUFFICIENT_CONTENT_REASON: &str = "insufficient_user_messages";

/// Message stored when the scorer reports an error without detail
pub const DEFAULT_SCORER_ERROR: &str = "External scorer reported an error";

/// Validated webhook request
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookFinalize {
    pub request_id: Uuid,
    pub outcome: ScorerOutcome,
}

/// Terminal outcome reported by the external scorer
#[derive(Debug, Clone, PartialEq)]
pub enum ScorerOutcome {
    Complete { result: Value },
    Error { message: String },
}

/// Validated short-path request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortFinalize {
    pub request_id: Uuid,
    pub user_message_count: u32,
}

/// Result of a finalize call
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    /// This call wrote the terminal state
    Finalized {
        evaluation: Evaluation,
        passed: bool,
        mirror: MirrorStatus,
    },
    /// Another finalizer won; nothing changed
    AlreadyFinalized { current_status: EvaluationStatus },
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("Evaluation not found: {0}")]
    NotFound(Uuid),

    /// Caller does not own the job
    #[error("Caller does not own evaluation {0}")]
    NotOwner(Uuid),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for FinalizeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => FinalizeError::NotFound(id),
            other => FinalizeError::Store(other),
        }
    }
}

/// Applies terminal outcomes to jobs
#[derive(Clone)]
pub struct Finalizer {
    jobs: Arc<dyn JobStore>,
    mirror: MirrorUpdater,
    policy: EvaluationPolicy,
}

impl Finalizer {
    pub fn new(jobs: Arc<dyn JobStore>, mirror: MirrorUpdater, policy: EvaluationPolicy) -> Self {
        Self {
            jobs,
            mirror,
            policy,
        }
    }

    /// Apply the external scorer's outcome
    pub async fn finalize_webhook(
        &self,
        request: WebhookFinalize,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let WebhookFinalize { request_id, outcome } = request;

        let (final_outcome, score) = match outcome {
            ScorerOutcome::Complete { result } => {
                let score = scoring::derive_score(&result);
                (FinalOutcome::Complete { result, score }, score)
            }
            ScorerOutcome::Error { message } => (FinalOutcome::Error { message }, 0),
        };
        let passed = scoring::is_passing(score, self.policy.pass_threshold);

        tracing::info!(
            request_id = %request_id,
            score,
            passed,
            threshold = self.policy.pass_threshold,
            "Applying scorer outcome"
        );

        self.apply(request_id, final_outcome, score, passed).await
    }

    /// Apply the fixed insufficient-content result on behalf of the owner
    pub async fn finalize_short(
        &self,
        request: ShortFinalize,
        caller: &PlatformUser,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let ShortFinalize {
            request_id,
            user_message_count,
        } = request;

        let job = self.jobs.get_by_request_id(request_id).await?;
        if job.owner_id != caller.id {
            tracing::warn!(
                request_id = %request_id,
                caller = %caller.id,
                owner = %job.owner_id,
                "Short-path finalize refused: caller is not the owner"
            );
            return Err(FinalizeError::NotOwner(request_id));
        }

        tracing::info!(
            request_id = %request_id,
            user_message_count,
            "Completing evaluation with insufficient-content result"
        );

        let outcome = FinalOutcome::Complete {
            result: insufficient_content_result(user_message_count),
            score: 0,
        };
        self.apply(request_id, outcome, 0, false).await
    }

    async fn apply(
        &self,
        request_id: Uuid,
        outcome: FinalOutcome,
        score: i64,
        passed: bool,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        match self
            .jobs
            .conditional_finalize(request_id, &EvaluationStatus::FINALIZABLE, outcome)
            .await
        {
            Ok(evaluation) => {
                let mirror = self.mirror.propagate(&evaluation, score, passed).await;
                Ok(FinalizeOutcome::Finalized {
                    evaluation,
                    passed,
                    mirror,
                })
            }
            Err(StoreError::Conflict { current, .. }) => {
                tracing::warn!(
                    request_id = %request_id,
                    current_status = %current,
                    "Attempted to update already finalized evaluation"
                );
                Ok(FinalizeOutcome::AlreadyFinalized {
                    current_status: current,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Fixed zero-score result for sessions too short to evaluate
pub fn insufficient_content_result(user_message_count: u32) -> Value {
    json!({
        "score": 0,
        "feedback": INSUFFICIENT_CONTENT_FEEDBACK,
        "metadata": {
            "user_message_count": user_message_count,
            "skipped_n8n": true,
            "reason": INSUFFICIENT_CONTENT_REASON,
        }
    })
}
