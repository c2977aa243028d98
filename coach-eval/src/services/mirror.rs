//! Session mirror propagation
//!
//! Runs strictly after a job's terminal write. Failures are logged and
//! swallowed: the job row stays authoritative and is never reverted.

use chrono::Utc;
use coach_common::Evaluation;
use std::sync::Arc;

use crate::db::{SessionMirror, SessionStore};

/// What happened to the mirror write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorStatus {
    Written,
    /// Job has no session
    Skipped,
    /// session_id points at no row
    SessionMissing,
    /// Write failed; logged only
    Failed(String),
}

#[derive(Clone)]
pub struct MirrorUpdater {
    sessions: Arc<dyn SessionStore>,
}

impl MirrorUpdater {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }

    /// Copy score/passed/feedback onto the job's session, best effort
    pub async fn propagate(&self, job: &Evaluation, score: i64, passed: bool) -> MirrorStatus {
        let Some(session_id) = job.session_id else {
            return MirrorStatus::Skipped;
        };

        let mirror = SessionMirror {
            score,
            passed,
            processed_feedback: job.result.clone(),
            ended_at: job.completed_at.unwrap_or_else(Utc::now),
        };

        match self.sessions.apply_mirror(session_id, &mirror).await {
            Ok(true) => {
                tracing::info!(
                    request_id = %job.request_id,
                    session_id = %session_id,
                    score,
                    passed,
                    "Session mirror updated"
                );
                MirrorStatus::Written
            }
            Ok(false) => {
                tracing::warn!(
                    request_id = %job.request_id,
                    session_id = %session_id,
                    "Session mirror skipped: session not found"
                );
                MirrorStatus::SessionMissing
            }
            Err(e) => {
                tracing::error!(
                    request_id = %job.request_id,
                    session_id = %session_id,
                    error = %e,
                    "Session mirror write failed; evaluation result kept"
                );
                MirrorStatus::Failed(e.to_string())
            }
        }
    }
}
