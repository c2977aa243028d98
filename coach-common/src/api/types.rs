//! Shared API request/response types
//!
//! Used by the evaluation service to render responses and by clients
//! (e.g. the HTTP poll consumer) to read them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Evaluation, EvaluationStatus, TerminalOutcome};

// ========================================
// Evaluation Views
// ========================================

/// Poll endpoint body: current status of one evaluation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationView {
    pub request_id: Uuid,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub status: EvaluationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl EvaluationView {
    /// Same rules as [`Evaluation::terminal_outcome`]
    pub fn terminal_outcome(&self) -> Option<TerminalOutcome> {
        match self.status {
            EvaluationStatus::Complete => Some(TerminalOutcome::Completed {
                result: self.result.clone().unwrap_or(Value::Null),
            }),
            EvaluationStatus::Error => Some(TerminalOutcome::Failed {
                message: self
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Evaluation failed".to_string()),
            }),
            _ => None,
        }
    }
}

impl From<&Evaluation> for EvaluationView {
    fn from(job: &Evaluation) -> Self {
        Self {
            request_id: job.request_id,
            session_id: job.session_id,
            status: job.status,
            result: job.result.clone(),
            score: job.score,
            error_message: job.error_message.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

/// Body returned by job creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvaluationResponse {
    pub request_id: Uuid,
    pub status: EvaluationStatus,
}

// ========================================
// Error Bodies
// ========================================

/// Error code carried by the 409 finalize body
pub const ALREADY_FINALIZED: &str = "ALREADY_FINALIZED";

/// 409 body for a finalize attempt on a terminal job
///
/// Idempotent retriers treat this as success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlreadyFinalizedBody {
    pub error: String,
    pub current_status: EvaluationStatus,
}

impl AlreadyFinalizedBody {
    pub fn new(current_status: EvaluationStatus) -> Self {
        Self {
            error: ALREADY_FINALIZED.to_string(),
            current_status,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}
