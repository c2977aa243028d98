//! Evaluation job model
//!
//! An evaluation job tracks one asynchronous scoring request. Status moves
//! forward only: PENDING → PROCESSING → {COMPLETE | ERROR}, and the two
//! terminal states accept no further transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Evaluation job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    /// Created, waiting for the external scorer
    Pending,
    /// External scorer accepted the request
    Processing,
    /// Result recorded (terminal)
    Complete,
    /// Failure recorded (terminal)
    Error,
}

impl EvaluationStatus {
    /// Statuses a finalizer may move a job out of
    pub const FINALIZABLE: [EvaluationStatus; 2] =
        [EvaluationStatus::Pending, EvaluationStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "pending",
            EvaluationStatus::Processing => "processing",
            EvaluationStatus::Complete => "complete",
            EvaluationStatus::Error => "error",
        }
    }

    /// Complete and error are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationStatus::Complete | EvaluationStatus::Error)
    }

    /// Forward-only transition table
    pub fn can_transition_to(&self, next: EvaluationStatus) -> bool {
        use EvaluationStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Complete) | (Pending, Error)
                | (Processing, Complete) | (Processing, Error)
        )
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EvaluationStatus::Pending),
            "processing" => Ok(EvaluationStatus::Processing),
            "complete" => Ok(EvaluationStatus::Complete),
            "error" => Ok(EvaluationStatus::Error),
            other => Err(Error::InvalidInput(format!(
                "Unknown evaluation status: {}",
                other
            ))),
        }
    }
}

/// Persisted evaluation job
///
/// `result` is present iff status is COMPLETE, `error_message` iff ERROR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Correlation token and idempotency key, never reused
    pub request_id: Uuid,
    /// Platform user who requested the evaluation
    pub owner_id: Uuid,
    /// Practice session mirrored on finalization (absent in demo flows)
    pub session_id: Option<Uuid>,
    pub status: EvaluationStatus,
    pub result: Option<Value>,
    /// Overall score derived at finalization
    pub score: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    /// New job in PENDING state
    pub fn new_pending(
        request_id: Uuid,
        owner_id: Uuid,
        session_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            owner_id,
            session_id,
            status: EvaluationStatus::Pending,
            result: None,
            score: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Payload/status agreement check
    pub fn is_consistent(&self) -> bool {
        let result_ok = self.result.is_some() == (self.status == EvaluationStatus::Complete);
        let error_ok = self.error_message.is_some() == (self.status == EvaluationStatus::Error);
        result_ok && error_ok
    }

    /// What a waiting consumer acts on, once the job is terminal
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
            EvaluationStatus::Pending | EvaluationStatus::Processing => None,
        }
    }
}

/// Terminal state as seen by a notification consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalOutcome {
    /// Consume the result
    Completed { result: Value },
    /// Surface the message
    Failed { message: String },
}
