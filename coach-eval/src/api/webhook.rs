//! POST /api/evaluation-complete
//!
//! Called by the external scorer once per job. The shared secret is checked
//! by middleware before this handler runs. Redelivery after a terminal write
//! answers 409 ALREADY_FINALIZED, which the scorer treats as success.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{DateTime, Utc};
use coach_common::EvaluationStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::finalizer::{
    FinalizeOutcome, ScorerOutcome, WebhookFinalize, DEFAULT_SCORER_ERROR,
};
use crate::AppState;

/// Webhook body as sent by the scorer
#[derive(Debug, Deserialize)]
pub struct EvaluationCompletePayload {
    pub request_id: Uuid,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, alias = "error")]
    pub error_message: Option<String>,
}

impl TryFrom<EvaluationCompletePayload> for WebhookFinalize {
    type Error = ApiError;

    fn try_from(payload: EvaluationCompletePayload) -> Result<Self, Self::Error> {
        let status = payload.status.as_deref().unwrap_or("complete");

        let outcome = match status {
            "complete" => match payload.result {
                Some(result @ Value::Object(_)) => ScorerOutcome::Complete { result },
                Some(_) => {
                    return Err(ApiError::BadRequest("result must be a JSON object".into()))
                }
                None => {
                    return Err(ApiError::BadRequest(
                        "result is required when status is complete".into(),
                    ))
                }
            },
            "error" => ScorerOutcome::Error {
                message: payload
                    .error_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SCORER_ERROR.to_string()),
            },
            other => {
                return Err(ApiError::BadRequest(format!(
                    "status must be 'complete' or 'error', got '{}'",
                    other
                )))
            }
        };

        Ok(WebhookFinalize {
            request_id: payload.request_id,
            outcome,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookEvaluation {
    pub request_id: Uuid,
    pub status: EvaluationStatus,
    pub score: Option<i64>,
    pub passed: bool,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    pub evaluation: WebhookEvaluation,
}

pub async fn evaluation_complete(
    State(state): State<AppState>,
    payload: Result<Json<EvaluationCompletePayload>, JsonRejection>,
) -> ApiResult<Json<WebhookResponse>> {
    let Json(payload) = payload?;
    let request = WebhookFinalize::try_from(payload)?;

    match state.finalizer.finalize_webhook(request).await? {
        FinalizeOutcome::Finalized {
            evaluation, passed, ..
        } => Ok(Json(WebhookResponse {
            ok: true,
            evaluation: WebhookEvaluation {
                request_id: evaluation.request_id,
                status: evaluation.status,
                score: evaluation.score,
                passed,
                updated_at: evaluation.updated_at,
                completed_at: evaluation.completed_at,
            },
        })),
        FinalizeOutcome::AlreadyFinalized { current_status } => {
            Err(ApiError::AlreadyFinalized { current_status })
        }
    }
}
