//! POST /api/complete-short-evaluation
//!
//! Lets the job owner close out a session too short to score. The result is
//! fixed (score 0, not passed) and nothing is sent to the external scorer.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{DateTime, Utc};
use coach_common::EvaluationStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::services::finalizer::{FinalizeOutcome, ShortFinalize};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ShortEvaluationPayload {
    pub request_id: Uuid,
    pub user_message_count: u32,
}

#[derive(Debug, Serialize)]
pub struct ShortEvaluation {
    pub request_id: Uuid,
    pub status: EvaluationStatus,
    pub result: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ShortEvaluationResponse {
    pub ok: bool,
    pub evaluation: ShortEvaluation,
}

pub async fn complete_short_evaluation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<ShortEvaluationPayload>, JsonRejection>,
) -> ApiResult<Json<ShortEvaluationResponse>> {
    let Json(payload) = payload?;
    let request = ShortFinalize {
        request_id: payload.request_id,
        user_message_count: payload.user_message_count,
    };

    match state.finalizer.finalize_short(request, &user).await? {
        FinalizeOutcome::Finalized { evaluation, .. } => Ok(Json(ShortEvaluationResponse {
            ok: true,
            evaluation: ShortEvaluation {
                request_id: evaluation.request_id,
                status: evaluation.status,
                result: evaluation.result,
                updated_at: evaluation.updated_at,
            },
        })),
        FinalizeOutcome::AlreadyFinalized { current_status } => {
            Err(ApiError::AlreadyFinalized { current_status })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_count_rejected() {
        let parsed: Result<ShortEvaluationPayload, _> =
            serde_json::from_value(json!({"request_id": Uuid::new_v4()}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_negative_count_rejected() {
        let parsed: Result<ShortEvaluationPayload, _> = serde_json::from_value(
            json!({"request_id": Uuid::new_v4(), "user_message_count": -1}),
        );
        assert!(parsed.is_err());
    }
}
