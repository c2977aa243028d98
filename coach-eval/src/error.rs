//! Error types for coach-eval
//!
//! Each variant maps to one HTTP status. Storage failures reach the caller
//! as a generic 500; the detail is only logged.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use coach_common::api::auth::ApiAuthError;
use coach_common::api::types::AlreadyFinalizedBody;
use coach_common::EvaluationStatus;
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::services::finalizer::FinalizeError;
use crate::services::trigger::TriggerError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad or missing credential (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed payload (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown resource (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Finalize attempted on a terminal job (409, idempotency signal)
    #[error("Evaluation already finalized as {current_status}")]
    AlreadyFinalized { current_status: EvaluationStatus },

    /// Request conflicts with current state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persistence failure (500)
    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(request_id) => {
                ApiError::NotFound(format!("Evaluation {}", request_id))
            }
            StoreError::Conflict { current, .. } if current.is_terminal() => {
                ApiError::AlreadyFinalized {
                    current_status: current,
                }
            }
            StoreError::Conflict { request_id, current } => {
                ApiError::Conflict(format!("Evaluation {} is {}", request_id, current))
            }
            other => ApiError::Storage(other),
        }
    }
}

impl From<FinalizeError> for ApiError {
    fn from(err: FinalizeError) -> Self {
        match err {
            FinalizeError::NotFound(request_id) => {
                ApiError::NotFound(format!("Evaluation {}", request_id))
            }
            FinalizeError::NotOwner(request_id) => {
                ApiError::Forbidden(format!("Evaluation {} belongs to another user", request_id))
            }
            FinalizeError::Store(e) => e.into(),
        }
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::SessionNotFound(session_id) => {
                ApiError::NotFound(format!("Session {}", session_id))
            }
            e @ TriggerError::NotRetryable { .. } => ApiError::Conflict(e.to_string()),
            TriggerError::Store(e) => e.into(),
        }
    }
}

impl From<ApiAuthError> for ApiError {
    fn from(err: ApiAuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::AlreadyFinalized { current_status } => {
                return (
                    StatusCode::CONFLICT,
                    Json(AlreadyFinalizedBody::new(current_status)),
                )
                    .into_response();
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Storage(ref err) => {
                tracing::error!(error = %err, "Storage failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
            ApiError::Internal(ref msg) => {
                tracing::error!(error = %msg, "Internal failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_already_finalized_body_is_flat() {
        let response = ApiError::AlreadyFinalized {
            current_status: EvaluationStatus::Complete,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["error"], "ALREADY_FINALIZED");
        assert_eq!(body["current_status"], "complete");
    }

    #[tokio::test]
    async fn test_storage_error_is_generic() {
        let response =
            ApiError::Storage(StoreError::Corrupt("secret detail".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("secret detail"));
    }

    #[test]
    fn test_store_error_mapping() {
        let id = Uuid::new_v4();
        assert!(matches!(ApiError::from(StoreError::NotFound(id)), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from(StoreError::Conflict { request_id: id, current: EvaluationStatus::Error }),
            ApiError::AlreadyFinalized { current_status: EvaluationStatus::Error }
        ));
        assert!(matches!(
            ApiError::from(StoreError::Conflict { request_id: id, current: EvaluationStatus::Processing }),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::DuplicateKey(id)),
            ApiError::Storage(StoreError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_finalize_error_mapping() {
        let id = Uuid::new_v4();
        assert!(matches!(ApiError::from(FinalizeError::NotFound(id)), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from(FinalizeError::NotOwner(id)), ApiError::Forbidden(_)));
        assert!(matches!(
            ApiError::from(FinalizeError::Store(StoreError::Busy("locked".into()))),
            ApiError::Storage(_)
        ));
    }

    #[test]
    fn test_trigger_error_mapping() {
        let id = Uuid::new_v4();
        assert!(matches!(
            ApiError::from(TriggerError::SessionNotFound(id)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(TriggerError::NotRetryable {
                session_id: id,
                request_id: Uuid::new_v4(),
                status: EvaluationStatus::Processing,
            }),
            ApiError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_status_codes() {
        let cases = vec![
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound(Uuid::new_v4().to_string()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
