//! Evaluation job endpoints for end users
//!
//! - POST /api/evaluations: create a job
//! - GET /api/evaluations/:request_id: poll current status
//! - GET /api/evaluations/:request_id/events: push stream (SSE)

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use coach_common::api::types::{CreateEvaluationResponse, EvaluationView};
use coach_common::sse::evaluation_sse_stream;
use coach_common::Evaluation;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::auth::AuthenticatedUser;
use crate::db::users::PlatformUser;
use crate::db::{JobStore, SessionStore};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateEvaluationRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// POST /api/evaluations
pub async fn create_evaluation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<CreateEvaluationRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;

    if let Some(session_id) = request.session_id {
        let session = state
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Session {}", session_id)))?;

        if session.user_id != user.id {
            return Err(ApiError::Forbidden(format!(
                "Session {} belongs to another user",
                session_id
            )));
        }
    }

    let job = state.creator.create(user.id, request.session_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateEvaluationResponse {
            request_id: job.request_id,
            status: job.status,
        }),
    ))
}

/// GET /api/evaluations/:request_id
pub async fn get_evaluation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<EvaluationView>> {
    let job = state.jobs.get_by_request_id(request_id).await?;
    ensure_readable(&job, &user)?;

    Ok(Json(EvaluationView::from(&job)))
}

/// GET /api/evaluations/:request_id/events
///
/// First event is the current snapshot; the stream closes after a terminal one.
pub async fn evaluation_events(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job = state.jobs.get_by_request_id(request_id).await?;
    ensure_readable(&job, &user)?;

    let subscription = state.hub.subscribe(request_id).await?;
    Ok(evaluation_sse_stream(request_id, subscription))
}

/// Owner or admin
fn ensure_readable(job: &Evaluation, user: &PlatformUser) -> ApiResult<()> {
    if job.owner_id == user.id || user.is_admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Evaluation {} belongs to another user",
            job.request_id
        )))
    }
}
