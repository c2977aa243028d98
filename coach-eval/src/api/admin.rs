//! Administrative endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use coach_common::api::types::CreateEvaluationResponse;
use uuid::Uuid;

use crate::api::auth::AdminUser;
use crate::error::ApiResult;
use crate::AppState;

/// POST /api/admin/sessions/:session_id/evaluate
///
/// New job only if the session has none or its latest one failed.
pub async fn trigger_evaluation(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(admin = %admin.id, session_id = %session_id, "Manual evaluation requested");

    let job = state.trigger.trigger(session_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateEvaluationResponse {
            request_id: job.request_id,
            status: job.status,
        }),
    ))
}
