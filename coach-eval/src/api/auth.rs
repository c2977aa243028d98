//! Request authentication for coach-eval
//!
//! - Scorer callbacks: shared secret header, checked by middleware
//! - End users: bearer token, resolved to a platform user by extractor

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use coach_common::api::auth::{parse_bearer, ApiAuthError, SCORER_SECRET_HEADER};
use tracing::warn;

use crate::db::users::{self, PlatformUser};
use crate::error::ApiError;
use crate::AppState;

/// Shared-secret middleware for scorer callback routes
pub async fn scorer_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = header_str(request.headers(), SCORER_SECRET_HEADER)?;

    if let Err(e) = state.webhook_secret.verify(provided) {
        warn!(path = %request.uri().path(), "Scorer callback rejected: {}", e);
        return Err(e.into());
    }

    Ok(next.run(request).await)
}

/// Caller proven by bearer token and known to the platform
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub PlatformUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parse_bearer(header_str(&parts.headers, AUTHORIZATION.as_str())?)?;

        let identity = state.identity.verify(token).await.map_err(|e| {
            warn!(path = %parts.uri.path(), "Bearer token rejected: {}", e);
            ApiError::from(e)
        })?;

        // Verified identity without a platform account is a client-side mistake
        let user = users::find_by_auth_id(&state.db, &identity.auth_id)
            .await?
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "No platform user for identity {}",
                    identity.auth_id
                ))
            })?;

        Ok(Self(user))
    }
}

/// Authenticated caller holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub PlatformUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.is_admin {
            warn!(user_id = %user.id, path = %parts.uri.path(), "Admin route refused");
            return Err(ApiError::Forbidden("Admin role required".into()));
        }

        Ok(Self(user))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiAuthError> {
    headers
        .get(name)
        .map(|value| value.to_str().map_err(|_| ApiAuthError::MalformedHeader))
        .transpose()
}
