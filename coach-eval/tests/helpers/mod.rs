//! Shared fixtures for coach-eval integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use coach_common::api::auth::SCORER_SECRET_HEADER;
use coach_eval::config::ServiceConfig;
use coach_eval::db::users::{self, PlatformUser, ADMIN_ROLE};
use coach_eval::db::{init_memory_pool, SqliteSessionStore};
use coach_eval::services::identity::Claims;
use coach_eval::services::ScorerClient;
use coach_eval::{build_router, AppState};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const JWT_SECRET: &str = "test-jwt-secret";

pub struct TestApp {
    pub state: AppState,
    pub pool: SqlitePool,
}

impl TestApp {
    /// In-memory database, scorer dispatch disabled
    pub async fn new() -> Self {
        let pool = init_memory_pool().await.expect("Should open in-memory database");
        Self::with_pool(pool, None)
    }

    pub fn with_pool(pool: SqlitePool, scorer: Option<Arc<dyn ScorerClient>>) -> Self {
        let config = ServiceConfig::for_secrets(WEBHOOK_SECRET, JWT_SECRET);
        let state = AppState::with_scorer(pool.clone(), config, scorer);
        Self { state, pool }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Platform user plus a valid bearer token for it
    pub async fn user(&self, auth_id: &str) -> (PlatformUser, String) {
        let user = users::insert_user(&self.pool, auth_id, None)
            .await
            .expect("Should insert user");
        (user, token_for(auth_id))
    }

    pub async fn admin(&self, auth_id: &str) -> (PlatformUser, String) {
        let (user, token) = self.user(auth_id).await;
        users::grant_role(&self.pool, user.id, ADMIN_ROLE)
            .await
            .expect("Should grant admin role");
        (PlatformUser { is_admin: true, ..user }, token)
    }

    /// New in-progress session owned by `owner`
    pub async fn session(&self, owner: Uuid) -> Uuid {
        SqliteSessionStore::new(self.pool.clone())
            .insert(owner)
            .await
            .expect("Should insert session")
            .id
    }

    /// Serve the router on an ephemeral local port; returns the base URL
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Should bind ephemeral port");
        let addr = listener.local_addr().expect("Should have local address");
        let router = self.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server should run");
        });
        format!("http://{}", addr)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.expect("Router should respond");
        into_parts(response).await
    }
}

pub fn token_for(auth_id: &str) -> String {
    let claims = Claims {
        sub: auth_id.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as u64,
        iss: None,
        aud: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Should mint token")
}

/// Webhook POST; `secret: None` omits the header
pub fn webhook_request(body: &Value, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/evaluation-complete")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SCORER_SECRET_HEADER, secret);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Request with an optional bearer token and optional JSON body
pub fn bearer_request(method: &str, uri: &str, token: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn into_parts(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}
