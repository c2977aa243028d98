//! External scorer client
//!
//! The scorer receives the request_id, works asynchronously, and reports
//! back through the completion webhook. Dispatch runs off the request path:
//! acceptance moves the job to PROCESSING, a failed hand-off finalizes it as
//! ERROR through the same conditional update every finalizer uses.

use async_trait::async_trait;
use coach_common::api::auth::SCORER_SECRET_HEADER;
use coach_common::{Evaluation, EvaluationStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::{FinalOutcome, JobStore, StoreError};

const USER_AGENT: &str = concat!("coach-eval/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Scorer returned {0}: {1}")]
    Rejected(u16, String),

    #[error("Client setup failed: {0}")]
    Setup(String),
}

/// Payload sent to the external scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub request_id: Uuid,
    pub owner_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[async_trait]
pub trait ScorerClient: Send + Sync {
    /// Hand one job to the scorer; Ok means accepted
    async fn request_evaluation(&self, request: &ScoringRequest) -> Result<(), ScorerError>;
}

/// reqwest-backed scorer client
pub struct HttpScorerClient {
    http_client: reqwest::Client,
    url: String,
    secret: String,
}

impl HttpScorerClient {
    pub fn new(url: String, secret: String, timeout: Duration) -> Result<Self, ScorerError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ScorerError::Setup(e.to_string()))?;

        Ok(Self {
            http_client,
            url,
            secret,
        })
    }
}

#[async_trait]
impl ScorerClient for HttpScorerClient {
    async fn request_evaluation(&self, request: &ScoringRequest) -> Result<(), ScorerError> {
        tracing::debug!(request_id = %request.request_id, url = %self.url, "Dispatching to scorer");

        let response = self
            .http_client
            .post(&self.url)
            .header(SCORER_SECRET_HEADER, &self.secret)
            .json(request)
            .send()
            .await
            .map_err(|e| ScorerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ScorerError::Rejected(status.as_u16(), error_text));
        }

        Ok(())
    }
}

/// Fire-and-forget dispatch of new jobs
#[derive(Clone)]
pub struct ScorerDispatcher {
    jobs: Arc<dyn JobStore>,
    client: Option<Arc<dyn ScorerClient>>,
    callback_url: Option<String>,
}

impl ScorerDispatcher {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        client: Option<Arc<dyn ScorerClient>>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            jobs,
            client,
            callback_url,
        }
    }

    /// Dispatcher that never contacts a scorer
    pub fn disabled(jobs: Arc<dyn JobStore>) -> Self {
        Self::new(jobs, None, None)
    }

    /// Spawn the hand-off for `job`; None when dispatch is disabled
    pub fn dispatch(&self, job: &Evaluation) -> Option<JoinHandle<()>> {
        let client = self.client.clone()?;
        let jobs = self.jobs.clone();
        let request = ScoringRequest {
            request_id: job.request_id,
            owner_id: job.owner_id,
            session_id: job.session_id,
            callback_url: self.callback_url.clone(),
        };

        Some(tokio::spawn(async move {
            let request_id = request.request_id;
            match client.request_evaluation(&request).await {
                Ok(()) => match jobs.mark_processing(request_id).await {
                    Ok(_) => tracing::info!(request_id = %request_id, "Scorer accepted evaluation"),
                    // Webhook may already have finalized the job
                    Err(StoreError::Conflict { current, .. }) => tracing::debug!(
                        request_id = %request_id,
                        current_status = %current,
                        "Job left pending before dispatch acknowledgment"
                    ),
                    Err(e) => tracing::error!(
                        request_id = %request_id,
                        error = %e,
                        "Failed to mark evaluation processing"
                    ),
                },
                Err(e) => {
                    tracing::error!(request_id = %request_id, error = %e, "Scorer dispatch failed");
                    let outcome = FinalOutcome::Error {
                        message: format!("Scorer dispatch failed: {}", e),
                    };
                    if let Err(e) = jobs
                        .conditional_finalize(request_id, &[EvaluationStatus::Pending], outcome)
                        .await
                    {
                        tracing::warn!(
                            request_id = %request_id,
                            error = %e,
                            "Dispatch failure not recorded"
                        );
                    }
                }
            }
        }))
    }
}
