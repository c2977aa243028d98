//! Bounded polling for a job's terminal state
//!
//! Fallback for consumers that cannot hold a push subscription. Reads
//! only: exhausting the attempt budget reports a timeout to the consumer
//! and leaves the job exactly as it was.

use async_trait::async_trait;
use coach_common::api::types::EvaluationView;
use coach_common::TerminalOutcome;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PollSettings;
use crate::db::{JobStore, StoreError};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Evaluation not found: {0}")]
    NotFound(Uuid),

    /// Credentials refused (401/403); retrying cannot help
    #[error("Status read denied with HTTP {0}")]
    Denied(u16),

    /// Retried on the next attempt
    #[error("Status read failed: {0}")]
    Transient(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("Evaluation still running after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("Polling cancelled")]
    Cancelled,

    #[error("Evaluation not found: {0}")]
    NotFound(Uuid),

    /// Caller may not read the job
    #[error("Status read denied with HTTP {status}")]
    Denied { status: u16 },
}

/// Where the poller reads job status from
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, request_id: Uuid) -> Result<EvaluationView, SourceError>;
}

/// Reads straight from the job store
pub struct StoreStatusSource {
    jobs: Arc<dyn JobStore>,
}

impl StoreStatusSource {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl StatusSource for StoreStatusSource {
    async fn fetch(&self, request_id: Uuid) -> Result<EvaluationView, SourceError> {
        match self.jobs.get_by_request_id(request_id).await {
            Ok(job) => Ok(EvaluationView::from(&job)),
            Err(StoreError::NotFound(id)) => Err(SourceError::NotFound(id)),
            Err(e) => Err(SourceError::Transient(e.to_string())),
        }
    }
}

/// Reads the service's poll endpoint as the job owner
pub struct HttpStatusSource {
    http_client: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpStatusSource {
    pub fn new(base_url: &str, bearer_token: String, timeout: Duration) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Transient(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
        })
    }

    fn status_url(&self, request_id: Uuid) -> String {
        format!("{}/api/evaluations/{}", self.base_url, request_id)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self, request_id: Uuid) -> Result<EvaluationView, SourceError> {
        let response = self
            .http_client
            .get(self.status_url(request_id))
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => return Err(SourceError::NotFound(request_id)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceError::Denied(status.as_u16()))
            }
            _ => {}
        }
        if !status.is_success() {
            return Err(SourceError::Transient(format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<EvaluationView>()
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl From<&PollSettings> for PollConfig {
    fn from(settings: &PollSettings) -> Self {
        Self {
            interval: settings.interval(),
            max_attempts: settings.max_attempts,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from(&PollSettings::default())
    }
}

pub struct Poller {
    source: Arc<dyn StatusSource>,
    config: PollConfig,
}

impl Poller {
    pub fn new(source: Arc<dyn StatusSource>, config: PollConfig) -> Self {
        Self { source, config }
    }

    /// Wait one interval, read, repeat until terminal or out of attempts
    pub async fn poll_until_terminal(
        &self,
        request_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TerminalOutcome, PollError> {
        for attempt in 1..=self.config.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            match self.source.fetch(request_id).await {
                Ok(view) => {
                    if let Some(outcome) = view.terminal_outcome() {
                        tracing::info!(
                            request_id = %request_id,
                            attempt,
                            status = %view.status,
                            "Polling reached terminal status"
                        );
                        return Ok(outcome);
                    }
                    tracing::debug!(request_id = %request_id, attempt, status = %view.status, "Still running");
                }
                Err(SourceError::NotFound(id)) => return Err(PollError::NotFound(id)),
                Err(SourceError::Denied(status)) => {
                    tracing::warn!(request_id = %request_id, attempt, status, "Poll denied; giving up");
                    return Err(PollError::Denied { status });
                }
                Err(SourceError::Transient(e)) => {
                    tracing::warn!(request_id = %request_id, attempt, error = %e, "Poll attempt failed");
                }
            }
        }

        tracing::warn!(
            request_id = %request_id,
            attempts = self.config.max_attempts,
            "Polling gave up; evaluation left untouched"
        );
        Err(PollError::TimedOut {
            attempts: self.config.max_attempts,
        })
    }
}
