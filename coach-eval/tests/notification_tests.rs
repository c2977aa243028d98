//! Consumer-side notification tests
//!
//! - Poll consumer gives up without touching the job, and still sees a
//!   later completion on a fresh run
//! - Push subscription and its SSE exposure deliver the terminal snapshot
//! - Dispatch to a scorer moves jobs to processing

mod helpers;

use async_trait::async_trait;
use axum::http::StatusCode;
use coach_common::{EvaluationStatus, TerminalOutcome};
use coach_eval::db::{init_memory_pool, FinalOutcome, JobStore};
use coach_eval::notify::{HttpStatusSource, PollConfig, PollError, Poller, StoreStatusSource};
use coach_eval::services::scorer_client::{ScorerError, ScoringRequest};
use coach_eval::services::ScorerClient;
use futures::StreamExt;
use helpers::{bearer_request, webhook_request, TestApp, WEBHOOK_SECRET};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;
use uuid::Uuid;

fn fast_poller(app: &TestApp, max_attempts: u32) -> Poller {
    Poller::new(
        Arc::new(StoreStatusSource::new(app.state.jobs.clone())),
        PollConfig {
            interval: Duration::from_millis(10),
            max_attempts,
        },
    )
}

#[tokio::test]
async fn test_poll_timeout_leaves_job_untouched() {
    let app = TestApp::new().await;
    let (owner, _) = app.user("auth-u1").await;
    let job = app.state.jobs.create(Uuid::new_v4(), owner.id, None).await.unwrap();

    let err = fast_poller(&app, 5)
        .poll_until_terminal(job.request_id, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, PollError::TimedOut { attempts: 5 });

    let stored = app.state.jobs.get_by_request_id(job.request_id).await.unwrap();
    assert_eq!(stored.status, EvaluationStatus::Pending);
    assert!(stored.result.is_none());
    assert!(stored.error_message.is_none());

    // Completion after the timeout is still accepted and observable
    let body = json!({"request_id": job.request_id, "result": {"score": 72}});
    let (status, _) = app.send(webhook_request(&body, Some(WEBHOOK_SECRET))).await;
    assert_eq!(status, StatusCode::OK);

    let outcome = fast_poller(&app, 5)
        .poll_until_terminal(job.request_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, TerminalOutcome::Completed { result: json!({"score": 72}) });
}

#[tokio::test]
async fn test_default_poller_uses_configured_budget() {
    let app = TestApp::new().await;
    let (owner, _) = app.user("auth-u1").await;
    let job = app.state.jobs.create(Uuid::new_v4(), owner.id, None).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = app.state.poller().poll_until_terminal(job.request_id, &cancel).await.unwrap_err();
    assert_eq!(err, PollError::Cancelled);
}

fn http_poller(base_url: &str, token: &str) -> Poller {
    let source = HttpStatusSource::new(base_url, token.to_string(), Duration::from_secs(5)).unwrap();
    Poller::new(
        Arc::new(source),
        PollConfig {
            interval: Duration::from_millis(10),
            max_attempts: 60,
        },
    )
}

#[tokio::test]
async fn test_http_poll_stops_on_rejected_credentials() {
    let app = TestApp::new().await;
    let (owner, token) = app.user("auth-u1").await;
    let (_, other_token) = app.user("auth-u2").await;
    let job = app.state.jobs.create(Uuid::new_v4(), owner.id, None).await.unwrap();
    let base_url = app.serve().await;
    let cancel = CancellationToken::new();

    let err = http_poller(&base_url, "not-a-jwt")
        .poll_until_terminal(job.request_id, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, PollError::Denied { status: 401 });

    let err = http_poller(&base_url, &other_token)
        .poll_until_terminal(job.request_id, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, PollError::Denied { status: 403 });

    let err = http_poller(&base_url, &token)
        .poll_until_terminal(Uuid::new_v4(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PollError::NotFound(_)));

    let body = json!({"request_id": job.request_id, "result": {"score": 81}});
    let (status, _) = app.send(webhook_request(&body, Some(WEBHOOK_SECRET))).await;
    assert_eq!(status, StatusCode::OK);

    let outcome = http_poller(&base_url, &token)
        .poll_until_terminal(job.request_id, &cancel)
        .await
        .unwrap();
    assert_eq!(outcome, TerminalOutcome::Completed { result: json!({"score": 81}) });
}

#[tokio::test]
async fn test_push_and_poll_agree() {
    let app = TestApp::new().await;
    let (owner, _) = app.user("auth-u1").await;
    let job = app.state.jobs.create(Uuid::new_v4(), owner.id, None).await.unwrap();

    let request_id = job.request_id;
    let subscription = app.state.hub.subscribe(request_id).await.unwrap();
    let poller = fast_poller(&app, 100);
    let poll = tokio::spawn(async move {
        poller
            .poll_until_terminal(request_id, &CancellationToken::new())
            .await
    });

    app.state
        .jobs
        .conditional_finalize(
            job.request_id,
            &EvaluationStatus::FINALIZABLE,
            FinalOutcome::Error { message: "scorer timeout".into() },
        )
        .await
        .unwrap();

    let expected = TerminalOutcome::Failed { message: "scorer timeout".into() };
    let pushed = tokio::time::timeout(Duration::from_secs(5), subscription.wait_terminal())
        .await
        .unwrap();
    assert_eq!(pushed, Some(expected.clone()));
    assert_eq!(poll.await.unwrap().unwrap(), expected);
}

#[tokio::test]
async fn test_sse_stream_for_finished_job() {
    let app = TestApp::new().await;
    let (owner, token) = app.user("auth-u1").await;
    let job = app.state.jobs.create(Uuid::new_v4(), owner.id, None).await.unwrap();
    let body = json!({"request_id": job.request_id, "result": {"score": 91}});
    app.send(webhook_request(&body, Some(WEBHOOK_SECRET))).await;

    let uri = format!("/api/evaluations/{}/events", job.request_id);
    let response = app
        .router()
        .oneshot(bearer_request("GET", &uri, Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert_eq!(text.matches("event:").count(), 1);
    assert!(text.contains("evaluation"));
    assert!(text.contains("\"status\":\"complete\""));
}

#[tokio::test]
async fn test_sse_stream_follows_job_to_completion() {
    let app = TestApp::new().await;
    let (owner, token) = app.user("auth-u1").await;
    let (_, other_token) = app.user("auth-u2").await;
    let job = app.state.jobs.create(Uuid::new_v4(), owner.id, None).await.unwrap();
    let uri = format!("/api/evaluations/{}/events", job.request_id);

    let (status, _) = app.send(bearer_request("GET", &uri, Some(&other_token), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let response = app
        .router()
        .oneshot(bearer_request("GET", &uri, Some(&token), None))
        .await
        .unwrap();
    let reader = tokio::spawn(axum::body::to_bytes(response.into_body(), usize::MAX));

    let body = json!({"request_id": job.request_id, "result": {"score": 64}});
    let (status, _) = app.send(webhook_request(&body, Some(WEBHOOK_SECRET))).await;
    assert_eq!(status, StatusCode::OK);

    let bytes = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let pending = text.find("\"status\":\"pending\"").unwrap();
    let complete = text.find("\"status\":\"complete\"").unwrap();
    assert!(pending < complete);
}

#[tokio::test]
async fn test_hub_delivers_processing_then_terminal() {
    let app = TestApp::new().await;
    let (owner, _) = app.user("auth-u1").await;
    let job = app.state.jobs.create(Uuid::new_v4(), owner.id, None).await.unwrap();

    let mut subscription = app.state.hub.subscribe(job.request_id).await.unwrap();
    app.state.jobs.mark_processing(job.request_id).await.unwrap();
    app.state
        .jobs
        .conditional_finalize(
            job.request_id,
            &EvaluationStatus::FINALIZABLE,
            FinalOutcome::Complete { result: json!({"score": 70}), score: 70 },
        )
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Some(snapshot) = subscription.next().await {
        seen.push(snapshot.status);
    }
    assert_eq!(
        seen,
        vec![EvaluationStatus::Pending, EvaluationStatus::Processing, EvaluationStatus::Complete]
    );
}

/// Accepts every request and records it
#[derive(Default)]
struct RecordingScorer {
    requests: Mutex<Vec<ScoringRequest>>,
}

#[async_trait]
impl ScorerClient for RecordingScorer {
    async fn request_evaluation(&self, request: &ScoringRequest) -> Result<(), ScorerError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_created_job_dispatched_to_scorer() {
    let scorer = Arc::new(RecordingScorer::default());
    let pool = init_memory_pool().await.unwrap();
    let app = TestApp::with_pool(pool, Some(scorer.clone() as Arc<dyn ScorerClient>));
    let (owner, token) = app.user("auth-u1").await;

    let (status, created) = app
        .send(bearer_request("POST", "/api/evaluations", Some(&token), Some(&json!({}))))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id: Uuid = serde_json::from_value(created["request_id"].clone()).unwrap();

    let outcome = app.state.hub.subscribe(request_id).await.unwrap();
    let processing = tokio::time::timeout(
        Duration::from_secs(5),
        outcome
            .filter(|s| futures::future::ready(s.status == EvaluationStatus::Processing))
            .next(),
    )
    .await
    .unwrap();
    assert!(processing.is_some());

    let requests = scorer.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request_id, request_id);
    assert_eq!(requests[0].owner_id, owner.id);
}
