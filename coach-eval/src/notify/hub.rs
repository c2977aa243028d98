//! Push delivery of job changes
//!
//! A subscription yields the job's current snapshot first, then every later
//! forward change, and ends after the first terminal snapshot. The change
//! feed is joined before the snapshot is read so no write can fall between
//! the two.

use coach_common::events::EventBus;
use coach_common::{Evaluation, EvaluationStatus, TerminalOutcome};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{JobStore, StoreError};

/// Per-request_id subscriptions over the store's change feed
#[derive(Clone)]
pub struct NotificationHub {
    jobs: Arc<dyn JobStore>,
    feed: EventBus,
}

impl NotificationHub {
    pub fn new(jobs: Arc<dyn JobStore>, feed: EventBus) -> Self {
        Self { jobs, feed }
    }

    /// Open a subscription; `NotFound` if the job does not exist
    pub async fn subscribe(&self, request_id: Uuid) -> Result<Subscription, StoreError> {
        let mut rx = self.feed.subscribe();
        let initial = self.jobs.get_by_request_id(request_id).await?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let jobs = self.jobs.clone();

        tracing::debug!(request_id = %request_id, status = %initial.status, "Subscription opened");

        let stream = async_stream::stream! {
            let mut last = initial.status;
            yield initial;

            if last.is_terminal() {
                return;
            }

            loop {
                let snapshot = tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!(request_id = %request_id, "Subscription cancelled");
                        break;
                    }
                    received = rx.recv() => match received {
                        Ok(event) if event.request_id() == request_id => event.snapshot().clone(),
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                request_id = %request_id,
                                skipped,
                                "Subscriber lagged; re-reading job"
                            );
                            match jobs.get_by_request_id(request_id).await {
                                Ok(snapshot) => snapshot,
                                Err(e) => {
                                    tracing::error!(request_id = %request_id, error = %e, "Re-read failed");
                                    break;
                                }
                            }
                        }
                        Err(RecvError::Closed) => break,
                    }
                };

                if !is_newer(last, snapshot.status) {
                    continue;
                }
                last = snapshot.status;
                yield snapshot;

                if last.is_terminal() {
                    break;
                }
            }
        };

        Ok(Subscription {
            inner: Box::pin(stream),
            cancel,
        })
    }
}

/// Status only moves forward; anything else is a replay
fn is_newer(last: EvaluationStatus, next: EvaluationStatus) -> bool {
    last.can_transition_to(next)
}

/// Stream of snapshots for one job
pub struct Subscription {
    inner: Pin<Box<dyn Stream<Item = Evaluation> + Send>>,
    cancel: CancellationToken,
}

impl Subscription {
    /// End the stream; idempotent
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    /// Consume snapshots until the job is terminal
    ///
    /// None if the subscription ended first.
    pub async fn wait_terminal(mut self) -> Option<TerminalOutcome> {
        while let Some(snapshot) = self.next().await {
            if let Some(outcome) = snapshot.terminal_outcome() {
                return Some(outcome);
            }
        }
        None
    }
}

impl Stream for Subscription {
    type Item = Evaluation;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_pool, users, FinalOutcome, SqliteJobStore};
    use serde_json::json;
    use std::time::Duration;

    async fn setup() -> (NotificationHub, Arc<SqliteJobStore>, Uuid) {
        let pool = init_memory_pool().await.unwrap();
        let owner = users::insert_user(&pool, "auth-hub", None).await.unwrap();
        let feed = EventBus::new(16);
        let jobs = Arc::new(SqliteJobStore::new(pool, feed.clone(), 1000));
        (NotificationHub::new(jobs.clone(), feed), jobs, owner.id)
    }

    fn complete(score: i64) -> FinalOutcome {
        FinalOutcome::Complete { result: json!({"score": score}), score }
    }

    #[tokio::test]
    async fn test_snapshot_then_changes_then_end() {
        let (hub, jobs, owner) = setup().await;
        let job = jobs.create(Uuid::new_v4(), owner, None).await.unwrap();

        let mut sub = hub.subscribe(job.request_id).await.unwrap();
        assert_eq!(sub.next().await.unwrap().status, EvaluationStatus::Pending);

        jobs.mark_processing(job.request_id).await.unwrap();
        jobs.conditional_finalize(job.request_id, &EvaluationStatus::FINALIZABLE, complete(85))
            .await
            .unwrap();

        assert_eq!(sub.next().await.unwrap().status, EvaluationStatus::Processing);
        let last = sub.next().await.unwrap();
        assert_eq!(last.status, EvaluationStatus::Complete);
        assert_eq!(last.result, Some(json!({"score": 85})));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_terminal_job_yields_single_snapshot() {
        let (hub, jobs, owner) = setup().await;
        let job = jobs.create(Uuid::new_v4(), owner, None).await.unwrap();
        jobs.conditional_finalize(
            job.request_id,
            &EvaluationStatus::FINALIZABLE,
            FinalOutcome::Error { message: "boom".into() },
        )
        .await
        .unwrap();

        let sub = hub.subscribe(job.request_id).await.unwrap();
        assert_eq!(
            sub.wait_terminal().await,
            Some(TerminalOutcome::Failed { message: "boom".into() })
        );
    }

    #[tokio::test]
    async fn test_other_jobs_filtered_out() {
        let (hub, jobs, owner) = setup().await;
        let watched = jobs.create(Uuid::new_v4(), owner, None).await.unwrap();
        let other = jobs.create(Uuid::new_v4(), owner, None).await.unwrap();

        let sub = hub.subscribe(watched.request_id).await.unwrap();
        jobs.conditional_finalize(other.request_id, &EvaluationStatus::FINALIZABLE, complete(10))
            .await
            .unwrap();
        jobs.conditional_finalize(watched.request_id, &EvaluationStatus::FINALIZABLE, complete(90))
            .await
            .unwrap();

        assert_eq!(
            sub.wait_terminal().await,
            Some(TerminalOutcome::Completed { result: json!({"score": 90}) })
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_stream() {
        let (hub, jobs, owner) = setup().await;
        let job = jobs.create(Uuid::new_v4(), owner, None).await.unwrap();

        let mut sub = hub.subscribe(job.request_id).await.unwrap();
        sub.next().await.unwrap();
        sub.unsubscribe();

        let next = tokio::time::timeout(Duration::from_secs(1), sub.next()).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (hub, _jobs, _owner) = setup().await;
        assert!(matches!(
            hub.subscribe(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_replays_are_not_newer() {
        assert!(is_newer(EvaluationStatus::Pending, EvaluationStatus::Processing));
        assert!(!is_newer(EvaluationStatus::Processing, EvaluationStatus::Processing));
        assert!(!is_newer(EvaluationStatus::Complete, EvaluationStatus::Error));
    }
}
