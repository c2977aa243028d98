//! Server-Sent Events (SSE) utilities

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::Evaluation;

/// SSE event name for evaluation snapshots
pub const EVALUATION_EVENT: &str = "evaluation";

/// Wrap a per-job snapshot stream as an SSE response
///
/// Each snapshot becomes one `evaluation` event carrying the full row as
/// JSON. The response ends when the snapshot stream ends.
pub fn evaluation_sse_stream<S>(
    request_id: Uuid,
    snapshots: S,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = Evaluation> + Send + 'static,
{
    info!(request_id = %request_id, "New SSE client subscribed to evaluation");

    let stream = async_stream::stream! {
        let mut snapshots = Box::pin(snapshots);

        while let Some(snapshot) = snapshots.next().await {
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    debug!(request_id = %request_id, status = %snapshot.status, "SSE: Sending snapshot");
                    yield Ok(Event::default().event(EVALUATION_EVENT).data(json));
                }
                Err(e) => {
                    warn!(request_id = %request_id, "SSE: Failed to serialize snapshot: {}", e);
                }
            }
        }

        debug!(request_id = %request_id, "SSE: Evaluation stream finished");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
