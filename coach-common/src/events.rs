//! Evaluation change feed
//!
//! Every committed write to an evaluation row is published here as a full
//! snapshot. Push subscribers filter by request_id.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Evaluation;

/// Evaluation change events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EvaluationEvent {
    /// Job row inserted (PENDING)
    EvaluationCreated {
        evaluation: Evaluation,
    },

    /// Job row moved to a new status through the conditional update
    EvaluationUpdated {
        /// Full row after the write
        evaluation: Evaluation,
    },
}

impl EvaluationEvent {
    pub fn request_id(&self) -> Uuid {
        self.snapshot().request_id
    }

    /// Row state carried by the event
    pub fn snapshot(&self) -> &Evaluation {
        match self {
            EvaluationEvent::EvaluationCreated { evaluation }
            | EvaluationEvent::EvaluationUpdated { evaluation } => evaluation,
        }
    }
}

/// Broadcast fan-out of evaluation changes
///
/// Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EvaluationEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per lagging receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EvaluationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EvaluationEvent) {
        let _ = self.tx.send(event);
    }
}
