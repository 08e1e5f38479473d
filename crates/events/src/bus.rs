//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`EngineEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the engine and
//! any outer layers (socket push, audit persistence).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use restack_core::types::JobId;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// A job or task lifecycle event.
///
/// Constructed via [`EngineEvent::new`] and enriched with
/// [`with_payload`](EngineEvent::with_payload). Event names are the
/// constants in `restack_core::job_events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Event name, e.g. `"job_progress"`.
    pub event_type: String,

    /// The job this event concerns.
    pub job_id: JobId,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    /// Create a new event with an empty payload.
    pub fn new(event_type: impl Into<String>, job_id: JobId) -> Self {
        Self {
            event_type: event_type.into(),
            job_id,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`EngineEvent`]. Slow receivers
/// that fall more than the channel capacity behind observe
/// `RecvError::Lagged` and should reconcile via job status polling.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// job state remains queryable through the job manager regardless.
    pub fn publish(&self, event: EngineEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use restack_core::job_events::{EVENT_JOB_PROGRESS, EVENT_JOB_STARTED};

    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let job_id = uuid::Uuid::now_v7();

        let event = EngineEvent::new(EVENT_JOB_PROGRESS, job_id)
            .with_payload(serde_json::json!({"progress": 40}));
        bus.publish(event);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, EVENT_JOB_PROGRESS);
        assert_eq!(received.job_id, job_id);
        assert_eq!(received.payload["progress"], 40);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let job_id = uuid::Uuid::now_v7();

        bus.publish(EngineEvent::new(EVENT_JOB_STARTED, job_id));

        assert_eq!(rx1.recv().await.unwrap().event_type, EVENT_JOB_STARTED);
        assert_eq!(rx2.recv().await.unwrap().event_type, EVENT_JOB_STARTED);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(EngineEvent::new(EVENT_JOB_STARTED, uuid::Uuid::now_v7()));
    }
}
