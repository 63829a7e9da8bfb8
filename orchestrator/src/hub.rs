//! Per-deployment event fan-out

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::models::deployment::DeployEvent;

/// Capacity of each live delivery queue. A receiver further behind than this
/// lags and skips; it never backpressures the publisher.
const LIVE_QUEUE_CAPACITY: usize = 256;

/// Final entry appended when a stream closes
pub const STREAM_CLOSED_MESSAGE: &str = "event stream closed";

struct StreamEntry {
    history: Vec<DeployEvent>,
    live: Option<broadcast::Sender<DeployEvent>>,
    closed: bool,
}

impl StreamEntry {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            live: None,
            closed: false,
        }
    }
}

/// Fan-out hub holding one ordered event stream per deployment id.
/// History is authoritative and append-only; live delivery is best-effort
/// and drops rather than blocks.
pub struct EventHub {
    streams: RwLock<HashMap<String, StreamEntry>>,
}

impl EventHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Append an event to history and forward it to live subscribers
    pub fn publish(&self, id: &str, event: DeployEvent) {
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        let entry = streams.entry(id.to_string()).or_insert_with(StreamEntry::new);

        entry.history.push(event.clone());
        if let Some(sender) = &entry.live {
            // Fails only when no receiver is attached; live delivery is
            // best-effort, history already has the event.
            let _ = sender.send(event);
        }
    }

    /// Attach a live subscriber, creating the queue on first subscribe.
    /// Returns None once the stream has been closed.
    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<DeployEvent>> {
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        let entry = streams.entry(id.to_string()).or_insert_with(StreamEntry::new);

        if entry.closed {
            return None;
        }
        let sender = entry
            .live
            .get_or_insert_with(|| broadcast::channel(LIVE_QUEUE_CAPACITY).0);
        Some(sender.subscribe())
    }

    /// Read history from an offset. Returns the events at and past the
    /// offset, the current history length, and whether the stream is closed.
    pub fn history_from(&self, id: &str, offset: usize) -> (Vec<DeployEvent>, usize, bool) {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        match streams.get(id) {
            Some(entry) => {
                let events = entry.history.get(offset..).unwrap_or_default().to_vec();
                (events, entry.history.len(), entry.closed)
            }
            None => (Vec::new(), 0, false),
        }
    }

    /// Push the final sentinel message and drop the live queue. History
    /// remains queryable; future subscribes get no live feed.
    pub fn close(&self, id: &str) {
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        let entry = streams.entry(id.to_string()).or_insert_with(StreamEntry::new);

        if entry.closed {
            return;
        }
        let event = DeployEvent::message(STREAM_CLOSED_MESSAGE);
        entry.history.push(event.clone());
        if let Some(sender) = entry.live.take() {
            // Receivers drain this and then observe the channel closing
            let _ = sender.send(event);
        }
        entry.closed = true;
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_live_delivery_preserves_publish_order() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe("42").unwrap();

        for i in 0..10 {
            hub.publish("42", DeployEvent::message(format!("event {i}")));
        }

        for i in 0..10 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.message.as_deref(), Some(format!("event {i}").as_str()));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_never_blocks_publish() {
        let hub = EventHub::new();
        let _stalled = hub.subscribe("42").unwrap();

        // Far beyond queue capacity; publish must not block or fail
        for i in 0..10_000 {
            hub.publish("42", DeployEvent::message(format!("event {i}")));
        }

        let (events, len, closed) = hub.history_from("42", 0);
        assert_eq!(len, 10_000);
        assert_eq!(events.len(), 10_000);
        assert!(!closed);
        assert_eq!(events[9_999].message.as_deref(), Some("event 9999"));
    }

    #[tokio::test]
    async fn test_streams_are_isolated_per_id() {
        let hub = EventHub::new();
        let mut rx_a = hub.subscribe("a").unwrap();
        let mut rx_b = hub.subscribe("b").unwrap();

        hub.publish("a", DeployEvent::message("for a"));
        hub.publish("b", DeployEvent::message("for b"));

        assert_eq!(rx_a.recv().await.unwrap().message.as_deref(), Some("for a"));
        assert_eq!(rx_b.recv().await.unwrap().message.as_deref(), Some("for b"));
    }

    #[tokio::test]
    async fn test_close_pushes_sentinel_and_drops_live_queue() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe("42").unwrap();

        hub.publish("42", DeployEvent::message("working"));
        hub.close("42");

        assert_eq!(rx.recv().await.unwrap().message.as_deref(), Some("working"));
        assert_eq!(
            rx.recv().await.unwrap().message.as_deref(),
            Some(STREAM_CLOSED_MESSAGE)
        );
        assert!(rx.recv().await.is_err());

        // No live feed after close; history stays queryable
        assert!(hub.subscribe("42").is_none());
        let (events, len, closed) = hub.history_from("42", 0);
        assert_eq!(len, 2);
        assert!(closed);
        assert_eq!(events[1].message.as_deref(), Some(STREAM_CLOSED_MESSAGE));

        // Closing twice appends nothing
        hub.close("42");
        let (_, len, _) = hub.history_from("42", 0);
        assert_eq!(len, 2);
    }

    #[tokio::test]
    async fn test_history_offsets() {
        let hub = EventHub::new();
        for i in 0..5 {
            hub.publish("42", DeployEvent::message(format!("event {i}")));
        }

        let (events, len, _) = hub.history_from("42", 3);
        assert_eq!(len, 5);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message.as_deref(), Some("event 3"));

        let (events, len, _) = hub.history_from("42", 99);
        assert!(events.is_empty());
        assert_eq!(len, 5);

        let (events, len, closed) = hub.history_from("unknown", 0);
        assert!(events.is_empty());
        assert_eq!(len, 0);
        assert!(!closed);
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_history_only() {
        let hub = EventHub::new();
        hub.publish("42", DeployEvent::message("early"));

        // A later subscriber sees nothing live; history has everything
        let mut rx = hub.subscribe("42").unwrap();
        hub.publish("42", DeployEvent::message("late"));

        assert_eq!(rx.recv().await.unwrap().message.as_deref(), Some("late"));
        let (events, _, _) = hub.history_from("42", 0);
        assert_eq!(events.len(), 2);
    }
}
