//! Event types for the segment checker event system
//!
//! Mutations (save, unlock, lock claims) emit events on an [`EventBus`];
//! the server forwards them to every connected browser session.

use crate::store::Stats;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events broadcast to all connected sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SegckEvent {
    /// Aggregated counts after a state change
    StatsUpdated {
        stats: Stats,
        /// When the counts were computed
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SegckEvent {
    pub fn stats(stats: Stats) -> Self {
        SegckEvent::StatsUpdated {
            stats,
            timestamp: chrono::Utc::now(),
        }
    }

    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            SegckEvent::StatsUpdated { .. } => "stats",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose the oldest events instead of stalling the sender
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SegckEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SegckEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SegckEvent,
    ) -> Result<usize, broadcast::error::SendError<SegckEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SegckEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_stats_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let sent = bus.emit(SegckEvent::stats(Stats::default())).unwrap();
        assert_eq!(sent, 2);

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.event_type(), "stats");
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(SegckEvent::stats(Stats::default())).is_err());
        // Lossy variant never fails
        bus.emit_lossy(SegckEvent::stats(Stats::default()));
        assert_eq!(bus.capacity(), 10);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_without_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.emit_lossy(SegckEvent::stats(Stats::default()));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(SegckEvent::stats(Stats::default())).unwrap();
        assert_eq!(json["type"], "StatsUpdated");
        assert!(json["stats"].is_object());
    }
}
