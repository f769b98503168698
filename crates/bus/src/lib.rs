pub mod event;

pub use event::Event;

use tokio::sync::broadcast;

/// Default per-subscriber queue depth (resource bound).
pub const DEFAULT_CAPACITY: usize = 256;

/// Typed pub/sub fan-out (C1). One broadcast channel serves every
/// subscriber; a slow subscriber that falls more than [`DEFAULT_CAPACITY`]
/// events behind silently misses the oldest ones on its next `recv` (it
/// gets `RecvError::Lagged` and can resync) rather than backpressuring
/// publishers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    /// Publishing never blocks and never fails when there are zero
    /// subscribers (the event is simply dropped).
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Subscribe a new receiver. Each subscriber gets its own lag cursor.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::SystemError {
            error: "boom".into(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::KoryThought {
            thought: "thinking".into(),
            phase: event::ThoughtPhase::Analyzing,
        });
        let received = rx.recv().await.unwrap();
        match received {
            Event::KoryThought { thought, .. } => assert_eq!(thought, "thinking"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_event() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(Event::SessionAcceptChanges {});
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking_publisher() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(Event::SessionAcceptChanges {});
        }
        // Lagged: some messages were dropped for this subscriber, but the
        // publisher above never blocked producing them.
        let result = rx.recv().await;
        assert!(matches!(result, Err(tokio::sync::broadcast::error::RecvError::Lagged(_))));
    }
}
