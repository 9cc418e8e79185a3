use tokio::sync::broadcast;

/// Fan-out bus for UI-facing notifications.
///
/// Publishing never blocks; slow subscribers observe `Lagged` and skip
/// ahead instead of stalling the publisher.
pub struct EventBus<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        Speaking(&'static str, bool),
        Left,
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Ping::Speaking("alice", true));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, Ping::Speaking("alice", true));
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Ping::Left);

        assert_eq!(rx1.recv().await.unwrap(), Ping::Left);
        assert_eq!(rx2.recv().await.unwrap(), Ping::Left);
    }

    #[test]
    fn publish_returns_zero_with_no_subscribers() {
        let bus: EventBus<Ping> = EventBus::new(16);
        assert_eq!(bus.publish(Ping::Left), 0);
    }

    #[tokio::test]
    async fn clones_share_subscribers() {
        let bus = EventBus::new(16);
        let other = bus.clone();
        let _rx1 = bus.subscribe();
        let _rx2 = other.subscribe();

        assert_eq!(other.publish(Ping::Left), 2);
        assert_eq!(bus.subscriber_count(), 2);
    }
}
