//! In-memory event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use crate::bus::{EventBus, Subscription};

const DEFAULT_CAPACITY: usize = 256;

/// In-memory pub/sub bus.
///
/// - No IO
/// - Best-effort fan-out
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    sender: broadcast::Sender<M>,
}

impl<M: Clone> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<M: Clone> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = core::convert::Infallible;

    fn publish(&self, message: M) -> Result<usize, Self::Error> {
        // `send` only fails when nobody is listening.
        Ok(self.sender.send(message).unwrap_or(0))
    }

    fn subscribe(&self) -> Subscription<M> {
        Subscription::new(self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        assert_eq!(bus.publish(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(7).unwrap(), 2);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
        assert_eq!(a.try_recv(), None);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newest() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.publish(i).unwrap();
        }
        assert_eq!(sub.recv().await, Some(3));
        assert_eq!(sub.recv().await, Some(4));
    }

    #[tokio::test]
    async fn closed_bus_ends_subscription() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }
}
