//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is for **distribution**, not storage: the job store is the source
//! of truth, events are published after a write has been accepted.
//!
//! - **Best-effort**: publishing with no subscribers is not an error
//! - **Broadcast**: every subscription gets its own copy of each message
//! - **Lossy under lag**: a subscriber that falls behind skips the oldest
//!   messages; consumers that must not miss work (the export worker) pair
//!   the subscription with a periodic sweep of the store

use std::sync::Arc;

use tokio::sync::broadcast;

/// A subscription to an event stream.
///
/// ```ignore
/// let mut sub = bus.subscribe();
/// while let Some(event) = sub.recv().await {
///     process(event);
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: broadcast::Receiver<M>,
}

impl<M: Clone> Subscription<M> {
    pub fn new(receiver: broadcast::Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<M> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscription lagged; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take a message if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<M> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscription lagged; messages dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// Implementations must be safe to share across threads; publishing never
/// blocks.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    /// Publish a message, returning how many subscribers received it.
    fn publish(&self, message: M) -> Result<usize, Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<usize, Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
