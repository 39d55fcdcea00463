//! In-memory event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use crate::bus::{EventBus, Subscription};

/// Default number of messages buffered per subscriber before it lags.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub enum InMemoryBusError {}

/// In-memory pub/sub bus.
///
/// - No IO
/// - Best-effort fan-out; slow subscribers observe `RecvError::Lagged`
/// - Publishing with no subscribers is not an error
#[derive(Debug, Clone)]
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
    M: Clone + Send + Sync + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        // `send` only fails when there are no receivers.
        if self.sender.send(message).is_err() {
            tracing::trace!("published with no live subscribers");
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        Subscription::new(self.sender.subscribe())
    }
}
