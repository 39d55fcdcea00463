//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes committed events to live listeners. It is not storage:
//! the document store is the source of truth, and a listener that falls behind
//! is told how many messages it missed so it can re-read current state.
//!
//! Delivery is at-least-once and best-effort. Consumers must be idempotent.

use std::sync::Arc;

use tokio::sync::broadcast;

/// Why a subscription could not yield a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// The bus was dropped; no further messages will arrive.
    Closed,
    /// The subscriber fell behind and `n` messages were skipped.
    Lagged(u64),
}

impl core::fmt::Display for RecvError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RecvError::Closed => f.write_str("event bus closed"),
            RecvError::Lagged(n) => write!(f, "subscriber lagged by {n} messages"),
        }
    }
}

impl std::error::Error for RecvError {}

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics). Dropping it detaches the listener.
///
/// ```ignore
/// let mut subscription = bus.subscribe();
/// loop {
///     match subscription.recv().await {
///         Ok(event) => process(event)?,
///         Err(RecvError::Lagged(_)) => resync().await?,
///         Err(RecvError::Closed) => break,
///     }
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

    /// Wait until the next message is available.
    pub async fn recv(&mut self) -> Result<M, RecvError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => RecvError::Closed,
            broadcast::error::RecvError::Lagged(n) => RecvError::Lagged(n),
        })
    }

    /// Try to receive a message without waiting.
    ///
    /// Returns `Ok(None)` when nothing is pending.
    pub fn try_recv(&mut self) -> Result<Option<M>, RecvError> {
        match self.receiver.try_recv() {
            Ok(m) => Ok(Some(m)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(RecvError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(RecvError::Lagged(n)),
        }
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// adjust stock → store commits → EventBus::publish → live subscriptions
/// ```
///
/// Events are **committed first**, then **published**, so a listener never
/// observes a movement that could still be rolled back.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
