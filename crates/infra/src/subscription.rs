//! Live movement subscriptions.
//!
//! A subscription is a spawned task that listens to the store's change feed
//! and pushes a fresh, newest-first snapshot of one product's history every
//! time a movement for that product commits.
//!
//! ```text
//! store commit → change feed → filter(product) → drain pending → reload → mpsc → caller
//! ```
//!
//! Intermediate states may be coalesced when the caller is slow; the latest
//! state is always delivered. At most `buffer` snapshots wait on an idle
//! reader. A load failure is sent as an error item and ends the subscription.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use stockroom_core::ProductId;
use stockroom_events::RecvError;
use stockroom_inventory::Movement;

use crate::error::LedgerError;
use crate::store::{ChangeFeed, DocumentStore};

pub type Snapshot = Result<Vec<Movement>, LedgerError>;

/// Handle to a live movement query. Dropping it cancels the listener.
#[derive(Debug)]
pub struct MovementSubscription {
    product_id: ProductId,
    receiver: mpsc::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl MovementSubscription {
    /// Start listening. Must be called from within a tokio runtime.
    pub(crate) fn spawn(store: Arc<dyn DocumentStore>, product_id: ProductId, buffer: usize) -> Self {
        let (tx, receiver) = mpsc::channel(buffer.max(1));
        // Subscribe before the initial load so no commit falls in between.
        let feed = store.changes();
        let task = tokio::spawn(run(store, product_id.clone(), feed, tx));
        Self {
            product_id,
            receiver,
            task,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// Next snapshot. `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// Detach from the change feed. Snapshots already buffered can still be read.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.receiver.close();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Polling the stream is equivalent to calling [`MovementSubscription::next`].
impl Stream for MovementSubscription {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for MovementSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    store: Arc<dyn DocumentStore>,
    product_id: ProductId,
    mut feed: ChangeFeed,
    tx: mpsc::Sender<Snapshot>,
) {
    if !deliver(store.as_ref(), &product_id, &tx).await {
        return;
    }

    loop {
        let relevant = tokio::select! {
            _ = tx.closed() => return,
            received = feed.recv() => match received {
                Ok(envelope) => envelope.product_id() == &product_id,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(product_id = %product_id, skipped, "movement feed lagged; reloading");
                    true
                }
                Err(RecvError::Closed) => return,
            },
        };
        if !relevant {
            continue;
        }

        // Anything already pending is covered by the reload below.
        loop {
            match feed.try_recv() {
                Ok(Some(_)) | Err(RecvError::Lagged(_)) => continue,
                Ok(None) | Err(RecvError::Closed) => break,
            }
        }

        if !deliver(store.as_ref(), &product_id, &tx).await {
            return;
        }
    }
}

/// Load and send one snapshot. Returns `false` when the subscription should end.
async fn deliver(store: &dyn DocumentStore, product_id: &ProductId, tx: &mpsc::Sender<Snapshot>) -> bool {
    match store.movements(product_id).await {
        Ok(snapshot) => tx.send(Ok(snapshot)).await.is_ok(),
        Err(err) => {
            let _ = tx.send(Err(LedgerError::from_store("watch_movements", err))).await;
            false
        }
    }
}
