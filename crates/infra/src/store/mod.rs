//! Transactional document store boundary.
//!
//! The store holds two collections: product records keyed by `product_id`, and
//! movement records keyed by `(product_id, movement_id)`. It provides the one
//! primitive the ledger cannot do without: a serializable read-modify-write of
//! a single product that also appends the movement justifying the change.
//!
//! ## Transaction semantics
//!
//! `apply_adjustment()`:
//! - reads the current product inside the transaction
//! - runs `StockAdjustment::decide` against what it read
//! - writes `current_stock`/`last_update_date` and appends the movement
//! - commits both writes, or neither
//! - publishes the committed movement on the change feed (after commit)
//!
//! Concurrent adjustments to the same product serialize; the decision always
//! observes the latest committed stock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_core::{DomainError, ProductId};
use stockroom_events::{Event, EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use stockroom_inventory::{Movement, Product, ProductDetails, StockAdjustment, StockChange, StockEvent};

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// Committed movements, published after each successful transaction.
pub type ChangeFeed = Subscription<EventEnvelope<StockEvent>>;

/// Store operation error.
///
/// These are **infrastructure errors** (connectivity, storage integrity) as
/// opposed to domain errors (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable, busy, or otherwise failed to complete the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write collided with existing data (e.g. unique key).
    #[error("store conflict: {0}")]
    Conflict(String),

    /// Persisted data could not be decoded into domain records.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Why a transaction did not commit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The domain decision rejected the change; nothing was written.
    #[error(transparent)]
    Rejected(DomainError),

    /// The backend failed; nothing was written.
    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for TransactionError {
    fn from(value: DomainError) -> Self {
        TransactionError::Rejected(value)
    }
}

impl From<StoreError> for TransactionError {
    fn from(value: StoreError) -> Self {
        TransactionError::Store(value)
    }
}

/// Result of a committed stock adjustment: the product as written and the new movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCommit {
    pub product: Product,
    pub movement: Movement,
}

/// Transactional document store with a live change feed.
#[async_trait]
pub trait DocumentStore: Send + Sync + core::fmt::Debug {
    /// Server-side "now", used to stamp registrations and edits.
    fn now(&self) -> DateTime<Utc>;

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError>;

    /// First product (in registration order) whose name equals `name` exactly.
    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>, StoreError>;

    /// All products, sorted by name.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Insert a new product, together with the movement recording its opening stock.
    ///
    /// Fails with `Rejected(Conflict)` if the id is taken.
    async fn insert_product(
        &self,
        product: Product,
        opening: Option<StockChange>,
    ) -> Result<Option<Movement>, TransactionError>;

    /// Replace the descriptive fields of a product. Stock is never written here.
    async fn replace_details(
        &self,
        id: &ProductId,
        details: ProductDetails,
    ) -> Result<Product, TransactionError>;

    /// Remove the product record. Returns `false` if it did not exist.
    ///
    /// Movements are append-only and are left in place.
    async fn delete_product(&self, id: &ProductId) -> Result<bool, StoreError>;

    /// Atomic stock read-modify-write plus movement append.
    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
    ) -> Result<StockCommit, TransactionError>;

    /// Movement history for one product, newest first.
    async fn movements(&self, id: &ProductId) -> Result<Vec<Movement>, StoreError>;

    /// Subscribe to committed movements across all products.
    fn changes(&self) -> ChangeFeed;
}

/// Announce a committed movement on the change feed.
///
/// Publishing never fails the write: the movement is already durable.
pub(crate) fn publish_movement(bus: &InMemoryEventBus<EventEnvelope<StockEvent>>, movement: &Movement) {
    let event = StockEvent::MovementRecorded(movement.clone());
    tracing::debug!(
        event_type = event.event_type(),
        event_version = event.version(),
        occurred_at = %event.occurred_at(),
        product_id = %movement.product_id(),
        sequence = movement.sequence(),
        "publishing stock event"
    );

    let envelope = EventEnvelope::new(
        *movement.id().as_uuid(),
        movement.product_id().clone(),
        movement.sequence(),
        event,
    );
    if let Err(err) = bus.publish(envelope) {
        tracing::warn!(error = ?err, "failed to publish movement");
    }
}
