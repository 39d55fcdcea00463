use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use stockroom_core::clock::monotonic_after;
use stockroom_core::{Clock, DomainError, MovementId, ProductId, SystemClock};
use stockroom_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockroom_inventory::{Movement, Product, ProductDetails, StockAdjustment, StockChange, StockEvent};

use super::{ChangeFeed, DocumentStore, StockCommit, StoreError, TransactionError, publish_movement};

#[derive(Debug)]
struct ProductRow {
    product: Product,
    /// Registration order, for "first match" lookups by name.
    registered: u64,
}

#[derive(Debug, Default)]
struct Collections {
    products: HashMap<ProductId, ProductRow>,
    /// Per-product history in append order (oldest first).
    movements: HashMap<ProductId, Vec<Movement>>,
    next_registration: u64,
}

impl Collections {
    fn record(&mut self, change: StockChange, now: DateTime<Utc>) -> Movement {
        let history = self
            .movements
            .entry(change.movement().product_id.clone())
            .or_default();
        let last = history.last();
        let timestamp = monotonic_after(last.map(|m| m.timestamp()), now);
        let sequence = last.map(|m| m.sequence()).unwrap_or(0) + 1;

        let movement = change
            .into_movement()
            .record(MovementId::new(), timestamp, sequence);
        history.push(movement.clone());
        movement
    }
}

/// In-memory document store.
///
/// Intended for tests/dev and for running the app without a database. One
/// write lock covers each transaction, so adjustments to the same product
/// serialize and the change feed sees commits in order.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    collections: RwLock<Collections>,
    bus: InMemoryEventBus<EventEnvelope<StockEvent>>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            collections: RwLock::new(Collections::default()),
            bus: InMemoryEventBus::new(),
            clock,
            offline: AtomicBool::new(false),
        }
    }

    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.bus = InMemoryEventBus::with_capacity(capacity);
        self
    }

    /// Make every operation fail as if the backend were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live change-feed listeners.
    pub fn feed_subscribers(&self) -> usize {
        self.bus.subscriber_count()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>, StoreError> {
        self.ensure_online()?;
        self.collections
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>, StoreError> {
        self.ensure_online()?;
        self.collections
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn publish(&self, movement: &Movement) {
        publish_movement(&self.bus, movement);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        let collections = self.read()?;
        Ok(collections.products.get(id).map(|row| row.product.clone()))
    }

    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        let collections = self.read()?;
        Ok(collections
            .products
            .values()
            .filter(|row| row.product.name() == name)
            .min_by_key(|row| row.registered)
            .map(|row| row.product.clone()))
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let collections = self.read()?;
        let mut products: Vec<Product> = collections
            .products
            .values()
            .map(|row| row.product.clone())
            .collect();
        products.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(products)
    }

    #[instrument(skip(self, product, opening), fields(product_id = %product.id()), err)]
    async fn insert_product(
        &self,
        product: Product,
        opening: Option<StockChange>,
    ) -> Result<Option<Movement>, TransactionError> {
        let mut collections = self.write()?;
        if collections.products.contains_key(product.id()) {
            return Err(DomainError::conflict(format!("product '{}' already exists", product.id())).into());
        }

        let registered = collections.next_registration;
        collections.next_registration += 1;
        let opening_at = product.registration_date();
        collections
            .products
            .insert(product.id().clone(), ProductRow { product, registered });

        let movement = opening.map(|change| collections.record(change, opening_at));
        if let Some(m) = &movement {
            self.publish(m);
        }
        Ok(movement)
    }

    async fn replace_details(
        &self,
        id: &ProductId,
        details: ProductDetails,
    ) -> Result<Product, TransactionError> {
        let now = self.clock.now();
        let mut collections = self.write()?;
        let row = collections
            .products
            .get_mut(id)
            .ok_or(TransactionError::Rejected(DomainError::not_found()))?;
        // Validate on a copy so a rejected edit leaves the record untouched.
        let mut updated = row.product.clone();
        updated.replace_details(details, now)?;
        row.product = updated.clone();
        Ok(updated)
    }

    async fn delete_product(&self, id: &ProductId) -> Result<bool, StoreError> {
        let mut collections = self.write()?;
        Ok(collections.products.remove(id).is_some())
    }

    #[instrument(
        skip(self, adjustment),
        fields(product_id = %adjustment.product_id, kind = ?adjustment.kind, quantity = adjustment.quantity),
        err
    )]
    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
    ) -> Result<StockCommit, TransactionError> {
        let now = self.clock.now();
        let mut collections = self.write()?;

        let current = collections
            .products
            .get(&adjustment.product_id)
            .map(|row| row.product.clone())
            .ok_or(TransactionError::Rejected(DomainError::not_found()))?;

        let change = adjustment.decide(&current)?;

        let movement = collections.record(change.clone(), now);
        let mut updated = current;
        change.apply_to(&mut updated, movement.timestamp());
        if let Some(row) = collections.products.get_mut(&adjustment.product_id) {
            row.product = updated.clone();
        }

        self.publish(&movement);
        Ok(StockCommit {
            product: updated,
            movement,
        })
    }

    async fn movements(&self, id: &ProductId) -> Result<Vec<Movement>, StoreError> {
        let collections = self.read()?;
        Ok(collections
            .movements
            .get(id)
            .map(|history| history.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn changes(&self) -> ChangeFeed {
        self.bus.subscribe()
    }
}
