//! Stock ledger: current stock per product plus the append-only movement
//! history that justifies it.
//!
//! The ledger owns no state. Every adjustment is one store transaction:
//!
//! ```text
//! IncreaseStock / DecreaseStock
//!   ↓
//! 1. Validate quantity (before touching the store)
//!   ↓
//! 2. DocumentStore::apply_adjustment
//!      read product → StockAdjustment::decide → write stock + append movement
//!   ↓
//! 3. Change feed publishes the committed movement
//! ```
//!
//! A rejected decrease writes nothing. Concurrent adjustments to the same
//! product serialize inside the store, so the floor-at-zero check always sees
//! the latest committed stock.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use stockroom_auth::IdentityProvider;
use stockroom_core::{ActorId, DomainError, ProductId};
use stockroom_inventory::{LedgerTotals, Movement, Product, StockAdjustment};

use crate::error::LedgerError;
use crate::store::{DocumentStore, StockCommit, TransactionError};
use crate::subscription::MovementSubscription;

pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 16;

/// Audit of one product's stock against its recorded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub product_id: ProductId,
    pub current_stock: u64,
    pub totals: LedgerTotals,
    pub movement_count: usize,
}

impl Reconciliation {
    /// Stock equals inbound minus outbound.
    pub fn is_consistent(&self) -> bool {
        self.totals.balance() == Some(self.current_stock)
    }
}

#[derive(Debug, Clone)]
pub struct StockLedger {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    subscription_buffer: usize,
}

impl StockLedger {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identity,
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }

    pub fn with_subscription_buffer(mut self, buffer: usize) -> Self {
        self.subscription_buffer = buffer.max(1);
        self
    }

    pub async fn increase_stock(
        &self,
        product_id: &ProductId,
        quantity: u64,
        responsible: Option<ActorId>,
        notes: Option<String>,
    ) -> Result<StockCommit, LedgerError> {
        self.adjust(
            StockAdjustment::increase(product_id.clone(), quantity)
                .responsible(responsible)
                .notes(notes),
        )
        .await
    }

    pub async fn decrease_stock(
        &self,
        product_id: &ProductId,
        quantity: u64,
        responsible: Option<ActorId>,
        notes: Option<String>,
    ) -> Result<StockCommit, LedgerError> {
        self.adjust(
            StockAdjustment::decrease(product_id.clone(), quantity)
                .responsible(responsible)
                .notes(notes),
        )
        .await
    }

    /// Apply an adjustment atomically and return the committed product and movement.
    #[instrument(
        skip(self, adjustment),
        fields(product_id = %adjustment.product_id, kind = ?adjustment.kind, quantity = adjustment.quantity)
    )]
    pub async fn adjust(&self, mut adjustment: StockAdjustment) -> Result<StockCommit, LedgerError> {
        if let Err(DomainError::Validation(msg)) = adjustment.validate() {
            return Err(LedgerError::InvalidQuantity(msg));
        }
        if adjustment.responsible.is_none() {
            adjustment.responsible = self.identity.current_actor();
        }

        match self.store.apply_adjustment(&adjustment).await {
            Ok(commit) => {
                tracing::info!(
                    movement_id = %commit.movement.id(),
                    new_stock = commit.product.current_stock(),
                    "stock adjusted"
                );
                Ok(commit)
            }
            // Decide only reports validation failures for the quantity (overflow).
            Err(TransactionError::Rejected(DomainError::Validation(msg))) => {
                tracing::warn!(reason = %msg, "stock adjustment rejected");
                Err(LedgerError::InvalidQuantity(msg))
            }
            Err(err) => {
                let err = LedgerError::from_transaction("apply_adjustment", &adjustment.product_id, err);
                if !err.is_retryable() {
                    tracing::warn!(error = %err, "stock adjustment rejected");
                }
                Err(err)
            }
        }
    }

    /// Live, newest-first view of a product's movements.
    ///
    /// Unknown products yield an empty snapshot; the product may be registered later.
    pub fn watch_movements(&self, product_id: ProductId) -> MovementSubscription {
        MovementSubscription::spawn(self.store.clone(), product_id, self.subscription_buffer)
    }

    /// Current newest-first snapshot of a product's movements.
    pub async fn list_movements(&self, product_id: &ProductId) -> Result<Vec<Movement>, LedgerError> {
        self.store
            .movements(product_id)
            .await
            .map_err(|e| LedgerError::from_store("list_movements", e))
    }

    /// Exact id match first, then the first product registered under exactly that name.
    #[instrument(skip(self))]
    pub async fn find_product(&self, query: &str) -> Result<Option<Product>, LedgerError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        if let Ok(id) = ProductId::parse(query) {
            let by_id = self
                .store
                .get_product(&id)
                .await
                .map_err(|e| LedgerError::from_store("find_product", e))?;
            if by_id.is_some() {
                return Ok(by_id);
            }
        }

        self.store
            .find_product_by_name(query)
            .await
            .map_err(|e| LedgerError::from_store("find_product", e))
    }

    pub async fn stock_level(&self, product_id: &ProductId) -> Result<u64, LedgerError> {
        Ok(self.require(product_id).await?.current_stock())
    }

    /// Recompute inbound minus outbound from the history and compare with the stored stock.
    pub async fn reconcile(&self, product_id: &ProductId) -> Result<Reconciliation, LedgerError> {
        let product = self.require(product_id).await?;
        let history = self.list_movements(product_id).await?;
        let report = Reconciliation {
            product_id: product_id.clone(),
            current_stock: product.current_stock(),
            totals: LedgerTotals::from_movements(&history),
            movement_count: history.len(),
        };
        if !report.is_consistent() {
            tracing::warn!(
                product_id = %product_id,
                current_stock = report.current_stock,
                inbound = report.totals.inbound,
                outbound = report.totals.outbound,
                "stock does not match movement history"
            );
        }
        Ok(report)
    }

    /// Products at or below their minimum stock, sorted by name.
    pub async fn low_stock(&self) -> Result<Vec<Product>, LedgerError> {
        let products = self
            .store
            .list_products()
            .await
            .map_err(|e| LedgerError::from_store("low_stock", e))?;
        Ok(products.into_iter().filter(Product::is_low_stock).collect())
    }

    async fn require(&self, product_id: &ProductId) -> Result<Product, LedgerError> {
        self.store
            .get_product(product_id)
            .await
            .map_err(|e| LedgerError::from_store("get_product", e))?
            .ok_or_else(|| LedgerError::ProductNotFound(product_id.clone()))
    }
}
