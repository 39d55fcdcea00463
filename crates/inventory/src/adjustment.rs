//! Stock adjustment decisions.
//!
//! `StockAdjustment::decide` is the single place the floor-at-zero rule lives.
//! Stores call it inside their transaction, against the product they just read,
//! so the check always sees the latest committed stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ActorId, DomainError, ProductId};

use crate::movement::{MovementDraft, MovementType};
use crate::product::Product;

/// Request to add or remove stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub kind: MovementType,
    pub quantity: u64,
    pub responsible: Option<ActorId>,
    pub notes: Option<String>,
}

impl StockAdjustment {
    pub fn increase(product_id: ProductId, quantity: u64) -> Self {
        Self::new(product_id, MovementType::Inbound, quantity)
    }

    pub fn decrease(product_id: ProductId, quantity: u64) -> Self {
        Self::new(product_id, MovementType::Outbound, quantity)
    }

    fn new(product_id: ProductId, kind: MovementType, quantity: u64) -> Self {
        Self {
            product_id,
            kind,
            quantity,
            responsible: None,
            notes: None,
        }
    }

    pub fn responsible(mut self, actor: Option<ActorId>) -> Self {
        self.responsible = actor;
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self
    }

    /// Reject requests that can never succeed, before touching the store.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }

    /// Decide the outcome of this adjustment against the current product state.
    ///
    /// Pure: nothing is written. The caller commits the returned change and
    /// the movement draft together, or neither.
    pub fn decide(&self, product: &Product) -> Result<StockChange, DomainError> {
        self.validate()?;
        if product.id() != &self.product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }

        let previous = product.current_stock();
        let new_stock = match self.kind {
            MovementType::Inbound => previous
                .checked_add(self.quantity)
                .ok_or_else(|| DomainError::validation("quantity overflows stock counter"))?,
            MovementType::Outbound => previous
                .checked_sub(self.quantity)
                .ok_or_else(|| DomainError::insufficient_stock(previous, self.quantity))?,
        };

        Ok(StockChange {
            previous_stock: previous,
            new_stock,
            movement: MovementDraft {
                product_id: self.product_id.clone(),
                quantity: self.quantity,
                kind: self.kind,
                responsible: self.responsible.clone(),
                notes: self.notes.clone(),
            },
        })
    }
}

/// Accepted adjustment: the new stock value plus the movement that justifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    previous_stock: u64,
    new_stock: u64,
    movement: MovementDraft,
}

impl StockChange {
    /// Movement recording the initial stock of a newly registered product.
    pub fn opening_balance(product: &Product, responsible: Option<ActorId>) -> Option<Self> {
        if product.current_stock() == 0 {
            return None;
        }
        Some(Self {
            previous_stock: 0,
            new_stock: product.current_stock(),
            movement: MovementDraft {
                product_id: product.id().clone(),
                quantity: product.current_stock(),
                kind: MovementType::Inbound,
                responsible,
                notes: Some("initial stock".to_string()),
            },
        })
    }

    pub fn previous_stock(&self) -> u64 {
        self.previous_stock
    }

    pub fn new_stock(&self) -> u64 {
        self.new_stock
    }

    pub fn movement(&self) -> &MovementDraft {
        &self.movement
    }

    pub fn into_movement(self) -> MovementDraft {
        self.movement
    }

    /// Write the new stock into `product`.
    pub fn apply_to(&self, product: &mut Product, at: DateTime<Utc>) {
        product.set_stock(self.new_stock, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::{LedgerTotals, Movement};
    use crate::product::{NewProduct, ProductDetails};
    use chrono::TimeZone;
    use stockroom_core::MovementId;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn product_with_stock(stock: u64) -> Product {
        let mut request = NewProduct::new(ProductDetails::named("Flour"));
        request.id = Some(ProductId::parse("flour").unwrap());
        request.initial_stock = stock;
        Product::register(request, t0()).unwrap()
    }

    fn pid() -> ProductId {
        ProductId::parse("flour").unwrap()
    }

    #[test]
    fn increase_adds_quantity() {
        let product = product_with_stock(10);
        let change = StockAdjustment::increase(pid(), 5).decide(&product).unwrap();
        assert_eq!(change.previous_stock(), 10);
        assert_eq!(change.new_stock(), 15);
        assert_eq!(change.movement().kind, MovementType::Inbound);
        assert_eq!(change.movement().quantity, 5);
    }

    #[test]
    fn decrease_below_zero_is_rejected() {
        let product = product_with_stock(3);
        let err = StockAdjustment::decrease(pid(), 5).decide(&product).unwrap_err();
        assert_eq!(err, DomainError::InsufficientStock { available: 3, requested: 5 });
        assert_eq!(
            err.to_string(),
            "insufficient stock for withdrawal: requested 5, available 3"
        );
    }

    #[test]
    fn decrease_to_exactly_zero_is_allowed() {
        let mut product = product_with_stock(3);
        let change = StockAdjustment::decrease(pid(), 3).decide(&product).unwrap();
        change.apply_to(&mut product, t0() + chrono::Duration::minutes(1));
        assert_eq!(product.current_stock(), 0);
        assert_eq!(product.last_update_date(), t0() + chrono::Duration::minutes(1));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let product = product_with_stock(3);
        let err = StockAdjustment::increase(pid(), 0).decide(&product).unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for zero quantity"),
        }
    }

    #[test]
    fn overflow_is_rejected() {
        let product = product_with_stock(u64::MAX - 1);
        assert!(matches!(
            StockAdjustment::increase(pid(), 2).decide(&product),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn mismatched_product_is_rejected() {
        let product = product_with_stock(3);
        let other = ProductId::parse("salt").unwrap();
        assert!(matches!(
            StockAdjustment::increase(other, 1).decide(&product),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn blank_notes_are_dropped() {
        let adj = StockAdjustment::increase(pid(), 1).notes(Some("   ".to_string()));
        assert_eq!(adj.notes, None);
        let adj = StockAdjustment::increase(pid(), 1).notes(Some(" restock ".to_string()));
        assert_eq!(adj.notes.as_deref(), Some("restock"));
    }

    #[test]
    fn opening_balance_only_for_nonzero_stock() {
        assert!(StockChange::opening_balance(&product_with_stock(0), None).is_none());
        let change = StockChange::opening_balance(&product_with_stock(7), None).unwrap();
        assert_eq!(change.movement().quantity, 7);
        assert_eq!(change.movement().kind, MovementType::Inbound);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn op_strategy() -> impl Strategy<Value = (bool, u64)> {
            (any::<bool>(), 1u64..50)
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Stock always equals inbound minus outbound over the recorded history.
            #[test]
            fn stock_matches_recorded_history(ops in prop::collection::vec(op_strategy(), 0..60)) {
                let mut product = product_with_stock(0);
                let mut history: Vec<Movement> = Vec::new();

                for (seq, (is_increase, qty)) in ops.into_iter().enumerate() {
                    let adj = if is_increase {
                        StockAdjustment::increase(pid(), qty)
                    } else {
                        StockAdjustment::decrease(pid(), qty)
                    };
                    let before = product.clone();
                    match adj.decide(&product) {
                        Ok(change) => {
                            let at = t0() + chrono::Duration::seconds(seq as i64);
                            change.apply_to(&mut product, at);
                            history.push(change.into_movement().record(MovementId::new(), at, seq as u64 + 1));
                        }
                        Err(DomainError::InsufficientStock { available, requested }) => {
                            prop_assert!(!is_increase);
                            prop_assert_eq!(available, before.current_stock());
                            prop_assert!(requested > available);
                            prop_assert_eq!(&product, &before);
                        }
                        Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                    }

                    let totals = LedgerTotals::from_movements(&history);
                    prop_assert_eq!(totals.balance(), Some(product.current_stock()));
                }
            }
        }
    }
}
