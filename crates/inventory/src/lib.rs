//! Inventory domain module: products and their stock ledger.
//!
//! This crate contains business rules for stock keeping, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod adjustment;
pub mod movement;
pub mod product;

pub use adjustment::{StockAdjustment, StockChange};
pub use movement::{LedgerTotals, Movement, MovementDraft, MovementType, StockEvent};
pub use product::{NewProduct, Product, ProductDetails, ProductStatus};
