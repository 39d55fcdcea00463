//! Infrastructure layer: document stores, the stock ledger, the product
//! catalog, live movement subscriptions and configuration.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod store;
pub mod subscription;

pub use catalog::ProductCatalog;
pub use config::{ConfigError, StockroomConfig, StoreBackend, StoreConfig, build_store};
pub use error::LedgerError;
pub use ledger::{Reconciliation, StockLedger};
pub use store::{
    DocumentStore, InMemoryDocumentStore, SqliteDocumentStore, StockCommit, StoreError,
    TransactionError,
};
pub use subscription::{MovementSubscription, Snapshot};
