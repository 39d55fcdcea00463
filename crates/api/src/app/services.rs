use std::sync::Arc;

use stockroom_auth::Anonymous;
use stockroom_infra::{
    DocumentStore, InMemoryDocumentStore, ProductCatalog, StockLedger, StockroomConfig, StoreError,
    build_store,
};

/// Services shared by every handler.
///
/// The acting user arrives per request (see `ActorContext`), so the server-side
/// identity collaborator is anonymous.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub ledger: StockLedger,
    pub catalog: ProductCatalog,
}

impl AppServices {
    pub fn new(store: Arc<dyn DocumentStore>, subscription_buffer: usize) -> Self {
        let identity = Arc::new(Anonymous);
        Self {
            ledger: StockLedger::new(store.clone(), identity.clone())
                .with_subscription_buffer(subscription_buffer),
            catalog: ProductCatalog::new(store, identity),
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryDocumentStore::new()),
            stockroom_infra::ledger::DEFAULT_SUBSCRIPTION_BUFFER,
        )
    }
}

pub async fn build_services(config: &StockroomConfig) -> Result<AppServices, StoreError> {
    let store = build_store(&config.store).await?;
    Ok(AppServices::new(store, config.subscription_buffer))
}
