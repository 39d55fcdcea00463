//! Product catalog: registration, edits, deletion and listing.
//!
//! The catalog never writes `current_stock`. A product registered with an
//! opening stock gets an Inbound movement in the same transaction, so its
//! history justifies its stock from the start.

use std::sync::Arc;

use tracing::instrument;

use stockroom_auth::IdentityProvider;
use stockroom_core::{ActorId, ProductId};
use stockroom_inventory::{NewProduct, Product, ProductDetails, StockChange};

use crate::error::LedgerError;
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct ProductCatalog {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl ProductCatalog {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Register a product. `responsible` signs the opening-stock movement and
    /// defaults to the signed-in actor.
    #[instrument(skip(self, request, responsible), fields(name = %request.details.name))]
    pub async fn register(
        &self,
        request: NewProduct,
        responsible: Option<ActorId>,
    ) -> Result<Product, LedgerError> {
        let product = Product::register(request, self.store.now())
            .map_err(LedgerError::rejected)?;
        let responsible = responsible.or_else(|| self.identity.current_actor());
        let opening = StockChange::opening_balance(&product, responsible);

        self.store
            .insert_product(product.clone(), opening)
            .await
            .map_err(|e| LedgerError::from_transaction("insert_product", product.id(), e))?;

        tracing::info!(
            product_id = %product.id(),
            initial_stock = product.current_stock(),
            "product registered"
        );
        Ok(product)
    }

    /// Replace every descriptive field. Stock and registration date are kept.
    #[instrument(skip(self, details), fields(product_id = %id))]
    pub async fn edit(&self, id: &ProductId, details: ProductDetails) -> Result<Product, LedgerError> {
        self.store
            .replace_details(id, details)
            .await
            .map_err(|e| LedgerError::from_transaction("replace_details", id, e))
    }

    /// Remove the product record. Its movement history is kept.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: &ProductId) -> Result<(), LedgerError> {
        let removed = self
            .store
            .delete_product(id)
            .await
            .map_err(|e| LedgerError::from_store("delete_product", e))?;
        if !removed {
            return Err(LedgerError::ProductNotFound(id.clone()));
        }
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    pub async fn get(&self, id: &ProductId) -> Result<Product, LedgerError> {
        self.store
            .get_product(id)
            .await
            .map_err(|e| LedgerError::from_store("get_product", e))?
            .ok_or_else(|| LedgerError::ProductNotFound(id.clone()))
    }

    /// All products, sorted by name.
    pub async fn list(&self) -> Result<Vec<Product>, LedgerError> {
        self.store
            .list_products()
            .await
            .map_err(|e| LedgerError::from_store("list_products", e))
    }
}
