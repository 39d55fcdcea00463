use serde::{Deserialize, Serialize};

use stockroom_core::ProductId;
use stockroom_infra::StockCommit;
use stockroom_inventory::{Movement, NewProduct, Product, ProductDetails};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterProductRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub initial_stock: u64,
    #[serde(flatten)]
    pub details: ProductDetails,
}

impl RegisterProductRequest {
    pub fn into_new_product(self) -> Result<NewProduct, axum::response::Response> {
        let id = match self.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(crate::app::errors::parse_product_id(raw)?),
            None => None,
        };
        Ok(NewProduct {
            id,
            details: self.details,
            initial_stock: self.initial_stock,
        })
    }
}

/// Quantities are unsigned: a negative number fails to deserialize.
#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub quantity: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FindQuery {
    pub q: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ProductView<'a> {
    #[serde(flatten)]
    pub product: &'a Product,
    pub is_low_stock: bool,
}

impl<'a> From<&'a Product> for ProductView<'a> {
    fn from(product: &'a Product) -> Self {
        Self {
            product,
            is_low_stock: product.is_low_stock(),
        }
    }
}

pub fn product_views(products: &[Product]) -> Vec<ProductView<'_>> {
    products.iter().map(ProductView::from).collect()
}

#[derive(Debug, Serialize)]
pub struct AdjustmentView<'a> {
    pub product: ProductView<'a>,
    pub movement: &'a Movement,
}

impl<'a> From<&'a StockCommit> for AdjustmentView<'a> {
    fn from(commit: &'a StockCommit) -> Self {
        Self {
            product: ProductView::from(&commit.product),
            movement: &commit.movement,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MovementsView<'a> {
    pub product_id: &'a ProductId,
    pub movements: &'a [Movement],
}
