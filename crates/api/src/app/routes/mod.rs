use axum::Router;

pub mod movements;
pub mod products;
pub mod stock;
pub mod system;

/// Router for all product-scoped endpoints.
pub fn router() -> Router {
    Router::new().nest("/products", products::router())
}
