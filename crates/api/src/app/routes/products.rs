use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stockroom_inventory::ProductDetails;

use crate::app::routes::{movements, stock};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_product).get(list_products))
        .route("/low-stock", get(low_stock))
        .route("/find", get(find_product))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/:id/stock", get(stock::stock_level))
        .route("/:id/stock/increase", post(stock::increase_stock))
        .route("/:id/stock/decrease", post(stock::decrease_stock))
        .route("/:id/movements", get(movements::list_movements))
        .route("/:id/movements/stream", get(movements::stream_movements))
}

pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::RegisterProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let request = match body.into_new_product() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.catalog.register(request, actor.into_actor()).await {
        Ok(product) => (StatusCode::CREATED, Json(dto::ProductView::from(&product))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.catalog.list().await {
        Ok(products) => (StatusCode::OK, Json(dto::product_views(&products))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// GET /products/low-stock
///
/// Products whose current stock is at or below their minimum threshold.
pub async fn low_stock(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.ledger.low_stock().await {
        Ok(products) => (StatusCode::OK, Json(dto::product_views(&products))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// GET /products/find?q=
///
/// Exact id match first, then exact name. A miss is a 404, never a server error.
pub async fn find_product(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::FindQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };

    match services.ledger.find_product(&query.q).await {
        Ok(Some(product)) => (StatusCode::OK, Json(dto::ProductView::from(&product))).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "product_not_found",
            format!("no product matches '{}'", query.q.trim()),
        ),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.get(&id).await {
        Ok(product) => (StatusCode::OK, Json(dto::ProductView::from(&product))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// PUT /products/:id
///
/// Replaces every descriptive field. Stock is only changed through the stock endpoints.
pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<ProductDetails>, JsonRejection>,
) -> axum::response::Response {
    let id = match errors::parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(details) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.catalog.edit(&id, details).await {
        Ok(product) => (StatusCode::OK, Json(dto::ProductView::from(&product))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
