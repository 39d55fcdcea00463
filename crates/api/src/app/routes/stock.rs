use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use stockroom_inventory::StockAdjustment;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub async fn increase_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> axum::response::Response {
    adjust(services, actor, id, body, StockAdjustment::increase).await
}

pub async fn decrease_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> axum::response::Response {
    adjust(services, actor, id, body, StockAdjustment::decrease).await
}

async fn adjust(
    services: Arc<AppServices>,
    actor: ActorContext,
    id: String,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
    build: fn(stockroom_core::ProductId, u64) -> StockAdjustment,
) -> axum::response::Response {
    let id = match errors::parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    let adjustment = build(id, body.quantity)
        .responsible(actor.into_actor())
        .notes(body.notes);

    match services.ledger.adjust(adjustment).await {
        Ok(commit) => (StatusCode::OK, Json(dto::AdjustmentView::from(&commit))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// GET /products/:id/stock
///
/// Current stock together with the totals recomputed from the movement history.
pub async fn stock_level(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.reconcile(&id).await {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "product_id": report.product_id,
                "current_stock": report.current_stock,
                "inbound": report.totals.inbound,
                "outbound": report.totals.outbound,
                "movement_count": report.movement_count,
                "consistent": report.is_consistent(),
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
