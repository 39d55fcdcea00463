use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockroom_core::ProductId;
use stockroom_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        LedgerError::ProductNotFound(_) => json_error(StatusCode::NOT_FOUND, "product_not_found", message),
        LedgerError::InsufficientStock {
            product_id,
            available,
            requested,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "product_id": product_id,
                "available": available,
                "requested": requested,
            })),
        )
            .into_response(),
        LedgerError::InvalidQuantity(_) | LedgerError::Validation(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        LedgerError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        LedgerError::Transient(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    ProductId::parse(raw)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}
