//! Movement history: one-shot snapshots and a live SSE feed.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use tokio_stream::StreamExt;

use stockroom_infra::{LedgerError, Snapshot};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.list_movements(&id).await {
        Ok(movements) => (
            StatusCode::OK,
            Json(dto::MovementsView {
                product_id: &id,
                movements: &movements,
            }),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// GET /products/:id/movements/stream
///
/// Server-Sent Events: a `snapshot` event with the full newest-first history
/// on connect and after every new movement. A failure is sent as an `error`
/// event and ends the stream. The body pulls straight from the subscription,
/// so a client that stops reading leaves at most one buffer of snapshots
/// queued; closing the connection drops the subscription.
pub async fn stream_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match errors::parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let events = services
        .ledger
        .watch_movements(id)
        .map(|item| Ok::<_, Infallible>(snapshot_event(item)));

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

fn snapshot_event(item: Snapshot) -> SseEvent {
    let encoded = item.and_then(|snapshot| {
        SseEvent::default()
            .event("snapshot")
            .json_data(&snapshot)
            .map_err(|err| {
                tracing::warn!(error = %err, "failed to encode movement snapshot");
                LedgerError::transient()
            })
    });
    encoded.unwrap_or_else(|err| {
        let data = json!({ "error": "unavailable", "message": err.to_string() });
        SseEvent::default().event("error").data(data.to_string())
    })
}
