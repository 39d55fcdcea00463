use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockroom_core::ActorId;

use crate::app::errors;
use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Attach an [`ActorContext`] to every request.
///
/// A missing header means an anonymous caller; a malformed one is rejected.
pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let actor = extract_actor(req.headers())?;
    req.extensions_mut().insert(ActorContext::new(actor));
    Ok(next.run(req).await)
}

fn extract_actor(headers: &HeaderMap) -> Result<Option<ActorId>, Response> {
    let Some(header) = headers.get(ACTOR_HEADER) else {
        return Ok(None);
    };

    let raw = header.to_str().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "X-Actor-Id must be ASCII")
    })?;
    if raw.trim().is_empty() {
        return Ok(None);
    }

    ActorId::parse(raw)
        .map(Some)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
}
