use axum::{
    Extension, Json,
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::manager::GossipManager;
use super::protocol::GossipRequest;

/// `PUT /kv-store/gossip`: imports a batch sent by a peer and answers with the local clock.
pub async fn handle_gossip(
    Extension(manager): Extension<Arc<GossipManager>>,
    body: Bytes,
) -> Response {
    let request: GossipRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Failed to parse gossip batch: {}", e);
            return (StatusCode::BAD_REQUEST, format!("invalid gossip batch: {}", e))
                .into_response();
        }
    };

    tracing::trace!(
        "Received {} gossip entr(ies) from {}",
        request.entries.len(),
        request.sender
    );

    let response = manager.receive(request).await;
    (StatusCode::OK, Json(response)).into_response()
}
