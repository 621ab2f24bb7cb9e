//! Client Routing Module
//!
//! The HTTP surface of a node: the key-value API, the key count, view changes and the
//! gossip endpoint, all mounted on one axum `Router`.
//!
//! ## Request Flow
//! 1. **Validation**: keys longer than 50 bytes and unparsable bodies are rejected with 400.
//! 2. **Ownership**: the key is hashed over the current view. If this node is not in the
//!    owner's shard, the request is proxied to that shard's members, owner first.
//! 3. **Causal execution**: locally served requests run against the `CausalStore` with the
//!    client's `causal-context`, and the response carries the merged clock back.
//!
//! View changes swap the hash's view with a compare-and-set loop, shrink or grow the
//! store's replica set to the node's new shard, then fan the view out to every member.

pub mod forward;
pub mod handlers;
pub mod protocol;
pub mod types;

use axum::{
    Extension, Router,
    routing::{any, get, put},
};
use std::sync::Arc;

use crate::gossip::ENDPOINT_GOSSIP;
use crate::gossip::handlers::handle_gossip;
use handlers::*;
use protocol::{ENDPOINT_KEY, ENDPOINT_KEY_COUNT, ENDPOINT_VIEW_CHANGE, KEYS_PREFIX};

pub use protocol::{KvRequest, KvResponse, ViewChangeRequest};
pub use types::{NodeState, RoutingConfig};

/// Builds the full node router.
pub fn router(node: Arc<NodeState>) -> Router {
    Router::new()
        .route(
            ENDPOINT_KEY,
            get(handle_get).put(handle_put).delete(handle_delete),
        )
        .route(&format!("{}/", KEYS_PREFIX), any(handle_missing_key))
        .route(ENDPOINT_KEY_COUNT, get(handle_key_count))
        .route(ENDPOINT_VIEW_CHANGE, put(handle_view_change))
        .route(ENDPOINT_GOSSIP, put(handle_gossip))
        .layer(Extension(node.gossip.clone()))
        .layer(Extension(node))
}
