use axum::{
    Extension, Json,
    body::Bytes,
    extract::Path,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;

use super::forward::forward;
use super::protocol::*;
use super::types::NodeState;
use crate::hash::parse_view;
use crate::store::StoreError;
use crate::transport::{peer_url, put_json_with_retry};

fn reply(status: StatusCode, body: KvResponse) -> Response {
    (status, Json(body)).into_response()
}

fn store_unavailable(method: &Method, e: StoreError) -> Response {
    tracing::error!("{} abandoned: {}", method, e);
    reply(
        StatusCode::SERVICE_UNAVAILABLE,
        KvResponse::failure(method.as_str(), e.to_string()),
    )
}

/// Parses an optional JSON body. An empty body is an empty request.
fn parse_body(method: &Method, body: &Bytes) -> Result<KvRequest, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(KvRequest::default());
    }

    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Failed to parse {} body: {}", method, e);
        reply(
            StatusCode::BAD_REQUEST,
            KvResponse::failure(method.as_str(), ERR_PARSE),
        )
    })
}

/// Validates the key and body, then decides whether the request is served here.
///
/// `Err` carries the response to return right away: a validation error or the result of
/// forwarding to the owner's shard.
async fn prepare(
    node: &NodeState,
    method: Method,
    key: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<KvRequest, Response> {
    if key.len() > MAX_KEY_LEN {
        return Err(reply(
            StatusCode::BAD_REQUEST,
            KvResponse::failure(method.as_str(), ERR_KEY_TOO_LONG),
        ));
    }

    let request = parse_body(&method, &body)?;

    if let Some(targets) = node.forward_targets(key, headers) {
        return Err(forward(node, method, key, body, targets).await);
    }

    Ok(request)
}

pub async fn handle_get(
    Extension(node): Extension<Arc<NodeState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match prepare(&node, Method::GET, &key, &headers, body).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    match node.store.read(&request.context(), &key).await {
        Ok(outcome) => match outcome.entry {
            Some(entry) => reply(
                StatusCode::OK,
                KvResponse {
                    does_exist: Some(true),
                    value: Some(entry.value),
                    ..KvResponse::success(MSG_RETRIEVED)
                }
                .with_context(outcome.clock),
            ),
            None => reply(
                StatusCode::NOT_FOUND,
                KvResponse {
                    does_exist: Some(false),
                    ..KvResponse::failure("GET", ERR_KEY_DNE)
                }
                .with_context(outcome.clock),
            ),
        },
        Err(e) => store_unavailable(&Method::GET, e),
    }
}

pub async fn handle_put(
    Extension(node): Extension<Arc<NodeState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match prepare(&node, Method::PUT, &key, &headers, body).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let value = match request.value.as_deref() {
        Some(value) if !value.is_empty() => value,
        _ => {
            return reply(
                StatusCode::BAD_REQUEST,
                KvResponse::failure("PUT", ERR_VALUE_MISSING),
            );
        }
    };

    match node.store.write(&request.context(), &key, value).await {
        Ok(outcome) => {
            let (status, message) = if outcome.replaced {
                (StatusCode::OK, MSG_UPDATED)
            } else {
                (StatusCode::CREATED, MSG_ADDED)
            };
            tracing::debug!("PUT {:?} committed at {}", key, outcome.clock);
            reply(
                status,
                KvResponse {
                    replaced: Some(outcome.replaced),
                    ..KvResponse::success(message)
                }
                .with_context(outcome.clock),
            )
        }
        Err(e) => store_unavailable(&Method::PUT, e),
    }
}

pub async fn handle_delete(
    Extension(node): Extension<Arc<NodeState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match prepare(&node, Method::DELETE, &key, &headers, body).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    match node.store.delete(&request.context(), &key).await {
        Ok(outcome) if outcome.deleted => reply(
            StatusCode::OK,
            KvResponse {
                does_exist: Some(true),
                ..KvResponse::success(MSG_DELETED)
            }
            .with_context(outcome.clock),
        ),
        Ok(outcome) => reply(
            StatusCode::NOT_FOUND,
            KvResponse {
                does_exist: Some(false),
                ..KvResponse::failure("DELETE", ERR_KEY_DNE)
            }
            .with_context(outcome.clock),
        ),
        Err(e) => store_unavailable(&Method::DELETE, e),
    }
}

/// Catches `/kv-store/keys/` with an empty key.
pub async fn handle_missing_key(method: Method) -> Response {
    reply(
        StatusCode::BAD_REQUEST,
        KvResponse::failure(method.as_str(), ERR_KEY_MISSING),
    )
}

pub async fn handle_key_count(Extension(node): Extension<Arc<NodeState>>, body: Bytes) -> Response {
    let request = match parse_body(&Method::GET, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match node.store.num_keys(&request.context()).await {
        Ok(outcome) => reply(
            StatusCode::OK,
            KvResponse {
                key_count: Some(outcome.count),
                ..KvResponse::success(MSG_KEY_COUNT)
            }
            .with_context(outcome.clock),
        ),
        Err(e) => store_unavailable(&Method::GET, e),
    }
}

/// Installs a new view, narrows the store's replica set to this node's new shard and,
/// unless the request was itself propagated, pushes the view to every old and new member.
pub async fn handle_view_change(
    Extension(node): Extension<Arc<NodeState>>,
    body: Bytes,
) -> Response {
    let request: ViewChangeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Failed to parse view change: {}", e);
            return reply(StatusCode::BAD_REQUEST, KvResponse::failure("PUT", ERR_PARSE));
        }
    };

    let members = parse_view(&request.view);
    if members.is_empty() {
        return reply(
            StatusCode::BAD_REQUEST,
            KvResponse::failure("PUT", ERR_VIEW_MISSING),
        );
    }

    // Serializes the swap with the replica update so the store never ends up scoped to an
    // older view than the hash.
    let (previous, view) = {
        let _guard = node.view_change.lock().await;

        let (previous, installed) = loop {
            let current = node.hash.view();
            let replication_factor = request
                .replication_factor
                .unwrap_or(current.replication_factor());
            let installed = current.next(members.clone(), replication_factor);
            if node
                .hash
                .test_and_set(current.version(), members.clone(), replication_factor)
            {
                break (current, installed);
            }
            tracing::debug!("View changed concurrently, retrying");
        };

        let replicas = node.shard_members_in(&installed);
        tracing::info!(
            "View {} installed: {} member(s), {} shard(s), replicas {:?}",
            installed.version(),
            installed.members().len(),
            installed.shard_count(),
            replicas
        );
        node.store.set_replicas(replicas).await;
        (previous, installed)
    };

    if !request.propagated {
        let targets: BTreeSet<String> = previous
            .members()
            .iter()
            .chain(view.members())
            .filter(|member| *member != &node.address)
            .cloned()
            .collect();
        propagate_view(&node, &request, view.replication_factor(), targets).await;
    }

    reply(
        StatusCode::OK,
        KvResponse {
            shard_count: Some(view.shard_count()),
            ..KvResponse::success(MSG_VIEW_CHANGED)
        },
    )
}

async fn propagate_view(
    node: &NodeState,
    request: &ViewChangeRequest,
    replication_factor: usize,
    targets: BTreeSet<String>,
) {
    let payload = ViewChangeRequest {
        view: request.view.clone(),
        replication_factor: Some(replication_factor),
        propagated: true,
    };

    let mut tasks = JoinSet::new();
    for target in targets {
        let client = node.http_client.clone();
        let payload = payload.clone();
        let timeout = node.config.fanout_timeout;
        let attempts = node.config.fanout_attempts;
        tasks.spawn(async move {
            let url = peer_url(&target, ENDPOINT_VIEW_CHANGE);
            let result = put_json_with_retry(&client, &url, &payload, timeout, attempts).await;
            (target, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((target, Ok(response))) if response.status().is_success() => {
                tracing::debug!("View propagated to {}", target);
            }
            Ok((target, Ok(response))) => {
                tracing::warn!("{} rejected the view: {}", target, response.status());
            }
            Ok((target, Err(e))) => {
                tracing::warn!("Failed to propagate view to {}: {}", target, e);
            }
            Err(e) => {
                tracing::error!("View propagation task failed: {}", e);
            }
        }
    }
}
