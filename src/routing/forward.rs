use axum::{
    Json,
    body::Bytes,
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};

use super::protocol::{ERR_MAIN_DOWN, FORWARDED_HEADER, KEYS_PREFIX, KvResponse};
use super::types::NodeState;
use crate::transport::peer_segments_url;

/// Proxies a client request for `key` to the first reachable member of `targets`.
///
/// The key is re-encoded as a single path segment, so keys holding `/`, `?` or `#` reach
/// the owner unchanged.
///
/// The member's status is returned as is. Its JSON body is re-encoded with `address` set
/// to that member; a body that is not a `KvResponse` is passed through untouched.
pub async fn forward(
    node: &NodeState,
    method: Method,
    key: &str,
    body: Bytes,
    targets: Vec<String>,
) -> Response {
    let path = format!("{}/{}", KEYS_PREFIX, key);
    let segments: Vec<&str> = KEYS_PREFIX
        .split('/')
        .filter(|segment| !segment.is_empty())
        .chain(std::iter::once(key))
        .collect();

    for target in &targets {
        let url = match peer_segments_url(target, &segments) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Cannot forward to {}: {}", target, e);
                continue;
            }
        };
        let result = node
            .http_client
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(FORWARDED_HEADER, node.address.as_str())
            .body(body.clone())
            .timeout(node.config.forward_timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to forward {} {} to {}: {}", method, path, target, e);
                continue;
            }
        };

        let status =
            StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read forwarded response from {}: {}", target, e);
                continue;
            }
        };

        tracing::debug!("{} {} served by {} ({})", method, path, target, status);

        return match serde_json::from_slice::<KvResponse>(&bytes) {
            Ok(mut kv) => {
                kv.address = Some(target.clone());
                (status, Json(kv)).into_response()
            }
            Err(_) => (status, bytes).into_response(),
        };
    }

    tracing::error!("No member of {:?} reachable for {} {}", targets, method, path);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(KvResponse::failure(method.as_str(), ERR_MAIN_DOWN)),
    )
        .into_response()
}
