//! Peer HTTP helpers shared by gossip and view-change fan-out.

use anyhow::Result;
use serde::Serialize;
use std::time::Duration;

/// Builds `http://{address}{path}`. Addresses that already carry a scheme are kept as is.
pub fn peer_url(address: &str, path: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        format!("{}{}", address, path)
    } else {
        format!("http://{}{}", address, path)
    }
}

/// Builds a peer URL from raw path segments, percent-encoding each one.
///
/// Segments may contain `/`, `?` or `#`; each still lands in a single path segment.
pub fn peer_segments_url(address: &str, segments: &[&str]) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(&peer_url(address, "/"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Peer address {:?} cannot carry a path", address))?
        .clear()
        .extend(segments.iter().copied());
    Ok(url)
}

/// PUTs `payload` as JSON, retrying transport errors with jittered exponential backoff.
///
/// Only transport failures are retried; any HTTP response, successful or not, is returned.
pub async fn put_json_with_retry<T: Serialize>(
    client: &reqwest::Client,
    url: &str,
    payload: &T,
    timeout: Duration,
    attempts: usize,
) -> Result<reqwest::Response> {
    let mut delay_ms = 100u64;
    let attempts = attempts.max(1);

    for attempt in 0..attempts {
        let response = client
            .put(url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt + 1 == attempts {
                    return Err(anyhow::anyhow!(e));
                }
                tracing::trace!("PUT {} failed (attempt {}): {}", url, attempt + 1, e);
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1000);
            }
        }
    }

    Err(anyhow::anyhow!("Retry attempts exhausted"))
}
