//! Client Protocol
//!
//! Endpoints, status messages and JSON bodies of the client-facing key-value API.
//! Field names follow the wire format clients already speak (`causal-context`,
//! `doesExist`, ...), hence the serde renames.

use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;

// --- API Endpoints ---

/// Prefix of every per-key endpoint.
pub const KEYS_PREFIX: &str = "/kv-store/keys";
/// Read, write or delete one key.
pub const ENDPOINT_KEY: &str = "/kv-store/keys/:key";
/// Number of live keys held by the serving node.
pub const ENDPOINT_KEY_COUNT: &str = "/kv-store/key-count";
/// Installs a new membership view.
pub const ENDPOINT_VIEW_CHANGE: &str = "/kv-store/view-change";

/// Set on requests one node proxies to another. A node never forwards such a request again.
pub const FORWARDED_HEADER: &str = "x-kv-forwarded";

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 50;

// --- Messages ---

pub const MSG_ADDED: &str = "Added successfully";
pub const MSG_UPDATED: &str = "Updated successfully";
pub const MSG_RETRIEVED: &str = "Retrieved successfully";
pub const MSG_DELETED: &str = "Deleted successfully";
pub const MSG_KEY_COUNT: &str = "Key count retrieved successfully";
pub const MSG_VIEW_CHANGED: &str = "View change successful";

pub const ERR_PARSE: &str = "Failed to parse request body";
pub const ERR_KEY_MISSING: &str = "Key is missing";
pub const ERR_KEY_TOO_LONG: &str = "Key is too long";
pub const ERR_KEY_DNE: &str = "Key does not exist";
pub const ERR_VALUE_MISSING: &str = "Value is missing";
pub const ERR_MAIN_DOWN: &str = "Main instance is down";
pub const ERR_VIEW_MISSING: &str = "View is missing";

// --- Data Transfer Objects ---

/// Body of a key request. Every field is optional; GET and DELETE may send no body at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvRequest {
    #[serde(default)]
    pub value: Option<String>,
    /// Last clock the client observed. Missing or `null` means "no dependencies".
    #[serde(rename = "causal-context", default)]
    pub causal_context: Option<VectorClock>,
}

impl KvRequest {
    pub fn context(&self) -> VectorClock {
        self.causal_context.clone().unwrap_or_default()
    }
}

/// Response body shared by every client endpoint. Absent fields are omitted from the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced: Option<bool>,
    #[serde(rename = "doesExist", skip_serializing_if = "Option::is_none")]
    pub does_exist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Member that actually served a forwarded request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "causal-context", skip_serializing_if = "Option::is_none")]
    pub causal_context: Option<VectorClock>,
    #[serde(rename = "key-count", skip_serializing_if = "Option::is_none")]
    pub key_count: Option<usize>,
    #[serde(rename = "shard-count", skip_serializing_if = "Option::is_none")]
    pub shard_count: Option<usize>,
}

impl KvResponse {
    pub fn success(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Error body in the `{"error": ..., "message": "Error in PUT"}` shape.
    pub fn failure(method: &str, error: impl Into<String>) -> Self {
        Self {
            message: Some(format!("Error in {}", method)),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, clock: VectorClock) -> Self {
        self.causal_context = Some(clock);
        self
    }
}

/// Body of `PUT /kv-store/view-change`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewChangeRequest {
    /// Comma-separated member addresses.
    pub view: String,
    /// Keeps the current replication factor when absent.
    #[serde(rename = "repl-factor", default, skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<usize>,
    /// Set by the node fanning the change out, so receivers do not fan it out again.
    #[serde(default)]
    pub propagated: bool,
}
