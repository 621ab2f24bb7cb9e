//! Gossip Wire Protocol
//!
//! Batches are JSON over HTTP `PUT`. The receiver answers with its clock, which the sender
//! records as the receiver's progress.

use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::store::Entry;

/// Endpoint receiving gossip batches from peers of the same shard.
pub const ENDPOINT_GOSSIP: &str = "/kv-store/gossip";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipRequest {
    /// Address of the sending node.
    pub sender: String,
    /// Sender's clock restricted to its replicas. Doubles as an acknowledgment of
    /// everything the sender has applied.
    #[serde(default)]
    pub clock: VectorClock,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipResponse {
    /// Receiver's clock after the import.
    pub clock: VectorClock,
    /// Entries actually applied (duplicates excluded).
    pub applied: usize,
}
