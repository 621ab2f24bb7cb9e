//! Anti-Entropy Module
//!
//! Keeps the replicas of a shard converged by pushing local commits to peers over HTTP.
//!
//! ## Core Mechanisms
//! - **Outbox**: the manager drains the store journal into an ordered log of local commits.
//! - **Discovery**: `find_gossip` selects, per peer, the commits that peer has not
//!   acknowledged yet, based on the last clock the peer reported.
//! - **Relay**: `relay_gossip` PUTs each batch to the peer's gossip endpoint, on a timer and
//!   whenever a new commit arrives. Failures are logged and retried on the next round.
//! - **Receive**: incoming batches are imported in causal order through
//!   `CausalStore::import_entry_until`, which enforces per-origin FIFO delivery.

pub mod handlers;
pub mod manager;
pub mod protocol;

pub use manager::{GossipConfig, GossipManager};
pub use protocol::{ENDPOINT_GOSSIP, GossipRequest, GossipResponse};
