//! Causally Consistent Key-Value Store Library
//!
//! This library crate defines the modules that make up one node of a sharded,
//! replicated key-value store with causal consistency.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//!
//! - **`clock`**: Vector clocks and their partial order, the basis of every causal check.
//! - **`hash`**: Key ownership. Maps keys to shards over a versioned membership view,
//!   by modulo or consistent hashing.
//! - **`store`**: The in-memory, causally blocking store. Client operations wait until the
//!   node has seen everything the client has; replicated entries are delivered in order.
//! - **`gossip`**: Anti-entropy between the replicas of a shard. Pushes local commits to
//!   peers and imports theirs.
//! - **`routing`**: The HTTP surface. Validates client requests, forwards them to the owning
//!   shard and handles view changes.
//! - **`transport`**: Shared helpers for node-to-node HTTP.
//! - **`config`**: Command-line and environment configuration, logging setup.

pub mod clock;
pub mod config;
pub mod gossip;
pub mod hash;
pub mod routing;
pub mod store;
pub mod transport;
