//! Causal Storage Module
//!
//! Implements the in-memory, vector-clock versioned key-value store that backs every node.
//!
//! ## Core Concepts
//! - **Causal wait**: every client operation carries the client's clock and blocks until the
//!   local clock, restricted to the shard's replicas, has caught up with it.
//! - **Commit**: a local write or delete bumps the node's own counter, stamps the entry with
//!   a snapshot of the clock and wakes every waiter.
//! - **Tombstones**: deletes keep the key with `deleted = true` so later merges can still
//!   reason about it.
//! - **Journal**: each client commit is pushed on a bounded channel that the gossip layer
//!   drains. Gossip imports go through `import_entry` and are not journaled.

pub mod memory;
pub mod types;

pub use memory::{CausalStore, Journal};
pub use types::{
    Abandoned, DeleteOutcome, Entry, KeyCount, ReadOutcome, StoreConfig, StoreError, WriteOutcome,
};

#[cfg(test)]
mod tests;
