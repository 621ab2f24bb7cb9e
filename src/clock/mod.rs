//! Logical Time Module
//!
//! Vector clocks are the only notion of time the store understands. Every node keeps one
//! clock for its whole lifetime and stamps a snapshot of it on each committed entry.
//!
//! ## Core Concepts
//! - **Partial order**: two clocks are `Equal`, `Less`, `Greater` or `Concurrent`.
//!   Missing counters count as zero.
//! - **Subsetting**: comparisons are restricted to the current replica set so that
//!   departed nodes can never hold back progress.
//! - **Delivery test**: `one_up_except` admits exactly the next update from a sender,
//!   which gives per-sender FIFO delivery of gossip.

pub mod vector;

pub use vector::{Causality, VectorClock};
