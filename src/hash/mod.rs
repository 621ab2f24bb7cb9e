//! Key Ownership Module
//!
//! Maps keys to the members that own them, over a membership list that can change at
//! runtime (view changes).
//!
//! ## Core Concepts
//! - **Views**: membership is an immutable, version-stamped `MembershipView`. Updates build
//!   a new snapshot and swap a single reference, so `test_and_set` is a version check.
//! - **Shards**: the sorted member list is cut into `members / replication_factor` shards.
//!   All members of a shard replicate the same keys.
//! - **Strategies**: `Modulo` (hash modulo shard count) and `Ring` (consistent hashing with
//!   virtual points) both implement `ShardMap`. Both are pure functions of the view, so
//!   every node computes the same owner for a given snapshot.

pub mod modulo;
pub mod ring;
pub mod types;

pub use modulo::Modulo;
pub use ring::Ring;
pub use types::{HashError, HashStrategy, MembershipView, ShardMap, parse_view};
