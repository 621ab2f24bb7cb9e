use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::clock::VectorClock;

/// One versioned record.
///
/// Entries are immutable once stamped; a later write to the same key replaces the map
/// slot with a new entry carrying a newer clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub clock: VectorClock,
}

impl Entry {
    pub fn live(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            deleted: false,
            clock: VectorClock::new(),
        }
    }

    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            deleted: true,
            clock: VectorClock::new(),
        }
    }
}

/// Why a causal wait gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Abandoned {
    #[error("deadline exceeded while waiting for causal dependencies")]
    DeadlineExceeded,
    #[error("store is shutting down")]
    Shutdown,
}

/// The only failure the store raises: a causal wait was abandoned before the operation
/// could be applied. Callers should treat it as retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("cannot apply operation: {0}")]
    CannotApply(#[from] Abandoned),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// A live value existed before this write.
    pub replaced: bool,
    pub clock: VectorClock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: bool,
    pub clock: VectorClock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// `None` for missing and tombstoned keys.
    pub entry: Option<Entry>,
    pub clock: VectorClock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCount {
    pub count: usize,
    pub clock: VectorClock,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound for client operations blocked on their causal context.
    /// `None` waits until the context is satisfied or the store shuts down.
    pub wait_timeout: Option<Duration>,
    /// Capacity of the journal channel. A full journal holds commits back.
    pub journal_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            wait_timeout: None,
            journal_capacity: 1024,
        }
    }
}
