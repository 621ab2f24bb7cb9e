use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, Notify, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::types::*;
use crate::clock::VectorClock;

/// Receiving half of the store journal: every client commit, in commit order.
pub type Journal = mpsc::Receiver<Entry>;

/// The causal key-value engine of one node.
///
/// A single async mutex guards the map, the clock and the replica list. Operations that
/// must wait for their causal context release the lock while parked on `clock_changed`
/// and re-check their predicate after every broadcast.
pub struct CausalStore {
    address: String,
    state: Mutex<StoreState>,
    clock_changed: Notify,
    journal: mpsc::Sender<Entry>,
    shutdown: CancellationToken,
    wait_timeout: Option<Duration>,
}

struct StoreState {
    /// Members whose counters take part in causal checks. Empty means all counters do.
    replicas: Vec<String>,
    entries: HashMap<String, Entry>,
    clock: VectorClock,
}

#[derive(Debug, PartialEq, Eq)]
enum Admission {
    /// Already covered by the local clock.
    Stale,
    /// The next update expected from its origin.
    Deliverable,
    /// Depends on updates that have not arrived yet.
    Pending,
}

impl StoreState {
    fn scoped(&self, clock: &VectorClock) -> VectorClock {
        if self.replicas.is_empty() {
            clock.clone()
        } else {
            clock.subset(&self.replicas)
        }
    }

    fn is_current(&self, incoming: &VectorClock) -> bool {
        self.scoped(incoming).is_covered_by(&self.scoped(&self.clock))
    }

    fn admission(&self, address: &str, incoming: &VectorClock) -> Admission {
        let incoming = self.scoped(incoming);
        let local = self.scoped(&self.clock);

        if incoming.is_covered_by(&local) {
            Admission::Stale
        } else if local.one_up_except(address, &incoming) {
            Admission::Deliverable
        } else {
            Admission::Pending
        }
    }
}

impl CausalStore {
    /// Creates an empty store living at `address` and the journal its commits feed.
    pub fn new(
        address: impl Into<String>,
        replicas: Vec<String>,
        config: StoreConfig,
    ) -> (Arc<Self>, Journal) {
        let (journal_tx, journal_rx) = mpsc::channel(config.journal_capacity.max(1));

        let store = Arc::new(Self {
            address: address.into(),
            state: Mutex::new(StoreState {
                replicas,
                entries: HashMap::new(),
                clock: VectorClock::new(),
            }),
            clock_changed: Notify::new(),
            journal: journal_tx,
            shutdown: CancellationToken::new(),
            wait_timeout: config.wait_timeout,
        });

        (store, journal_rx)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Writes `key = value` once the store has caught up with `client`.
    pub async fn write(
        &self,
        client: &VectorClock,
        key: &str,
        value: &str,
    ) -> Result<WriteOutcome, StoreError> {
        let mut state = self.wait_until_current(client).await?;

        state.clock.max(client);
        let replaced = self.commit(&mut state, Entry::live(key, value)).await;

        Ok(WriteOutcome {
            replaced,
            clock: state.clock.clone(),
        })
    }

    /// Tombstones `key` if it holds a live value. Deleting a missing key changes nothing.
    pub async fn delete(&self, client: &VectorClock, key: &str) -> Result<DeleteOutcome, StoreError> {
        let mut state = self.wait_until_current(client).await?;

        let live = state.entries.get(key).is_some_and(|entry| !entry.deleted);
        if !live {
            return Ok(DeleteOutcome {
                deleted: false,
                clock: state.clock.merged(client),
            });
        }

        state.clock.max(client);
        let deleted = self.commit(&mut state, Entry::tombstone(key)).await;

        Ok(DeleteOutcome {
            deleted,
            clock: state.clock.clone(),
        })
    }

    pub async fn read(&self, client: &VectorClock, key: &str) -> Result<ReadOutcome, StoreError> {
        let state = self.wait_until_current(client).await?;

        let entry = state
            .entries
            .get(key)
            .filter(|entry| !entry.deleted)
            .cloned();

        Ok(ReadOutcome {
            entry,
            clock: state.clock.merged(client),
        })
    }

    /// Counts live keys.
    pub async fn num_keys(&self, client: &VectorClock) -> Result<KeyCount, StoreError> {
        let state = self.wait_until_current(client).await?;

        let count = state.entries.values().filter(|entry| !entry.deleted).count();

        Ok(KeyCount {
            count,
            clock: state.clock.merged(client),
        })
    }

    /// Applies an entry received from another replica, waiting without deadline until it
    /// is the next update expected from its origin.
    ///
    /// Returns `Ok(false)` for a duplicate that the local clock already covers.
    pub async fn import_entry(&self, entry: Entry) -> Result<bool, StoreError> {
        self.import_entry_until(entry, None).await
    }

    pub async fn import_entry_until(
        &self,
        entry: Entry,
        deadline: Option<Instant>,
    ) -> Result<bool, StoreError> {
        let mut state = self
            .lock_when(deadline, |state| {
                state.admission(&self.address, &entry.clock) != Admission::Pending
            })
            .await?;

        if state.admission(&self.address, &entry.clock) == Admission::Stale {
            tracing::trace!("Skipping stale import of {:?} at {}", entry.key, entry.clock);
            return Ok(false);
        }

        // The entry keeps the stamp of the node that committed it.
        state.clock.max(&entry.clock);
        self.clock_changed.notify_waiters();

        tracing::debug!(
            "Imported {} of {:?} at t={}",
            if entry.deleted { "delete" } else { "write" },
            entry.key,
            state.clock
        );
        state.entries.insert(entry.key.clone(), entry);

        Ok(true)
    }

    /// Replaces the replica list used to scope causal checks.
    pub async fn set_replicas(&self, replicas: Vec<String>) {
        let mut state = self.state.lock().await;
        tracing::info!("Store replicas set to {:?}", replicas);
        state.replicas = replicas;
        // A smaller replica set can release waiters blocked on departed nodes.
        self.clock_changed.notify_waiters();
    }

    /// Advances one counter from outside, e.g. once `node` is known to have processed
    /// an event, and wakes every waiter.
    pub async fn bump_clock_for_node(&self, node: &str) {
        let mut state = self.state.lock().await;
        state.clock.increment(node);
        self.clock_changed.notify_waiters();
    }

    pub async fn clock(&self) -> VectorClock {
        self.state.lock().await.clock.clone()
    }

    /// The local clock restricted to the current replicas.
    pub async fn replica_clock(&self) -> VectorClock {
        let state = self.state.lock().await;
        state.scoped(&state.clock)
    }

    pub async fn replicas(&self) -> Vec<String> {
        self.state.lock().await.replicas.clone()
    }

    /// Snapshot of every entry, tombstones included.
    pub async fn entries(&self) -> Vec<Entry> {
        self.state.lock().await.entries.values().cloned().collect()
    }

    /// Abandons every pending and future causal wait with `Abandoned::Shutdown`.
    pub fn shutdown(&self) {
        tracing::info!("Store at {} shutting down", self.address);
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn wait_until_current(
        &self,
        client: &VectorClock,
    ) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        let deadline = self.wait_timeout.map(|timeout| Instant::now() + timeout);
        self.lock_when(deadline, |state| state.is_current(client))
            .await
    }

    /// Locks the state once `ready` holds, re-checking after every clock change.
    async fn lock_when<F>(
        &self,
        deadline: Option<Instant>,
        ready: F,
    ) -> Result<MutexGuard<'_, StoreState>, StoreError>
    where
        F: Fn(&StoreState) -> bool,
    {
        loop {
            // Register before testing so a commit between the test and the await is not lost.
            let notified = self.clock_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let state = self.state.lock().await;
            if ready(&state) {
                return Ok(state);
            }
            drop(state);

            tokio::select! {
                _ = &mut notified => {}
                _ = self.shutdown.cancelled() => {
                    return Err(Abandoned::Shutdown.into());
                }
                _ = sleep_until(deadline) => {
                    return Err(Abandoned::DeadlineExceeded.into());
                }
            }
        }
    }

    /// Stamps and stores a client-originated entry. Must run with the state locked.
    async fn commit(&self, state: &mut StoreState, mut entry: Entry) -> bool {
        let replaced = state
            .entries
            .get(&entry.key)
            .is_some_and(|previous| !previous.deleted);

        state.clock.increment(&self.address);
        self.clock_changed.notify_waiters();

        entry.clock = state.clock.clone();
        if entry.deleted {
            tracing::debug!("Committed delete of {:?} at t={}", entry.key, state.clock);
        } else {
            tracing::debug!(
                "Committed {:?}={:?} at t={}",
                entry.key,
                entry.value,
                state.clock
            );
        }
        state.entries.insert(entry.key.clone(), entry.clone());

        // Sent under the lock so gossip never sees a commit ahead of its clock.
        if self.journal.send(entry).await.is_err() {
            tracing::warn!("Journal receiver is gone, commit will not be gossiped");
        }

        replaced
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
