//! Causal Store Tests
//!
//! ## Test Scopes
//! - **Local operations**: write/read/delete/num_keys semantics, tombstones, returned clocks.
//! - **Causal blocking**: operations from the future wait and are released by commits,
//!   deadlines and shutdown.
//! - **Imports**: per-origin delivery order, duplicate suppression, no journal emission.
//! - **Journal**: every client commit is emitted once, with an independent clock copy.

#[cfg(test)]
mod tests {
    use crate::clock::VectorClock;
    use crate::store::{Abandoned, CausalStore, Entry, Journal, StoreConfig, StoreError};
    use std::sync::Arc;
    use std::time::Duration;

    const SELF: &str = "10.0.0.2:8080";
    const PEER: &str = "10.0.0.3:8080";

    fn replicas() -> Vec<String> {
        vec![SELF.to_string(), PEER.to_string()]
    }

    fn new_store() -> (Arc<CausalStore>, Journal) {
        CausalStore::new(SELF, replicas(), StoreConfig::default())
    }

    fn vc(entries: &[(&str, u64)]) -> VectorClock {
        entries.iter().map(|(node, count)| (*node, *count)).collect()
    }

    fn remote(key: &str, value: &str, clock: VectorClock) -> Entry {
        Entry {
            clock,
            ..Entry::live(key, value)
        }
    }

    // ============================================================
    // LOCAL OPERATIONS
    // ============================================================

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let (store, _journal) = new_store();

        let written = store.write(&VectorClock::new(), "a", "1").await.unwrap();
        assert!(!written.replaced);
        assert_eq!(written.clock.get(SELF), 1);

        let read = tokio::time::timeout(Duration::from_secs(1), store.read(&written.clock, "a"))
            .await
            .expect("read with the write's clock must not block")
            .unwrap();

        let entry = read.entry.expect("key should exist");
        assert_eq!(entry.value, "1");
        assert_eq!(entry.clock, written.clock);
    }

    #[tokio::test]
    async fn test_overwrite_reports_replaced() {
        let (store, _journal) = new_store();

        let first = store.write(&VectorClock::new(), "a", "1").await.unwrap();
        let second = store.write(&first.clock, "a", "2").await.unwrap();

        assert!(second.replaced);
        assert_eq!(second.clock.get(SELF), 2);
        let read = store.read(&second.clock, "a").await.unwrap();
        assert_eq!(read.entry.unwrap().value, "2");
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_a_noop() {
        let (store, _journal) = new_store();

        let first = store.delete(&VectorClock::new(), "ghost").await.unwrap();
        let second = store.delete(&first.clock, "ghost").await.unwrap();

        assert!(!first.deleted);
        assert!(!second.deleted);
        assert_eq!(store.clock().await, VectorClock::new());
        assert!(store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_leaves_tombstone() {
        let (store, _journal) = new_store();

        let written = store.write(&VectorClock::new(), "a", "1").await.unwrap();
        let deleted = store.delete(&written.clock, "a").await.unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.clock.get(SELF), 2);

        let read = store.read(&deleted.clock, "a").await.unwrap();
        assert!(read.entry.is_none());

        // Second delete sees the tombstone and does nothing.
        let again = store.delete(&deleted.clock, "a").await.unwrap();
        assert!(!again.deleted);

        let entries = store.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].deleted);

        // Writing over a tombstone is not a replacement.
        let rewritten = store.write(&again.clock, "a", "3").await.unwrap();
        assert!(!rewritten.replaced);
    }

    #[tokio::test]
    async fn test_num_keys_skips_tombstones() {
        let (store, _journal) = new_store();

        let mut clock = VectorClock::new();
        for key in ["a", "b", "c"] {
            clock = store.write(&clock, key, "v").await.unwrap().clock;
        }
        clock = store.delete(&clock, "b").await.unwrap().clock;

        let count = store.num_keys(&clock).await.unwrap();
        assert_eq!(count.count, 2);
    }

    #[tokio::test]
    async fn test_read_keeps_foreign_context() {
        let (store, _journal) = new_store();

        // Counters of other shards pass through untouched.
        let client = vc(&[("10.0.9.9:8080", 7)]);
        let read = store.read(&client, "a").await.unwrap();

        assert!(read.entry.is_none());
        assert_eq!(read.clock.get("10.0.9.9:8080"), 7);
        assert_eq!(store.clock().await.get("10.0.9.9:8080"), 0);
    }

    // ============================================================
    // CAUSAL BLOCKING
    // ============================================================

    #[tokio::test]
    async fn test_read_from_future_blocks_until_write() {
        let (store, _journal) = new_store();
        let future_clock = vc(&[(SELF, 1)]);

        let reader = {
            let store = store.clone();
            let future_clock = future_clock.clone();
            tokio::spawn(async move { store.read(&future_clock, "a").await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished(), "read from the future must block");

        store.write(&VectorClock::new(), "a", "1").await.unwrap();

        let read = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("write should release the blocked read")
            .unwrap()
            .unwrap();
        assert_eq!(read.entry.unwrap().value, "1");
    }

    #[tokio::test]
    async fn test_import_releases_waiting_write() {
        let (store, _journal) = new_store();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.write(&vc(&[(PEER, 1)]), "b", "after").await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished());

        let applied = store
            .import_entry(remote("a", "before", vc(&[(PEER, 1)])))
            .await
            .unwrap();
        assert!(applied);

        let outcome = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome.clock, vc(&[(SELF, 1), (PEER, 1)]));
    }

    #[tokio::test]
    async fn test_concurrent_context_also_waits() {
        let (store, _journal) = new_store();
        store.write(&VectorClock::new(), "a", "1").await.unwrap();

        // {SELF:0, PEER:1} is concurrent with the local {SELF:1}; PEER:1 is still missing.
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            store.read(&vc(&[(PEER, 1)]), "a"),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_replica_counters_never_block() {
        let (store, _journal) = new_store();

        let client = vc(&[("10.0.0.99:8080", 42)]);
        let written = tokio::time::timeout(Duration::from_secs(1), store.write(&client, "a", "1"))
            .await
            .expect("counters of non-replicas must be ignored")
            .unwrap();
        assert_eq!(written.clock.get("10.0.0.99:8080"), 42);
    }

    #[tokio::test]
    async fn test_shrinking_replicas_releases_waiters() {
        let (store, _journal) = new_store();

        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.read(&vc(&[(PEER, 3)]), "a").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished());

        store.set_replicas(vec![SELF.to_string()]).await;

        let read = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(read.is_ok());
    }

    #[tokio::test]
    async fn test_bump_clock_releases_waiters() {
        let (store, _journal) = new_store();

        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.num_keys(&vc(&[(PEER, 1)])).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        store.bump_clock_for_node(PEER).await;

        let count = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(count.count, 0);
        assert_eq!(store.clock().await.get(PEER), 1);
    }

    #[tokio::test]
    async fn test_wait_timeout_abandons() {
        let config = StoreConfig {
            wait_timeout: Some(Duration::from_millis(30)),
            ..StoreConfig::default()
        };
        let (store, _journal) = CausalStore::new(SELF, replicas(), config);

        let err = store.read(&vc(&[(PEER, 1)]), "a").await.unwrap_err();
        assert_eq!(err, StoreError::CannotApply(Abandoned::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_shutdown_abandons_blocked_operations() {
        let (store, _journal) = new_store();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.write(&vc(&[(PEER, 5)]), "a", "1").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        store.shutdown();

        let err = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert_eq!(err, StoreError::CannotApply(Abandoned::Shutdown));
        assert!(err.to_string().contains("cannot apply operation"));
    }

    // ============================================================
    // IMPORTS
    // ============================================================

    #[tokio::test]
    async fn test_import_waits_for_predecessor() {
        let (store, _journal) = new_store();

        let second = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .import_entry(remote("a", "2", vc(&[(PEER, 2)])))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished(), "an import that skips ahead must wait");

        assert!(store.import_entry(remote("a", "1", vc(&[(PEER, 1)]))).await.unwrap());
        assert!(
            tokio::time::timeout(Duration::from_secs(1), second)
                .await
                .unwrap()
                .unwrap()
                .unwrap()
        );

        let read = store.read(&vc(&[(PEER, 2)]), "a").await.unwrap();
        assert_eq!(read.entry.unwrap().value, "2");
        assert_eq!(store.clock().await, vc(&[(PEER, 2)]));
    }

    #[tokio::test]
    async fn test_import_duplicate_is_ignored() {
        let (store, _journal) = new_store();
        let entry = remote("a", "1", vc(&[(PEER, 1)]));

        assert!(store.import_entry(entry.clone()).await.unwrap());
        assert!(!store.import_entry(entry).await.unwrap());
        assert_eq!(store.clock().await, vc(&[(PEER, 1)]));
    }

    #[tokio::test]
    async fn test_import_keeps_origin_stamp_and_skips_journal() {
        let (store, mut journal) = new_store();

        let entry = remote("a", "1", vc(&[(PEER, 1)]));
        store.import_entry(entry.clone()).await.unwrap();

        // No own counter bump and nothing journaled for a remote commit.
        assert_eq!(store.clock().await.get(SELF), 0);
        assert!(journal.try_recv().is_err());
        assert_eq!(store.entries().await, vec![entry]);
    }

    #[tokio::test]
    async fn test_import_until_deadline() {
        let (store, _journal) = new_store();

        let deadline = tokio::time::Instant::now() + Duration::from_millis(30);
        let err = store
            .import_entry_until(remote("a", "1", vc(&[(PEER, 3)])), Some(deadline))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::CannotApply(Abandoned::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_imported_tombstone_hides_key() {
        let (store, _journal) = new_store();

        store.import_entry(remote("a", "1", vc(&[(PEER, 1)]))).await.unwrap();
        let tombstone = Entry {
            clock: vc(&[(PEER, 2)]),
            ..Entry::tombstone("a")
        };
        store.import_entry(tombstone).await.unwrap();

        let count = store.num_keys(&VectorClock::new()).await.unwrap();
        assert_eq!(count.count, 0);
    }

    // ============================================================
    // JOURNAL
    // ============================================================

    #[tokio::test]
    async fn test_journal_receives_every_client_commit() {
        let (store, mut journal) = new_store();

        let written = store.write(&VectorClock::new(), "a", "1").await.unwrap();
        store.delete(&written.clock, "a").await.unwrap();
        store.delete(&written.clock, "missing").await.unwrap();

        let first = journal.recv().await.unwrap();
        assert_eq!(first.key, "a");
        assert!(!first.deleted);
        assert_eq!(first.clock, vc(&[(SELF, 1)]));

        let second = journal.recv().await.unwrap();
        assert!(second.deleted);
        assert_eq!(second.clock, vc(&[(SELF, 2)]));

        assert!(journal.try_recv().is_err(), "no-op delete must not be journaled");
    }

    #[tokio::test]
    async fn test_full_journal_holds_commits_back() {
        let config = StoreConfig {
            journal_capacity: 1,
            ..StoreConfig::default()
        };
        let (store, mut journal) = CausalStore::new(SELF, replicas(), config);

        store.write(&VectorClock::new(), "a", "1").await.unwrap();

        let blocked = {
            let store = store.clone();
            tokio::spawn(async move { store.write(&VectorClock::new(), "b", "2").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "a full journal applies backpressure");

        journal.recv().await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome.clock.get(SELF), 2);
    }
}
