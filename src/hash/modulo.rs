use parking_lot::RwLock;
use std::sync::Arc;

use super::types::{HashError, MembershipView, ShardMap, hash_key};

/// Hash-modulo placement: `xxh64(key) % shard_count` picks the shard, the shard's
/// first member is the owner.
pub struct Modulo {
    view: RwLock<Arc<MembershipView>>,
}

impl Modulo {
    pub fn new(members: Vec<String>, replication_factor: usize) -> Self {
        Self {
            view: RwLock::new(Arc::new(MembershipView::new(
                0,
                members,
                replication_factor,
            ))),
        }
    }
}

impl ShardMap for Modulo {
    fn get(&self, key: &str) -> Result<String, HashError> {
        let view = self.view();
        if view.is_empty() {
            return Err(HashError::NoMembers(key.to_string()));
        }

        let shard = (hash_key(key) % view.shard_count() as u64) as usize;
        view.shard_members(shard)
            .into_iter()
            .next()
            .ok_or_else(|| HashError::NoMembers(key.to_string()))
    }

    fn view(&self) -> Arc<MembershipView> {
        self.view.read().clone()
    }

    fn set(&self, members: Vec<String>, replication_factor: usize) {
        let mut view = self.view.write();
        let next = view.next(members, replication_factor);
        tracing::info!(
            "Membership set to {:?} (version {}, {} shard(s))",
            next.members(),
            next.version(),
            next.shard_count()
        );
        *view = Arc::new(next);
    }

    fn test_and_set(
        &self,
        expected_version: u64,
        members: Vec<String>,
        replication_factor: usize,
    ) -> bool {
        let mut view = self.view.write();
        if view.version() != expected_version {
            tracing::debug!(
                "Membership swap rejected: expected version {}, found {}",
                expected_version,
                view.version()
            );
            return false;
        }
        *view = Arc::new(view.next(members, replication_factor));
        true
    }
}
