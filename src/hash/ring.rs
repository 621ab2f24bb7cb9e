use parking_lot::RwLock;
use std::sync::Arc;

use super::types::{HashError, MembershipView, ShardMap, hash_key};

const VIRTUAL_POINTS: usize = 64;

/// Consistent-hash placement.
///
/// Each member owns `VIRTUAL_POINTS` points on a 64-bit ring; a key belongs to the first
/// point at or after its own hash, wrapping around. Adding or removing a member only
/// moves the keys adjacent to its points.
pub struct Ring {
    table: RwLock<Arc<RingTable>>,
}

struct RingTable {
    view: Arc<MembershipView>,
    /// `(point, index into view.members())`, sorted by point.
    points: Vec<(u64, usize)>,
}

impl RingTable {
    fn build(view: MembershipView) -> Self {
        let mut points: Vec<(u64, usize)> = view
            .members()
            .iter()
            .enumerate()
            .flat_map(|(index, member)| {
                (0..VIRTUAL_POINTS).map(move |i| (hash_key(&format!("{}#{}", member, i)), index))
            })
            .collect();
        points.sort_unstable();

        Self {
            view: Arc::new(view),
            points,
        }
    }

    fn owner(&self, key: &str) -> Option<&String> {
        if self.points.is_empty() {
            return None;
        }
        let hash = hash_key(key);
        let slot = self.points.partition_point(|(point, _)| *point < hash);
        let (_, index) = self.points[slot % self.points.len()];
        self.view.members().get(index)
    }
}

impl Ring {
    pub fn new(members: Vec<String>, replication_factor: usize) -> Self {
        Self {
            table: RwLock::new(Arc::new(RingTable::build(MembershipView::new(
                0,
                members,
                replication_factor,
            )))),
        }
    }
}

impl ShardMap for Ring {
    fn get(&self, key: &str) -> Result<String, HashError> {
        let table = self.table.read().clone();
        table
            .owner(key)
            .cloned()
            .ok_or_else(|| HashError::NoMembers(key.to_string()))
    }

    fn view(&self) -> Arc<MembershipView> {
        self.table.read().view.clone()
    }

    fn set(&self, members: Vec<String>, replication_factor: usize) {
        let mut table = self.table.write();
        let next = table.view.next(members, replication_factor);
        tracing::info!(
            "Ring rebuilt for {:?} (version {}, {} points)",
            next.members(),
            next.version(),
            next.members().len() * VIRTUAL_POINTS
        );
        *table = Arc::new(RingTable::build(next));
    }

    fn test_and_set(
        &self,
        expected_version: u64,
        members: Vec<String>,
        replication_factor: usize,
    ) -> bool {
        let mut table = self.table.write();
        if table.view.version() != expected_version {
            return false;
        }
        let next = table.view.next(members, replication_factor);
        *table = Arc::new(RingTable::build(next));
        true
    }
}
