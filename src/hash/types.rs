use std::sync::Arc;
use thiserror::Error;

use super::{Modulo, Ring};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("membership is empty, no owner for key {0:?}")]
    NoMembers(String),
}

/// Which `ShardMap` implementation a node runs with.
///
/// Every node of a cluster must use the same strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum HashStrategy {
    #[default]
    Modulo,
    Ring,
}

impl HashStrategy {
    pub fn build(self, members: Vec<String>, replication_factor: usize) -> Arc<dyn ShardMap> {
        match self {
            HashStrategy::Modulo => Arc::new(Modulo::new(members, replication_factor)),
            HashStrategy::Ring => Arc::new(Ring::new(members, replication_factor)),
        }
    }
}

/// An immutable membership snapshot.
///
/// Members are kept sorted and deduplicated so that every node derives the same shard
/// layout from the same list, whatever order it was given in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipView {
    version: u64,
    members: Vec<String>,
    replication_factor: usize,
}

impl MembershipView {
    pub fn new(version: u64, members: Vec<String>, replication_factor: usize) -> Self {
        let mut members: Vec<String> = members
            .into_iter()
            .map(|member| member.trim().to_string())
            .filter(|member| !member.is_empty())
            .collect();
        members.sort();
        members.dedup();

        Self {
            version,
            members,
            replication_factor: replication_factor.max(1),
        }
    }

    /// The view that follows this one.
    pub fn next(&self, members: Vec<String>, replication_factor: usize) -> Self {
        Self::new(self.version + 1, members, replication_factor)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.index_of(member).is_some()
    }

    /// Zero for an empty view, otherwise at least one.
    pub fn shard_count(&self) -> usize {
        if self.members.is_empty() {
            0
        } else {
            (self.members.len() / self.replication_factor).max(1)
        }
    }

    /// Members beyond the last full shard join the last shard.
    pub fn shard_of(&self, member: &str) -> Option<usize> {
        let index = self.index_of(member)?;
        Some((index / self.replication_factor).min(self.shard_count() - 1))
    }

    pub fn shard_members(&self, shard: usize) -> Vec<String> {
        self.members
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                (index / self.replication_factor).min(self.shard_count() - 1) == shard
            })
            .map(|(_, member)| member.clone())
            .collect()
    }

    fn index_of(&self, member: &str) -> Option<usize> {
        self.members
            .binary_search_by(|candidate| candidate.as_str().cmp(member))
            .ok()
    }
}

/// Maps keys to owning members over a replaceable membership view.
pub trait ShardMap: Send + Sync {
    /// Owner of `key`. Fails only when the view has no members.
    fn get(&self, key: &str) -> Result<String, HashError>;

    /// Current snapshot.
    fn view(&self) -> Arc<MembershipView>;

    /// Replaces the membership unconditionally.
    fn set(&self, members: Vec<String>, replication_factor: usize);

    /// Replaces the membership only if the current view still has `expected_version`.
    /// Returns whether the swap happened; on `false` re-read the view and retry.
    fn test_and_set(
        &self,
        expected_version: u64,
        members: Vec<String>,
        replication_factor: usize,
    ) -> bool;

    fn members(&self) -> Vec<String> {
        self.view().members().to_vec()
    }

    fn shard_members(&self, shard: usize) -> Vec<String> {
        self.view().shard_members(shard)
    }

    fn shard_of(&self, member: &str) -> Option<usize> {
        self.view().shard_of(member)
    }

    fn shard_count(&self) -> usize {
        self.view().shard_count()
    }
}

/// Splits a comma separated view (`"10.0.0.2:8080,10.0.0.3:8080"`).
pub fn parse_view(view: &str) -> Vec<String> {
    view.split(',')
        .map(str::trim)
        .filter(|member| !member.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn hash_key(key: &str) -> u64 {
    xxhash_rust::xxh64::xxh64(key.as_bytes(), 0)
}
