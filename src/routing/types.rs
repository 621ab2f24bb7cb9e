use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::protocol::FORWARDED_HEADER;
use crate::gossip::GossipManager;
use crate::hash::{MembershipView, ShardMap};
use crate::store::CausalStore;

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Timeout of one proxied client request.
    pub forward_timeout: Duration,
    /// Timeout of one view-change PUT to another member.
    pub fanout_timeout: Duration,
    /// Transport attempts per view-change PUT.
    pub fanout_attempts: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            forward_timeout: Duration::from_secs(5),
            fanout_timeout: Duration::from_secs(5),
            fanout_attempts: 3,
        }
    }
}

/// Everything a request handler needs, shared through an axum `Extension`.
pub struct NodeState {
    pub address: String,
    pub store: Arc<CausalStore>,
    pub hash: Arc<dyn ShardMap>,
    pub gossip: Arc<GossipManager>,
    pub http_client: reqwest::Client,
    pub config: RoutingConfig,
    /// Held while a view change swaps the hash and rescopes the store.
    pub view_change: Mutex<()>,
}

impl NodeState {
    pub fn new(
        store: Arc<CausalStore>,
        hash: Arc<dyn ShardMap>,
        gossip: Arc<GossipManager>,
        config: RoutingConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            address: store.address().to_string(),
            store,
            hash,
            gossip,
            http_client: reqwest::Client::new(),
            config,
            view_change: Mutex::new(()),
        })
    }

    /// Members to proxy a request for `key` to, owner first, or `None` when this node
    /// serves it itself.
    ///
    /// A node serves a key when it belongs to the owner's shard, when ownership cannot be
    /// computed (no members) and when the request was already forwarded once.
    pub fn forward_targets(&self, key: &str, headers: &HeaderMap) -> Option<Vec<String>> {
        if headers.contains_key(FORWARDED_HEADER) {
            return None;
        }

        let owner = match self.hash.get(key) {
            Ok(owner) => owner,
            Err(e) => {
                tracing::debug!("No owner for key {:?} ({}), serving locally", key, e);
                return None;
            }
        };

        if owner == self.address {
            return None;
        }

        let view = self.hash.view();
        let owner_shard = view.shard_of(&owner);
        if owner_shard.is_some() && owner_shard == view.shard_of(&self.address) {
            return None;
        }

        let mut targets = vec![owner.clone()];
        if let Some(shard) = owner_shard {
            targets.extend(
                view.shard_members(shard)
                    .into_iter()
                    .filter(|member| member != &owner),
            );
        }

        tracing::debug!("Key {:?} is served by {:?}", key, targets);
        Some(targets)
    }

    /// Replicas of this node's shard under the current view.
    pub fn own_shard_members(&self) -> Vec<String> {
        self.shard_members_in(&self.hash.view())
    }

    /// Replicas of this node's shard under `view`. A node outside the view replicates
    /// with nobody.
    pub fn shard_members_in(&self, view: &MembershipView) -> Vec<String> {
        match view.shard_of(&self.address) {
            Some(shard) => view.shard_members(shard),
            None => vec![self.address.clone()],
        }
    }
}
