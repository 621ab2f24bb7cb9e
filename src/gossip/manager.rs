use anyhow::Result;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::protocol::{ENDPOINT_GOSSIP, GossipRequest, GossipResponse};
use crate::clock::VectorClock;
use crate::store::{CausalStore, Entry, Journal};
use crate::transport::{peer_url, put_json_with_retry};

#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Time between two relay rounds when no commit triggers one earlier.
    pub interval: Duration,
    /// Timeout of one gossip PUT.
    pub request_timeout: Duration,
    /// How long an incoming entry may wait for its causal predecessors.
    pub import_timeout: Duration,
    /// Maximum entries per peer per round.
    pub max_batch: usize,
    /// Transport attempts per PUT.
    pub attempts: usize,
    /// Unacknowledged commits kept for peers. Once full, the journal drain stops, and
    /// commits on this node block until a peer catches up or leaves the view.
    pub outbox_capacity: usize,
}

impl GossipConfig {
    /// Request timeout for a given import timeout. A receiver may spend the whole import
    /// timeout on one entry before answering, so the sender waits at least twice as long.
    pub fn request_timeout_for(import_timeout: Duration) -> Duration {
        import_timeout * 2 + Duration::from_secs(1)
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        let import_timeout = Duration::from_secs(2);
        Self {
            interval: Duration::from_millis(1000),
            request_timeout: Self::request_timeout_for(import_timeout),
            import_timeout,
            max_batch: 256,
            attempts: 2,
            outbox_capacity: 65_536,
        }
    }
}

pub struct GossipManager {
    store: Arc<CausalStore>,
    address: String,
    /// Local commits not yet acknowledged by every peer, in commit order.
    outbox: Mutex<Vec<Entry>>,
    /// Last clock each peer reported, i.e. what it is known to have applied.
    peer_clocks: DashMap<String, VectorClock>,
    trigger: Notify,
    /// Signalled whenever pruning frees outbox slots.
    outbox_space: Notify,
    http_client: reqwest::Client,
    config: GossipConfig,
}

impl GossipManager {
    pub fn new(store: Arc<CausalStore>, config: GossipConfig) -> Arc<Self> {
        Arc::new(Self {
            address: store.address().to_string(),
            store,
            outbox: Mutex::new(Vec::new()),
            peer_clocks: DashMap::new(),
            trigger: Notify::new(),
            outbox_space: Notify::new(),
            http_client: reqwest::Client::new(),
            config,
        })
    }

    /// Spawns the journal drain and the relay loop. Both stop when the store shuts down.
    pub fn start(self: &Arc<Self>, journal: Journal) -> (JoinHandle<()>, JoinHandle<()>) {
        tracing::info!(
            "Starting gossip for {} (interval {:?})",
            self.address,
            self.config.interval
        );

        let drain = self.spawn_journal_drain(journal);
        let relay = {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.run().await;
            })
        };

        (drain, relay)
    }

    /// Moves every journaled commit into the outbox and asks for an early relay round.
    pub fn spawn_journal_drain(self: &Arc<Self>, mut journal: Journal) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(entry) = journal.recv().await {
                manager.enqueue(entry).await;
            }
            tracing::debug!("Journal closed, drain task exiting");
        })
    }

    /// Appends a commit to the outbox, waiting for room when it is full.
    ///
    /// Gives up silently on shutdown.
    pub async fn enqueue(&self, entry: Entry) {
        let shutdown = self.store.shutdown_token();
        let mut warned = false;

        loop {
            let space = self.outbox_space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut outbox = self.outbox.lock().await;
                if outbox.len() < self.config.outbox_capacity.max(1) {
                    outbox.push(entry);
                    break;
                }
            }

            if !warned {
                tracing::warn!(
                    "Gossip outbox full ({} entries), waiting for peers to catch up",
                    self.config.outbox_capacity
                );
                warned = true;
            }
            // Peers only acknowledge over gossip, so keep relaying while we wait.
            self.trigger.notify_one();

            tokio::select! {
                _ = &mut space => {}
                _ = shutdown.cancelled() => return,
            }
        }

        self.trigger.notify_one();
    }

    async fn run(self: Arc<Self>) {
        let shutdown = self.store.shutdown_token();
        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.trigger.notified() => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Gossip loop for {} stopped", self.address);
                    return;
                }
            }

            let delivered = self.relay_gossip().await;
            if delivered > 0 {
                tracing::trace!("Gossip round reached {} peer(s)", delivered);
            }
        }
    }

    /// Peers of this node's shard.
    pub async fn peers(&self) -> Vec<String> {
        self.store
            .replicas()
            .await
            .into_iter()
            .filter(|replica| replica != &self.address)
            .collect()
    }

    /// Commits each peer has not acknowledged yet, oldest first.
    pub async fn find_gossip(&self) -> HashMap<String, Vec<Entry>> {
        let peers = self.peers().await;
        let outbox = self.outbox.lock().await;

        let mut batches = HashMap::new();
        for peer in peers {
            let known = self.known_counter(&peer);
            let pending: Vec<Entry> = outbox
                .iter()
                .filter(|entry| entry.clock.get(&self.address) > known)
                .take(self.config.max_batch)
                .cloned()
                .collect();

            if !pending.is_empty() {
                tracing::debug!(
                    "{} entr(ies) pending for {} (acknowledged up to {})",
                    pending.len(),
                    peer,
                    known
                );
                batches.insert(peer, pending);
            }
        }

        batches
    }

    /// Sends every pending batch. Returns the number of peers that answered.
    pub async fn relay_gossip(&self) -> usize {
        let batches = self.find_gossip().await;
        if batches.is_empty() {
            // Nothing pending may still mean unpruned entries, e.g. when the shard has no peers.
            self.prune_outbox().await;
            return 0;
        }

        let clock = self.store.replica_clock().await;
        let mut delivered = 0;

        for (peer, entries) in batches {
            let request = GossipRequest {
                sender: self.address.clone(),
                clock: clock.clone(),
                entries,
            };

            match self.send_gossip(&peer, &request).await {
                Ok(response) => {
                    tracing::debug!(
                        "Gossip to {}: {} of {} applied, peer now at {}",
                        peer,
                        response.applied,
                        request.entries.len(),
                        response.clock
                    );
                    self.record_peer_clock(&peer, &response.clock);
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to deliver gossip to {}: {}", peer, e);
                }
            }
        }

        self.prune_outbox().await;
        delivered
    }

    async fn send_gossip(&self, peer: &str, request: &GossipRequest) -> Result<GossipResponse> {
        let response = put_json_with_retry(
            &self.http_client,
            &peer_url(peer, ENDPOINT_GOSSIP),
            request,
            self.config.request_timeout,
            self.config.attempts,
        )
        .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Gossip rejected: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    /// Imports a batch from a peer, in causal order, stopping at the first entry whose
    /// predecessors do not arrive within the import timeout.
    pub async fn receive(&self, request: GossipRequest) -> GossipResponse {
        self.record_peer_clock(&request.sender, &request.clock);

        let mut entries = request.entries;
        entries.sort_by_key(|entry| entry.clock.sum());
        let total = entries.len();

        let mut applied = 0;
        for entry in entries {
            let deadline = Instant::now() + self.config.import_timeout;
            match self.store.import_entry_until(entry, Some(deadline)).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "Stopped importing gossip from {} after {} of {}: {}",
                        request.sender,
                        applied,
                        total,
                        e
                    );
                    break;
                }
            }
        }

        if applied > 0 {
            tracing::debug!("Imported {} entr(ies) from {}", applied, request.sender);
        }

        self.prune_outbox().await;

        GossipResponse {
            clock: self.store.replica_clock().await,
            applied,
        }
    }

    pub fn record_peer_clock(&self, peer: &str, clock: &VectorClock) {
        self.peer_clocks
            .entry(peer.to_string())
            .or_default()
            .max(clock);
    }

    pub fn peer_clock(&self, peer: &str) -> Option<VectorClock> {
        self.peer_clocks.get(peer).map(|clock| clock.clone())
    }

    pub async fn outbox_len(&self) -> usize {
        self.outbox.lock().await.len()
    }

    fn known_counter(&self, peer: &str) -> u64 {
        self.peer_clocks
            .get(peer)
            .map(|clock| clock.get(&self.address))
            .unwrap_or(0)
    }

    /// Drops commits every current peer has acknowledged.
    async fn prune_outbox(&self) {
        let peers = self.peers().await;
        let acknowledged = peers
            .iter()
            .map(|peer| self.known_counter(peer))
            .min()
            .unwrap_or(u64::MAX);

        let mut outbox = self.outbox.lock().await;
        let before = outbox.len();
        outbox.retain(|entry| entry.clock.get(&self.address) > acknowledged);
        if outbox.len() < before {
            tracing::trace!("Pruned {} acknowledged entr(ies)", before - outbox.len());
            self.outbox_space.notify_waiters();
        }
    }
}
