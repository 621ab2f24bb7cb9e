use causal_kv::config::{Config, init_tracing};
use causal_kv::gossip::GossipManager;
use causal_kv::routing::{NodeState, router};
use causal_kv::store::CausalStore;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::parse();
    let bind_addr = config.bind_addr()?;
    let members = config.members();

    tracing::info!("Starting node {} on {}", config.address, bind_addr);
    if members.is_empty() {
        tracing::warn!("Empty view, every key is served locally until a view change");
    } else if !members.contains(&config.address) {
        tracing::warn!("{} is not part of view {:?}", config.address, members);
    }

    // 1. Key ownership:
    let hash = config
        .hash_strategy
        .build(members, config.replication_factor);

    // 2. Store, replicating with the members of this node's shard:
    let view = hash.view();
    let replicas = match view.shard_of(&config.address) {
        Some(shard) => view.shard_members(shard),
        None => vec![config.address.clone()],
    };
    tracing::info!(
        "{} shard(s) over {} member(s), replicas {:?}",
        view.shard_count(),
        view.members().len(),
        replicas
    );
    let (store, journal) = CausalStore::new(&config.address, replicas, config.store_config());

    // 3. Gossip:
    let gossip = GossipManager::new(store.clone(), config.gossip_config());
    let (drain_task, gossip_task) = gossip.start(journal);

    // 4. HTTP router:
    let node = NodeState::new(store.clone(), hash, gossip, config.routing_config());
    let app = router(node);

    // 5. Serve until Ctrl+C:
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let shutdown_store = store.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Shutting down, abandoning pending causal waits");
            shutdown_store.shutdown();
        })
        .await?;

    gossip_task.await?;
    drain_task.abort();
    tracing::info!("Node {} stopped", config.address);

    Ok(())
}
