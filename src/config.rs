//! Node configuration, read from command-line flags with environment fallbacks.
//!
//! Every flag maps to an upper-case environment variable (`ADDRESS`, `VIEW`, ...), so a
//! node can be started from a container environment without arguments.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::gossip::GossipConfig;
use crate::hash::{HashStrategy, parse_view};
use crate::routing::RoutingConfig;
use crate::store::StoreConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "causal-kv")]
#[command(about = "Sharded, causally consistent key-value store node")]
pub struct Config {
    /// Address other members reach this node at, e.g. 10.0.0.2:8080.
    #[arg(long, env = "ADDRESS")]
    pub address: String,

    /// Comma-separated addresses of every member, this node included.
    #[arg(long, env = "VIEW", default_value = "")]
    pub view: String,

    /// Members per shard.
    #[arg(long = "repl-factor", env = "REPL_FACTOR", default_value_t = 1)]
    pub replication_factor: usize,

    /// How keys are mapped to shards.
    #[arg(long, env = "HASH_STRATEGY", value_enum, default_value_t = HashStrategy::Modulo)]
    pub hash_strategy: HashStrategy,

    /// Local socket to listen on. Defaults to 0.0.0.0 on the port of `address`.
    #[arg(long, env = "BIND")]
    pub bind: Option<SocketAddr>,

    #[arg(long, env = "GOSSIP_INTERVAL_MS", default_value_t = 1000)]
    pub gossip_interval_ms: u64,

    /// How long a gossiped entry may wait for its causal predecessors.
    #[arg(long, env = "GOSSIP_IMPORT_TIMEOUT_MS", default_value_t = 2000)]
    pub gossip_import_timeout_ms: u64,

    /// Maximum entries sent to one peer per gossip round.
    #[arg(long, env = "GOSSIP_MAX_BATCH", default_value_t = 256)]
    pub gossip_max_batch: usize,

    /// Unacknowledged local commits kept for lagging peers before writes block.
    #[arg(long, env = "GOSSIP_OUTBOX_CAPACITY", default_value_t = 65_536)]
    pub gossip_outbox_capacity: usize,

    #[arg(long, env = "FORWARD_TIMEOUT_MS", default_value_t = 5000)]
    pub forward_timeout_ms: u64,

    /// Upper bound on a client operation's causal wait. 0 waits indefinitely.
    #[arg(long, env = "CAUSAL_WAIT_TIMEOUT_MS", default_value_t = 0)]
    pub causal_wait_timeout_ms: u64,

    /// Capacity of the commit journal feeding gossip.
    #[arg(long, env = "JOURNAL_CAPACITY", default_value_t = 1024)]
    pub journal_capacity: usize,
}

impl Config {
    pub fn members(&self) -> Vec<String> {
        parse_view(&self.view)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        if let Some(bind) = self.bind {
            return Ok(bind);
        }

        let port = self
            .address
            .rsplit(':')
            .next()
            .and_then(|port| port.parse::<u16>().ok())
            .with_context(|| format!("No port in address {:?}, set BIND", self.address))?;

        Ok(SocketAddr::from(([0, 0, 0, 0], port)))
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            wait_timeout: match self.causal_wait_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            journal_capacity: self.journal_capacity,
        }
    }

    pub fn gossip_config(&self) -> GossipConfig {
        let import_timeout = Duration::from_millis(self.gossip_import_timeout_ms);
        GossipConfig {
            interval: Duration::from_millis(self.gossip_interval_ms.max(1)),
            request_timeout: GossipConfig::request_timeout_for(import_timeout),
            import_timeout,
            max_batch: self.gossip_max_batch.max(1),
            outbox_capacity: self.gossip_outbox_capacity.max(1),
            ..GossipConfig::default()
        }
    }

    pub fn routing_config(&self) -> RoutingConfig {
        RoutingConfig {
            forward_timeout: Duration::from_millis(self.forward_timeout_ms),
            ..RoutingConfig::default()
        }
    }
}

/// Installs the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["causal-kv", "--address", "10.0.0.2:8080"]).unwrap();

        assert!(config.members().is_empty());
        assert_eq!(config.replication_factor, 1);
        assert_eq!(config.hash_strategy, HashStrategy::Modulo);
        assert_eq!(config.bind_addr().unwrap(), "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.store_config().wait_timeout, None);
        assert_eq!(config.store_config().journal_capacity, 1024);
        assert_eq!(config.gossip_config().interval, Duration::from_secs(1));
        assert_eq!(config.gossip_config().outbox_capacity, 65_536);
    }

    #[test]
    fn test_gossip_request_outlives_import_wait() {
        let config = Config::try_parse_from([
            "causal-kv",
            "--address",
            "10.0.0.2:8080",
            "--gossip-import-timeout-ms",
            "3000",
        ])
        .unwrap();

        let gossip = config.gossip_config();
        assert_eq!(gossip.import_timeout, Duration::from_secs(3));
        assert!(gossip.request_timeout > gossip.import_timeout * 2);

        let defaults = GossipConfig::default();
        assert!(defaults.request_timeout > defaults.import_timeout * 2);
    }

    #[test]
    fn test_explicit_flags() {
        let config = Config::try_parse_from([
            "causal-kv",
            "--address",
            "node-a:13800",
            "--view",
            "node-a:13800, node-b:13800",
            "--repl-factor",
            "2",
            "--hash-strategy",
            "ring",
            "--bind",
            "127.0.0.1:9000",
            "--causal-wait-timeout-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(config.members(), vec!["node-a:13800", "node-b:13800"]);
        assert_eq!(config.replication_factor, 2);
        assert_eq!(config.hash_strategy, HashStrategy::Ring);
        assert_eq!(config.bind_addr().unwrap(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(
            config.store_config().wait_timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_address_without_port_needs_bind() {
        let config = Config::try_parse_from(["causal-kv", "--address", "node-a"]).unwrap();
        assert!(config.bind_addr().is_err());
    }
}
