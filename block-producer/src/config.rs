//! Configuration for the block producer engine: `Config::from_file`/`from_env`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Block producer engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// This node's id (used to exclude self from gossip/fetch fan-out)
    pub node_id: String,

    /// Path to the durable KV store
    pub data_file: PathBuf,

    /// Genesis time, seconds since epoch
    pub genesis_time: i64,

    /// Slot duration, seconds
    pub period_secs: u64,

    /// Main-cycle poll interval, seconds
    pub tick_secs: u64,

    /// Number of block producers in the rotation
    pub bp_num: u64,

    /// This node's index in `[0, bp_num)`
    pub index: u64,

    /// Fee multiplier applied to billing gas amounts
    pub gas_price: u64,

    /// Peer configuration
    pub peers: PeerConfig,
}

/// Peer list for gossip (`AdviseNewBlock`) and sync (`FetchBlock`) fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer node ids, in the fixed order `sync_head` iterates them
    pub node_ids: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_id: "bp-0".to_string(),
            data_file: PathBuf::from("./data/chain.redb"),
            genesis_time: 0,
            period_secs: 10,
            tick_secs: 1,
            bp_num: 1,
            index: 0,
            gas_price: 1,
            peers: PeerConfig { node_ids: vec![] },
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(format!("failed to read config file: {e}")))?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| crate::error::Error::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Load from environment variables, overriding the default.
    pub fn from_env() -> crate::error::Result<Self> {
        let mut config = EngineConfig::default();

        if let Ok(node_id) = std::env::var("BP_NODE_ID") {
            config.node_id = node_id;
        }
        if let Ok(data_file) = std::env::var("BP_DATA_FILE") {
            config.data_file = PathBuf::from(data_file);
        }
        if let Ok(genesis_time) = std::env::var("BP_GENESIS_TIME") {
            config.genesis_time = genesis_time
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("invalid BP_GENESIS_TIME: {e}")))?;
        }
        if let Ok(period) = std::env::var("BP_PERIOD_SECS") {
            config.period_secs = period
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("invalid BP_PERIOD_SECS: {e}")))?;
        }
        if let Ok(tick) = std::env::var("BP_TICK_SECS") {
            config.tick_secs = tick
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("invalid BP_TICK_SECS: {e}")))?;
        }
        if let Ok(bp_num) = std::env::var("BP_NUM") {
            config.bp_num = bp_num
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("invalid BP_NUM: {e}")))?;
        }
        if let Ok(index) = std::env::var("BP_INDEX") {
            config.index = index
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("invalid BP_INDEX: {e}")))?;
        }
        if let Ok(gas_price) = std::env::var("BP_GAS_PRICE") {
            config.gas_price = gas_price
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("invalid BP_GAS_PRICE: {e}")))?;
        }

        Ok(config)
    }
}
