//! Configuration loading for the shard router: `Config::from_file`/`from_env`.

use crate::error::Result;
use crate::types::RouterConfig;

impl RouterConfig {
    /// Load sharding configuration from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(format!("failed to read config file: {e}")))?;
        let config: RouterConfig = toml::from_str(&content)
            .map_err(|e| crate::error::Error::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Load sharding configuration from the environment.
    ///
    /// Only a single table's sharding config can be expressed via
    /// environment variables (`SHARD_ROUTER_TABLE`, `SHARD_ROUTER_COL`,
    /// `SHARD_ROUTER_INTERVAL_SECONDS`, `SHARD_ROUTER_START_TIME`); use
    /// [`RouterConfig::from_file`] for multi-table deployments.
    pub fn from_env() -> Result<Self> {
        let mut config = RouterConfig::default();

        if let Ok(table) = std::env::var("SHARD_ROUTER_TABLE") {
            let shard_col_name = std::env::var("SHARD_ROUTER_COL")
                .map_err(|_| crate::error::Error::Config("SHARD_ROUTER_COL not set".to_string()))?;
            let shard_interval_seconds = std::env::var("SHARD_ROUTER_INTERVAL_SECONDS")
                .map_err(|_| crate::error::Error::Config("SHARD_ROUTER_INTERVAL_SECONDS not set".to_string()))?
                .parse::<i64>()
                .map_err(|e| crate::error::Error::Config(format!("invalid interval: {e}")))?;
            let shard_start_time = std::env::var("SHARD_ROUTER_START_TIME")
                .unwrap_or_else(|_| "0".to_string())
                .parse::<i64>()
                .map_err(|e| crate::error::Error::Config(format!("invalid start time: {e}")))?;

            config.tables.insert(
                table,
                crate::types::ShardingConf {
                    shard_col_name,
                    shard_interval_seconds,
                    shard_start_time,
                },
            );
        }

        Ok(config)
    }
}
