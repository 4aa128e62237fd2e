//! Configuration loading for the durable store: `Config::from_file`/`from_env`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the durable `redb` file lives on disk (the `data_file`
/// configuration key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the `redb` database file. Created on first open if missing.
    pub data_file: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("chain.redb"),
        }
    }
}

impl StoreConfig {
    /// Load store configuration from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(format!("failed to read config file: {e}")))?;
        let config: StoreConfig = toml::from_str(&content)
            .map_err(|e| crate::error::Error::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Load store configuration from the environment (`CHAIN_CORE_DATA_FILE`),
    /// falling back to the default path if unset.
    pub fn from_env() -> Result<Self> {
        let mut config = StoreConfig::default();
        if let Ok(data_file) = std::env::var("CHAIN_CORE_DATA_FILE") {
            config.data_file = PathBuf::from(data_file);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_with_no_vars_uses_default() {
        std::env::remove_var("CHAIN_CORE_DATA_FILE");
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.data_file, PathBuf::from("chain.redb"));
    }

    #[test]
    fn from_env_honors_override() {
        std::env::set_var("CHAIN_CORE_DATA_FILE", "/tmp/custom.redb");
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.data_file, PathBuf::from("/tmp/custom.redb"));
        std::env::remove_var("CHAIN_CORE_DATA_FILE");
    }

    #[test]
    fn from_file_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(&path, "data_file = \"/var/lib/chain/chain.redb\"\n").unwrap();
        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.data_file, PathBuf::from("/var/lib/chain/chain.redb"));
    }
}
