//! Configuration for the DB allocation service: `Config::from_file`/`from_env`.

use serde::{Deserialize, Serialize};

/// Allocation service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Max rounds `allocate_nodes` widens its candidate range before
    /// giving up with `DB_ALLOCATION`
    pub allocation_rounds: u32,
    /// Proof-of-work difficulty: number of leading zero bits the mined
    /// `database_id` hash must have
    pub pow_difficulty_bits: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            allocation_rounds: 5,
            pow_difficulty_bits: 8,
        }
    }
}

impl AllocatorConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(format!("failed to read config file: {e}")))?;
        let config: AllocatorConfig = toml::from_str(&content)
            .map_err(|e| crate::error::Error::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Load from environment variables, overriding the default.
    pub fn from_env() -> crate::error::Result<Self> {
        let mut config = AllocatorConfig::default();

        if let Ok(rounds) = std::env::var("ALLOCATOR_ALLOCATION_ROUNDS") {
            config.allocation_rounds = rounds
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("invalid ALLOCATOR_ALLOCATION_ROUNDS: {e}")))?;
        }
        if let Ok(bits) = std::env::var("ALLOCATOR_POW_DIFFICULTY_BITS") {
            config.pow_difficulty_bits = bits
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("invalid ALLOCATOR_POW_DIFFICULTY_BITS: {e}")))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_with_no_vars_is_default() {
        std::env::remove_var("ALLOCATOR_ALLOCATION_ROUNDS");
        std::env::remove_var("ALLOCATOR_POW_DIFFICULTY_BITS");
        let config = AllocatorConfig::from_env().unwrap();
        assert_eq!(config.allocation_rounds, 5);
        assert_eq!(config.pow_difficulty_bits, 8);
    }
}
