//! Error types for the DB allocation service (C11)

use thiserror::Error;

/// Result type for node-allocator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Node allocator errors
#[derive(Error, Debug)]
pub enum Error {
    /// `allocate_nodes` exhausted `allocation_rounds` without finding enough
    /// acceptable candidates
    #[error("failed to allocate {needed} node(s) for resource request after exhausting allocation rounds")]
    DbAllocation {
        /// number of nodes the request asked for
        needed: u32,
    },

    /// The requested sqlchain database is not registered in the `ServiceMap`
    #[error("no such database: {0:?}")]
    NoSuchDatabase(String),

    /// An RPC to a miner node failed
    #[error("node {node} rpc failed: {reason}")]
    PeerRpc {
        /// target node id
        node: String,
        /// failure reason
        reason: String,
    },

    /// A signed directive's signature failed to verify
    #[error("signature verification failed for directive from {0:?}")]
    SignatureInvalid(String),

    /// Underlying chain-core error (crypto, serialization)
    #[error(transparent)]
    Chain(#[from] chain_core::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
