//! Error types for the block producer engine

use thiserror::Error;

/// Result type for block-producer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Block producer errors
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying chain-core error (store, replay, tx application, ...)
    #[error(transparent)]
    Chain(#[from] chain_core::Error),

    /// `check_block`: stated parent does not match local head
    #[error("block parent hash does not match current head")]
    ParentNotMatch,

    /// `check_block`: merkle root over the block's transactions is wrong
    #[error("invalid merkle root")]
    InvalidMerkleRoot,

    /// `check_block`: recomputed block hash does not match the header's
    #[error("invalid block hash")]
    InvalidHash,

    /// A requested block does not exist locally or on any peer
    #[error("no such block at height {0}")]
    NoSuchBlock(u64),

    /// A billing request's signatures failed to verify
    #[error("billing request signature invalid")]
    TxSignatureInvalid,

    /// RPC to a peer failed
    #[error("peer {peer} rpc failed: {reason}")]
    PeerRpc {
        /// peer node id
        peer: String,
        /// failure reason
        reason: String,
    },

    /// The engine's worker mailbox is closed (engine shutting down)
    #[error("engine mailbox closed")]
    MailboxClosed,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
