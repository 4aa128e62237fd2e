//! Error types for the chain core

use thiserror::Error;

/// Result type for chain-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chain core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Durable store error (redb)
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// A non-genesis block's parent could not be resolved during replay
    #[error("parent not found for block at height {0}")]
    ParentNotFound(u64),

    /// `check_block`: the block's stated parent does not match the local head
    #[error("block parent hash does not match current head")]
    ParentNotMatch,

    /// `check_block`: merkle root over the block's transactions is wrong
    #[error("invalid merkle root")]
    InvalidMerkleRoot,

    /// `check_block`: recomputed block hash does not match the header's
    #[error("invalid block hash")]
    InvalidHash,

    /// Requested block does not exist
    #[error("no such block: {0}")]
    NoSuchBlock(String),

    /// Requested sqlchain database does not exist
    #[error("no such database: {0}")]
    NoSuchDatabase(String),

    /// A transaction's nonce does not match the account's expected next nonce
    #[error("tx nonce mismatch for account {account}: expected {expected}, got {got}")]
    TxNonceMismatch {
        /// account address (hex)
        account: String,
        /// expected next nonce
        expected: u64,
        /// nonce carried by the transaction
        got: u64,
    },

    /// Signature verification on a transaction or block header failed
    #[error("signature verification failed: {0}")]
    TxSignatureInvalid(String),

    /// Invariant violation detected while applying state (never expected in
    /// correct operation; surfaced rather than silently tolerated)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<redb::Error> for Error {
    fn from(err: redb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Error::Storage(err.to_string())
    }
}
