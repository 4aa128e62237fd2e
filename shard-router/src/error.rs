//! Error types for the shard router

use thiserror::Error;

/// Result type for shard-router operations
pub type Result<T> = std::result::Result<T, Error>;

/// Shard router errors
#[derive(Error, Debug)]
pub enum Error {
    /// The configured shard column was not found in the statement's column list
    #[error("shard column {0:?} not found in insert column list")]
    ShardColNotFound(String),

    /// The shard-column expression was not a literal (e.g. a function call)
    #[error("shard column value must be a literal, got a non-literal expression: {0}")]
    NonLiteralShardKey(String),

    /// A parameter marker in the shard-column position could not be resolved against bind args
    #[error("bind argument not found for parameter marker {0:?}")]
    BindNotFound(String),

    /// The resolved shard-column value was not an integer seconds-since-epoch
    #[error("shard column value is not an integer timestamp: {0}")]
    BadShardKeyType(String),

    /// `REPLACE INTO` / `ON DUPLICATE KEY UPDATE` against a sharded table
    #[error("REPLACE/ON DUPLICATE KEY UPDATE is not supported against a sharded table {0:?}")]
    UnsupportedShardedUpsert(String),

    /// Shard id would be negative (insert timestamp before the configured shard start)
    #[error("insert timestamp predates shard_start_time for table {0:?}")]
    InsertBeforeShardStart(String),

    /// Could not fetch the base table's schema DDL to mirror into a shard table
    #[error("failed to fetch base schema for table {0:?}: {1}")]
    SchemaFetchFailed(String, String),

    /// Base schema DDL could not be textually rewritten into a shard DDL
    #[error("failed to rewrite schema DDL for shard table {0:?}")]
    SchemaRewriteFailed(String),

    /// Executing the materialized shard DDL failed
    #[error("failed to create shard table {0:?}: {1}")]
    ShardDdlFailed(String, String),

    /// A statement is not a supported `INSERT`
    #[error("unsupported statement, expected INSERT: {0}")]
    UnsupportedStatement(String),

    /// The statement failed to parse
    #[error("sql parse error: {0}")]
    Parse(#[from] sqlparser::parser::ParserError),

    /// The underlying row-store driver reported an error while executing a primitive
    #[error("row-store execution error: {0}")]
    Execution(String),

    /// A sharded insert's transaction failed and the rollback itself also failed
    #[error("insert failed ({0}) and rollback also failed: {1}")]
    RollbackFailed(String, String),

    /// Configuration error (malformed TOML, missing table entry, ...)
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Execution(err.to_string())
    }
}
