//! DB allocation service (C11): places newly requested sqlchain databases
//! onto miner nodes via consistent hashing, fans a signed directive out to
//! the allocated peer set, and tracks the result in an in-memory
//! `ServiceMap`.
//!
//! This crate reuses `chain-core`'s signing primitives (`KeyPair`,
//! `Address`, `Signature`) rather than redefining them — a `DatabaseInstance`
//! is deployed across block-producer nodes, so directives against it are
//! signed the same way a block or transaction is.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod hash_ring;
pub mod metrics;
pub mod transport;
pub mod types;

pub use allocator::Allocator;
pub use config::AllocatorConfig;
pub use error::{Error, Result};
pub use hash_ring::ConsistentHashRing;
pub use metrics::{InMemoryNodeMetrics, NodeMetrics};
pub use transport::DbsTransport;
pub use types::{
    CreateDatabaseRequest, CreateDatabaseResponse, DatabaseInstance, DbsUpdateRequest, Peers,
    ResourceSpec, ServiceMap, ServiceOp, SignedUpdateServiceHeader,
};
