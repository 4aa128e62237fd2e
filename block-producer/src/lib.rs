//! Block producer: paces block production against a round-robin slot
//! schedule, applies self-produced and peer-sourced blocks through a
//! single serialized path, and countersigns billing requests into
//! durable transactions.
//!
//! Storage, the block DAG, account/sqlchain state, and cryptography all
//! live in `chain_core`; this crate owns the production cadence, peer
//! sync, and the cooperative tasks that drive them (`engine`).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod stash;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{spawn_engine, Engine, EngineHandle};
pub use error::{Error, Result};
pub use scheduler::SlotScheduler;
pub use transport::PeerTransport;
