//! Durable block index and account/transaction meta-state for the block
//! producer chain engine.
//!
//! This crate owns the data model (`types`), the durable key-value layout
//! over `redb` (`store`), the in-memory block DAG rebuilt from it on open
//! (`block_index`), the account/nonce/sqlchain projection applied under a
//! write transaction (`meta_state`), the cryptographic primitives used
//! to hash and sign blocks and transactions (`crypto`), and the store's own
//! file-location configuration (`config`).
//!
//! Nothing here drives the production cadence or peer sync — that is
//! `block-producer`, which depends on this crate for storage and state.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod block_index;
pub mod config;
pub mod crypto;
pub mod error;
pub mod meta_state;
pub mod store;
pub mod types;

pub use block_index::BlockIndex;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use meta_state::MetaState;
pub use store::Store;
pub use types::{
    Account, Address, BillingRequest, BillingRequestHeader, Block, BlockHeader, ChainState,
    Signature, SqlChainMeta, TxBilling, TxCreateDatabase, TxKind,
};
