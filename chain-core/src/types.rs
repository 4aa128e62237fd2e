//! Core data types for the chain core
//!
//! All types are designed for:
//! - Deterministic serialization (bincode) for hashing and signing
//! - Memory safety (no unsafe code)

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte account / producer address (an Ed25519 public key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// View as raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// An Ed25519 signature, stored as raw bytes so the type does not depend on
/// a particular dalek version at the API boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Build from raw bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// View as raw bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}
impl Eq for Signature {}

/// Block header. `block_hash` and `merkle_root` are derived values, not
/// stored redundantly in the header itself — see [`BlockHeader::merkle_root`]
/// and [`Block::compute_hash`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Wire format version
    pub version: u32,
    /// Address of the block's producer
    pub producer_address: Address,
    /// Hash of the parent block (all-zero for genesis)
    pub parent_hash: [u8; 32],
    /// Merkle root over `tx_hashes_in_order`
    pub merkle_root: [u8; 32],
    /// Block timestamp, seconds since epoch
    pub timestamp: i64,
}

impl BlockHeader {
    /// Canonical bytes used both for hashing and for signing
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("BlockHeader serialization cannot fail")
    }
}

/// A signed block: header plus its ordered transaction list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// Signature over `header.canonical_bytes()` by `header.producer_address`
    pub signature: Signature,
    /// Ordered transaction list
    pub transactions: Vec<TxKind>,
}

impl Block {
    /// `block_hash = H(header_bytes)`
    pub fn compute_hash(&self) -> [u8; 32] {
        crate::crypto::hash_bytes(&self.header.canonical_bytes())
    }

    /// Hashes of `transactions`, in order
    pub fn tx_hashes(&self) -> Vec<[u8; 32]> {
        self.transactions.iter().map(|tx| tx.hash()).collect()
    }

    /// `height` is not carried in the header (only `parent_hash` is); callers
    /// that need it track it alongside the block (e.g. in [`crate::block_index::BlockIndex`]).
    pub fn verify_signature(&self) -> bool {
        crate::crypto::verify_signature(
            &self.header.canonical_bytes(),
            &self.signature,
            self.header.producer_address.as_bytes(),
        )
    }
}

/// Per-account ledger record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account address
    pub address: Address,
    /// Current balance
    pub balance: u64,
    /// Next nonce to be assigned/expected for this account
    pub next_nonce: u64,
}

impl Account {
    /// A fresh account record, lazily created on first reference
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balance: 0,
            next_nonce: 0,
        }
    }
}

/// A billing request: gas consumed per receiving address, to be converted
/// into fees by the block producer (see [`crate::meta_state`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRequestHeader {
    /// (receiver address, gas amount) pairs
    pub gas_amounts: Vec<(Address, u64)>,
    /// sqlchain database this billing request concerns
    pub database_id: String,
}

/// A billing request as submitted by a database's miners, before the block
/// producer countersigns it into a [`TxBilling`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRequest {
    /// Request header
    pub header: BillingRequestHeader,
    /// Signatures from the miners attesting to the header
    pub signatures: Vec<Signature>,
}

/// A billing transaction: the block producer's countersigned record of fees
/// and rewards owed to each receiver in a [`BillingRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxBilling {
    /// The producer account that submitted this tx (its nonce advances)
    pub account: Address,
    /// Nonce assigned to this tx for `account`
    pub nonce: u64,
    /// Per-receiver fee amounts, `fees[i] = gas_amounts[i].1 * gas_price`
    pub fees: Vec<(Address, u64)>,
    /// Per-receiver reward amounts (current policy: always zero, see spec §9)
    pub rewards: Vec<(Address, u64)>,
    /// Signature over the tx's canonical bytes (signature field zeroed)
    pub signature: Signature,
}

/// A transaction registering that a new sqlchain database has been
/// provisioned (see `node-allocator`'s `create_database`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxCreateDatabase {
    /// Account that requested provisioning (its nonce advances)
    pub account: Address,
    /// Nonce assigned to this tx for `account`
    pub nonce: u64,
    /// The newly allocated database id
    pub database_id: String,
    /// Opaque instance metadata, as produced by the allocator
    pub instance_meta: Vec<u8>,
    /// Signature over the tx's canonical bytes (signature field zeroed)
    pub signature: Signature,
}

/// Closed set of transaction kinds. New kinds are added here, never as an
/// open-ended trait object, so every kind gets an explicit storage bucket
/// and an explicit `apply_transaction` arm (see [`crate::meta_state`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TxKind {
    /// Billing settlement
    Billing(TxBilling),
    /// Database provisioning record
    CreateDatabase(TxCreateDatabase),
}

impl TxKind {
    /// One byte per variant, used as a key prefix in the tx index bucket
    pub fn kind_tag(&self) -> u8 {
        match self {
            TxKind::Billing(_) => 1,
            TxKind::CreateDatabase(_) => 2,
        }
    }

    /// The signing/nonce-bearing account for this tx
    pub fn account(&self) -> Address {
        match self {
            TxKind::Billing(tx) => tx.account,
            TxKind::CreateDatabase(tx) => tx.account,
        }
    }

    /// The nonce assigned to this tx
    pub fn nonce(&self) -> u64 {
        match self {
            TxKind::Billing(tx) => tx.nonce,
            TxKind::CreateDatabase(tx) => tx.nonce,
        }
    }

    /// Canonical bytes with the signature field zeroed, used both to produce
    /// and to verify `signature`.
    fn signing_bytes(&self) -> Vec<u8> {
        match self.clone() {
            TxKind::Billing(mut tx) => {
                tx.signature = Signature([0u8; 64]);
                bincode::serialize(&tx).expect("tx serialization cannot fail")
            }
            TxKind::CreateDatabase(mut tx) => {
                tx.signature = Signature([0u8; 64]);
                bincode::serialize(&tx).expect("tx serialization cannot fail")
            }
        }
    }

    /// `hash()` over the tx's signed canonical bytes
    pub fn hash(&self) -> [u8; 32] {
        crate::crypto::hash_bytes(&bincode::serialize(self).expect("tx serialization cannot fail"))
    }

    /// Verify `signature` against `account`'s public key
    pub fn verify_signature(&self) -> bool {
        let signature = match self {
            TxKind::Billing(tx) => tx.signature,
            TxKind::CreateDatabase(tx) => tx.signature,
        };
        crate::crypto::verify_signature(&self.signing_bytes(), &signature, self.account().as_bytes())
    }

    /// Serialize for durable storage
    pub fn serialize(&self) -> crate::error::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// In-memory, single-current-value chain head, persisted on every push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainState {
    /// Hash of the current head block
    pub head_hash: [u8; 32],
    /// Height of the current head block
    pub height: u64,
}

impl ChainState {
    /// The state before any block has been pushed
    pub fn genesis_pending() -> Self {
        Self {
            head_hash: [0u8; 32],
            height: 0,
        }
    }
}

/// Per-database sqlchain registry record, written by `TxCreateDatabase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlChainMeta {
    /// Database id
    pub database_id: String,
    /// Opaque instance metadata
    pub instance_meta: Vec<u8>,
    /// Height at which this database was registered
    pub created_at_height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_is_lowercase_hex() {
        let addr = Address([0xabu8; 32]);
        assert_eq!(addr.to_string(), "ab".repeat(32));
    }

    #[test]
    fn tx_kind_tags_are_distinct() {
        let billing = TxKind::Billing(TxBilling {
            account: Address([1u8; 32]),
            nonce: 0,
            fees: vec![],
            rewards: vec![],
            signature: Signature([0u8; 64]),
        });
        let create_db = TxKind::CreateDatabase(TxCreateDatabase {
            account: Address([1u8; 32]),
            nonce: 0,
            database_id: "db1".to_string(),
            instance_meta: vec![],
            signature: Signature([0u8; 64]),
        });
        assert_ne!(billing.kind_tag(), create_db.kind_tag());
    }
}
