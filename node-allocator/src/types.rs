//! Core types for the DB allocation service: resource requests, the peer
//! set a provisioned database is deployed across, and the `ServiceMap`
//! registry of provisioned sqlchain instances.

use chain_core::{Address, Signature};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A requested resource shape: how many nodes the caller wants, and the
/// minimum free memory (bytes) each candidate node must report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Number of nodes to allocate
    pub node_count: u32,
    /// Minimum free memory, in bytes, a candidate node must have available
    pub memory: u64,
}

/// The peer set a provisioned sqlchain database is deployed across, with one
/// member elected leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peers {
    /// All node ids hosting this database, including the leader
    pub node_ids: Vec<String>,
    /// The elected leader among `node_ids`
    pub leader: String,
}

/// A provisioned sqlchain database instance, as recorded in the
/// `ServiceMap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInstance {
    /// Unique id, derived via proof-of-work over the requesting node's id
    pub database_id: String,
    /// Requested resource shape
    pub resource: ResourceSpec,
    /// Nodes hosting this database
    pub peers: Peers,
    /// Opaque genesis block payload for the new sqlchain
    pub genesis_block: Vec<u8>,
}

/// `ServiceMap`: `database_id -> DatabaseInstance`, with a secondary index
/// `node_id -> [database_id]`. Mutated only through `set`/`delete`; readers
/// see the state as of their call (this is an in-memory structure, guarded
/// externally by the allocator's own lock — see `allocator::Allocator`).
#[derive(Debug, Clone, Default)]
pub struct ServiceMap {
    by_database: HashMap<String, DatabaseInstance>,
    by_node: HashMap<String, Vec<String>>,
}

impl ServiceMap {
    /// An empty service map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a database instance, updating the secondary
    /// index for every peer node it is deployed on.
    pub fn set(&mut self, instance: DatabaseInstance) {
        for node in &instance.peers.node_ids {
            let entry = self.by_node.entry(node.clone()).or_default();
            if !entry.contains(&instance.database_id) {
                entry.push(instance.database_id.clone());
            }
        }
        self.by_database.insert(instance.database_id.clone(), instance);
    }

    /// Remove a database instance, if present, cleaning up the secondary
    /// index.
    pub fn delete(&mut self, database_id: &str) -> Option<DatabaseInstance> {
        let removed = self.by_database.remove(database_id)?;
        for node in &removed.peers.node_ids {
            if let Some(entry) = self.by_node.get_mut(node) {
                entry.retain(|id| id != database_id);
            }
        }
        Some(removed)
    }

    /// Look up a database instance by id.
    pub fn get(&self, database_id: &str) -> Option<&DatabaseInstance> {
        self.by_database.get(database_id)
    }

    /// Whether `database_id` is already registered (used by the
    /// proof-of-work miner to reject a collision).
    pub fn contains(&self, database_id: &str) -> bool {
        self.by_database.contains_key(database_id)
    }

    /// Database ids hosted on `node_id`.
    pub fn databases_on_node(&self, node_id: &str) -> Vec<String> {
        self.by_node.get(node_id).cloned().unwrap_or_default()
    }
}

/// The operation a signed service directive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceOp {
    /// Provision a new database instance
    CreateDb,
    /// Tear down an existing database instance
    DropDb,
}

/// `DBS.Update`'s signed header: an operation against one database
/// instance, signed by the issuing node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUpdateServiceHeader {
    /// Which operation this directive requests
    pub op: ServiceOp,
    /// The instance the operation concerns
    pub instance: DatabaseInstance,
}

impl SignedUpdateServiceHeader {
    /// Canonical bytes signed by `signee` and verified by every receiving
    /// node before acting on the directive.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("SignedUpdateServiceHeader serialization cannot fail")
    }
}

/// A fully signed `DBS.Update` request, as fanned out to miner nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbsUpdateRequest {
    /// The signed header
    pub header: SignedUpdateServiceHeader,
    /// The address that signed `header`
    pub signee: Address,
    /// Signature over `header.canonical_bytes()`
    pub signature: Signature,
}

impl DbsUpdateRequest {
    /// Verify `signature` against `signee`.
    pub fn verify(&self) -> bool {
        chain_core::crypto::verify_signature(
            &self.header.canonical_bytes(),
            &self.signature,
            self.signee.as_bytes(),
        )
    }
}

/// A request to provision a new sqlchain database (C11's inbound request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDatabaseRequest {
    /// The requesting node's id, used as the proof-of-work seed for
    /// `database_id` derivation
    pub node_id: String,
    /// Requested resource shape
    pub resource: ResourceSpec,
}

/// The response to a successful `create_database` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDatabaseResponse {
    /// The newly provisioned instance
    pub instance_meta: DatabaseInstance,
}
