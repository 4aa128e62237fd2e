//! C11 — DB Allocation Service.
//!
//! `create_database` derives a unique `database_id` by proof-of-work, picks
//! candidate nodes via consistent hashing filtered by free memory
//! (`allocate_nodes`), and fans a signed `CreateDb` directive out to every
//! allocated node; any failure triggers a compensating `DropDb` fan-out to
//! the nodes already contacted. `ServiceMap` is mutated only after the
//! whole deploy succeeds.

use crate::config::AllocatorConfig;
use crate::error::{Error, Result};
use crate::hash_ring::ConsistentHashRing;
use crate::metrics::NodeMetrics;
use crate::transport::DbsTransport;
use crate::types::{
    CreateDatabaseRequest, CreateDatabaseResponse, DatabaseInstance, DbsUpdateRequest, Peers,
    ResourceSpec, ServiceMap, ServiceOp, SignedUpdateServiceHeader,
};
use chain_core::crypto::{hash_bytes, KeyPair};
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;

/// The DB allocation service. Owns the consistent-hash ring over the
/// current node set, the `ServiceMap` registry, and the keypair this node
/// signs outbound directives with.
pub struct Allocator {
    config: AllocatorConfig,
    ring: ConsistentHashRing,
    metrics: Arc<dyn NodeMetrics>,
    transport: Arc<dyn DbsTransport>,
    keypair: Arc<KeyPair>,
    service_map: RwLock<ServiceMap>,
}

impl Allocator {
    /// Build an allocator over a fixed candidate node set.
    pub fn new(
        config: AllocatorConfig,
        node_ids: Vec<String>,
        metrics: Arc<dyn NodeMetrics>,
        transport: Arc<dyn DbsTransport>,
        keypair: Arc<KeyPair>,
    ) -> Self {
        Self {
            config,
            ring: ConsistentHashRing::new(&node_ids),
            metrics,
            transport,
            keypair,
            service_map: RwLock::new(ServiceMap::new()),
        }
    }

    /// Look up a provisioned instance by id.
    pub fn get_database(&self, database_id: &str) -> Option<DatabaseInstance> {
        self.service_map.read().get(database_id).cloned()
    }

    /// Database ids hosted on `node_id`.
    pub fn get_node_databases(&self, node_id: &str) -> Vec<String> {
        self.service_map.read().databases_on_node(node_id)
    }

    /// Derive a unique `database_id` via single-threaded proof-of-work:
    /// hash `node_id ++ nonce` until the result has at least
    /// `pow_difficulty_bits` leading zero bits and is not already present
    /// in the `ServiceMap`.
    fn mine_database_id(&self, node_id: &str) -> String {
        let mut nonce: u64 = rand::thread_rng().gen();
        loop {
            let mut preimage = Vec::with_capacity(node_id.len() + 8);
            preimage.extend_from_slice(node_id.as_bytes());
            preimage.extend_from_slice(&nonce.to_be_bytes());
            let digest = hash_bytes(&preimage);
            let candidate = hex::encode(&digest[..16]);

            if leading_zero_bits(&digest) >= self.config.pow_difficulty_bits
                && !self.service_map.read().contains(&candidate)
            {
                return candidate;
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Pick `resource.node_count` candidate nodes for `database_id`, widening
    /// the consistent-hash neighbor range across up to `allocation_rounds`
    /// attempts. A candidate is accepted only if its free-memory gauge is
    /// known (`METRIC_NOT_COLLECTED` otherwise excludes it, never errors the
    /// whole call) and at least `resource.memory`.
    pub fn allocate_nodes(&self, resource: &ResourceSpec, database_id: &str) -> Result<Peers> {
        for round in 0..self.config.allocation_rounds {
            let range = (round as usize + 1) * resource.node_count as usize;
            let candidates = self.ring.neighbors(database_id, range);

            let acceptable: Vec<String> = candidates
                .into_iter()
                .filter(|node_id| match self.metrics.free_memory_bytes(node_id) {
                    Some(free) => free >= resource.memory,
                    None => false,
                })
                .collect();

            if acceptable.len() >= resource.node_count as usize {
                let node_ids: Vec<String> = acceptable.into_iter().take(resource.node_count as usize).collect();
                let leader_idx = rand::thread_rng().gen_range(0..node_ids.len());
                let leader = node_ids[leader_idx].clone();
                return Ok(Peers { node_ids, leader });
            }
        }
        Err(Error::DbAllocation {
            needed: resource.node_count,
        })
    }

    fn sign(&self, op: ServiceOp, instance: DatabaseInstance) -> DbsUpdateRequest {
        let header = SignedUpdateServiceHeader { op, instance };
        let signature = self.keypair.sign(&header.canonical_bytes());
        DbsUpdateRequest {
            header,
            signee: self.keypair.address(),
            signature,
        }
    }

    /// Provision a new sqlchain database: mine a `database_id`, allocate
    /// peers, fan a signed `CreateDb` out to every allocated node, and
    /// register the instance in the `ServiceMap` only if every node
    /// accepted it. On any node's failure, fan a compensating `DropDb` out
    /// to all allocated nodes and return the original error. Current policy
    /// records only the first error rather than per-node outcomes.
    pub async fn create_database(&self, req: CreateDatabaseRequest) -> Result<CreateDatabaseResponse> {
        let database_id = self.mine_database_id(&req.node_id);
        let peers = self.allocate_nodes(&req.resource, &database_id)?;

        let instance = DatabaseInstance {
            database_id: database_id.clone(),
            resource: req.resource,
            peers: peers.clone(),
            genesis_block: genesis_block_payload(&database_id),
        };

        let create_directive = self.sign(ServiceOp::CreateDb, instance.clone());

        let mut join_set = tokio::task::JoinSet::new();
        for node_id in &peers.node_ids {
            let node_id = node_id.clone();
            let transport = self.transport.clone();
            let directive = create_directive.clone();
            join_set.spawn(async move {
                let result = transport.update(&node_id, &directive).await;
                (node_id, result)
            });
        }

        let mut first_error: Option<Error> = None;
        while let Some(joined) = join_set.join_next().await {
            let (node_id, result) = joined.expect("create_db fan-out task panicked");
            if let Err(err) = result {
                tracing::warn!(node = %node_id, error = %err, "CreateDb rejected by node");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        if let Some(err) = first_error {
            tracing::warn!(database_id = %database_id, "compensating DropDb after failed CreateDb fan-out");
            self.fan_out_drop(&instance).await;
            return Err(err);
        }

        self.service_map.write().set(instance.clone());
        Ok(CreateDatabaseResponse { instance_meta: instance })
    }

    /// Tear down a provisioned instance: fan a signed `DropDb` out to its
    /// peer set, then delete it from the `ServiceMap` only if every node
    /// accepted the teardown.
    pub async fn drop_database(&self, database_id: &str) -> Result<()> {
        let instance = self
            .get_database(database_id)
            .ok_or_else(|| Error::NoSuchDatabase(database_id.to_string()))?;

        let first_error = self.fan_out_drop(&instance).await;
        if let Some(err) = first_error {
            return Err(err);
        }
        self.service_map.write().delete(database_id);
        Ok(())
    }

    async fn fan_out_drop(&self, instance: &DatabaseInstance) -> Option<Error> {
        let directive = self.sign(ServiceOp::DropDb, instance.clone());
        let mut join_set = tokio::task::JoinSet::new();
        for node_id in &instance.peers.node_ids {
            let node_id = node_id.clone();
            let transport = self.transport.clone();
            let directive = directive.clone();
            join_set.spawn(async move {
                let result = transport.update(&node_id, &directive).await;
                (node_id, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            let (node_id, result) = joined.expect("DropDb fan-out task panicked");
            if let Err(err) = result {
                tracing::warn!(node = %node_id, error = %err, "DropDb rejected by node");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error
    }
}

/// The genesis block payload for a newly provisioned sqlchain is opaque to
/// this crate — it is produced by `chain-core`/`block-producer` once the
/// database is live, not by the allocator. A placeholder derived from the
/// database id stands in for it here.
fn genesis_block_payload(database_id: &str) -> Vec<u8> {
    hash_bytes(database_id.as_bytes()).to_vec()
}

fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut count = 0;
    for byte in bytes {
        if *byte == 0 {
            count += 8;
            continue;
        }
        count += byte.leading_zeros();
        break;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryNodeMetrics;
    use crate::transport::testing::FakeDbsTransport;

    fn allocator(node_ids: Vec<String>, metrics: InMemoryNodeMetrics, transport: FakeDbsTransport) -> Allocator {
        Allocator::new(
            AllocatorConfig {
                allocation_rounds: 2,
                pow_difficulty_bits: 1,
            },
            node_ids,
            Arc::new(metrics),
            Arc::new(transport),
            Arc::new(KeyPair::generate()),
        )
    }

    #[test]
    fn allocate_nodes_widens_range_until_enough_candidates() {
        // 10 nodes, half under the requested memory floor. With
        // node_count=5 and allocation_rounds=2, the second round's range
        // (2 * 5 = 10) necessarily spans the whole node set regardless of
        // ring order, so exactly the 5 well-provisioned nodes are always
        // found by the final round even if the first (range = 5) comes up
        // short.
        let node_ids: Vec<String> = (0..10).map(|i| format!("node-{i}")).collect();
        let mut metrics = InMemoryNodeMetrics::new();
        for (i, node_id) in node_ids.iter().enumerate() {
            metrics.set_free_memory(node_id, if i < 5 { 2000 } else { 500 });
        }

        let alloc = allocator(node_ids, metrics, FakeDbsTransport::new());
        let resource = ResourceSpec {
            node_count: 5,
            memory: 1000,
        };
        let peers = alloc.allocate_nodes(&resource, "db-1").unwrap();
        assert_eq!(peers.node_ids.len(), 5);
        assert!(peers.node_ids.contains(&peers.leader));
        assert!(peers.node_ids.iter().all(|id| {
            let idx: usize = id.strip_prefix("node-").unwrap().parse().unwrap();
            idx < 5
        }));
    }

    #[test]
    fn allocate_nodes_fails_after_exhausting_rounds() {
        let node_ids: Vec<String> = (0..4).map(|i| format!("node-{i}")).collect();
        let metrics = InMemoryNodeMetrics::new(); // no metrics at all: every node excluded
        let alloc = allocator(node_ids, metrics, FakeDbsTransport::new());
        let resource = ResourceSpec {
            node_count: 3,
            memory: 1000,
        };
        let result = alloc.allocate_nodes(&resource, "db-1");
        assert!(matches!(result, Err(Error::DbAllocation { needed: 3 })));
    }

    #[tokio::test]
    async fn create_database_registers_instance_on_success() {
        let node_ids: Vec<String> = (0..3).map(|i| format!("node-{i}")).collect();
        let mut metrics = InMemoryNodeMetrics::new();
        for node_id in &node_ids {
            metrics.set_free_memory(node_id, 10_000);
        }
        let alloc = allocator(node_ids, metrics, FakeDbsTransport::new());

        let req = CreateDatabaseRequest {
            node_id: "requesting-node".to_string(),
            resource: ResourceSpec {
                node_count: 2,
                memory: 1000,
            },
        };
        let resp = alloc.create_database(req).await.unwrap();
        assert_eq!(resp.instance_meta.peers.node_ids.len(), 2);
        assert!(alloc.get_database(&resp.instance_meta.database_id).is_some());
    }

    #[tokio::test]
    async fn create_database_compensates_with_drop_db_on_partial_failure() {
        let node_ids: Vec<String> = (0..3).map(|i| format!("node-{i}")).collect();
        let mut metrics = InMemoryNodeMetrics::new();
        for node_id in &node_ids {
            metrics.set_free_memory(node_id, 10_000);
        }
        let transport = FakeDbsTransport::new().failing("node-1");
        let alloc = allocator(node_ids, metrics, transport);

        let req = CreateDatabaseRequest {
            node_id: "requesting-node".to_string(),
            resource: ResourceSpec {
                node_count: 3,
                memory: 1000,
            },
        };
        let result = alloc.create_database(req).await;
        assert!(result.is_err());
        // nothing registered: the whole deploy rolled back
        assert_eq!(alloc.get_node_databases("node-0").len(), 0);
    }
}
