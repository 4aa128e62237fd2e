//! The peer RPC boundary (`MCC.AdviseNewBlock`, `MCC.FetchBlock`).
//!
//! No transport is implemented here. This trait is the assumed external
//! collaborator; a real implementation would carry these calls over
//! gRPC/HTTP to other block-producer nodes.

use crate::error::Result;
use async_trait::async_trait;
use chain_core::Block;

/// RPC calls this node issues to its peers.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// `MCC.AdviseNewBlock`: notify `peer_id` of a newly produced block.
    async fn advise_new_block(&self, peer_id: &str, block: &Block) -> Result<()>;

    /// `MCC.FetchBlock`: ask `peer_id` for the block at `height`, if it has one.
    async fn fetch_block(&self, peer_id: &str, height: u64) -> Result<Option<Block>>;
}

/// An in-memory fake used by this crate's own tests: `advise_new_block` calls
/// are recorded, and `fetch_block` responses are pre-seeded per peer/height.
#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct FakeTransport {
        pub advised: Mutex<Vec<(String, u64)>>,
        pub blocks: HashMap<(String, u64), Block>,
        pub failing_peers: Vec<String>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_block(mut self, peer_id: &str, height: u64, block: Block) -> Self {
            self.blocks.insert((peer_id.to_string(), height), block);
            self
        }

        pub fn failing(mut self, peer_id: &str) -> Self {
            self.failing_peers.push(peer_id.to_string());
            self
        }
    }

    #[async_trait]
    impl PeerTransport for FakeTransport {
        async fn advise_new_block(&self, peer_id: &str, block: &Block) -> Result<()> {
            if self.failing_peers.contains(&peer_id.to_string()) {
                return Err(Error::PeerRpc {
                    peer: peer_id.to_string(),
                    reason: "forced failure".to_string(),
                });
            }
            let height = block.header.timestamp as u64;
            self.advised.lock().await.push((peer_id.to_string(), height));
            Ok(())
        }

        async fn fetch_block(&self, peer_id: &str, height: u64) -> Result<Option<Block>> {
            if self.failing_peers.contains(&peer_id.to_string()) {
                return Err(Error::PeerRpc {
                    peer: peer_id.to_string(),
                    reason: "forced failure".to_string(),
                });
            }
            Ok(self.blocks.get(&(peer_id.to_string(), height)).cloned())
        }
    }
}
