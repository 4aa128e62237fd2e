//! In-memory block index, rebuilt on open by replaying the durable
//! `block_index` bucket in key (height) order.
//!
//! Blocks are kept in a `Vec` arena and referenced by their position in it
//! rather than by owning back-pointers, so `ancestor()` is a simple walk over
//! stable `usize` indices instead of a graph of `Rc`/`Arc` nodes.

use crate::crypto::merkle_root;
use crate::error::{Error, Result};
use crate::store::ReadTxn;
use crate::types::Block;
use std::collections::HashMap;

struct Node {
    hash: [u8; 32],
    height: u64,
    block: Block,
    parent: Option<usize>,
}

/// In-memory chain of blocks, indexed by arena position and by hash.
pub struct BlockIndex {
    nodes: Vec<Node>,
    by_hash: HashMap<[u8; 32], usize>,
    head: Option<usize>,
}

impl BlockIndex {
    /// An empty index, with no blocks linked yet.
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            by_hash: HashMap::new(),
            head: None,
        }
    }

    /// Rebuild the index from the durable store's `block_index` bucket,
    /// iterated in height order. Verifies each non-genesis block's signature
    /// before linking it; this is the one place replay re-checks signatures,
    /// since `check_block` already checked them before the block was pushed.
    pub fn replay(read: &ReadTxn) -> Result<Self> {
        let mut index = Self::empty();
        for (height, hash, block) in read.iter_blocks()? {
            index.link(height, hash, block)?;
        }
        Ok(index)
    }

    fn link(&mut self, height: u64, hash: [u8; 32], block: Block) -> Result<()> {
        let is_genesis = height == 0;

        let parent = if is_genesis {
            None
        } else {
            let candidate = self.head.filter(|&h| self.nodes[h].hash == block.header.parent_hash);
            let resolved = match candidate {
                Some(idx) => idx,
                None => *self
                    .by_hash
                    .get(&block.header.parent_hash)
                    .ok_or(Error::ParentNotFound(height))?,
            };

            if !block.verify_signature() {
                return Err(Error::TxSignatureInvalid(format!(
                    "block at height {height} has an invalid producer signature"
                )));
            }

            Some(resolved)
        };

        let idx = self.nodes.len();
        self.nodes.push(Node {
            hash,
            height,
            block,
            parent,
        });
        self.by_hash.insert(hash, idx);
        self.head = Some(idx);
        Ok(())
    }

    /// Link a newly-pushed block onto the head of the index. Callers are
    /// expected to have already run `check_block` (parent match, merkle
    /// root, hash, signature) before calling this.
    pub fn push(&mut self, height: u64, hash: [u8; 32], block: Block) -> Result<()> {
        let is_genesis = height == 0;
        let parent = if is_genesis {
            None
        } else {
            Some(self.head.ok_or(Error::ParentNotFound(height))?)
        };
        let idx = self.nodes.len();
        self.nodes.push(Node {
            hash,
            height,
            block,
            parent,
        });
        self.by_hash.insert(hash, idx);
        self.head = Some(idx);
        Ok(())
    }

    /// Current head height, or `None` if no block has been pushed yet.
    pub fn height(&self) -> Option<u64> {
        self.head.map(|idx| self.nodes[idx].height)
    }

    /// Current head hash.
    pub fn head_hash(&self) -> Option<[u8; 32]> {
        self.head.map(|idx| self.nodes[idx].hash)
    }

    /// Look up a block by hash.
    pub fn get(&self, hash: &[u8; 32]) -> Option<&Block> {
        self.by_hash.get(hash).map(|&idx| &self.nodes[idx].block)
    }

    /// Walk parent links from the head back to height `h`. Returns `None` if
    /// `h` is above the current height or the chain does not reach that far.
    pub fn ancestor(&self, h: u64) -> Option<&Block> {
        let head = self.head?;
        if h > self.nodes[head].height {
            return None;
        }
        let mut cur = head;
        loop {
            let node = &self.nodes[cur];
            if node.height == h {
                return Some(&node.block);
            }
            cur = node.parent?;
        }
    }

    /// Recompute the merkle root over a block's transactions, for
    /// `check_block` to compare against the header's stated root.
    pub fn expected_merkle_root(block: &Block) -> [u8; 32] {
        merkle_root(&block.tx_hashes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::BlockHeader;

    fn signed_block(kp: &KeyPair, parent_hash: [u8; 32], timestamp: i64) -> Block {
        let header = BlockHeader {
            version: 1,
            producer_address: kp.address(),
            parent_hash,
            merkle_root: [0u8; 32],
            timestamp,
        };
        let signature = kp.sign(&header.canonical_bytes());
        Block {
            header,
            signature,
            transactions: vec![],
        }
    }

    #[test]
    fn ancestor_walks_back_to_requested_height() {
        let kp = KeyPair::generate();
        let mut index = BlockIndex::empty();

        let genesis = signed_block(&kp, [0u8; 32], 0);
        let genesis_hash = genesis.compute_hash();
        index.push(0, genesis_hash, genesis).unwrap();

        let b1 = signed_block(&kp, genesis_hash, 1);
        let b1_hash = b1.compute_hash();
        index.push(1, b1_hash, b1).unwrap();

        let b2 = signed_block(&kp, b1_hash, 2);
        let b2_hash = b2.compute_hash();
        index.push(2, b2_hash, b2).unwrap();

        assert_eq!(index.ancestor(1).unwrap().header.timestamp, 1);
        assert_eq!(index.ancestor(0).unwrap().header.timestamp, 0);
        assert!(index.ancestor(3).is_none());
    }

    #[test]
    fn push_without_parent_fails_for_non_genesis() {
        let kp = KeyPair::generate();
        let mut index = BlockIndex::empty();
        let b1 = signed_block(&kp, [9u8; 32], 1);
        let hash = b1.compute_hash();
        assert!(index.push(1, hash, b1).is_err());
    }
}
