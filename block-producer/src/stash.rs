//! The out-of-order peer block stash (part of C10).
//!
//! Blocks whose height is ahead of the height this node is currently
//! missing are held here until a successful push closes the gap; the
//! stash is then drained back onto `blocks_from_rpc`, in the order the
//! blocks originally arrived. Height is tracked alongside each block
//! rather than read off it, matching how `chain_core::BlockIndex` itself
//! treats height as a caller-supplied sibling value, never a field on
//! `Block` itself.

use chain_core::Block;
use std::collections::VecDeque;

/// FIFO holding area for peer blocks received out of order.
#[derive(Default)]
pub struct Stash {
    blocks: VecDeque<(u64, Block)>,
}

impl Stash {
    /// An empty stash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a block for later re-delivery.
    pub fn enqueue(&mut self, height: u64, block: Block) {
        self.blocks.push_back((height, block));
    }

    /// Remove and return every stashed block, in original arrival order.
    pub fn drain(&mut self) -> Vec<(u64, Block)> {
        self.blocks.drain(..).collect()
    }

    /// Number of blocks currently held.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the stash holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::{Address, BlockHeader, Signature};

    fn block(timestamp: i64) -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                producer_address: Address([0u8; 32]),
                parent_hash: [0u8; 32],
                merkle_root: [0u8; 32],
                timestamp,
            },
            signature: Signature([0u8; 64]),
            transactions: vec![],
        }
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let mut stash = Stash::new();
        stash.enqueue(6, block(60));
        stash.enqueue(7, block(70));
        let drained = stash.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, 6);
        assert_eq!(drained[1].0, 7);
        assert!(stash.is_empty());
    }
}
