//! Consistent-hash node placement: a sorted hash ring with virtual nodes
//! per real node, binary search + wraparound, placing `database_id` keys
//! onto `node_id` candidates.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const VIRTUAL_NODES_PER_NODE: usize = 150;

/// A sorted hash ring over a fixed set of node ids, each represented by
/// several virtual nodes to smooth out placement skew.
pub struct ConsistentHashRing {
    ring: Vec<(u64, String)>,
}

impl ConsistentHashRing {
    /// Build a ring over `node_ids`, each with `VIRTUAL_NODES_PER_NODE`
    /// virtual positions.
    pub fn new(node_ids: &[String]) -> Self {
        let mut ring = Vec::with_capacity(node_ids.len() * VIRTUAL_NODES_PER_NODE);
        for node_id in node_ids {
            for replica in 0..VIRTUAL_NODES_PER_NODE {
                let key = format!("{node_id}#{replica}");
                ring.push((hash_key(&key), node_id.clone()));
            }
        }
        ring.sort_by_key(|&(hash, _)| hash);
        Self { ring }
    }

    /// Walk the ring starting at `key`'s hash position, collecting distinct
    /// node ids (deduplicating their virtual positions) until `range` of
    /// them have been found or the ring has been fully walked once.
    /// Wraps around past the end of the ring back to the start.
    pub fn neighbors(&self, key: &str, range: usize) -> Vec<String> {
        if self.ring.is_empty() || range == 0 {
            return Vec::new();
        }

        let hash = hash_key(key);
        let start = match self.ring.binary_search_by_key(&hash, |&(h, _)| h) {
            Ok(idx) => idx,
            Err(idx) => idx % self.ring.len(),
        };

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::with_capacity(range);
        for i in 0..self.ring.len() {
            let (_, node_id) = &self.ring[(start + i) % self.ring.len()];
            if seen.insert(node_id.clone()) {
                out.push(node_id.clone());
                if out.len() == range {
                    break;
                }
            }
        }
        out
    }
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("node-{i}")).collect()
    }

    #[test]
    fn neighbors_returns_requested_count_when_enough_nodes_exist() {
        let ring = ConsistentHashRing::new(&nodes(5));
        let result = ring.neighbors("db-1", 3);
        assert_eq!(result.len(), 3);
        let unique: std::collections::HashSet<_> = result.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn neighbors_caps_at_available_node_count() {
        let ring = ConsistentHashRing::new(&nodes(2));
        let result = ring.neighbors("db-1", 10);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn neighbors_is_deterministic_for_same_key() {
        let ring = ConsistentHashRing::new(&nodes(8));
        assert_eq!(ring.neighbors("db-1", 4), ring.neighbors("db-1", 4));
    }

    #[test]
    fn widening_range_is_a_superset_preserving_prefix_order() {
        let ring = ConsistentHashRing::new(&nodes(10));
        let narrow = ring.neighbors("db-1", 3);
        let wide = ring.neighbors("db-1", 6);
        assert_eq!(&wide[..3], narrow.as_slice());
    }

    #[test]
    fn empty_ring_returns_no_neighbors() {
        let ring = ConsistentHashRing::new(&[]);
        assert!(ring.neighbors("db-1", 3).is_empty());
    }
}
