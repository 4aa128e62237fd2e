//! Node-resource metric collection, treated as an external collaborator.
//! Modeled here as a trait so `allocate_nodes` can be tested without a live
//! metrics collector; [`InMemoryNodeMetrics`] is the reference
//! implementation used by this crate's own tests.

/// Per-node resource gauges consulted by `allocate_nodes`.
pub trait NodeMetrics: Send + Sync {
    /// Free memory, in bytes, currently reported for `node_id`. `None` if
    /// no metric has been collected for this node (`METRIC_NOT_COLLECTED`).
    fn free_memory_bytes(&self, node_id: &str) -> Option<u64>;
}

/// An in-memory, externally-updated metrics table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNodeMetrics {
    free_memory: std::collections::HashMap<String, u64>,
}

impl InMemoryNodeMetrics {
    /// No metrics collected for any node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) `node_id`'s free-memory gauge.
    pub fn set_free_memory(&mut self, node_id: impl Into<String>, bytes: u64) {
        self.free_memory.insert(node_id.into(), bytes);
    }
}

impl NodeMetrics for InMemoryNodeMetrics {
    fn free_memory_bytes(&self, node_id: &str) -> Option<u64> {
        self.free_memory.get(node_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_node_reports_no_metric() {
        let metrics = InMemoryNodeMetrics::new();
        assert_eq!(metrics.free_memory_bytes("node-0"), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut metrics = InMemoryNodeMetrics::new();
        metrics.set_free_memory("node-0", 4096);
        assert_eq!(metrics.free_memory_bytes("node-0"), Some(4096));
    }
}
