//! Multinode XA Coordinator (spec §4.9, C12): partitions a per-endpoint XA
//! transaction budget across the known server fleet so the sum of
//! per-node allocations tracks the configured total as nodes come and go.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Recomputed on every health-map change (spec §4.9 "recomputed on health
/// changes"); holds only the last-computed per-node allocation, read
/// without locking by C13's pool-resize sweep.
pub struct XaBudgetCoordinator {
    total: usize,
    per_node: AtomicUsize,
}

impl XaBudgetCoordinator {
    pub fn new(total: usize) -> Self {
        let coordinator = Self {
            total,
            per_node: AtomicUsize::new(total),
        };
        coordinator.recompute(1);
        coordinator
    }

    /// `ceil(total / healthyNodes)`, floored at 1 when there is at least
    /// one healthy node (an empty fleet means nothing to allocate to, but
    /// callers should not be left with a zero-sized pool while any
    /// endpoint is reachable).
    pub fn recompute(&self, healthy_nodes: usize) -> usize {
        let n = healthy_nodes.max(1);
        let per_node = self.total.div_ceil(n);
        self.per_node.store(per_node, Ordering::Release);
        per_node
    }

    pub fn per_node_allocation(&self) -> usize {
        self.per_node.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
