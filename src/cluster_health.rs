//! Cluster Health Tracker (spec §4.7 "Piggybacked cluster health", C13):
//! server-side. Each request carries a health bitmap from the client;
//! when it differs from what this tracker last saw, it resizes the
//! regular and XA pools for every registered fingerprint via the
//! multinode XA coordinator (C12).

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, instrument};

use crate::pool_registry::PoolRegistry;
use crate::xa::XaBudgetCoordinator;

/// One bit per known server endpoint, index-aligned with the endpoint
/// list the client and server both derived from the proxy URL (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthBitmap(pub Vec<bool>);

impl HealthBitmap {
    pub fn healthy_count(&self) -> usize {
        self.0.iter().filter(|h| **h).count()
    }
}

pub struct ClusterHealthTracker {
    last_seen: RwLock<Option<HealthBitmap>>,
    xa_coordinator: Arc<XaBudgetCoordinator>,
}

impl ClusterHealthTracker {
    pub fn new(xa_coordinator: Arc<XaBudgetCoordinator>) -> Self {
        Self {
            last_seen: RwLock::new(None),
            xa_coordinator,
        }
    }

    /// Called from every RPC handler with the piggybacked bitmap. Returns
    /// `true` if the health map changed and a resize sweep ran.
    #[instrument(skip(self, registry))]
    pub fn observe(&self, registry: &PoolRegistry, bitmap: HealthBitmap) -> bool {
        {
            let current = self.last_seen.read();
            if current.as_ref() == Some(&bitmap) {
                return false;
            }
        }
        *self.last_seen.write() = Some(bitmap.clone());
        self.resize_pools(registry, &bitmap);
        true
    }

    fn resize_pools(&self, registry: &PoolRegistry, bitmap: &HealthBitmap) {
        let healthy = bitmap.healthy_count();
        let per_node_xa = self.xa_coordinator.recompute(healthy);
        info!(healthy_nodes = healthy, per_node_xa, "cluster health changed; resizing pools");

        // Regular-pool resizing on recovery is the redistributor's job
        // (C16, spec §4.8); this tracker only repartitions the XA budget,
        // per §4.9 "recomputed on health changes".
        for fp in registry.fingerprints() {
            if let Some(xa) = registry.xa_registry(fp) {
                let min_idle = xa.pool().idle_count().min(per_node_xa);
                xa.pool().resize(per_node_xa, min_idle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bitmap_is_a_no_op() {
        let tracker = ClusterHealthTracker::new(Arc::new(XaBudgetCoordinator::new(50)));
        let registry = PoolRegistry::new();
        let bitmap = HealthBitmap(vec![true, true, false]);
        assert!(tracker.observe(&registry, bitmap.clone()));
        assert!(!tracker.observe(&registry, bitmap));
    }

    #[test]
    fn changed_bitmap_recomputes_xa_budget() {
        let tracker = ClusterHealthTracker::new(Arc::new(XaBudgetCoordinator::new(30)));
        let registry = PoolRegistry::new();
        tracker.observe(&registry, HealthBitmap(vec![true, true, true]));
        assert_eq!(tracker.xa_coordinator.per_node_allocation(), 10);
        tracker.observe(&registry, HealthBitmap(vec![true, false, true]));
        assert_eq!(tracker.xa_coordinator.per_node_allocation(), 15);
    }
}
