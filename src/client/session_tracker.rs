//! Session Tracker (spec §4.7, C14): counts active sessions per server
//! endpoint for load-aware selection. Grounded on the same per-key
//! atomic-counter idiom as `pool_registry.rs::PoolMetrics`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::client::endpoint::ServerEndpoint;

#[derive(Default)]
pub struct SessionTracker {
    counts: DashMap<usize, AtomicUsize>,
    round_robin: AtomicUsize,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, endpoint: &Arc<ServerEndpoint>) {
        self.counts.entry(endpoint.id).or_default().fetch_add(1, Ordering::AcqRel);
    }

    pub fn unbind(&self, endpoint: &Arc<ServerEndpoint>) {
        if let Some(counter) = self.counts.get(&endpoint.id) {
            counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1))).ok();
        }
    }

    pub fn count(&self, endpoint: &Arc<ServerEndpoint>) -> usize {
        self.counts.get(&endpoint.id).map(|c| c.load(Ordering::Acquire)).unwrap_or(0)
    }

    /// Healthy endpoint with the fewest bound sessions; ties fall back to
    /// round-robin (spec §4.7 "Server selection for session-less
    /// operations").
    pub fn least_loaded<'a>(&self, endpoints: &'a [Arc<ServerEndpoint>]) -> Option<&'a Arc<ServerEndpoint>> {
        let healthy: Vec<&Arc<ServerEndpoint>> = endpoints.iter().filter(|e| e.is_healthy()).collect();
        if healthy.is_empty() {
            return None;
        }
        let min_count = healthy.iter().map(|e| self.count(e)).min().unwrap();
        let tied: Vec<&&Arc<ServerEndpoint>> = healthy.iter().filter(|e| self.count(e) == min_count).collect();
        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % tied.len();
        Some(tied[idx])
    }
}
