//! Pool Registry (spec §4.2, C2): six process-wide concurrent maps keyed
//! by `ConnectionFingerprint`. Entries are created once, by whichever
//! `connect` handler first sees a given fingerprint, and never replaced
//! for the process lifetime — mutation is put-if-absent, grounded on the
//! teacher's DashMap-migration notes in `common/concurrent_map.rs`
//! ("sharded locking... simple API, similar to standard HashMap").

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{Properties, RegularPool};
use crate::circuit_breaker::CircuitBreaker;
use crate::common::{now_millis, ConnectionFingerprint, DatabaseFlavor, MonotonicMillis};
use crate::xa::registry::XaTransactionRegistry;

#[derive(Debug, Clone)]
pub struct UnpooledConnectionDetails {
    pub url: String,
    pub user: String,
    pub password: String,
    pub properties: Properties,
}

/// Per-fingerprint slow-query segregator handle (the segregator itself
/// lives in `slow_query.rs`; the registry only owns the put-if-absent
/// slot).
pub type SlowQuerySlot = Arc<crate::slow_query::SlowQuerySegregator>;

/// Borrow/idle/waiter counters read without locking, surfaced on
/// `ResourceExhausted` and in diagnostics (spec §10 ambient observability).
#[derive(Default)]
pub struct PoolMetrics {
    pub total_borrows: AtomicU64,
    pub total_timeouts: AtomicUsize,
}

enum RegularEntry {
    Pooled(Arc<dyn RegularPool>),
    Unpooled(UnpooledConnectionDetails),
}

enum XaEntry {
    Pooled(Arc<XaTransactionRegistry>),
    Unpooled(UnpooledConnectionDetails),
}

/// Process-wide registry of backend pools, one entry per fingerprint.
pub struct PoolRegistry {
    regular: DashMap<ConnectionFingerprint, RegularEntry>,
    xa: DashMap<ConnectionFingerprint, XaEntry>,
    flavor: DashMap<ConnectionFingerprint, DatabaseFlavor>,
    slow_query: DashMap<ConnectionFingerprint, SlowQuerySlot>,
    circuit_breakers: DashMap<ConnectionFingerprint, Arc<CircuitBreaker>>,
    metrics: DashMap<ConnectionFingerprint, Arc<PoolMetrics>>,
    created_at: DashMap<ConnectionFingerprint, MonotonicMillis>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            regular: DashMap::new(),
            xa: DashMap::new(),
            flavor: DashMap::new(),
            slow_query: DashMap::new(),
            circuit_breakers: DashMap::new(),
            metrics: DashMap::new(),
            created_at: DashMap::new(),
        }
    }

    /// Registers the resolved flavor for a fingerprint (idempotent:
    /// subsequent calls with the same fingerprint are no-ops, as flavor is
    /// derived purely from the URL and therefore stable).
    pub fn record_flavor(&self, fp: ConnectionFingerprint, flavor: DatabaseFlavor) {
        self.flavor.entry(fp).or_insert(flavor);
        self.created_at.entry(fp).or_insert_with(now_millis);
    }

    pub fn flavor(&self, fp: ConnectionFingerprint) -> Option<DatabaseFlavor> {
        self.flavor.get(&fp).map(|v| *v)
    }

    /// Put-if-absent registration of a pooled regular data source.
    /// Returns `false` if an entry already existed (the caller should
    /// discard the pool it just built and use the existing one instead).
    pub fn put_regular_pool_if_absent(&self, fp: ConnectionFingerprint, pool: Arc<dyn RegularPool>) -> bool {
        match self.regular.entry(fp) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(RegularEntry::Pooled(pool));
                true
            }
        }
    }

    pub fn put_unpooled_regular_if_absent(&self, fp: ConnectionFingerprint, details: UnpooledConnectionDetails) -> bool {
        match self.regular.entry(fp) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(RegularEntry::Unpooled(details));
                true
            }
        }
    }

    pub fn regular_pool(&self, fp: ConnectionFingerprint) -> Option<Arc<dyn RegularPool>> {
        match self.regular.get(&fp)?.value() {
            RegularEntry::Pooled(p) => Some(p.clone()),
            RegularEntry::Unpooled(_) => None,
        }
    }

    pub fn unpooled_regular(&self, fp: ConnectionFingerprint) -> Option<UnpooledConnectionDetails> {
        match self.regular.get(&fp)?.value() {
            RegularEntry::Unpooled(d) => Some(d.clone()),
            RegularEntry::Pooled(_) => None,
        }
    }

    pub fn put_xa_registry_if_absent(&self, fp: ConnectionFingerprint, registry: Arc<XaTransactionRegistry>) -> bool {
        match self.xa.entry(fp) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(XaEntry::Pooled(registry));
                true
            }
        }
    }

    pub fn put_unpooled_xa_if_absent(&self, fp: ConnectionFingerprint, details: UnpooledConnectionDetails) -> bool {
        match self.xa.entry(fp) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(XaEntry::Unpooled(details));
                true
            }
        }
    }

    pub fn xa_registry(&self, fp: ConnectionFingerprint) -> Option<Arc<XaTransactionRegistry>> {
        match self.xa.get(&fp)?.value() {
            XaEntry::Pooled(r) => Some(r.clone()),
            XaEntry::Unpooled(_) => None,
        }
    }

    pub fn slow_query_segregator(&self, fp: ConnectionFingerprint) -> SlowQuerySlot {
        self.slow_query
            .entry(fp)
            .or_insert_with(|| Arc::new(crate::slow_query::SlowQuerySegregator::new()))
            .clone()
    }

    /// Per-fingerprint circuit breaker for the statement dispatcher (C6).
    pub fn circuit_breaker(&self, fp: ConnectionFingerprint) -> Arc<CircuitBreaker> {
        self.circuit_breakers
            .entry(fp)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(5, std::time::Duration::from_secs(30))))
            .clone()
    }

    pub fn metrics(&self, fp: ConnectionFingerprint) -> Arc<PoolMetrics> {
        self.metrics.entry(fp).or_insert_with(|| Arc::new(PoolMetrics::default())).clone()
    }

    /// Snapshot of every fingerprint currently registered, for the
    /// cluster health tracker's resize sweep (spec §4.8/§4.9).
    pub fn fingerprints(&self) -> Vec<ConnectionFingerprint> {
        self.regular.iter().map(|e| *e.key()).collect()
    }
}
