//! Shared immutable `Context` (spec §9: "each handler is stateless,
//! sharing a single immutable Context holding references to all
//! registries and services").

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{BackendDriver, PoolProvider};
use crate::cluster_health::ClusterHealthTracker;
use crate::config::OjpConfig;
use crate::error::Result;
use crate::pool_registry::PoolRegistry;
use crate::session::SessionManager;
use crate::xa::XaBudgetCoordinator;

/// Opens a `BackendDriver` for a resolved `{url, user, password}` tuple.
/// Stands in for the classpath-driver-loading step the source performs
/// (spec §1(a): the core depends on a `BackendDriver` abstraction, never
/// a concrete JDBC driver) — the embedding binary supplies the concrete
/// implementation at process init.
#[async_trait]
pub trait DriverResolver: Send + Sync {
    async fn resolve(&self, url: &str, user: &str, password: &str) -> Result<Arc<dyn BackendDriver>>;
}

pub struct Context {
    pub config: OjpConfig,
    pub pool_registry: Arc<PoolRegistry>,
    pub session_manager: Arc<SessionManager>,
    pub xa_coordinator: Arc<XaBudgetCoordinator>,
    pub cluster_health: Arc<ClusterHealthTracker>,
    pub driver_resolver: Arc<dyn DriverResolver>,
    /// Registered pool providers (spec §9: "explicit registration of pool
    /// providers at process init; selection is by declared priority, with
    /// a health-capability predicate").
    pub pool_providers: Vec<Arc<dyn PoolProvider>>,
}

impl Context {
    pub fn new(config: OjpConfig, driver_resolver: Arc<dyn DriverResolver>, pool_providers: Vec<Arc<dyn PoolProvider>>) -> Arc<Self> {
        let xa_coordinator = Arc::new(XaBudgetCoordinator::new(config.xa_max_transactions as usize));
        Arc::new(Self {
            config,
            pool_registry: Arc::new(PoolRegistry::new()),
            session_manager: Arc::new(SessionManager::new()),
            cluster_health: Arc::new(ClusterHealthTracker::new(xa_coordinator.clone())),
            xa_coordinator,
            driver_resolver,
            pool_providers,
        })
    }

    /// Highest-`priority` provider that reports itself `available()` (spec
    /// §9 provider selection: "a health-capability predicate").
    pub fn select_pool_provider(&self) -> Option<&Arc<dyn PoolProvider>> {
        self.pool_providers.iter().filter(|p| p.available()).max_by_key(|p| p.priority())
    }
}
