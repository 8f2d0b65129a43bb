//! `connect` / `terminateSession` handlers (spec §4.2, §4.6, §6).
//!
//! On first use of a fingerprint, resolves a driver and selects a pool
//! provider to populate the pool registry (spec §4.2 "put-if-absent...
//! created by the connect handler on first use"); every subsequent
//! `connect` for the same fingerprint reuses the existing pool.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::acquire::{acquire, WaiterGauge};
use crate::backend::BackendConnection;
use crate::common::DatabaseFlavor;
use crate::error::{OjpError, Result};
use crate::fingerprint::ConnectionFingerprint;
use crate::pool_registry::UnpooledConnectionDetails;
use crate::rpc::context::Context;
use crate::rpc::messages::{ConnectionDetails, SessionInfo, TransactionInfo, TransactionStatus};
use crate::xa::{XaBackendPool, XaLogicalConnection, XaTransactionRegistry};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REGULAR_MAX_SIZE: usize = 20;
const DEFAULT_REGULAR_MIN_IDLE: usize = 2;

#[instrument(skip(ctx, details), fields(url = %details.url, is_xa = details.is_xa))]
pub async fn connect(ctx: &Context, details: ConnectionDetails) -> Result<SessionInfo> {
    let flavor = DatabaseFlavor::from_url(&details.url);
    let fp = ConnectionFingerprint::compute(&details.url, &details.user, &details.password, details.is_xa, &details.properties);
    ctx.pool_registry.record_flavor(fp, flavor);

    ensure_regular_entry(ctx, fp, &details).await?;
    if details.is_xa && ctx.config.xa_connection_pool_enabled {
        ensure_xa_entry(ctx, fp, &details).await?;
    }

    let (connection, backend_session): (Arc<dyn BackendConnection>, _) = if details.is_xa {
        let registry = ctx
            .pool_registry
            .xa_registry(fp)
            .ok_or_else(|| OjpError::Unsupported("xa requested with no xa pool provider registered".into()))?;
        let session = registry.pool().borrow(ACQUIRE_TIMEOUT).await.map_err(OjpError::from)?;
        (Arc::new(XaLogicalConnection(session.clone())), Some(session))
    } else if let Some(pool) = ctx.pool_registry.regular_pool(fp) {
        let waiters = WaiterGauge::new();
        let conn = acquire(&pool, &waiters, ACQUIRE_TIMEOUT).await.map_err(OjpError::from)?;
        (conn, None)
    } else {
        let unpooled = ctx
            .pool_registry
            .unpooled_regular(fp)
            .expect("ensure_regular_entry always registers one of pooled/unpooled");
        let driver = ctx.driver_resolver.resolve(&unpooled.url, &unpooled.user, &unpooled.password).await?;
        let conn: Arc<dyn BackendConnection> = Arc::from(driver.connect().await?);
        (conn, None)
    };

    let session = ctx.session_manager.create(fp, details.client_id, details.is_xa, connection, backend_session);

    Ok(SessionInfo {
        fingerprint: fp.to_string(),
        client_id: details.client_id,
        session_id: session.session_id,
        is_xa: details.is_xa,
        target_server: String::new(),
        cluster_health: Vec::new(),
        transaction_info: TransactionInfo {
            status: TransactionStatus::None,
            transaction_id: None,
        },
    })
}

async fn ensure_regular_entry(ctx: &Context, fp: ConnectionFingerprint, details: &ConnectionDetails) -> Result<()> {
    if ctx.pool_registry.regular_pool(fp).is_some() || ctx.pool_registry.unpooled_regular(fp).is_some() {
        return Ok(());
    }
    match ctx.select_pool_provider() {
        Some(provider) => {
            let driver = ctx.driver_resolver.resolve(&details.url, &details.user, &details.password).await?;
            let pool = provider.create_pool(driver, DEFAULT_REGULAR_MAX_SIZE, DEFAULT_REGULAR_MIN_IDLE).await?;
            ctx.pool_registry.put_regular_pool_if_absent(fp, pool);
        }
        None => {
            ctx.pool_registry.put_unpooled_regular_if_absent(
                fp,
                UnpooledConnectionDetails {
                    url: details.url.clone(),
                    user: details.user.clone(),
                    password: details.password.clone(),
                    properties: details.properties.clone(),
                },
            );
        }
    }
    Ok(())
}

async fn ensure_xa_entry(ctx: &Context, fp: ConnectionFingerprint, details: &ConnectionDetails) -> Result<()> {
    if ctx.pool_registry.xa_registry(fp).is_some() {
        return Ok(());
    }
    let driver = ctx.driver_resolver.resolve(&details.url, &details.user, &details.password).await?;
    let per_node = ctx.xa_coordinator.per_node_allocation();
    let pool = XaBackendPool::new(driver, ctx.config.connection_pool_default_isolation, per_node, 0);
    let registry = Arc::new(XaTransactionRegistry::new(pool, ACQUIRE_TIMEOUT));
    ctx.pool_registry.put_xa_registry_if_absent(fp, registry);
    Ok(())
}

use crate::common::SessionId;
use crate::rpc::messages::SessionTerminationStatus;

#[instrument(skip(ctx))]
pub async fn terminate_session(ctx: &Context, session_id: SessionId) -> SessionTerminationStatus {
    ctx.session_manager.terminate(&ctx.pool_registry, session_id).await;
    SessionTerminationStatus {
        session_id,
        terminated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::FakeBackendDriver;
    use crate::backend::{BackendDriver, PoolProvider, RegularPool};
    use crate::config::OjpConfig;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct FakeDriverResolver;

    #[async_trait]
    impl crate::rpc::context::DriverResolver for FakeDriverResolver {
        async fn resolve(&self, _url: &str, _user: &str, _password: &str) -> Result<Arc<dyn BackendDriver>> {
            Ok(Arc::new(FakeBackendDriver::default()))
        }
    }

    struct FakeRegularPool {
        driver: Arc<dyn BackendDriver>,
        idle: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl RegularPool for FakeRegularPool {
        async fn borrow(&self, _timeout: Duration) -> Result<Arc<dyn BackendConnection>> {
            Ok(Arc::from(self.driver.connect().await?))
        }
        fn resize(&self, _max_size: usize, _min_idle: usize) {}
        fn borrowed_count(&self) -> usize {
            0
        }
        fn idle_count(&self) -> usize {
            self.idle.load(std::sync::atomic::Ordering::Relaxed)
        }
        fn max_size(&self) -> usize {
            20
        }
        fn force_invalidate_idle(&self, count: usize) {
            let current = self.idle.load(std::sync::atomic::Ordering::Relaxed);
            self.idle.fetch_sub(count.min(current), std::sync::atomic::Ordering::Relaxed);
        }
    }

    struct FakePoolProvider;

    #[async_trait]
    impl PoolProvider for FakePoolProvider {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn priority(&self) -> i32 {
            10
        }
        fn available(&self) -> bool {
            true
        }
        async fn create_pool(&self, driver: Arc<dyn BackendDriver>, _max_size: usize, _min_idle: usize) -> Result<Arc<dyn RegularPool>> {
            Ok(Arc::new(FakeRegularPool {
                driver,
                idle: std::sync::atomic::AtomicUsize::new(0),
            }))
        }
    }

    fn details(is_xa: bool) -> ConnectionDetails {
        ConnectionDetails {
            url: "jdbc:postgresql://db/app".into(),
            user: "u".into(),
            password: "p".into(),
            client_id: uuid::Uuid::new_v4(),
            is_xa,
            properties: BTreeMap::new(),
            server_endpoints: vec![],
        }
    }

    #[tokio::test]
    async fn connect_creates_pool_on_first_use_and_reuses_it() {
        let ctx = Context::new(OjpConfig::default(), Arc::new(FakeDriverResolver), vec![Arc::new(FakePoolProvider)]);
        let info1 = connect(&ctx, details(false)).await.unwrap();
        let info2 = connect(&ctx, details(false)).await.unwrap();
        assert_ne!(info1.session_id, info2.session_id);
        assert_eq!(ctx.session_manager.count(), 2);
    }

    #[tokio::test]
    async fn xa_connect_without_provider_still_creates_xa_pool() {
        let ctx = Context::new(OjpConfig::default(), Arc::new(FakeDriverResolver), vec![]);
        let info = connect(&ctx, details(true)).await.unwrap();
        assert!(info.is_xa);
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let ctx = Context::new(OjpConfig::default(), Arc::new(FakeDriverResolver), vec![Arc::new(FakePoolProvider)]);
        let info = connect(&ctx, details(false)).await.unwrap();
        let status1 = terminate_session(&ctx, info.session_id).await;
        let status2 = terminate_session(&ctx, info.session_id).await;
        assert!(status1.terminated);
        assert!(status2.terminated);
        assert!(ctx.session_manager.lookup(info.session_id).is_err());
    }
}
