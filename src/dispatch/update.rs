//! `executeUpdate` (spec §4.5, §6).

use std::sync::Arc;

use crate::common::Value;
use crate::error::Result;
use crate::pool_registry::PoolRegistry;
use crate::session::Session;

#[tracing::instrument(skip(session, registry, params))]
pub async fn execute_update(session: &Arc<Session>, registry: &PoolRegistry, sql: &str, params: &[Value]) -> Result<u64> {
    let _guard = session.lock.lock().await;
    super::dispatch_guarded(session, registry, sql, |_executor| async { session.connection.execute_update(sql, params).await }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::FakeBackendConnection;
    use crate::session::Session;

    #[tokio::test]
    async fn update_touches_session_activity() {
        let fp = crate::common::ConnectionFingerprint::compute("u", "a", "b", false, &Default::default());
        let session = Arc::new(Session::new(
            uuid::Uuid::new_v4(),
            fp,
            uuid::Uuid::new_v4(),
            false,
            Arc::new(FakeBackendConnection::default()),
            None,
        ));
        let before = session.last_activity_at();
        let registry = PoolRegistry::new();
        let affected = execute_update(&session, &registry, "UPDATE t SET x = 1", &[]).await.unwrap();
        assert_eq!(affected, 0);
        assert!(session.last_activity_at() >= before);
    }
}
