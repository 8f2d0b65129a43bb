//! Batch add/execute (spec §4.5 "Parameter handling... batch add/execute
//! is a dedicated path"): applies one SQL statement across N parameter
//! sets, returning one update count per set.

use std::sync::Arc;

use crate::common::Value;
use crate::error::Result;
use crate::pool_registry::PoolRegistry;
use crate::session::Session;

#[tracing::instrument(skip(session, registry, batches))]
pub async fn execute_batch(session: &Arc<Session>, registry: &PoolRegistry, sql: &str, batches: &[Vec<Value>]) -> Result<Vec<u64>> {
    let _guard = session.lock.lock().await;
    let mut counts = Vec::with_capacity(batches.len());
    for params in batches {
        let count = super::dispatch_guarded(session, registry, sql, |_executor| async { session.connection.execute_update(sql, params).await }).await?;
        counts.push(count);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::FakeBackendConnection;

    #[tokio::test]
    async fn batch_returns_one_count_per_parameter_set() {
        let fp = crate::common::ConnectionFingerprint::compute("u", "a", "b", false, &Default::default());
        let session = Arc::new(Session::new(
            uuid::Uuid::new_v4(),
            fp,
            uuid::Uuid::new_v4(),
            false,
            Arc::new(FakeBackendConnection::default()),
            None,
        ));
        let registry = PoolRegistry::new();
        let batches = vec![vec![Value::Integer(1)], vec![Value::Integer(2)], vec![Value::Integer(3)]];
        let counts = execute_batch(&session, &registry, "INSERT INTO t(x) VALUES (?)", &batches).await.unwrap();
        assert_eq!(counts.len(), 3);
    }
}
