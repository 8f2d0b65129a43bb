//! `executeQuery` (spec §4.5, §6). Captures column metadata up front and
//! registers the cursor under a fresh result-set UUID for `fetchNextRows`
//! to stream from, per spec "Result set handling".

use std::sync::Arc;

use crate::backend::ColumnMeta;
use crate::common::{ResultSetId, Value};
use crate::error::Result;
use crate::pool_registry::PoolRegistry;
use crate::session::{ResultSet, Session};
use tokio::sync::Mutex as AsyncMutex;

pub struct QueryOutcome {
    pub result_set_id: ResultSetId,
    pub columns: Vec<ColumnMeta>,
}

#[tracing::instrument(skip(session, registry, params))]
pub async fn execute_query(session: &Arc<Session>, registry: &PoolRegistry, sql: &str, params: &[Value]) -> Result<QueryOutcome> {
    let _guard = session.lock.lock().await;
    let (columns, cursor) = super::dispatch_guarded(session, registry, sql, |_executor| async { session.connection.execute_query(sql, params).await }).await?;

    let result_set_id = uuid::Uuid::new_v4();
    session.result_sets.insert(
        result_set_id,
        ResultSet {
            columns: columns.clone(),
            cursor: AsyncMutex::new(cursor),
        },
    );
    // Vendor-specific quirk stash (spec §4.5: "drivers that eagerly close
    // result sets" need metadata retrievable independent of the cursor).
    session.attributes.insert(format!("resultset.{result_set_id}.columns"), format!("{}", columns.len()));

    Ok(QueryOutcome { result_set_id, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::FakeBackendConnection;

    #[tokio::test]
    async fn query_registers_a_result_set() {
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
        let outcome = execute_query(&session, &registry, "SELECT 1", &[]).await.unwrap();
        assert!(session.result_sets.contains_key(&outcome.result_set_id));
    }
}
