//! `fetchNextRows` (spec §4.5, §6): streams rows from an already-open
//! result set in fixed-size batches.

use std::sync::Arc;

use crate::backend::Row;
use crate::common::ResultSetId;
use crate::error::{OjpError, Result};
use crate::session::Session;

pub struct FetchOutcome {
    pub rows: Vec<Row>,
    pub done: bool,
}

#[tracing::instrument(skip(session))]
pub async fn fetch_next_rows(session: &Arc<Session>, result_set_id: ResultSetId, max_rows: usize) -> Result<FetchOutcome> {
    let _guard = session.lock.lock().await;
    session.touch();
    let entry = session.result_sets.get(&result_set_id).ok_or(OjpError::UnknownId {
        kind: "resultSet",
        id: result_set_id.to_string(),
    })?;
    let mut cursor = entry.cursor.lock().await;
    let (rows, done) = cursor.fetch(max_rows).await?;
    drop(cursor);
    if done {
        drop(entry);
        session.result_sets.remove(&result_set_id);
    }
    Ok(FetchOutcome { rows, done })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::FakeBackendConnection;
    use crate::dispatch::query::execute_query;
    use crate::pool_registry::PoolRegistry;

    #[tokio::test]
    async fn fetch_completes_and_drops_exhausted_result_set() {
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
        let fetched = fetch_next_rows(&session, outcome.result_set_id, 100).await.unwrap();
        assert!(fetched.done);
        assert!(!session.result_sets.contains_key(&outcome.result_set_id));
    }

    #[tokio::test]
    async fn fetch_on_unknown_result_set_fails() {
        let fp = crate::common::ConnectionFingerprint::compute("u", "a", "b", false, &Default::default());
        let session = Arc::new(Session::new(
            uuid::Uuid::new_v4(),
            fp,
            uuid::Uuid::new_v4(),
            false,
            Arc::new(FakeBackendConnection::default()),
            None,
        ));
        let err = fetch_next_rows(&session, uuid::Uuid::new_v4(), 10).await.unwrap_err();
        assert!(matches!(err, OjpError::UnknownId { .. }));
    }
}
