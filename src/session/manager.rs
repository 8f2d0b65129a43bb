//! Session Manager (spec §4.6, C4): lifecycle of sessions keyed by UUID.
//! Grounded on the teacher's `pool_registry.rs` put-if-absent/DashMap
//! idiom, generalized to two linked maps: `sessionId -> Session` and
//! `clientId -> set<sessionId>` for fan-out terminate by client.

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::backend::BackendConnection;
use crate::common::{ClientId, ConnectionFingerprint, SessionId};
use crate::error::{OjpError, Result};
use crate::pool_registry::PoolRegistry;
use crate::session::types::Session;
use crate::xa::XaBackendSession;

#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<Session>>,
    by_client: DashMap<ClientId, DashSet<SessionId>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, connection, backend_session))]
    pub fn create(
        &self,
        fingerprint: ConnectionFingerprint,
        client_id: ClientId,
        is_xa: bool,
        connection: Arc<dyn BackendConnection>,
        backend_session: Option<Arc<XaBackendSession>>,
    ) -> Arc<Session> {
        let session_id = uuid::Uuid::new_v4();
        let session = Arc::new(Session::new(session_id, fingerprint, client_id, is_xa, connection, backend_session));
        self.sessions.insert(session_id, session.clone());
        self.by_client.entry(client_id).or_default().insert(session_id);
        info!(%session_id, %client_id, is_xa, "session created");
        session
    }

    pub fn lookup(&self, session_id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .get(&session_id)
            .map(|e| e.value().clone())
            .ok_or(OjpError::UnknownId {
                kind: "session",
                id: session_id.to_string(),
            })
    }

    pub fn sessions_for_client(&self, client_id: ClientId) -> Vec<SessionId> {
        self.by_client.get(&client_id).map(|s| s.iter().map(|id| *id).collect()).unwrap_or_default()
    }

    pub fn all_session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Crash-safe, idempotent terminate: removing an already-removed
    /// session is a no-op, not an error (spec §4.6 "idempotent"). Takes
    /// the pool registry so an XA session's backend session goes back
    /// through `XaBackendPool::release` — the only path that restores the
    /// semaphore permit `borrow()` forgot — instead of being closed
    /// directly, which would leak pool capacity.
    #[instrument(skip(self, pool_registry))]
    pub async fn terminate(&self, pool_registry: &PoolRegistry, session_id: SessionId) {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return;
        };
        if let Some(set) = self.by_client.get(&session.client_id) {
            set.remove(&session_id);
        }
        session.mark_closed();

        for entry in session.result_sets.iter() {
            drop(entry.value().cursor.lock().await);
        }
        session.result_sets.clear();
        session.statements.clear();
        session.lobs.clear();

        if let Err(e) = session.connection.close().await {
            warn!(%session_id, error = %e, "error closing session connection during terminate");
        }
        if let Some(backend_session) = &session.backend_session {
            // A completed xaCommit/xaRollback already released this
            // session back to the pool (possibly to another borrower by
            // now) — only release it here if this session still holds the
            // checkout, otherwise we'd release it a second time.
            if backend_session.is_checked_out() {
                if let Some(registry) = pool_registry.xa_registry(session.fingerprint) {
                    registry.pool().release(backend_session.clone()).await;
                } else {
                    warn!(%session_id, "xa session has no registered pool to release into; closing instead");
                    if let Err(e) = backend_session.xa_connection.close().await {
                        warn!(%session_id, error = %e, "error closing xa backend session during terminate");
                    }
                }
            }
        }
        info!(%session_id, "session terminated");
    }
}
