//! Session (spec §3, C3): the in-memory holder for one client's logical
//! connection and everything it owns. Owned exclusively by the Session
//! Manager (`manager.rs`); every other component reaches a session's
//! resources only through a handler holding its write lock.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::backend::{BackendConnection, ResultCursor};
use crate::common::{now_millis, ClientId, ConnectionFingerprint, LobId, MonotonicMillis, ResultSetId, SessionId, StatementId};
use crate::xa::{XaBackendSession, Xid};

pub struct Statement {
    pub sql: String,
}

pub struct ResultSet {
    pub columns: Vec<crate::backend::ColumnMeta>,
    pub cursor: AsyncMutex<Box<dyn ResultCursor>>,
}

/// Tracks an in-flight LOB stream so the cleanup reaper can refuse to
/// terminate a session mid-stream (spec §9 open question, resolved in
/// `DESIGN.md`: the reaper checks this flag before terminating).
pub struct LobHandle {
    pub streaming: AtomicBool,
}

/// One client's logical connection and everything it owns (spec §3).
/// `lock` is the per-session write lock from §5: every RPC handler
/// acquires it before touching any field below, and holds it across
/// `.await` points for the duration of the operation.
pub struct Session {
    pub session_id: SessionId,
    pub fingerprint: ConnectionFingerprint,
    pub client_id: ClientId,
    pub is_xa: bool,

    pub connection: Arc<dyn BackendConnection>,
    pub backend_session: Option<Arc<XaBackendSession>>,
    pub xid: AsyncMutex<Option<Xid>>,

    pub statements: DashMap<StatementId, Statement>,
    pub result_sets: DashMap<ResultSetId, ResultSet>,
    pub lobs: DashMap<LobId, Arc<LobHandle>>,
    pub attributes: DashMap<String, String>,

    created_at: MonotonicMillis,
    last_activity_at: AtomicI64,
    pub transaction_timeout_seconds: AtomicI64,
    /// Local (non-XA) transaction in progress, toggled by `startTransaction`/
    /// `commitTransaction`/`rollbackTransaction` (spec §6). Unused for XA
    /// sessions, whose transaction state lives in the XA registry's
    /// `TxContext` instead.
    in_transaction: AtomicBool,
    closed: AtomicBool,

    /// Serializes concurrent RPCs against this session (spec §5: "JDBC
    /// connections are not thread-safe"). `()`-valued because the data it
    /// protects lives in the `DashMap`s above, not behind the mutex itself.
    pub lock: AsyncMutex<()>,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        fingerprint: ConnectionFingerprint,
        client_id: ClientId,
        is_xa: bool,
        connection: Arc<dyn BackendConnection>,
        backend_session: Option<Arc<XaBackendSession>>,
    ) -> Self {
        let now = now_millis() as i64;
        Self {
            session_id,
            fingerprint,
            client_id,
            is_xa,
            connection,
            backend_session,
            xid: AsyncMutex::new(None),
            statements: DashMap::new(),
            result_sets: DashMap::new(),
            lobs: DashMap::new(),
            attributes: DashMap::new(),
            created_at: now as MonotonicMillis,
            last_activity_at: AtomicI64::new(now),
            transaction_timeout_seconds: AtomicI64::new(0),
            in_transaction: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            lock: AsyncMutex::new(()),
        }
    }

    pub fn touch(&self) {
        self.last_activity_at.store(now_millis() as i64, Ordering::Relaxed);
    }

    pub fn last_activity_at(&self) -> MonotonicMillis {
        self.last_activity_at.load(Ordering::Relaxed) as MonotonicMillis
    }

    pub fn created_at(&self) -> MonotonicMillis {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// True while any LOB owned by this session is mid-stream (spec §9:
    /// the cleanup sweep must refuse to terminate such a session).
    pub fn has_active_lob_stream(&self) -> bool {
        self.lobs.iter().any(|e| e.value().streaming.load(Ordering::Acquire))
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    pub fn set_in_transaction(&self, value: bool) {
        self.in_transaction.store(value, Ordering::Release);
    }
}
