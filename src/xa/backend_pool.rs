//! XA Backend Session Pool (spec §4.4, C10): a generic pool of
//! `XABackendSession`, each wrapping one physical `XAConnection` (and its
//! derived logical connection). Grounded on the teacher's
//! `pool/connection/lifecycle.rs` activate/passivate/reset idiom, adapted
//! so passivation resets transaction isolation — a correctness
//! requirement (spec §8 "Isolation reset"), not an optimization.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::backend::{BackendConnection, BackendDriver, ColumnMeta, IsolationLevel, LobSink, LobSource, ResultCursor, XaConnection};
use crate::common::Value;
use crate::error::{OjpError, Result};
use crate::xa::types::XaError;

/// One physical XA connection on loan from the pool (spec §3
/// `XABackendSession`).
pub struct XaBackendSession {
    pub id: u64,
    pub xa_connection: Box<dyn XaConnection>,
    healthy: AtomicBool,
    last_validated_at: Mutex<Instant>,
    borrowed_at: Mutex<Option<Instant>>,
}

impl XaBackendSession {
    fn new(id: u64, xa_connection: Box<dyn XaConnection>) -> Self {
        Self {
            id,
            xa_connection,
            healthy: AtomicBool::new(true),
            last_validated_at: Mutex::new(Instant::now()),
            borrowed_at: Mutex::new(None),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Release);
    }

    /// True from `borrow()` until the matching `release()` clears it —
    /// lets a caller holding onto this session outside the pool (e.g. a
    /// `Session`) tell whether it still owns the checkout or whether the
    /// pool has already taken it back.
    pub fn is_checked_out(&self) -> bool {
        self.borrowed_at.lock().is_some()
    }
}

struct Idle {
    session: Arc<XaBackendSession>,
    idled_at: Instant,
}

struct PoolState {
    idle: VecDeque<Idle>,
    borrowed: usize,
    created: usize,
}

/// Bounded pool of `XaBackendSession`. One housekeeping task per pool
/// (spec §4.4 "a single scheduled worker per pool").
pub struct XaBackendPool {
    driver: Arc<dyn BackendDriver>,
    default_isolation: IsolationLevel,
    max_size: Mutex<usize>,
    min_idle: Mutex<usize>,
    leak_threshold: Duration,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
    shutdown: Arc<AtomicBool>,
}

impl XaBackendPool {
    pub fn new(driver: Arc<dyn BackendDriver>, default_isolation: IsolationLevel, max_size: usize, min_idle: usize) -> Arc<Self> {
        let pool = Arc::new(Self {
            driver,
            default_isolation,
            max_size: Mutex::new(max_size),
            min_idle: Mutex::new(min_idle),
            leak_threshold: Duration::from_secs(300),
            semaphore: Arc::new(Semaphore::new(max_size)),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                borrowed: 0,
                created: 0,
            }),
            next_id: AtomicU64::new(1),
            shutdown: Arc::new(AtomicBool::new(false)),
        });
        pool.clone().spawn_housekeeping();
        pool
    }

    /// Adjusts pool bounds in place without disturbing pinned sessions
    /// (spec §4.3 `resizeBackendPool`). Growing the semaphore adds
    /// permits immediately; shrinking lets outstanding borrows drain
    /// naturally — we never forcibly evict a pinned branch.
    pub fn resize(&self, max_size: usize, min_idle: usize) {
        let mut cur_max = self.max_size.lock();
        if max_size > *cur_max {
            self.semaphore.add_permits(max_size - *cur_max);
        }
        *cur_max = max_size;
        *self.min_idle.lock() = min_idle;
    }

    pub fn borrowed_count(&self) -> usize {
        self.state.lock().borrowed
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn max_size(&self) -> usize {
        *self.max_size.lock()
    }

    /// Borrows a session, bounded by `timeout`. Activation validates the
    /// underlying physical connection is reachable; a dead idle session is
    /// discarded and a fresh one opened instead of being handed back.
    pub async fn borrow(self: &Arc<Self>, timeout: Duration) -> Result<Arc<XaBackendSession>> {
        let permit = tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| OjpError::from(XaError::RmErr("xa pool exhausted".into())))?
            .expect("semaphore not closed");
        permit.forget();

        loop {
            let candidate = {
                let mut state = self.state.lock();
                state.idle.pop_front()
            };
            let session = match candidate {
                Some(idle) => {
                    if idle.session.xa_connection.is_valid().await {
                        idle.session
                    } else {
                        self.state.lock().created -= 1;
                        continue;
                    }
                }
                None => {
                    let conn = self.driver.connect_xa().await?;
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    self.state.lock().created += 1;
                    Arc::new(XaBackendSession::new(id, conn))
                }
            };
            *session.borrowed_at.lock() = Some(Instant::now());
            let mut state = self.state.lock();
            state.borrowed += 1;
            return Ok(session);
        }
    }

    /// Passivates and returns a session to the pool: unconditionally rolls
    /// back the logical connection (cheaper than querying autocommit state
    /// first, and a no-op on a connection with nothing pending), resets
    /// isolation to the configured default, clears borrowed-timestamp
    /// bookkeeping (spec §4.4, testable as "Isolation reset" in §8).
    pub async fn release(&self, session: Arc<XaBackendSession>) {
        *session.borrowed_at.lock() = None;
        {
            let mut state = self.state.lock();
            state.borrowed = state.borrowed.saturating_sub(1);
        }
        self.semaphore.add_permits(1);

        if !session.is_healthy() {
            self.state.lock().created -= 1;
            return;
        }

        let logical = session.xa_connection.logical_connection();
        let reset_ok = logical.rollback().await.is_ok()
            && logical.set_transaction_isolation(self.default_isolation).await.is_ok();
        if !reset_ok {
            session.mark_unhealthy();
            self.state.lock().created -= 1;
            return;
        }

        *session.last_validated_at.lock() = Instant::now();
        self.state.lock().idle.push_back(Idle {
            session,
            idled_at: Instant::now(),
        });
    }

    /// Marks the given idle sessions (by id) invalid so the next borrow
    /// skips them and opens fresh ones instead — the mechanism the
    /// redistributor (C16) uses to rebalance after recovery (spec §4.8).
    pub fn force_invalidate_idle(&self, ids: &[u64]) {
        let mut state = self.state.lock();
        for idle in state.idle.iter() {
            if ids.contains(&idle.session.id) {
                idle.session.mark_unhealthy();
            }
        }
        state.idle.retain(|idle| idle.session.is_healthy());
    }

    /// Oldest-first snapshot of idle session ids and their idle-since
    /// instant, for the redistributor's "sorted by oldest lastUsedAt"
    /// selection (spec §4.8).
    pub fn idle_oldest_first(&self) -> Vec<(u64, Instant)> {
        let state = self.state.lock();
        let mut v: Vec<_> = state.idle.iter().map(|i| (i.session.id, i.idled_at)).collect();
        v.sort_by_key(|(_, t)| *t);
        v
    }

    fn spawn_housekeeping(self: Arc<Self>) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                self.scan_for_leaks();
            }
        });
    }

    fn scan_for_leaks(&self) {
        // Idle sessions have no borrowed_at set; only a borrowed-but-not-
        // returned session can leak. We only have visibility into idle
        // ones plus the aggregate borrowed count here, so leak detection
        // logs at the pool level — per-session detail requires the XA
        // registry's TxContext map (see registry.rs's own sweep).
        let state = self.state.lock();
        if state.borrowed > 0 && state.idle.is_empty() && state.created >= *self.max_size.lock() {
            warn!(borrowed = state.borrowed, "xa backend pool fully checked out; possible leak");
        }
    }
}

impl Drop for XaBackendPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// Exposes an XA backend session's logical connection as a plain
/// `Arc<dyn BackendConnection>`, so a `Session` can hold `connection`
/// uniformly whether or not it is XA-bound (spec §3: "for XA, derived
/// from the bound XAConnection").
pub struct XaLogicalConnection(pub Arc<XaBackendSession>);

#[async_trait]
impl BackendConnection for XaLogicalConnection {
    async fn execute_update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.0.xa_connection.logical_connection().execute_update(sql, params).await
    }
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<(Vec<ColumnMeta>, Box<dyn ResultCursor>)> {
        self.0.xa_connection.logical_connection().execute_query(sql, params).await
    }
    async fn is_valid(&self) -> bool {
        self.0.xa_connection.logical_connection().is_valid().await
    }
    async fn set_autocommit(&self, autocommit: bool) -> Result<()> {
        self.0.xa_connection.logical_connection().set_autocommit(autocommit).await
    }
    async fn commit(&self) -> Result<()> {
        self.0.xa_connection.logical_connection().commit().await
    }
    async fn rollback(&self) -> Result<()> {
        self.0.xa_connection.logical_connection().rollback().await
    }
    async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        self.0.xa_connection.logical_connection().set_transaction_isolation(level).await
    }
    async fn close(&self) -> Result<()> {
        // The XA connection itself is closed when the pool releases or
        // invalidates the backend session, not by the session's own close
        // path (spec §3 invariant: "closing an XA session closes the
        // XAConnection, not the logical connection directly").
        Ok(())
    }
    async fn open_lob_sink(&self, lob_id: &str) -> Result<Box<dyn LobSink>> {
        self.0.xa_connection.logical_connection().open_lob_sink(lob_id).await
    }
    async fn open_lob_source(&self, lob_id: &str, block_size: usize) -> Result<Box<dyn LobSource>> {
        self.0.xa_connection.logical_connection().open_lob_source(lob_id, block_size).await
    }
}
