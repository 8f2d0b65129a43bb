//! XA Transaction Registry (spec §4.3, C11) — the hardest subsystem.
//!
//! Per-pool state machine mapping `XidKey -> TxContext`. Pins a borrowed
//! `XaBackendSession` for the lifetime of a branch (start -> end ->
//! prepare -> commit/rollback), and performs recovery against the
//! backend's own prepared-transaction log — there is no cross-node shared
//! state (spec §1 non-goals); the transaction manager is the sole
//! authority and this registry is its per-node execution surface.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::backend::XaFlags;
use crate::error::{OjpError, Result};
use crate::xa::backend_pool::{XaBackendPool, XaBackendSession};
use crate::xa::types::{Xid, XaError, XaState, XaVote, XidKey};

/// A pinned transaction branch (spec §3 `TxContext`).
pub struct TxContext {
    pub xid_key: XidKey,
    pub backend_session: Arc<XaBackendSession>,
    pub state: XaState,
    /// The exact `Xid` object presented at `xaStart`, reused verbatim for
    /// every subsequent backend call on this branch (spec §3, §9).
    pub origin_xid: Xid,
}

/// Per-pool XA state machine. One instance per backend pool fingerprint
/// (owned by `PoolRegistry`).
pub struct XaTransactionRegistry {
    pool: Arc<XaBackendPool>,
    contexts: DashMap<XidKey, Mutex<TxContext>>,
    acquire_timeout: Duration,
}

impl XaTransactionRegistry {
    pub fn new(pool: Arc<XaBackendPool>, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            contexts: DashMap::new(),
            acquire_timeout,
        }
    }

    pub fn pool(&self) -> &Arc<XaBackendPool> {
        &self.pool
    }

    /// `xaStart(xid, flags)` (spec §4.3). `backend_session` is the
    /// physical session already bound to the calling `Session` at connect
    /// time — the same connection all of that session's statement/LOB
    /// dispatch runs against. `xaStart` must pin exactly that connection
    /// into the new `TxContext`, never borrow a second one from the pool,
    /// or SQL run "inside" the branch would land on a different physical
    /// connection than the one enrolled in it.
    #[instrument(skip(self, xid, backend_session), fields(xid = ?XidKey::from(&xid)))]
    pub async fn xa_start(&self, xid: Xid, flags: XaFlags, backend_session: Arc<XaBackendSession>) -> Result<()> {
        let key = XidKey::from(&xid);
        match flags {
            XaFlags::NoFlags => {
                if self.contexts.contains_key(&key) {
                    return Err(OjpError::from(XaError::Proto(format!("{key:?} already has a context"))));
                }
                let session = backend_session;
                session
                    .xa_connection
                    .start(&xid, flags)
                    .await
                    .map_err(|e| XaError::RmFail(e.to_string()))?;
                self.contexts.insert(
                    key.clone(),
                    Mutex::new(TxContext {
                        xid_key: key,
                        backend_session: session,
                        state: XaState::Active,
                        origin_xid: xid,
                    }),
                );
                Ok(())
            }
            XaFlags::Join | XaFlags::Resume => {
                let entry = self
                    .contexts
                    .get(&key)
                    .ok_or_else(|| OjpError::from(XaError::Proto(format!("no context to {flags:?} for {key:?}"))))?;
                let mut ctx = entry.value().lock();
                ctx.state = ctx.state.transition(XaState::Active)?;
                ctx.backend_session
                    .xa_connection
                    .start(&ctx.origin_xid, flags)
                    .await
                    .map_err(|e| XaError::RmFail(e.to_string()))?;
                Ok(())
            }
            other => Err(OjpError::from(XaError::Proto(format!("unexpected flags for xaStart: {other:?}")))),
        }
    }

    /// `xaEnd(xid, flags)`.
    #[instrument(skip(self, xid), fields(xid = ?XidKey::from(xid)))]
    pub async fn xa_end(&self, xid: &Xid, flags: XaFlags) -> Result<()> {
        let key = XidKey::from(xid);
        let entry = self.contexts.get(&key).ok_or(XaError::NotA)?;
        let mut ctx = entry.value().lock();
        ctx.state = ctx.state.transition(XaState::Ended)?;
        ctx.backend_session
            .xa_connection
            .end(&ctx.origin_xid, flags)
            .await
            .map_err(|e| XaError::RmFail(e.to_string()))?;
        Ok(())
    }

    /// `xaPrepare(xid)`. On `XA_RDONLY`, unpins and returns the session
    /// immediately and drops the context (spec §4.3, scenario 2 in §8).
    #[instrument(skip(self, xid), fields(xid = ?XidKey::from(xid)))]
    pub async fn xa_prepare(&self, xid: &Xid) -> Result<XaVote> {
        let key = XidKey::from(xid);
        let vote = {
            let entry = self.contexts.get(&key).ok_or(XaError::NotA)?;
            let mut ctx = entry.value().lock();
            // Precondition: state = Ended. The transition call both
            // enforces and records this.
            ctx.state.transition(XaState::Prepared)?;
            let vote = ctx
                .backend_session
                .xa_connection
                .prepare(&ctx.origin_xid)
                .await
                .map_err(|e| XaError::RmFail(e.to_string()))?;
            ctx.state = match vote {
                XaVote::ReadOnly => XaState::Committed,
                XaVote::Ok => XaState::Prepared,
            };
            vote
        };
        if vote == XaVote::ReadOnly {
            let (_, session) = self.remove_and_take_session(&key)?;
            self.pool.release(session).await;
            info!("read-only prepare: session unpinned without a commit call");
        }
        Ok(vote)
    }

    /// `xaCommit(xid, onePhase)`. Idempotent on an already-`Committed`
    /// branch. Accepts xids with no known context by opening a temporary
    /// session (the recovery path, spec §4.3 "Commit/rollback of a
    /// previously-unknown xid MUST still be accepted").
    #[instrument(skip(self, xid), fields(xid = ?XidKey::from(xid)))]
    pub async fn xa_commit(&self, xid: &Xid, one_phase: bool) -> Result<()> {
        let key = XidKey::from(xid);
        let has_context = self.contexts.contains_key(&key);
        if !has_context {
            // Unknown xid: recovery path, no persistent context created.
            let session = self
                .pool
                .borrow(self.acquire_timeout)
                .await
                .map_err(|e| OjpError::from(XaError::RmErr(e.to_string())))?;
            let result = session.xa_connection.commit(xid, one_phase).await;
            self.pool.release(session).await;
            return result.map_err(|e| OjpError::from(XaError::RmFail(e.to_string())));
        }

        {
            let entry = self.contexts.get(&key).ok_or(XaError::NotA)?;
            let already_committed = matches!(entry.value().lock().state, XaState::Committed);
            if already_committed {
                return Ok(());
            }
            let mut ctx = entry.value().lock();
            ctx.state = ctx.state.transition(XaState::Committed)?;
            ctx.backend_session
                .xa_connection
                .commit(&ctx.origin_xid, one_phase)
                .await
                .map_err(|e| XaError::RmFail(e.to_string()))?;
        }
        let (_, session) = self.remove_and_take_session(&key)?;
        self.pool.release(session).await;
        Ok(())
    }

    /// `xaRollback(xid)`. Idempotent on an already-`RolledBack` branch;
    /// same unknown-xid recovery acceptance as commit.
    #[instrument(skip(self, xid), fields(xid = ?XidKey::from(xid)))]
    pub async fn xa_rollback(&self, xid: &Xid) -> Result<()> {
        let key = XidKey::from(xid);
        let has_context = self.contexts.contains_key(&key);
        if !has_context {
            let session = self
                .pool
                .borrow(self.acquire_timeout)
                .await
                .map_err(|e| OjpError::from(XaError::RmErr(e.to_string())))?;
            let result = session.xa_connection.rollback(xid).await;
            self.pool.release(session).await;
            return result.map_err(|e| OjpError::from(XaError::RmFail(e.to_string())));
        }

        {
            let entry = self.contexts.get(&key).ok_or(XaError::NotA)?;
            let already = matches!(entry.value().lock().state, XaState::RolledBack);
            if already {
                return Ok(());
            }
            let mut ctx = entry.value().lock();
            ctx.state = ctx.state.transition(XaState::RolledBack)?;
            ctx.backend_session
                .xa_connection
                .rollback(&ctx.origin_xid)
                .await
                .map_err(|e| XaError::RmFail(e.to_string()))?;
        }
        let (_, session) = self.remove_and_take_session(&key)?;
        self.pool.release(session).await;
        Ok(())
    }

    /// `xaRecover(flags)`. Borrows any backend session, asks the database,
    /// returns the driver's xids verbatim — the same `Arc` objects are
    /// reused if the caller later commits/rolls back one of them (spec
    /// §4.3, §9).
    #[instrument(skip(self))]
    pub async fn xa_recover(&self, flags: XaFlags) -> Result<Vec<Xid>> {
        let session = self
            .pool
            .borrow(self.acquire_timeout)
            .await
            .map_err(|e| OjpError::from(XaError::RmErr(e.to_string())))?;
        let result = session.xa_connection.recover(flags).await;
        self.pool.release(session).await;
        result.map_err(|e| OjpError::from(XaError::RmFail(e.to_string())))
    }

    /// `xaForget(xid)`.
    #[instrument(skip(self, xid), fields(xid = ?XidKey::from(xid)))]
    pub async fn xa_forget(&self, xid: &Xid) -> Result<()> {
        let key = XidKey::from(xid);
        if let Some((_, ctx)) = self.contexts.remove(&key) {
            let ctx = ctx.into_inner();
            ctx.backend_session
                .xa_connection
                .forget(&ctx.origin_xid)
                .await
                .map_err(|e| XaError::RmFail(e.to_string()))?;
            self.pool.release(ctx.backend_session).await;
        } else {
            let session = self
                .pool
                .borrow(self.acquire_timeout)
                .await
                .map_err(|e| OjpError::from(XaError::RmErr(e.to_string())))?;
            let result = session.xa_connection.forget(xid).await;
            self.pool.release(session).await;
            result.map_err(|e| XaError::RmFail(e.to_string()))?;
        }
        Ok(())
    }

    /// Trivial delegations on the bound session's `XAResource` (spec §4.3).
    pub async fn xa_set_transaction_timeout(&self, xid: &Xid, seconds: i32) -> Result<()> {
        let key = XidKey::from(xid);
        let entry = self.contexts.get(&key).ok_or(XaError::NotA)?;
        entry
            .value()
            .lock()
            .backend_session
            .xa_connection
            .set_transaction_timeout(seconds)
            .await
            .map_err(|e| XaError::RmFail(e.to_string()))?;
        Ok(())
    }

    pub fn xa_get_transaction_timeout(&self, xid: &Xid) -> Result<i32> {
        let key = XidKey::from(xid);
        let entry = self.contexts.get(&key).ok_or(XaError::NotA)?;
        let ctx = entry.value().lock();
        Ok(ctx.backend_session.xa_connection.get_transaction_timeout())
    }

    pub async fn xa_is_same_rm(&self, xid: &Xid, other_xid: &Xid) -> Result<bool> {
        let key = XidKey::from(xid);
        let other_key = XidKey::from(other_xid);
        let entry = self.contexts.get(&key).ok_or(XaError::NotA)?;
        let other = self.contexts.get(&other_key).ok_or(XaError::NotA)?;
        let same = entry
            .value()
            .lock()
            .backend_session
            .xa_connection
            .is_same_rm(other.value().lock().backend_session.xa_connection.as_ref())
            .await
            .map_err(|e| XaError::RmFail(e.to_string()))?;
        Ok(same)
    }

    /// Number of live `TxContext`s pinning a backend session (for
    /// diagnostics and the leak-detection sweep).
    pub fn active_branch_count(&self) -> usize {
        self.contexts.len()
    }

    fn remove_and_take_session(&self, key: &XidKey) -> Result<(XidKey, Arc<XaBackendSession>)> {
        let (_, ctx) = self.contexts.remove(key).ok_or(XaError::NotA)?;
        let ctx = ctx.into_inner();
        Ok((ctx.xid_key, ctx.backend_session))
    }

    /// Logs a diagnostic when branches remain pinned — we only warn, we
    /// never force a state transition, since only the transaction manager
    /// may decide a branch's outcome.
    pub fn warn_on_pinned_branches(&self) {
        let n = self.contexts.len();
        if n > 0 {
            warn!(active = n, "xa registry has pinned branches");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::{FakeBackendDriver, FakeXaConnection};
    use crate::backend::IsolationLevel;
    use crate::xa::types::XidData;
    use std::sync::Arc;

    fn xid(format_id: i32, gtrid: u8, bqual: u8) -> Xid {
        Arc::new(XidData {
            format_id,
            gtrid: vec![gtrid],
            bqual: vec![bqual],
        })
    }

    async fn registry() -> XaTransactionRegistry {
        let driver = Arc::new(FakeBackendDriver::default());
        let pool = XaBackendPool::new(driver, IsolationLevel::ReadCommitted, 4, 0);
        XaTransactionRegistry::new(pool, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn two_phase_commit_happy_path() {
        let reg = registry().await;
        let x = xid(1, 0x01, 0x02);
        let session = reg.pool().borrow(Duration::from_secs(1)).await.unwrap();
        reg.xa_start(x.clone(), XaFlags::NoFlags, session).await.unwrap();
        reg.xa_end(&x, XaFlags::Success).await.unwrap();
        let vote = reg.xa_prepare(&x).await.unwrap();
        assert_eq!(vote, XaVote::Ok);
        reg.xa_commit(&x, false).await.unwrap();
        assert_eq!(reg.active_branch_count(), 0);
        assert_eq!(reg.pool().borrowed_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_commit_is_idempotent() {
        let reg = registry().await;
        let x = xid(1, 0xAA, 0xBB);
        let session = reg.pool().borrow(Duration::from_secs(1)).await.unwrap();
        reg.xa_start(x.clone(), XaFlags::NoFlags, session).await.unwrap();
        reg.xa_end(&x, XaFlags::Success).await.unwrap();
        reg.xa_prepare(&x).await.unwrap();
        reg.xa_commit(&x, false).await.unwrap();
        // No context remains; this now takes the recovery path and must
        // still succeed (spec §7 idempotent commit/rollback).
        reg.xa_commit(&x, false).await.unwrap();
    }

    #[tokio::test]
    async fn double_start_without_flags_is_proto_error() {
        let reg = registry().await;
        let x = xid(1, 0x01, 0x02);
        let session = reg.pool().borrow(Duration::from_secs(1)).await.unwrap();
        reg.xa_start(x.clone(), XaFlags::NoFlags, session).await.unwrap();
        let second_session = reg.pool().borrow(Duration::from_secs(1)).await.unwrap();
        let err = reg.xa_start(x, XaFlags::NoFlags, second_session).await.unwrap_err();
        assert!(matches!(err, OjpError::Xa(XaError::Proto(_))));
    }

    #[tokio::test]
    async fn xid_identity_preserved_through_driver_calls() {
        let reg = registry().await;
        let x = xid(7, 0x09, 0x10);
        let session = reg.pool().borrow(Duration::from_secs(1)).await.unwrap();
        reg.xa_start(x.clone(), XaFlags::NoFlags, session).await.unwrap();
        reg.xa_end(&x, XaFlags::Success).await.unwrap();
        reg.xa_prepare(&x).await.unwrap();
        reg.xa_commit(&x, false).await.unwrap();

        let seen = FakeXaConnection::last_seen_xid();
        assert!(Arc::ptr_eq(&seen.unwrap(), &x));
    }

    /// `xaStart` must pin the session it's given, never borrow a second
    /// one from the pool — the whole point of passing `backend_session` in
    /// rather than letting the registry borrow its own.
    #[tokio::test]
    async fn xa_start_does_not_borrow_a_second_session() {
        let reg = registry().await;
        let x = xid(1, 0x55, 0x66);
        let session = reg.pool().borrow(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reg.pool().borrowed_count(), 1);
        reg.xa_start(x.clone(), XaFlags::NoFlags, session).await.unwrap();
        assert_eq!(reg.pool().borrowed_count(), 1);
        reg.xa_end(&x, XaFlags::Success).await.unwrap();
        reg.xa_prepare(&x).await.unwrap();
        reg.xa_commit(&x, false).await.unwrap();
        assert_eq!(reg.pool().borrowed_count(), 0);
        assert_eq!(reg.pool().idle_count(), 1);
    }
}
