//! Thin RPC-layer wrappers for the XA verbs (spec §4.9, §6). Each handler
//! resolves the session's XA registry, converts the wire `Xid` form, and
//! delegates straight to `XaTransactionRegistry` — all the protocol logic
//! already lives there.

use std::sync::Arc;

use tracing::instrument;

use crate::error::{OjpError, Result};
use crate::rpc::context::Context;
use crate::rpc::messages::{
    WireXid, XaCommitRequest, XaEndRequest, XaForgetRequest, XaGetTransactionTimeoutRequest, XaIsSameRmRequest, XaPrepareRequest,
    XaPrepareResponse, XaRecoverRequest, XaRecoverResponse, XaRollbackRequest, XaSetTransactionTimeoutRequest, XaStartRequest,
};
use crate::session::Session;
use crate::xa::{XaTransactionRegistry, Xid};

fn registry_for(ctx: &Context, session: &Arc<Session>) -> Result<Arc<XaTransactionRegistry>> {
    ctx.pool_registry
        .xa_registry(session.fingerprint)
        .ok_or_else(|| OjpError::Unsupported("session's pool has no xa registry".into()))
}

#[instrument(skip(ctx, req))]
pub async fn xa_start(ctx: &Context, req: XaStartRequest) -> Result<()> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    *session.xid.lock().await = Some(xid.clone());
    let backend_session = session
        .backend_session
        .clone()
        .ok_or_else(|| OjpError::Unsupported("xaStart on a session with no bound xa backend session".into()))?;
    registry.xa_start(xid, req.flags, backend_session).await
}

#[instrument(skip(ctx, req))]
pub async fn xa_end(ctx: &Context, req: XaEndRequest) -> Result<()> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    registry.xa_end(&xid, req.flags).await
}

#[instrument(skip(ctx, req))]
pub async fn xa_prepare(ctx: &Context, req: XaPrepareRequest) -> Result<XaPrepareResponse> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    let vote = registry.xa_prepare(&xid).await?;
    Ok(XaPrepareResponse { vote })
}

#[instrument(skip(ctx, req))]
pub async fn xa_commit(ctx: &Context, req: XaCommitRequest) -> Result<()> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    registry.xa_commit(&xid, req.one_phase).await?;
    *session.xid.lock().await = None;
    Ok(())
}

#[instrument(skip(ctx, req))]
pub async fn xa_rollback(ctx: &Context, req: XaRollbackRequest) -> Result<()> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    registry.xa_rollback(&xid).await?;
    *session.xid.lock().await = None;
    Ok(())
}

#[instrument(skip(ctx, req))]
pub async fn xa_recover(ctx: &Context, req: XaRecoverRequest) -> Result<XaRecoverResponse> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xids = registry.xa_recover(req.flags).await?;
    Ok(XaRecoverResponse {
        xids: xids.iter().map(WireXid::from).collect(),
    })
}

#[instrument(skip(ctx, req))]
pub async fn xa_forget(ctx: &Context, req: XaForgetRequest) -> Result<()> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    registry.xa_forget(&xid).await
}

#[instrument(skip(ctx, req))]
pub async fn xa_set_transaction_timeout(ctx: &Context, req: XaSetTransactionTimeoutRequest) -> Result<()> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    registry.xa_set_transaction_timeout(&xid, req.seconds).await
}

#[instrument(skip(ctx, req))]
pub async fn xa_get_transaction_timeout(ctx: &Context, req: XaGetTransactionTimeoutRequest) -> Result<i32> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    registry.xa_get_transaction_timeout(&xid)
}

#[instrument(skip(ctx, req))]
pub async fn xa_is_same_rm(ctx: &Context, req: XaIsSameRmRequest) -> Result<bool> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let registry = registry_for(ctx, &session)?;
    let xid: Xid = req.xid.into();
    let other: Xid = req.other_xid.into();
    registry.xa_is_same_rm(&xid, &other).await
}
