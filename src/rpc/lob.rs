//! `createLob` / `readLob` RPC wrappers (spec §4.5 "LOB handling", §6).
//! The streaming transport itself is an external collaborator (spec §1);
//! here a call carries its full block sequence in one request/response,
//! which is what every transport binding ultimately reduces bidirectional
//! streaming calls to at the logical-message level.

use tracing::instrument;

use crate::error::Result;
use crate::lob::{self, LobDataBlock};
use crate::rpc::context::Context;
use crate::rpc::messages::{CreateLobRequest, LobDataBlockMsg, LobReferenceMsg, ReadLobRequest};

#[instrument(skip(ctx, req))]
pub async fn create_lob(ctx: &Context, req: CreateLobRequest) -> Result<LobReferenceMsg> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let mut blocks = req.blocks.into_iter();
    let reference = lob::create_lob(&session, || blocks.next().map(|b| LobDataBlock { data: b.data })).await?;
    Ok(LobReferenceMsg {
        lob_id: reference.lob_id,
        total_bytes: reference.total_bytes,
    })
}

#[instrument(skip(ctx, req))]
pub async fn read_lob(ctx: &Context, req: ReadLobRequest) -> Result<Vec<LobDataBlockMsg>> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let mut out = Vec::new();
    lob::read_lob(&session, req.lob_id, req.block_size, |block| out.push(LobDataBlockMsg { data: block.data })).await?;
    Ok(out)
}
