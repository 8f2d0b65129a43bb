//! `executeUpdate` / `executeQuery` / `fetchNextRows` RPC wrappers (spec
//! §4.5, §6): the batch-or-not variants are distinguished by whether
//! `StatementRequest.batch` is set, translating straight to
//! `dispatch::update`/`dispatch::query`/`dispatch::batch`/`dispatch::fetch`.

use tracing::instrument;

use crate::dispatch::{batch, fetch, query, update};
use crate::error::Result;
use crate::rpc::context::Context;
use crate::rpc::messages::{FetchRowsResponse, OpResult, ResultSetFetchRequest, StatementRequest};

#[instrument(skip(ctx, req), fields(sql = %req.sql))]
pub async fn execute_update(ctx: &Context, req: StatementRequest) -> Result<OpResult> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    if let Some(batches) = &req.batch {
        let counts = batch::execute_batch(&session, &ctx.pool_registry, &req.sql, batches).await?;
        return Ok(OpResult {
            batch_counts: counts,
            done: true,
            ..Default::default()
        });
    }
    let count = update::execute_update(&session, &ctx.pool_registry, &req.sql, &req.params).await?;
    Ok(OpResult {
        update_count: Some(count),
        done: true,
        ..Default::default()
    })
}

#[instrument(skip(ctx, req), fields(sql = %req.sql))]
pub async fn execute_query(ctx: &Context, req: StatementRequest) -> Result<OpResult> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let outcome = query::execute_query(&session, &ctx.pool_registry, &req.sql, &req.params).await?;
    Ok(OpResult {
        result_set_id: Some(outcome.result_set_id),
        columns: outcome.columns,
        done: true,
        ..Default::default()
    })
}

#[instrument(skip(ctx, req))]
pub async fn fetch_next_rows(ctx: &Context, req: ResultSetFetchRequest) -> Result<FetchRowsResponse> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let outcome = fetch::fetch_next_rows(&session, req.result_set_id, req.max_rows).await?;
    Ok(FetchRowsResponse {
        rows: outcome.rows,
        done: outcome.done,
    })
}
