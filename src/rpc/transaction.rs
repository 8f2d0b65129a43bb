//! `startTransaction` / `commitTransaction` / `rollbackTransaction` (spec
//! §6). Only meaningful for non-XA sessions: an XA session's transaction
//! boundary is driven by `xaStart`/`xaEnd`/`xaCommit`/`xaRollback` instead
//! (spec §4.9), never by these three verbs.

use std::sync::Arc;

use tracing::instrument;

use crate::error::{OjpError, Result};
use crate::rpc::context::Context;
use crate::session::Session;

fn reject_xa(session: &Arc<Session>) -> Result<()> {
    if session.is_xa {
        return Err(OjpError::Unsupported("local transaction verbs do not apply to an XA-bound session".into()));
    }
    Ok(())
}

#[instrument(skip(ctx))]
pub async fn start_transaction(ctx: &Context, session_id: crate::common::SessionId) -> Result<()> {
    let session = ctx.session_manager.lookup(session_id)?;
    reject_xa(&session)?;
    let _guard = session.lock.lock().await;
    session.touch();
    session.connection.set_autocommit(false).await?;
    session.set_in_transaction(true);
    Ok(())
}

#[instrument(skip(ctx))]
pub async fn commit_transaction(ctx: &Context, session_id: crate::common::SessionId) -> Result<()> {
    let session = ctx.session_manager.lookup(session_id)?;
    reject_xa(&session)?;
    let _guard = session.lock.lock().await;
    session.touch();
    session.connection.commit().await?;
    session.connection.set_autocommit(true).await?;
    session.set_in_transaction(false);
    Ok(())
}

#[instrument(skip(ctx))]
pub async fn rollback_transaction(ctx: &Context, session_id: crate::common::SessionId) -> Result<()> {
    let session = ctx.session_manager.lookup(session_id)?;
    reject_xa(&session)?;
    let _guard = session.lock.lock().await;
    session.touch();
    session.connection.rollback().await?;
    session.connection.set_autocommit(true).await?;
    session.set_in_transaction(false);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::FakeBackendDriver;
    use crate::config::OjpConfig;
    use crate::rpc::connect::connect;
    use crate::rpc::messages::ConnectionDetails;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct FakeDriverResolver;

    #[async_trait]
    impl crate::rpc::context::DriverResolver for FakeDriverResolver {
        async fn resolve(&self, _url: &str, _user: &str, _password: &str) -> Result<Arc<dyn crate::backend::BackendDriver>> {
            Ok(Arc::new(FakeBackendDriver::default()))
        }
    }

    fn details() -> ConnectionDetails {
        ConnectionDetails {
            url: "jdbc:postgresql://db/app".into(),
            user: "u".into(),
            password: "p".into(),
            client_id: uuid::Uuid::new_v4(),
            is_xa: false,
            properties: BTreeMap::new(),
            server_endpoints: vec![],
        }
    }

    #[tokio::test]
    async fn start_commit_round_trip_clears_in_transaction_flag() {
        let ctx = Context::new(OjpConfig::default(), Arc::new(FakeDriverResolver), vec![]);
        let info = connect(&ctx, details()).await.unwrap();
        start_transaction(&ctx, info.session_id).await.unwrap();
        assert!(ctx.session_manager.lookup(info.session_id).unwrap().is_in_transaction());
        commit_transaction(&ctx, info.session_id).await.unwrap();
        assert!(!ctx.session_manager.lookup(info.session_id).unwrap().is_in_transaction());
    }

    #[tokio::test]
    async fn rollback_clears_in_transaction_flag() {
        let ctx = Context::new(OjpConfig::default(), Arc::new(FakeDriverResolver), vec![]);
        let info = connect(&ctx, details()).await.unwrap();
        start_transaction(&ctx, info.session_id).await.unwrap();
        rollback_transaction(&ctx, info.session_id).await.unwrap();
        assert!(!ctx.session_manager.lookup(info.session_id).unwrap().is_in_transaction());
    }

    #[tokio::test]
    async fn rejects_on_xa_session() {
        let ctx = Context::new(OjpConfig::default(), Arc::new(FakeDriverResolver), vec![]);
        let mut xa_details = details();
        xa_details.is_xa = true;
        let info = connect(&ctx, xa_details).await.unwrap();
        assert!(start_transaction(&ctx, info.session_id).await.is_err());
    }
}
