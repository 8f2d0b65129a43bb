//! `callResource` RPC wrapper (spec §4.5, §6): translates the wire DTO
//! straight to `dispatch::callable::call_resource`.

use tracing::instrument;

use crate::dispatch::callable::{self, CallResourceRequest};
use crate::error::Result;
use crate::rpc::context::Context;
use crate::rpc::messages::{CallResourceRequestMsg, CallResourceResponseMsg};

#[instrument(skip(ctx, req))]
pub async fn call_resource(ctx: &Context, req: CallResourceRequestMsg) -> Result<CallResourceResponseMsg> {
    let session = ctx.session_manager.lookup(req.session_id)?;
    let resp = callable::call_resource(
        &session,
        CallResourceRequest {
            kind: req.kind,
            resource_id: req.resource_id,
            method: req.method,
        },
    )
    .await?;
    Ok(CallResourceResponseMsg { value: resp.value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::FakeBackendDriver;
    use crate::config::OjpConfig;
    use crate::dispatch::callable::{MethodId, ResourceKind};
    use crate::rpc::connect::connect;
    use crate::rpc::messages::ConnectionDetails;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct FakeDriverResolver;

    #[async_trait]
    impl crate::rpc::context::DriverResolver for FakeDriverResolver {
        async fn resolve(&self, _url: &str, _user: &str, _password: &str) -> Result<Arc<dyn crate::backend::BackendDriver>> {
            Ok(Arc::new(FakeBackendDriver::default()))
        }
    }

    #[tokio::test]
    async fn unknown_result_set_surfaces_unknown_id() {
        let ctx = Context::new(OjpConfig::default(), Arc::new(FakeDriverResolver), vec![]);
        let details = ConnectionDetails {
            url: "jdbc:postgresql://db/app".into(),
            user: "u".into(),
            password: "p".into(),
            client_id: uuid::Uuid::new_v4(),
            is_xa: false,
            properties: BTreeMap::new(),
            server_endpoints: vec![],
        };
        let session_id = connect(&ctx, details).await.unwrap().session_id;
        let err = call_resource(
            &ctx,
            CallResourceRequestMsg {
                session_id,
                kind: ResourceKind::ResultSet,
                resource_id: uuid::Uuid::new_v4(),
                method: MethodId::ColumnCount,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, crate::error::OjpError::UnknownId { .. }));
    }
}
