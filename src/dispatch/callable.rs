//! `callResource` (spec §4.5, §6, §9): the reflection-free rendering of
//! "generic introspection on any owned resource identified by
//! `{type, uuid, methodName, params}`". Spec §9 calls for "an explicit
//! switch over a closed set... only whitelisted operations are exposed" —
//! this is that switch.

use std::sync::Arc;
use uuid::Uuid;

use crate::common::Value;
use crate::error::{OjpError, Result};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResourceKind {
    Statement,
    ResultSet,
    Lob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MethodId {
    IsClosed,
    ColumnCount,
    Close,
}

pub struct CallResourceRequest {
    pub kind: ResourceKind,
    pub resource_id: Uuid,
    pub method: MethodId,
}

pub struct CallResourceResponse {
    pub value: Option<Value>,
}

#[tracing::instrument(skip(session))]
pub async fn call_resource(session: &Arc<Session>, req: CallResourceRequest) -> Result<CallResourceResponse> {
    let _guard = session.lock.lock().await;
    session.touch();
    match (req.kind, req.method) {
        (ResourceKind::Statement, MethodId::IsClosed) => {
            let closed = !session.statements.contains_key(&req.resource_id);
            Ok(CallResourceResponse {
                value: Some(Value::Boolean(closed)),
            })
        }
        (ResourceKind::Statement, MethodId::Close) => {
            session.statements.remove(&req.resource_id);
            Ok(CallResourceResponse { value: None })
        }
        (ResourceKind::ResultSet, MethodId::ColumnCount) => {
            let entry = session.result_sets.get(&req.resource_id).ok_or(OjpError::UnknownId {
                kind: "resultSet",
                id: req.resource_id.to_string(),
            })?;
            Ok(CallResourceResponse {
                value: Some(Value::Integer(entry.columns.len() as i64)),
            })
        }
        (ResourceKind::ResultSet, MethodId::Close) => {
            session.result_sets.remove(&req.resource_id);
            Ok(CallResourceResponse { value: None })
        }
        (ResourceKind::Lob, MethodId::IsClosed) => {
            let streaming = session
                .lobs
                .get(&req.resource_id)
                .map(|h| h.streaming.load(std::sync::atomic::Ordering::Acquire))
                .unwrap_or(false);
            Ok(CallResourceResponse {
                value: Some(Value::Boolean(!streaming)),
            })
        }
        (kind, method) => Err(OjpError::Unsupported(format!("no callResource whitelist entry for {kind:?}/{method:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests_support::FakeBackendConnection;

    fn new_session() -> Arc<Session> {
        let fp = crate::common::ConnectionFingerprint::compute("u", "a", "b", false, &Default::default());
        Arc::new(Session::new(
            uuid::Uuid::new_v4(),
            fp,
            uuid::Uuid::new_v4(),
            false,
            Arc::new(FakeBackendConnection::default()),
            None,
        ))
    }

    #[tokio::test]
    async fn unknown_resource_kind_method_pair_is_unsupported() {
        let session = new_session();
        let err = call_resource(
            &session,
            CallResourceRequest {
                kind: ResourceKind::Lob,
                resource_id: Uuid::new_v4(),
                method: MethodId::ColumnCount,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OjpError::Unsupported(_)));
    }

    #[tokio::test]
    async fn statement_is_closed_reflects_removal() {
        let session = new_session();
        let id = Uuid::new_v4();
        session.statements.insert(id, crate::session::Statement { sql: "SELECT 1".into() });
        let resp = call_resource(
            &session,
            CallResourceRequest {
                kind: ResourceKind::Statement,
                resource_id: id,
                method: MethodId::IsClosed,
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.value, Some(Value::Boolean(false)));
    }
}
