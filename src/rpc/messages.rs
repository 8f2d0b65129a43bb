//! Request/response DTOs for the RPC surface (spec §6). The wire encoding
//! itself is an external collaborator (spec §1: "a transport-agnostic IDL
//! is assumed given") — these types are the logical shape every transport
//! binding marshals to and from.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{ColumnMeta, XaFlags};
use crate::common::{ClientId, LobId, ResultSetId, SessionId, StatementId, Value};
use crate::dispatch::callable::{MethodId, ResourceKind};
use crate::xa::{XaVote, Xid, XidData};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub url: String,
    pub user: String,
    pub password: String,
    pub client_id: ClientId,
    pub is_xa: bool,
    pub properties: BTreeMap<String, String>,
    pub server_endpoints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    None,
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub status: TransactionStatus,
    pub transaction_id: Option<StatementId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub fingerprint: String,
    pub client_id: ClientId,
    pub session_id: SessionId,
    pub is_xa: bool,
    pub target_server: String,
    pub cluster_health: Vec<bool>,
    pub transaction_info: TransactionInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementRequest {
    pub session_id: SessionId,
    pub sql: String,
    pub params: Vec<Value>,
    pub generated_keys: bool,
    pub batch: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpResult {
    pub update_count: Option<u64>,
    pub result_set_id: Option<ResultSetId>,
    pub columns: Vec<ColumnMeta>,
    pub batch_counts: Vec<u64>,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSetFetchRequest {
    pub session_id: SessionId,
    pub result_set_id: ResultSetId,
    pub max_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRowsResponse {
    pub rows: Vec<Vec<Value>>,
    pub done: bool,
}

/// Transport-level Xid as it arrives on the wire. Decoded into a fresh
/// `Arc<XidData>` per call; the registry is responsible for preserving
/// *its own* stored `originXid` across a branch's lifetime (spec §3, §9)
/// — the wire layer only needs value equality to find the right branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireXid {
    pub format_id: i32,
    pub gtrid: Vec<u8>,
    pub bqual: Vec<u8>,
}

impl From<WireXid> for Xid {
    fn from(w: WireXid) -> Self {
        Arc::new(XidData {
            format_id: w.format_id,
            gtrid: w.gtrid,
            bqual: w.bqual,
        })
    }
}

impl From<&Xid> for WireXid {
    fn from(x: &Xid) -> Self {
        WireXid {
            format_id: x.format_id,
            gtrid: x.gtrid.clone(),
            bqual: x.bqual.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaStartRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
    pub flags: XaFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaEndRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
    pub flags: XaFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaPrepareRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaPrepareResponse {
    pub vote: XaVote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaCommitRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
    pub one_phase: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaRollbackRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaRecoverRequest {
    pub session_id: SessionId,
    pub flags: XaFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaRecoverResponse {
    pub xids: Vec<WireXid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaForgetRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaSetTransactionTimeoutRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
    pub seconds: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaGetTransactionTimeoutRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XaIsSameRmRequest {
    pub session_id: SessionId,
    pub xid: WireXid,
    pub other_xid: WireXid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobDataBlockMsg {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLobRequest {
    pub session_id: SessionId,
    pub blocks: Vec<LobDataBlockMsg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobReferenceMsg {
    pub lob_id: LobId,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadLobRequest {
    pub session_id: SessionId,
    pub lob_id: LobId,
    pub block_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResourceRequestMsg {
    pub session_id: SessionId,
    pub kind: ResourceKind,
    pub resource_id: StatementId,
    pub method: MethodId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResourceResponseMsg {
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTerminationStatus {
    pub session_id: SessionId,
    pub terminated: bool,
}
