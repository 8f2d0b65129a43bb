//! External collaborators (spec §1): the core never talks to a JDBC driver
//! or a connection-pool library directly. It depends on these trait
//! boundaries, which the embedding binary implements against whatever
//! driver/pool-provider SPI it ships with.
//!
//! Mirrors the teacher's `ConnectionFactory<C>` pattern
//! (`pool/connection/lifecycle.rs`), generalized to also open XA
//! connections and to carry the vendor-neutral row/value shape from
//! `src/common`.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::common::Value;
use crate::error::Result;
use crate::xa::{Xid, XaVote};

/// One row of a result set, as the dispatcher sees it: already decoded
/// into `Value`s, never raw driver types.
pub type Row = Vec<Value>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

/// A physical (non-XA) backend connection, as handed out by `BackendDriver`
/// or borrowed from a `PoolProvider`-created `DataSource`.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    async fn execute_update(&self, sql: &str, params: &[Value]) -> Result<u64>;
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<(Vec<ColumnMeta>, Box<dyn ResultCursor>)>;
    async fn is_valid(&self) -> bool;
    async fn set_autocommit(&self, autocommit: bool) -> Result<()>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
    async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()>;
    async fn close(&self) -> Result<()>;
    async fn open_lob_sink(&self, lob_id: &str) -> Result<Box<dyn LobSink>>;
    async fn open_lob_source(&self, lob_id: &str, block_size: usize) -> Result<Box<dyn LobSource>>;
}

/// Server-streamed in fixed-size batches by the dispatcher (spec §4.5).
#[async_trait]
pub trait ResultCursor: Send + Sync {
    async fn fetch(&mut self, max_rows: usize) -> Result<(Vec<Row>, bool)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// A physical XA connection: an `XAResource` plus the logical connection
/// derived from it (spec §3 `XABackendSession`).
#[async_trait]
pub trait XaConnection: Send + Sync {
    fn logical_connection(&self) -> &dyn BackendConnection;
    async fn start(&self, xid: &Xid, flags: XaFlags) -> Result<()>;
    async fn end(&self, xid: &Xid, flags: XaFlags) -> Result<()>;
    async fn prepare(&self, xid: &Xid) -> Result<XaVote>;
    async fn commit(&self, xid: &Xid, one_phase: bool) -> Result<()>;
    async fn rollback(&self, xid: &Xid) -> Result<()>;
    async fn forget(&self, xid: &Xid) -> Result<()>;
    async fn recover(&self, flags: XaFlags) -> Result<Vec<Xid>>;
    async fn is_same_rm(&self, other: &dyn XaConnection) -> Result<bool>;
    async fn set_transaction_timeout(&self, seconds: i32) -> Result<()>;
    fn get_transaction_timeout(&self) -> i32;
    async fn is_valid(&self) -> bool;
    async fn close(&self) -> Result<()>;
}

/// XA association flags (`TMNOFLAGS`, `TMJOIN`, `TMRESUME`, `TMSUCCESS`,
/// `TMFAIL`, `TMSUSPEND`, `TMSTARTRSCAN`, `TMENDRSCAN`), spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum XaFlags {
    NoFlags,
    Join,
    Resume,
    Success,
    Fail,
    Suspend,
    StartRscan,
    EndRscan,
}

/// Opens raw physical connections. One instance per resolved
/// `{url, user, password}` tuple, shared by every session that maps to the
/// same fingerprint.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>>;
    async fn connect_xa(&self) -> Result<Box<dyn XaConnection>>;
}

/// The write side of a backend Blob/Clob under construction (spec §4.5
/// "the dispatcher wires an `InputStream` sink to the backend Blob/Clob
/// and commits on stream completion").
#[async_trait]
pub trait LobSink: Send + Sync {
    async fn write_block(&mut self, data: &[u8]) -> Result<()>;
    /// Commits the accumulated data and returns its backend-assigned size.
    async fn finish(&mut self) -> Result<u64>;
}

/// The read side of an already-materialized backend Blob/Clob, paginated
/// in fixed-size blocks by the LOB streaming engine.
#[async_trait]
pub trait LobSource: Send + Sync {
    async fn read_block(&mut self, max_bytes: usize) -> Result<(Vec<u8>, bool)>;
}

/// SPI creating pooled regular and XA data sources (spec §1(b), §9's
/// "service-provider lookup... becomes an explicit registration of pool
/// providers at process init").
#[async_trait]
pub trait PoolProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> i32;
    fn available(&self) -> bool;

    async fn create_pool(
        &self,
        driver: std::sync::Arc<dyn BackendDriver>,
        max_size: usize,
        min_idle: usize,
    ) -> Result<std::sync::Arc<dyn RegularPool>>;
}

/// A pooled source of `BackendConnection`s. `min_idle`/`max_size` are
/// mutable in place (spec §4.3 `resizeBackendPool`).
#[async_trait]
pub trait RegularPool: Send + Sync {
    async fn borrow(&self, timeout: std::time::Duration) -> Result<std::sync::Arc<dyn BackendConnection>>;
    fn resize(&self, max_size: usize, min_idle: usize);
    fn borrowed_count(&self) -> usize;
    fn idle_count(&self) -> usize;
    fn max_size(&self) -> usize;
    /// Invalidates up to `count` idle connections so the pool opens fresh
    /// ones (on whichever node it reconnects to) on next borrow — the
    /// regular-pool counterpart of `XaBackendPool::force_invalidate_idle`,
    /// used by the health-check redistributor (spec §4.8/C16) to rebalance
    /// non-XA pools after an endpoint recovers. Never touches borrowed
    /// connections. Concrete pool providers decide which idle connections
    /// to evict; this only bounds how many.
    fn force_invalidate_idle(&self, count: usize);
}

/// Connection-tuple properties, order-independent (fed into the
/// fingerprint hash and to the driver/pool provider verbatim).
pub type Properties = BTreeMap<String, String>;
