//! Shared identifiers and value types used across the dispatch, XA, and
//! client-side subsystems.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::fingerprint::ConnectionFingerprint;

pub type SessionId = uuid::Uuid;
pub type ClientId = uuid::Uuid;
pub type StatementId = uuid::Uuid;
pub type ResultSetId = uuid::Uuid;
pub type LobId = uuid::Uuid;

/// Monotonic activity timestamp, millis since an arbitrary epoch. Only
/// ever compared to itself within a process, never persisted or compared
/// across processes (spec §3: `lastActivityAt`).
pub type MonotonicMillis = u64;

pub fn now_millis() -> MonotonicMillis {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Resolved database flavor, driving vendor-specific dispatcher behavior
/// (spec §3 `DatabaseFlavor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseFlavor {
    Postgres,
    Oracle,
    MySql,
    MariaDb,
    SqlServer,
    Db2,
    H2,
    CockroachDb,
    Unknown,
}

impl DatabaseFlavor {
    /// Classifies a backend JDBC-style URL by scheme prefix. Best-effort:
    /// an unrecognized scheme resolves to `Unknown` rather than failing,
    /// since flavor only drives optional vendor-specific affinity/quirk
    /// handling, never correctness of the core dispatch path.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        let rest = lower.strip_prefix("jdbc:").unwrap_or(&lower);
        if rest.starts_with("postgresql:") || rest.starts_with("postgres:") {
            DatabaseFlavor::Postgres
        } else if rest.starts_with("oracle:") {
            DatabaseFlavor::Oracle
        } else if rest.starts_with("mariadb:") {
            DatabaseFlavor::MariaDb
        } else if rest.starts_with("mysql:") {
            DatabaseFlavor::MySql
        } else if rest.starts_with("sqlserver:") || rest.starts_with("jtds:") {
            DatabaseFlavor::SqlServer
        } else if rest.starts_with("db2:") {
            DatabaseFlavor::Db2
        } else if rest.starts_with("h2:") {
            DatabaseFlavor::H2
        } else if rest.starts_with("cockroachdb:") {
            DatabaseFlavor::CockroachDb
        } else {
            DatabaseFlavor::Unknown
        }
    }
}

impl fmt::Display for DatabaseFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A typed parameter or column value crossing the RPC boundary. Deliberately
/// small: the dispatcher applies these positionally and never interprets
/// them (no SQL transformation, per spec non-goals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BYTES",
            Value::Timestamp(_) => "TIMESTAMP",
        }
    }
}

/// Connection-class vs. database-class distinction used by the client-side
/// failure detector (spec §4.7): only these codes ever flip endpoint
/// health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcStatus {
    Ok,
    Unavailable,
    DeadlineExceeded,
    Cancelled,
    UnknownConnectionTagged,
    UnknownOther,
    DatabaseError,
}

impl RpcStatus {
    pub fn is_connection_class(self) -> bool {
        matches!(
            self,
            RpcStatus::Unavailable
                | RpcStatus::DeadlineExceeded
                | RpcStatus::Cancelled
                | RpcStatus::UnknownConnectionTagged
        )
    }
}
