//! Crate-wide error taxonomy.
//!
//! Mirrors spec §7: each variant is a *kind*, not a wrapper around a single
//! backend type, so that RPC handlers can translate it to the wire form
//! (SQLState/error-code metadata) without matching on backend-specific
//! error types.

use thiserror::Error;

use crate::xa::XaError;

pub type Result<T> = std::result::Result<T, OjpError>;

/// Everything a handler in `src/rpc` can fail with.
#[derive(Debug, Error)]
pub enum OjpError {
    /// XA transition attempted from the wrong source state, or an operation
    /// attempted on a session that is already closed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A session/statement/result-set/LOB UUID the caller referenced does
    /// not exist (anymore).
    #[error("not found: {kind} {id}")]
    UnknownId { kind: &'static str, id: String },

    /// The pool could not produce a connection within the configured wait.
    #[error("resource exhausted: {borrowed}/{max} borrowed, {waiters} waiters")]
    ResourceExhausted {
        max: usize,
        borrowed: usize,
        waiters: usize,
    },

    /// The backend driver reported a SQL-level failure. `sql_state` and
    /// `vendor_code` are preserved verbatim for the wire response.
    #[error("backend failure [{sql_state}]: {message}")]
    BackendFailure {
        sql_state: String,
        vendor_code: i32,
        message: String,
    },

    /// Transport-level failure on the client path. Causes the endpoint to
    /// be marked unhealthy by the connection manager.
    #[error("connection failure: {0}")]
    ConnectionClass(String),

    /// A deadline or a bounded wait expired.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// The operation has no provider configured for it (e.g. XA requested
    /// with no XA pool provider registered).
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Xa(#[from] XaError),

    #[error(transparent)]
    Pool(#[from] crate::acquire::PoolError),
}

impl OjpError {
    /// True for the status codes the client-side connection manager treats
    /// as "endpoint is unhealthy" (spec §4.7 failure detection).
    pub fn is_connection_class(&self) -> bool {
        matches!(self, OjpError::ConnectionClass(_) | OjpError::Timeout(_))
    }
}
