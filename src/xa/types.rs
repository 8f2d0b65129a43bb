//! Xid identity and the transaction-branch state machine (spec §3, §4.3).
//!
//! The transport-level `Xid` must be preserved by **object identity**
//! across every backend call for a branch — some drivers (PostgreSQL
//! named explicitly in spec §3) compare by identity, not by value. The
//! idiomatic Rust rendering of "object identity" is `Arc` pointer
//! identity: `Xid` is `Arc<XidData>`, never reconstructed or cloned-by-value
//! once it has been handed to `xaStart`. `Arc::ptr_eq` is how tests assert
//! the identity-preservation property (spec §8).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// The branch identifier's value content. `Xid` wraps this in an `Arc` so
/// the *handle* can be compared by identity while the *content* remains
/// plain data for logging/equality of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XidData {
    pub format_id: i32,
    pub gtrid: Vec<u8>,
    pub bqual: Vec<u8>,
}

/// The object threaded through every backend XA call for one branch.
/// Deliberately not `Copy`/`PartialEq`-on-value: the whole point is that
/// call sites pass *this* `Arc`, not a reconstructed equal one.
pub type Xid = Arc<XidData>;

/// Value-typed map key derived from an `Xid`'s content — used wherever we
/// need `Hash + Eq` (e.g. the `contexts` map), never for identity checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XidKey {
    pub format_id: i32,
    pub gtrid: Vec<u8>,
    pub bqual: Vec<u8>,
}

impl From<&XidData> for XidKey {
    fn from(x: &XidData) -> Self {
        XidKey {
            format_id: x.format_id,
            gtrid: x.gtrid.clone(),
            bqual: x.bqual.clone(),
        }
    }
}

impl From<&Xid> for XidKey {
    fn from(x: &Xid) -> Self {
        XidKey::from(x.as_ref())
    }
}

/// XA transaction branch states (spec §3 `TxContext.state`). The only
/// mutator is `XaState::transition`, so an invalid transition cannot be
/// expressed anywhere else in the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaState {
    Active,
    Ended,
    Prepared,
    Committed,
    RolledBack,
}

impl XaState {
    /// Attempts `self -> to`. Fails with `XaError::Proto` for any pair not
    /// explicitly allowed by spec §4.3's table — there is no default/catch
    /// branch, so adding a new state requires updating this match.
    pub fn transition(self, to: XaState) -> Result<XaState, XaError> {
        let allowed = matches!(
            (self, to),
            (XaState::Active, XaState::Ended)
                | (XaState::Ended, XaState::Active) // TMJOIN/TMRESUME re-association
                | (XaState::Ended, XaState::Prepared)
                | (XaState::Ended, XaState::Committed) // prepare voted read-only
                | (XaState::Ended, XaState::RolledBack)
                | (XaState::Active, XaState::RolledBack)
                | (XaState::Prepared, XaState::Committed)
                | (XaState::Prepared, XaState::RolledBack)
        );
        if allowed {
            Ok(to)
        } else {
            Err(XaError::Proto(format!("{self:?} -> {to:?}")))
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum XaError {
    /// `XAER_PROTO`: invalid state transition, or duplicate `xaStart` with
    /// `TMNOFLAGS` on an xid that already has a context.
    #[error("XAER_PROTO: {0}")]
    Proto(String),

    /// `XAER_RMERR`: the backend session pool was exhausted.
    #[error("XAER_RMERR: {0}")]
    RmErr(String),

    /// `XAER_RMFAIL`: the backend driver raised a SQL-level error.
    #[error("XAER_RMFAIL: {0}")]
    RmFail(String),

    /// `XAER_NOTA`: the xid is unknown and the operation is not a
    /// recovery-path commit/rollback.
    #[error("XAER_NOTA: unknown xid")]
    NotA,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XaVote {
    Ok,
    ReadOnly,
}
