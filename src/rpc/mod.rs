//! RPC Surface (spec §6, C19): one module per verb group, all sharing the
//! process-wide `Context`. Grounded on the dispatcher's own "one handler
//! per verb" decomposition (spec §9), extended one layer out to the
//! session-lifecycle, transaction-boundary, and XA verbs that sit in
//! front of the statement dispatcher.

pub mod callable;
pub mod connect;
pub mod context;
pub mod lob;
pub mod messages;
pub mod statement;
pub mod transaction;
pub mod xa;

pub use context::{Context, DriverResolver};
