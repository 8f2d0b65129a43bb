//! Session and Session Manager subsystem (spec §3, §4.6, C3-C5).

pub mod manager;
pub mod reaper;
pub mod types;

pub use manager::SessionManager;
pub use reaper::SessionReaper;
pub use types::{LobHandle, ResultSet, Session, Statement};
