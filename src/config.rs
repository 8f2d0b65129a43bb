//! Recognized configuration keys (spec §6) as a plain value object. Parsing
//! config files/env vars is explicitly out of scope (spec §1); the
//! embedding binary is responsible for producing an `OjpConfig`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OjpConfig {
    pub session_cleanup_enabled: bool,
    pub session_cleanup_timeout: Duration,
    pub session_cleanup_interval: Duration,

    pub xa_connection_pool_enabled: bool,
    pub xa_max_transactions: u32,
    pub xa_idle_rebalance_fraction: f64,
    pub xa_max_close_per_recovery: u32,

    pub connection_pool_default_isolation: crate::backend::IsolationLevel,

    pub loadaware_selection_enabled: bool,

    pub healthcheck_interval: Duration,
    pub healthcheck_threshold: Duration,

    pub redistribution_enabled: bool,

    /// Legacy flag, no-op: unified connect-to-all mode is mandatory
    /// (spec §4.7, §9). Retained only so a config file carrying the key
    /// does not fail to parse.
    pub connection_unified_enabled: bool,
}

impl Default for OjpConfig {
    fn default() -> Self {
        Self {
            session_cleanup_enabled: true,
            session_cleanup_timeout: Duration::from_secs(30 * 60),
            session_cleanup_interval: Duration::from_secs(5 * 60),

            xa_connection_pool_enabled: true,
            xa_max_transactions: 50,
            xa_idle_rebalance_fraction: 0.5,
            xa_max_close_per_recovery: 10,

            connection_pool_default_isolation: crate::backend::IsolationLevel::ReadCommitted,

            loadaware_selection_enabled: true,

            healthcheck_interval: Duration::from_millis(30_000),
            healthcheck_threshold: Duration::from_millis(60_000),

            redistribution_enabled: true,

            connection_unified_enabled: true,
        }
    }
}
