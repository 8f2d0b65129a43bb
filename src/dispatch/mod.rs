//! Statement Dispatcher (spec §4.5, C8): one handler per RPC verb,
//! sharing the guarded-execution wrapper below. Grounded in spec §9's
//! design note "god-class dispatcher is decomposed into one handler per
//! RPC verb" — each verb is its own file instead of one dispatcher type
//! with a giant match.

pub mod batch;
pub mod callable;
pub mod fetch;
pub mod query;
pub mod update;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{OjpError, Result};
use crate::pool_registry::PoolRegistry;
use crate::session::Session;
use crate::slow_query::Executor;

/// Fingerprints a statement by its SQL text for circuit-breaker and
/// slow-query routing (spec §4.5 steps 2 and 4 key off "the statement's
/// fingerprint", distinct from `ConnectionFingerprint` in `fingerprint.rs`
/// which identifies a *pool*, not a *statement*).
pub(crate) fn statement_fingerprint(sql: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    sql.hash(&mut hasher);
    hasher.finish()
}

/// Steps 1, 2, 4, 5 of spec §4.5 wrapped around one statement execution.
/// Step 3 (affinity-mandated session routing) is a client/RPC-layer
/// concern — by the time a call reaches the dispatcher, the session is
/// already resolved.
pub(crate) async fn dispatch_guarded<T, F, Fut>(session: &Arc<Session>, registry: &PoolRegistry, sql: &str, run: F) -> Result<T>
where
    F: FnOnce(Executor) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    session.touch();

    let fp_hash = statement_fingerprint(sql);
    let breaker = registry.circuit_breaker(session.fingerprint);
    if breaker.is_open(fp_hash) {
        return Err(OjpError::Unsupported(format!("circuit open for statement fingerprint {fp_hash:x}")));
    }

    let segregator = registry.slow_query_segregator(session.fingerprint);
    let executor = segregator.executor_for(fp_hash);

    // A statement segregated to the secondary executor must actually run
    // under a separate concurrency bound, not just carry the label — hold
    // its bulkhead permit for the duration of the call.
    let _secondary_permit = match executor {
        Executor::Secondary => Some(segregator.acquire_secondary().await),
        Executor::Main => None,
    };

    let start = Instant::now();
    let result = run(executor).await;
    segregator.record_latency(fp_hash, start.elapsed());

    match &result {
        Ok(_) => breaker.record_success(fp_hash),
        Err(e) if e.is_connection_class() => breaker.record_failure(fp_hash),
        Err(_) => {}
    }
    result
}
