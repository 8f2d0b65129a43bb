//! Slow Query Segregator (spec §4.5 step 4, C7): routes statement
//! execution between a main and secondary executor based on measured
//! latency, with a cool-down before trying the main path again. One
//! instance per backend pool fingerprint (owned via `PoolRegistry`'s
//! `slow_query` map).
//!
//! The secondary executor is a bulkhead, not just a label: it's a bounded
//! concurrency gate a segregated statement must acquire before running, so
//! a burst of slow statements can't starve the main path of backend
//! connections/threads even though both still dispatch through the same
//! pool.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::common::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    Main,
    Secondary,
}

struct FingerprintState {
    segregated_at: AtomicU64,
}

/// Default width of the secondary executor's bulkhead (spec doesn't name
/// a value; kept small and fixed so segregated statements stay a minority
/// share of total concurrency).
const DEFAULT_SECONDARY_CONCURRENCY: usize = 4;

/// Per-pool routing decision keyed by statement fingerprint. A statement
/// that measures slower than `slow_threshold` is segregated to the
/// secondary executor until `cool_down` has passed since the last slow
/// measurement.
pub struct SlowQuerySegregator {
    states: DashMap<u64, FingerprintState>,
    slow_threshold: Duration,
    cool_down: Duration,
    secondary: Arc<Semaphore>,
}

impl SlowQuerySegregator {
    pub fn new() -> Self {
        Self::with_thresholds(Duration::from_secs(1), Duration::from_secs(60))
    }

    pub fn with_thresholds(slow_threshold: Duration, cool_down: Duration) -> Self {
        Self {
            states: DashMap::new(),
            slow_threshold,
            cool_down,
            secondary: Arc::new(Semaphore::new(DEFAULT_SECONDARY_CONCURRENCY)),
        }
    }

    /// Acquires the secondary executor's bulkhead permit. Held by the
    /// caller for the duration of one statement's execution; returns
    /// immediately (no queueing limit) since statement dispatch already
    /// has its own acquire timeout upstream of this.
    pub async fn acquire_secondary(&self) -> SemaphorePermit<'_> {
        self.secondary.acquire().await.expect("secondary semaphore never closed")
    }

    /// Which executor a fresh invocation of `fingerprint` should use.
    pub fn executor_for(&self, fingerprint: u64) -> Executor {
        let Some(state) = self.states.get(&fingerprint) else {
            return Executor::Main;
        };
        let segregated_at = state.segregated_at.load(Ordering::Acquire);
        if segregated_at == 0 {
            return Executor::Main;
        }
        let elapsed = now_millis().saturating_sub(segregated_at);
        if elapsed > self.cool_down.as_millis() as u64 {
            Executor::Main
        } else {
            Executor::Secondary
        }
    }

    /// Records how long an execution on `fingerprint` took, segregating
    /// future executions if it exceeded the slow threshold.
    pub fn record_latency(&self, fingerprint: u64, elapsed: Duration) {
        if elapsed > self.slow_threshold {
            self.states
                .entry(fingerprint)
                .or_insert_with(|| FingerprintState {
                    segregated_at: AtomicU64::new(0),
                })
                .segregated_at
                .store(now_millis(), Ordering::Release);
        }
    }
}

impl Default for SlowQuerySegregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_statements_stay_on_main_executor() {
        let seg = SlowQuerySegregator::with_thresholds(Duration::from_millis(100), Duration::from_secs(60));
        seg.record_latency(1, Duration::from_millis(5));
        assert_eq!(seg.executor_for(1), Executor::Main);
    }

    #[test]
    fn slow_statement_segregates_until_cooldown() {
        let seg = SlowQuerySegregator::with_thresholds(Duration::from_millis(1), Duration::from_secs(60));
        seg.record_latency(2, Duration::from_millis(50));
        assert_eq!(seg.executor_for(2), Executor::Secondary);
    }

    #[tokio::test]
    async fn segregation_expires_after_cooldown() {
        let seg = SlowQuerySegregator::with_thresholds(Duration::from_millis(1), Duration::from_millis(20));
        seg.record_latency(3, Duration::from_millis(50));
        assert_eq!(seg.executor_for(3), Executor::Secondary);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(seg.executor_for(3), Executor::Main);
    }

    #[tokio::test]
    async fn secondary_executor_is_a_real_concurrency_bound() {
        let seg = SlowQuerySegregator::new();
        let held: Vec<_> = futures::future::join_all((0..DEFAULT_SECONDARY_CONCURRENCY).map(|_| seg.acquire_secondary())).await;
        assert_eq!(held.len(), DEFAULT_SECONDARY_CONCURRENCY);

        // The bulkhead is fully checked out: one more acquire must block.
        let blocked = tokio::time::timeout(Duration::from_millis(20), seg.acquire_secondary()).await;
        assert!(blocked.is_err());

        drop(held);
        // Releasing one frees capacity for the next caller.
        let acquired = tokio::time::timeout(Duration::from_millis(20), seg.acquire_secondary()).await;
        assert!(acquired.is_ok());
    }
}
