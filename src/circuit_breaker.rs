//! Circuit Breaker (spec §4.5 step 2, C6): per-statement-fingerprint
//! failure counter that short-circuits repeated failing statements.
//! Grounded on the fingerprint-keyed `DashMap` idiom established in
//! `pool_registry.rs`, applied to statement text instead of connection
//! tuples.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::common::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

struct Circuit {
    consecutive_failures: AtomicU32,
    opened_at: AtomicU64,
}

/// Tracks one circuit per statement fingerprint (a hash of the SQL text).
/// Opens after `failure_threshold` consecutive failures; resets after
/// `cool_down` has elapsed since opening, on the next attempt (half-open
/// retry, matching the teacher's slow-query cool-down shape).
pub struct CircuitBreaker {
    circuits: DashMap<u64, Circuit>,
    failure_threshold: u32,
    cool_down: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            circuits: DashMap::new(),
            failure_threshold,
            cool_down,
        }
    }

    /// Returns `true` if calls for this fingerprint should fail fast
    /// without reaching the backend.
    pub fn is_open(&self, fingerprint: u64) -> bool {
        let Some(circuit) = self.circuits.get(&fingerprint) else {
            return false;
        };
        let opened_at = circuit.opened_at.load(Ordering::Acquire);
        if opened_at == 0 {
            return false;
        }
        let elapsed = now_millis().saturating_sub(opened_at);
        if elapsed > self.cool_down.as_millis() as u64 {
            circuit.opened_at.store(0, Ordering::Release);
            circuit.consecutive_failures.store(0, Ordering::Release);
            return false;
        }
        true
    }

    pub fn record_success(&self, fingerprint: u64) {
        if let Some(circuit) = self.circuits.get(&fingerprint) {
            circuit.consecutive_failures.store(0, Ordering::Release);
            circuit.opened_at.store(0, Ordering::Release);
        }
    }

    pub fn record_failure(&self, fingerprint: u64) {
        let circuit = self.circuits.entry(fingerprint).or_insert_with(|| Circuit {
            consecutive_failures: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
        });
        let failures = circuit.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold {
            circuit.opened_at.store(now_millis(), Ordering::Release);
        }
    }
}
