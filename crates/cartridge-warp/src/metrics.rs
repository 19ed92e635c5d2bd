//! Engine counters.
//!
//! Counters are monotonic across the engine's lifetime and shared via
//! `Arc`, so callers can read a consistent snapshot without locking the
//! evolution path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Shared monotonic counters for the evolution engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    changes_detected: AtomicU64,
    changes_applied: AtomicU64,
    changes_blocked: AtomicU64,
    failures: AtomicU64,
    running: AtomicBool,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_detected(&self, count: u64) {
        self.changes_detected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_applied(&self, count: u64) {
        self.changes_applied.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_blocked(&self, count: u64) {
        self.changes_blocked.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_changes_detected: self.changes_detected.load(Ordering::Relaxed),
            total_changes_applied: self.changes_applied.load(Ordering::Relaxed),
            total_changes_blocked: self.changes_blocked.load(Ordering::Relaxed),
            total_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of [`EngineMetrics`] at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_changes_detected: u64,
    pub total_changes_applied: u64,
    pub total_changes_blocked: u64,
    pub total_failures: u64,
}
