//! Metrics sink boundary.
//!
//! The engine reports counters and timings through [`MetricsSink`], injected
//! at construction. Production embeds wire this to their collector;
//! [`NullMetrics`] drops everything and [`MemoryMetrics`] accumulates
//! in-process for tests and diagnostics.

use dashmap::DashMap;

/// Receiver for engine counters and timings.
pub trait MetricsSink: Send + Sync {
    /// Increments a named counter by one.
    fn increment_counter(&self, name: &str);

    /// Records a duration sample in milliseconds under a name.
    fn record_timing(&self, name: &str, duration_ms: f64);
}

/// Discards all metrics.
#[derive(Debug, Default)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn increment_counter(&self, _name: &str) {}
    fn record_timing(&self, _name: &str, _duration_ms: f64) {}
}

/// Accumulates metrics in memory. Concurrent-safe via `DashMap`.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    counters: DashMap<String, u64>,
    timings: DashMap<String, Vec<f64>>,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, 0 if never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    /// All timing samples recorded under a name.
    pub fn timings(&self, name: &str) -> Vec<f64> {
        self.timings.get(name).map(|v| v.clone()).unwrap_or_default()
    }
}

impl MetricsSink for MemoryMetrics {
    fn increment_counter(&self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    fn record_timing(&self, name: &str, duration_ms: f64) {
        self.timings
            .entry(name.to_string())
            .or_default()
            .push(duration_ms);
    }
}
