//! Fetch metrics
//!
//! Latency of feed round trips and cumulative counts of records dropped
//! during ingestion.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use crate::market_data::{DropCounts, RequestClass};

/// Point-in-time view of the collected metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchSnapshot {
    pub latency_p50: u64,
    pub latency_p95: u64,
    pub latency_p99: u64,
    pub initial_loads: u64,
    pub history_loads: u64,
    pub failures: u64,
    pub stale_responses: u64,
    pub records_received: u64,
    pub dropped: DropCounts,
}

/// Collector for feed fetch metrics
#[derive(Debug, Clone)]
pub struct FetchMetrics {
    latency_samples: VecDeque<u64>,
    max_samples: usize,
    initial_loads: u64,
    history_loads: u64,
    failures: u64,
    stale_responses: u64,
    records_received: u64,
    dropped: DropCounts,
}

impl FetchMetrics {
    pub fn new(max_samples: usize) -> Self {
        Self {
            latency_samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            initial_loads: 0,
            history_loads: 0,
            failures: 0,
            stale_responses: 0,
            records_received: 0,
            dropped: DropCounts::default(),
        }
    }

    /// Record a completed fetch of `class`.
    pub fn record_load(
        &mut self,
        class: RequestClass,
        latency: Duration,
        received: usize,
        dropped: &DropCounts,
    ) {
        self.push_latency(latency);
        match class {
            RequestClass::Initial => self.initial_loads += 1,
            RequestClass::More => self.history_loads += 1,
        }
        self.records_received += received as u64;
        self.dropped.accumulate(dropped);
    }

    /// Record a fetch that ended in an error.
    pub fn record_failure(&mut self, latency: Duration) {
        self.push_latency(latency);
        self.failures += 1;
    }

    /// Drops reported by a fetch that produced no usable candles.
    pub fn record_dropped(&mut self, received: usize, dropped: &DropCounts) {
        self.records_received += received as u64;
        self.dropped.accumulate(dropped);
    }

    pub fn record_stale(&mut self) {
        self.stale_responses += 1;
    }

    fn push_latency(&mut self, latency: Duration) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency.as_millis() as u64);
    }

    /// Latency percentiles (p50, p95, p99) in milliseconds
    pub fn calculate_percentiles(&self) -> (u64, u64, u64) {
        if self.latency_samples.is_empty() {
            return (0, 0, 0);
        }

        let mut sorted: Vec<u64> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let len = sorted.len();
        let pick = |pct: usize| sorted[((len * pct) / 100).min(len - 1)];
        (pick(50), pick(95), pick(99))
    }

    pub fn snapshot(&self) -> FetchSnapshot {
        let (latency_p50, latency_p95, latency_p99) = self.calculate_percentiles();
        FetchSnapshot {
            latency_p50,
            latency_p95,
            latency_p99,
            initial_loads: self.initial_loads,
            history_loads: self.history_loads,
            failures: self.failures,
            stale_responses: self.stale_responses,
            records_received: self.records_received,
            dropped: self.dropped,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.max_samples);
    }
}

impl Default for FetchMetrics {
    fn default() -> Self {
        Self::new(256)
    }
}
