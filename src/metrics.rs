//! Performance metrics for the filter engine
//!
//! Lightweight, thread-safe counters recorded on every engine operation.
//! Latencies are kept in microseconds: in-memory queries routinely finish
//! well under a millisecond.
//!
//! # Overview
//!
//! - Query latencies with percentile calculations (p50, p95, p99)
//! - Slow query tracking
//! - Per-operation counts and average latencies
//! - Result cache hits and misses
//!
//! # Example
//!
//! ```
//! use facet_engine::metrics::{EngineMetrics, Operation};
//!
//! let metrics = EngineMetrics::new();
//! metrics.record(Operation::Options, 120);
//! metrics.record_cache(true);
//!
//! let stats = metrics.snapshot();
//! assert_eq!(stats.query_count, 1);
//! assert_eq!(stats.cache_hits, 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Rolling window of recent latencies used for percentiles.
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Only the most recent slow queries are kept.
const MAX_SLOW_QUERIES: usize = 10;

/// Queries at or above this duration are recorded as slow (one 60 Hz frame).
pub const SLOW_QUERY_THRESHOLD_US: u64 = 16_000;

/// Engine operations tracked by [`EngineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    BuildIndex,
    MatchingPositions,
    FilteredRows,
    FilteredCount,
    Options,
}

impl Operation {
    const ALL: [Operation; 6] = [
        Operation::Load,
        Operation::BuildIndex,
        Operation::MatchingPositions,
        Operation::FilteredRows,
        Operation::FilteredCount,
        Operation::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Load => "Load",
            Operation::BuildIndex => "BuildIndex",
            Operation::MatchingPositions => "MatchingPositions",
            Operation::FilteredRows => "FilteredRows",
            Operation::FilteredCount => "FilteredCount",
            Operation::Options => "Options",
        }
    }

    fn slot(&self) -> usize {
        *self as usize
    }
}

/// A recorded slow query.
#[derive(Clone, Debug, PartialEq)]
pub struct SlowQuery {
    pub operation: Operation,
    pub duration_us: u64,
    /// Microseconds since metrics started.
    pub timestamp_us: u64,
}

/// Statistics for a single operation type.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationStat {
    pub operation: Operation,
    pub count: u64,
    pub avg_us: u64,
}

/// Point-in-time copy of all metrics. Plain values, no atomics.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub query_count: u64,
    pub slow_query_count: u64,
    pub query_p50_us: u64,
    pub query_p95_us: u64,
    pub query_p99_us: u64,
    pub query_avg_us: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub top_slow_queries: Vec<SlowQuery>,
    /// Operations with at least one call, most frequent first.
    pub op_stats: Vec<OperationStat>,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Fraction of cache lookups that hit (0.0 when nothing was looked up).
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Thread-safe metrics collector owned by one engine.
pub struct EngineMetrics {
    query_count: AtomicU64,
    slow_query_count: AtomicU64,
    /// Recent latencies; mutex-protected since VecDeque isn't atomic.
    latencies_us: Mutex<VecDeque<u64>>,
    latency_sum_us: AtomicU64,
    op_counts: [AtomicU64; 6],
    op_latency_sums: [AtomicU64; 6],
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    slow_queries: Mutex<VecDeque<SlowQuery>>,
    started_at: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            query_count: AtomicU64::new(0),
            slow_query_count: AtomicU64::new(0),
            latencies_us: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            latency_sum_us: AtomicU64::new(0),
            op_counts: Default::default(),
            op_latency_sums: Default::default(),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            slow_queries: Mutex::new(VecDeque::with_capacity(MAX_SLOW_QUERIES)),
            started_at: Instant::now(),
        }
    }

    /// Record one completed operation.
    ///
    /// O(1) amortized: atomic increments plus bounded deque operations.
    pub fn record(&self, operation: Operation, duration_us: u64) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.op_counts[operation.slot()].fetch_add(1, Ordering::Relaxed);
        self.op_latency_sums[operation.slot()].fetch_add(duration_us, Ordering::Relaxed);

        {
            let mut latencies = self
                .latencies_us
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                if let Some(old) = latencies.pop_front() {
                    self.latency_sum_us.fetch_sub(old, Ordering::Relaxed);
                }
            }
            latencies.push_back(duration_us);
            self.latency_sum_us.fetch_add(duration_us, Ordering::Relaxed);
        }

        if duration_us >= SLOW_QUERY_THRESHOLD_US {
            self.slow_query_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                operation = operation.as_str(),
                duration_us,
                "Slow engine operation"
            );

            let slow = SlowQuery {
                operation,
                duration_us,
                timestamp_us: self.started_at.elapsed().as_micros() as u64,
            };
            let mut slow_queries = self
                .slow_queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slow_queries.len() >= MAX_SLOW_QUERIES {
                slow_queries.pop_front();
            }
            slow_queries.push_back(slow);
        }
    }

    /// Record a result cache lookup.
    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Time `f` and record it under `operation`.
    pub fn timed<T>(&self, operation: Operation, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(operation, start.elapsed().as_micros() as u64);
        out
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95, p99, avg) = {
            let latencies = self
                .latencies_us
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if latencies.is_empty() {
                (0, 0, 0, 0)
            } else {
                let mut sorted: Vec<u64> = latencies.iter().copied().collect();
                sorted.sort_unstable();
                let len = sorted.len();
                let p50 = sorted[len * 50 / 100];
                let p95 = sorted[len * 95 / 100];
                let p99 = sorted[(len * 99 / 100).min(len - 1)];
                let avg = self.latency_sum_us.load(Ordering::Relaxed) / len as u64;
                (p50, p95, p99, avg)
            }
        };

        let top_slow_queries = self
            .slow_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        let mut op_stats: Vec<OperationStat> = Operation::ALL
            .iter()
            .filter_map(|&op| {
                let count = self.op_counts[op.slot()].load(Ordering::Relaxed);
                if count == 0 {
                    return None;
                }
                let sum = self.op_latency_sums[op.slot()].load(Ordering::Relaxed);
                Some(OperationStat {
                    operation: op,
                    count,
                    avg_us: sum / count,
                })
            })
            .collect();
        op_stats.sort_by(|a, b| b.count.cmp(&a.count));

        MetricsSnapshot {
            query_count: self.query_count.load(Ordering::Relaxed),
            slow_query_count: self.slow_query_count.load(Ordering::Relaxed),
            query_p50_us: p50,
            query_p95_us: p95,
            query_p99_us: p99,
            query_avg_us: avg,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            top_slow_queries,
            op_stats,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("query_count", &self.query_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let snap = EngineMetrics::new().snapshot();
        assert_eq!(snap.query_count, 0);
        assert_eq!(snap.query_p50_us, 0);
        assert!(snap.top_slow_queries.is_empty());
        assert!(snap.op_stats.is_empty());
        assert_eq!(snap.cache_hit_ratio(), 0.0);
    }

    #[test]
    fn test_record_updates_counts_and_averages() {
        let m = EngineMetrics::new();
        m.record(Operation::Options, 100);
        m.record(Operation::Options, 300);
        m.record(Operation::FilteredCount, 50);

        let snap = m.snapshot();
        assert_eq!(snap.query_count, 3);
        assert_eq!(snap.op_stats[0].operation, Operation::Options);
        assert_eq!(snap.op_stats[0].count, 2);
        assert_eq!(snap.op_stats[0].avg_us, 200);
        assert_eq!(snap.query_avg_us, 150);
    }

    #[test]
    fn test_slow_query_tracking() {
        let m = EngineMetrics::new();
        m.record(Operation::Load, SLOW_QUERY_THRESHOLD_US - 1);
        assert_eq!(m.snapshot().slow_query_count, 0);

        m.record(Operation::Load, SLOW_QUERY_THRESHOLD_US);
        let snap = m.snapshot();
        assert_eq!(snap.slow_query_count, 1);
        assert_eq!(snap.top_slow_queries[0].operation, Operation::Load);
    }

    #[test]
    fn test_slow_queries_bounded() {
        let m = EngineMetrics::new();
        for i in 0..(MAX_SLOW_QUERIES as u64 + 5) {
            m.record(Operation::FilteredRows, SLOW_QUERY_THRESHOLD_US + i);
        }
        let snap = m.snapshot();
        assert_eq!(snap.top_slow_queries.len(), MAX_SLOW_QUERIES);
        assert_eq!(snap.top_slow_queries[0].duration_us, SLOW_QUERY_THRESHOLD_US + 5);
    }

    #[test]
    fn test_latency_window_bounded() {
        let m = EngineMetrics::new();
        for i in 0..(LATENCY_WINDOW_SIZE as u64 + 100) {
            m.record(Operation::MatchingPositions, i);
        }
        let snap = m.snapshot();
        // oldest 100 dropped: window is 100..1100
        assert_eq!(snap.query_p50_us, 600);
        assert_eq!(snap.query_count, LATENCY_WINDOW_SIZE as u64 + 100);
    }

    #[test]
    fn test_cache_ratio() {
        let m = EngineMetrics::new();
        m.record_cache(true);
        m.record_cache(true);
        m.record_cache(false);
        m.record_cache(true);
        assert_eq!(m.snapshot().cache_hit_ratio(), 0.75);
    }

    #[test]
    fn test_timed_records_operation() {
        let m = EngineMetrics::new();
        let out = m.timed(Operation::BuildIndex, || 7);
        assert_eq!(out, 7);
        assert_eq!(m.snapshot().op_stats[0].operation, Operation::BuildIndex);
    }
}
