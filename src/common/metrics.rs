//! Coordinator metrics
//!
//! Per-operation call counters and latency histograms plus a tally of the
//! status codes returned to clients, rendered in Prometheus text format.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        Self {
            buckets: (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect(),
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // Stored as microseconds
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative `(le, count)` pairs, ending with `+Inf`
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Timed coordinator operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    ExecuteNonQuery,
    ExecuteInLocalGroup,
    ExecuteInRemoteGroup,
    ForwardChangeMembership,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::ExecuteNonQuery,
        Operation::ExecuteInLocalGroup,
        Operation::ExecuteInRemoteGroup,
        Operation::ForwardChangeMembership,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::ExecuteNonQuery => "execute_non_query",
            Operation::ExecuteInLocalGroup => "execute_in_local_group",
            Operation::ExecuteInRemoteGroup => "execute_in_remote_group",
            Operation::ForwardChangeMembership => "forward_change_membership",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
pub struct OperationMetrics {
    pub calls: Counter,
    pub failures: Counter,
    pub latency: Histogram,
}

#[derive(Debug)]
pub struct MetricsRegistry {
    operations: Vec<OperationMetrics>,
    status_codes: Mutex<BTreeMap<i32, u64>>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            operations: Operation::ALL
                .iter()
                .map(|_| OperationMetrics::default())
                .collect(),
            status_codes: Mutex::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn operation(&self, op: Operation) -> &OperationMetrics {
        &self.operations[op.index()]
    }

    pub fn record(&self, op: Operation, duration: Duration, success: bool) {
        let metrics = self.operation(op);
        metrics.calls.inc();
        metrics.latency.observe(duration.as_secs_f64() * 1000.0);
        if !success {
            metrics.failures.inc();
        }
    }

    /// Count a status code handed back to a client
    pub fn record_status(&self, code: i32) {
        *self.status_codes.lock().unwrap().entry(code).or_insert(0) += 1;
    }

    pub fn status_count(&self, code: i32) -> u64 {
        self.status_codes
            .lock()
            .unwrap()
            .get(&code)
            .copied()
            .unwrap_or(0)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP minits_operation_calls_total Coordinator operations started\n");
        out.push_str("# TYPE minits_operation_calls_total counter\n");
        for op in Operation::ALL {
            let _ = writeln!(
                out,
                "minits_operation_calls_total{{operation=\"{}\"}} {}",
                op.name(),
                self.operation(op).calls.get()
            );
        }

        out.push_str("# HELP minits_operation_failures_total Operations that did not succeed\n");
        out.push_str("# TYPE minits_operation_failures_total counter\n");
        for op in Operation::ALL {
            let _ = writeln!(
                out,
                "minits_operation_failures_total{{operation=\"{}\"}} {}",
                op.name(),
                self.operation(op).failures.get()
            );
        }

        out.push_str("# HELP minits_operation_duration_ms Operation duration in milliseconds\n");
        out.push_str("# TYPE minits_operation_duration_ms histogram\n");
        for op in Operation::ALL {
            let latency = &self.operation(op).latency;
            for (le, count) in latency.get_buckets() {
                let le = if le.is_infinite() {
                    "+Inf".to_string()
                } else {
                    le.to_string()
                };
                let _ = writeln!(
                    out,
                    "minits_operation_duration_ms_bucket{{operation=\"{}\",le=\"{}\"}} {}",
                    op.name(),
                    le,
                    count
                );
            }
            let _ = writeln!(
                out,
                "minits_operation_duration_ms_sum{{operation=\"{}\"}} {}",
                op.name(),
                latency.sum()
            );
            let _ = writeln!(
                out,
                "minits_operation_duration_ms_count{{operation=\"{}\"}} {}",
                op.name(),
                latency.count()
            );
        }

        out.push_str("# HELP minits_status_total Statuses returned to clients by code\n");
        out.push_str("# TYPE minits_status_total counter\n");
        for (code, count) in self.status_codes.lock().unwrap().iter() {
            let _ = writeln!(out, "minits_status_total{{code=\"{}\"}} {}", code, count);
        }

        out.push_str("# HELP minits_uptime_seconds Server uptime in seconds\n");
        out.push_str("# TYPE minits_uptime_seconds gauge\n");
        let _ = writeln!(out, "minits_uptime_seconds {}", self.uptime_seconds());

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
