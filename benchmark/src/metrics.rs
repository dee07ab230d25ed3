// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Metric types for benchmark results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sysinfo::System;

/// Which part of the segment manager a benchmark exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkCategory {
    /// Allocate, join and release through the table lock
    SegmentTable,
    /// Attach/detach cycles
    Attach,
    /// Loads and stores through a process page table
    UserAccess,
    /// Concurrent processes sharing one table
    Contention,
}

impl BenchmarkCategory {
    pub const ALL: [BenchmarkCategory; 4] = [
        BenchmarkCategory::SegmentTable,
        BenchmarkCategory::Attach,
        BenchmarkCategory::UserAccess,
        BenchmarkCategory::Contention,
    ];
}

impl std::fmt::Display for BenchmarkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchmarkCategory::SegmentTable => write!(f, "segment_table"),
            BenchmarkCategory::Attach => write!(f, "attach"),
            BenchmarkCategory::UserAccess => write!(f, "user_access"),
            BenchmarkCategory::Contention => write!(f, "contention"),
        }
    }
}

/// Latency distribution of one benchmark, in nanoseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub median_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub std_dev_ns: f64,
    /// Raw samples, downsampled when there are many
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<u64>>,
}

/// Samples kept in a report before downsampling kicks in.
const MAX_RAW_SAMPLES: usize = 1000;

impl LatencyMetrics {
    /// Summarize a set of latency samples.
    pub fn from_samples(mut samples: Vec<u64>, keep_raw: bool) -> Self {
        if samples.is_empty() {
            return Self {
                min_ns: 0,
                max_ns: 0,
                mean_ns: 0.0,
                median_ns: 0,
                p95_ns: 0,
                p99_ns: 0,
                std_dev_ns: 0.0,
                samples: None,
            };
        }

        samples.sort_unstable();
        let len = samples.len() as f64;
        let mean_ns = samples.iter().map(|&s| s as f64).sum::<f64>() / len;
        let variance = samples
            .iter()
            .map(|&s| (s as f64 - mean_ns).powi(2))
            .sum::<f64>()
            / len;

        let raw = keep_raw.then(|| {
            let step = (samples.len() / MAX_RAW_SAMPLES).max(1);
            samples.iter().step_by(step).copied().collect()
        });

        Self {
            min_ns: samples[0],
            max_ns: samples[samples.len() - 1],
            mean_ns,
            median_ns: percentile(&samples, 0.50),
            p95_ns: percentile(&samples, 0.95),
            p99_ns: percentile(&samples, 0.99),
            std_dev_ns: variance.sqrt(),
            samples: raw,
        }
    }

    /// Format latency in human-readable form (auto-selects ns/μs/ms).
    pub fn format_latency(ns: u64) -> String {
        match ns {
            0..=999 => format!("{}ns", ns),
            1_000..=999_999 => format!("{:.2}μs", ns as f64 / 1e3),
            1_000_000..=999_999_999 => format!("{:.2}ms", ns as f64 / 1e6),
            _ => format!("{:.2}s", ns as f64 / 1e9),
        }
    }
}

/// Nearest-rank percentile of sorted, non-empty samples.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let rank = (sorted.len() as f64 * p) as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Operations completed over a wall-clock interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputMetrics {
    pub ops_per_sec: f64,
    pub total_ops: u64,
    pub duration_ns: u64,
}

impl ThroughputMetrics {
    pub fn calculate(total_ops: u64, duration_ns: u64) -> Self {
        let secs = duration_ns as f64 / 1e9;
        Self {
            ops_per_sec: if secs > 0.0 { total_ops as f64 / secs } else { 0.0 },
            total_ops,
            duration_ns,
        }
    }
}

/// Host the benchmarks ran on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub kernel_version: Option<String>,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub memory_bytes: u64,
}

impl SystemInfo {
    /// Collect current system information.
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        Self {
            os: System::long_os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
        }
    }
}

/// One named measurement plus its context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub category: BenchmarkCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<ThroughputMetrics>,
    pub iterations: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BenchmarkResult {
    /// Create a latency result from raw samples.
    pub fn latency(
        name: impl Into<String>,
        category: BenchmarkCategory,
        samples: Vec<u64>,
        keep_raw_samples: bool,
    ) -> Self {
        let iterations = samples.len() as u64;
        Self {
            name: name.into(),
            category,
            latency: Some(LatencyMetrics::from_samples(samples, keep_raw_samples)),
            throughput: None,
            iterations,
            metadata: HashMap::new(),
        }
    }

    /// Create a throughput result.
    pub fn throughput(
        name: impl Into<String>,
        category: BenchmarkCategory,
        total_ops: u64,
        duration_ns: u64,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            latency: None,
            throughput: Some(ThroughputMetrics::calculate(total_ops, duration_ns)),
            iterations: total_ops,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata value. Values that fail to serialize are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), value);
        }
        self
    }
}

/// A full benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub benchmark_suite: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkReport {
    pub fn new() -> Self {
        Self {
            benchmark_suite: "shmem-benchmarks".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            results: Vec::new(),
        }
    }

    pub fn add_result(&mut self, result: BenchmarkResult) {
        self.results.push(result);
    }
}

impl Default for BenchmarkReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_metrics_from_samples() {
        let samples = vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000];
        let metrics = LatencyMetrics::from_samples(samples, false);

        assert_eq!(metrics.min_ns, 100);
        assert_eq!(metrics.max_ns, 1000);
        assert_eq!(metrics.median_ns, 600);
        assert_eq!(metrics.p99_ns, 1000);
        assert!((metrics.mean_ns - 550.0).abs() < 0.01);
        assert!(metrics.samples.is_none());
    }

    #[test]
    fn test_raw_samples_downsampled() {
        let samples: Vec<u64> = (0..5000).collect();
        let metrics = LatencyMetrics::from_samples(samples, true);
        assert_eq!(metrics.samples.unwrap().len(), 1000);
    }

    #[test]
    fn test_empty_samples() {
        let metrics = LatencyMetrics::from_samples(Vec::new(), true);
        assert_eq!(metrics.max_ns, 0);
        assert!(metrics.samples.is_none());
    }

    #[test]
    fn test_latency_format() {
        assert_eq!(LatencyMetrics::format_latency(500), "500ns");
        assert_eq!(LatencyMetrics::format_latency(1500), "1.50μs");
        assert_eq!(LatencyMetrics::format_latency(1_500_000), "1.50ms");
        assert_eq!(LatencyMetrics::format_latency(1_500_000_000), "1.50s");
    }

    #[test]
    fn test_throughput_calculation() {
        let metrics = ThroughputMetrics::calculate(1000, 1_000_000_000);
        assert!((metrics.ops_per_sec - 1000.0).abs() < 0.01);
        assert_eq!(ThroughputMetrics::calculate(5, 0).ops_per_sec, 0.0);
    }

    #[test]
    fn test_benchmark_result_serialization() {
        let result = BenchmarkResult::latency(
            "attach_detach",
            BenchmarkCategory::Attach,
            vec![100, 200, 300],
            false,
        )
        .with_metadata("table_capacity", 16);

        let json = serde_json::to_string_pretty(&result).unwrap();
        assert!(json.contains("attach_detach"));
        assert!(json.contains("\"attach\""));
        assert!(json.contains("table_capacity"));
    }
}
