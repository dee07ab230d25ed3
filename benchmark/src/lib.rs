// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shmem Benchmarking Framework
//!
//! Measures the cost of segment manager operations on a simulated kernel.
//!
//! # Benchmark Categories
//!
//! - **Segment Table**: allocate, join and release through the table lock
//! - **Attach**: attach/detach cycles including page-table updates
//! - **User Access**: word loads and stores through a process page table
//! - **Contention**: many processes hammering one table concurrently
//!
//! # Data Output
//!
//! Reports are written as JSON files with standardized metrics.

pub mod harness;
pub mod metrics;
pub mod reporter;

pub use harness::BenchmarkHarness;
pub use metrics::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, LatencyMetrics, SystemInfo,
    ThroughputMetrics,
};
pub use reporter::JsonReporter;
