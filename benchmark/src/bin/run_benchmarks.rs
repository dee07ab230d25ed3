// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI tool to run the benchmark suite and write a JSON report.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use shmem_benchmark::harness::{bench_kernel, run_concurrent, BenchmarkHarness};
use shmem_benchmark::{
    BenchmarkCategory, BenchmarkReport, BenchmarkResult, JsonReporter, LatencyMetrics,
};
use shmem_core::syscall::sys_shmget;
use shmem_core::{Kernel, KernelConfig, SegmentKey};

#[derive(Parser)]
#[command(name = "run_benchmarks")]
#[command(about = "Run segment manager benchmarks and generate JSON reports")]
struct Args {
    /// Output directory for benchmark data
    #[arg(short, long, default_value = "data")]
    output: PathBuf,

    /// Number of iterations for each benchmark
    #[arg(short, long, default_value_t = 1000)]
    iterations: u64,

    /// Categories to run (all if not specified)
    #[arg(short, long)]
    category: Option<Vec<String>>,

    /// Run in quick mode (fewer iterations)
    #[arg(long)]
    quick: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let iterations = if args.quick { 50 } else { args.iterations };

    println!("Shmem Benchmark Suite");
    println!("=====================");
    println!("Output directory: {:?}", args.output);
    println!("Iterations: {}", iterations);
    println!();

    let reporter = JsonReporter::new(&args.output)?;
    let mut report = BenchmarkReport::new();

    let selected: Vec<String> = args.category.unwrap_or_default();
    let should_run = |category: BenchmarkCategory| {
        selected.is_empty()
            || selected
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&category.to_string()))
    };

    let harness = BenchmarkHarness::new()
        .warmup(iterations / 10)
        .iterations(iterations);

    for category in BenchmarkCategory::ALL {
        if !should_run(category) {
            continue;
        }
        println!("Running {} benchmarks...", category);
        match category {
            BenchmarkCategory::SegmentTable => segment_table(&mut report, &harness)?,
            BenchmarkCategory::Attach => attach(&mut report, &harness)?,
            BenchmarkCategory::UserAccess => user_access(&mut report, &harness)?,
            BenchmarkCategory::Contention => contention(&mut report, iterations)?,
        }
    }

    let path = reporter.save(&report)?;
    println!();
    println!("Benchmark report saved to: {:?}", path);
    println!();
    print_summary(&report);

    Ok(())
}

fn segment_table(report: &mut BenchmarkReport, harness: &BenchmarkHarness) -> anyhow::Result<()> {
    let (kernel, pid) = bench_kernel(KernelConfig::default())?;

    // Allocate a fresh segment and release it again.
    let samples = harness.run(|| {
        let id = kernel.shmget(pid, SegmentKey::PRIVATE, 4096)?;
        kernel.release(pid, id)
    })?;
    report.add_result(BenchmarkResult::latency(
        "allocate_release",
        BenchmarkCategory::SegmentTable,
        samples,
        harness.should_keep_samples(),
    ));
    println!("  ✓ allocate_release");

    let id = kernel.shmget(pid, SegmentKey::new(1), 4096)?;
    let samples = harness.run(|| {
        kernel.shmget(pid, SegmentKey::new(1), 4096)?;
        kernel.release(pid, id)
    })?;
    report.add_result(BenchmarkResult::latency(
        "join_release",
        BenchmarkCategory::SegmentTable,
        samples,
        harness.should_keep_samples(),
    ));
    println!("  ✓ join_release");

    let samples = harness.run(|| {
        sys_shmget(&kernel, pid, 2, 8192);
        Ok(())
    })?;
    report.add_result(
        BenchmarkResult::latency(
            "rejected_oversize",
            BenchmarkCategory::SegmentTable,
            samples,
            harness.should_keep_samples(),
        )
        .with_metadata("size", 8192),
    );
    println!("  ✓ rejected_oversize");
    Ok(())
}

fn attach(report: &mut BenchmarkReport, harness: &BenchmarkHarness) -> anyhow::Result<()> {
    let (kernel, pid) = bench_kernel(KernelConfig::default())?;
    let id = kernel.shmget(pid, SegmentKey::new(1), 4096)?;

    let samples = harness.run(|| {
        let va = kernel.shmat(pid, id)?;
        kernel.shmdt(pid, va)
    })?;
    report.add_result(BenchmarkResult::latency(
        "attach_detach",
        BenchmarkCategory::Attach,
        samples,
        harness.should_keep_samples(),
    ));
    println!("  ✓ attach_detach");

    // Only the detach half is timed here.
    let samples = harness.run_with_setup(
        || kernel.shmat(pid, id),
        |&va| kernel.shmdt(pid, va),
        |_| Ok(()),
    )?;
    report.add_result(BenchmarkResult::latency(
        "detach",
        BenchmarkCategory::Attach,
        samples,
        harness.should_keep_samples(),
    ));
    println!("  ✓ detach");
    Ok(())
}

fn user_access(report: &mut BenchmarkReport, harness: &BenchmarkHarness) -> anyhow::Result<()> {
    let (kernel, pid) = bench_kernel(KernelConfig::default())?;
    let id = kernel.shmget(pid, SegmentKey::new(1), 4096)?;
    let va = kernel.shmat(pid, id)?;

    let samples = harness.run(|| {
        let value = kernel.load_u32(pid, va)?;
        kernel.store_u32(pid, va, value.wrapping_add(1))
    })?;
    report.add_result(BenchmarkResult::latency(
        "load_store_u32",
        BenchmarkCategory::UserAccess,
        samples,
        harness.should_keep_samples(),
    ));
    println!("  ✓ load_store_u32");

    let page = vec![0xABu8; 4096];
    let samples = harness.run(|| kernel.write_bytes(pid, va, &page))?;
    report.add_result(
        BenchmarkResult::latency(
            "write_page",
            BenchmarkCategory::UserAccess,
            samples,
            harness.should_keep_samples(),
        )
        .with_metadata("bytes", page.len()),
    );
    println!("  ✓ write_page");
    Ok(())
}

fn contention(report: &mut BenchmarkReport, iterations: u64) -> anyhow::Result<()> {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());

    for threads in [1, 2, 4, 8].into_iter().filter(|&n| n <= cores.max(2)) {
        let kernel = Arc::new(Kernel::new(KernelConfig {
            attach_slots: 4,
            ..KernelConfig::default()
        })?);
        let (ops, duration_ns) = run_concurrent(&kernel, threads, iterations, |kernel, pid| {
            let id = kernel.shmget(pid, SegmentKey::new(7), 4096)?;
            let va = kernel.shmat(pid, id)?;
            kernel.shmdt(pid, va)?;
            kernel.release(pid, id)
        })?;

        let name = format!("get_attach_detach_{}", threads);
        report.add_result(
            BenchmarkResult::throughput(&name, BenchmarkCategory::Contention, ops, duration_ns)
                .with_metadata("threads", threads),
        );
        println!("  ✓ {}", name);
    }
    Ok(())
}

fn print_summary(report: &BenchmarkReport) {
    println!("Summary");
    println!("-------");
    println!();

    for result in &report.results {
        if let Some(latency) = &result.latency {
            println!(
                "{}: median={}, p99={}",
                result.name,
                LatencyMetrics::format_latency(latency.median_ns),
                LatencyMetrics::format_latency(latency.p99_ns)
            );
        }
        if let Some(throughput) = &result.throughput {
            println!("{}: {:.0} ops/s", result.name, throughput.ops_per_sec);
        }
    }
}
