// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for timing kernel operations.
//!
//! Operations return `ShmResult` so a refused call stops the run instead of
//! being timed as if it had succeeded.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shmem_core::{Kernel, KernelConfig, ProcessId, ShmResult};

/// Measures per-call latency of a kernel operation.
pub struct BenchmarkHarness {
    warmup_iterations: u64,
    measurement_iterations: u64,
    keep_raw_samples: bool,
}

impl BenchmarkHarness {
    pub fn new() -> Self {
        Self {
            warmup_iterations: 10,
            measurement_iterations: 100,
            keep_raw_samples: true,
        }
    }

    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    pub fn iterations(mut self, iterations: u64) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    pub fn keep_samples(mut self, keep: bool) -> Self {
        self.keep_raw_samples = keep;
        self
    }

    pub fn should_keep_samples(&self) -> bool {
        self.keep_raw_samples
    }

    /// Time each call of `operation`. Returns latency samples in nanoseconds.
    pub fn run<F>(&self, mut operation: F) -> ShmResult<Vec<u64>>
    where
        F: FnMut() -> ShmResult<()>,
    {
        for _ in 0..self.warmup_iterations {
            operation()?;
        }

        let mut samples = Vec::with_capacity(self.measurement_iterations as usize);
        for _ in 0..self.measurement_iterations {
            let start = Instant::now();
            operation()?;
            samples.push(start.elapsed().as_nanos() as u64);
        }
        Ok(samples)
    }

    /// Like [`run`](Self::run), but only `operation` is timed; `setup` feeds
    /// it and `teardown` cleans up after it.
    pub fn run_with_setup<T, S, O, D>(
        &self,
        mut setup: S,
        mut operation: O,
        mut teardown: D,
    ) -> ShmResult<Vec<u64>>
    where
        S: FnMut() -> ShmResult<T>,
        O: FnMut(&T) -> ShmResult<()>,
        D: FnMut(T) -> ShmResult<()>,
    {
        for _ in 0..self.warmup_iterations {
            let input = setup()?;
            operation(&input)?;
            teardown(input)?;
        }

        let mut samples = Vec::with_capacity(self.measurement_iterations as usize);
        for _ in 0..self.measurement_iterations {
            let input = setup()?;
            let start = Instant::now();
            operation(&input)?;
            let elapsed = start.elapsed();
            teardown(input)?;
            samples.push(elapsed.as_nanos() as u64);
        }
        Ok(samples)
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A kernel with one spawned process, ready for single-threaded benchmarks.
pub fn bench_kernel(config: KernelConfig) -> ShmResult<(Kernel, ProcessId)> {
    let kernel = Kernel::new(config)?;
    let pid = kernel.spawn();
    Ok((kernel, pid))
}

/// Run `per_thread` calls of `operation` on each of `threads` processes at
/// once. Returns (total operations, wall-clock nanoseconds).
pub fn run_concurrent<F>(
    kernel: &Arc<Kernel>,
    threads: usize,
    per_thread: u64,
    operation: F,
) -> ShmResult<(u64, u64)>
where
    F: Fn(&Kernel, ProcessId) -> ShmResult<()> + Send + Sync + 'static,
{
    let operation = Arc::new(operation);
    let pids: Vec<ProcessId> = (0..threads).map(|_| kernel.spawn()).collect();

    let start = Instant::now();
    let handles: Vec<_> = pids
        .iter()
        .map(|&pid| {
            let kernel = Arc::clone(kernel);
            let operation = Arc::clone(&operation);
            thread::spawn(move || -> ShmResult<()> {
                for _ in 0..per_thread {
                    operation(&kernel, pid)?;
                }
                Ok(())
            })
        })
        .collect();

    let mut outcome = Ok(());
    for handle in handles {
        match handle.join() {
            Ok(result) => outcome = outcome.and(result),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
    let elapsed: Duration = start.elapsed();

    for pid in pids {
        kernel.exit(pid)?;
    }
    outcome?;
    Ok((threads as u64 * per_thread, elapsed.as_nanos() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shmem_core::{SegmentError, SegmentKey, ShmError};

    #[test]
    fn test_harness_collects_samples() {
        let (kernel, pid) = bench_kernel(KernelConfig::default()).unwrap();
        let harness = BenchmarkHarness::new().warmup(5).iterations(20);

        let samples = harness
            .run(|| kernel.shmget(pid, SegmentKey::new(1), 64).map(|_| ()))
            .unwrap();

        assert_eq!(samples.len(), 20);
        // warmup + measurement references on one descriptor
        assert_eq!(kernel.stats().segments[0].refcount, 25);
    }

    #[test]
    fn test_harness_stops_on_error() {
        let (kernel, pid) = bench_kernel(KernelConfig::default()).unwrap();
        let harness = BenchmarkHarness::new().warmup(0).iterations(10);

        let result = harness.run(|| kernel.shmget(pid, SegmentKey::new(1), 8192).map(|_| ()));
        assert!(matches!(
            result,
            Err(ShmError::Segment(SegmentError::UnsupportedSize { .. }))
        ));
    }

    #[test]
    fn test_setup_and_teardown_balance() {
        let (kernel, pid) = bench_kernel(KernelConfig::default()).unwrap();
        let id = kernel.shmget(pid, SegmentKey::new(2), 64).unwrap();
        let harness = BenchmarkHarness::new().warmup(3).iterations(10);

        let samples = harness
            .run_with_setup(
                || kernel.shmat(pid, id),
                |&va| kernel.store_u32(pid, va, 1),
                |va| kernel.shmdt(pid, va),
            )
            .unwrap();

        assert_eq!(samples.len(), 10);
        assert_eq!(kernel.stats().segments[0].refcount, 1);
        assert!(kernel.attachments(pid).unwrap().is_empty());
    }

    #[test]
    fn test_run_concurrent() {
        let kernel = Arc::new(Kernel::new(KernelConfig::default()).unwrap());
        let (ops, _) = run_concurrent(&kernel, 4, 50, |kernel, pid| {
            let id = kernel.shmget(pid, SegmentKey::new(3), 16)?;
            let va = kernel.shmat(pid, id)?;
            kernel.shmdt(pid, va)
        })
        .unwrap();

        assert_eq!(ops, 200);
        assert!(kernel.processes().is_empty());
        // Exiting dropped every shmget reference the workers took.
        assert_eq!(kernel.stats().in_use, 0);
    }
}
