// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Segment table and attach/detach microbenchmarks.
//!
//! Measures the single-process cost of every entry point on a fresh kernel.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shmem_benchmark::harness::bench_kernel;
use shmem_core::syscall::{sys_shmat, sys_shmdt, sys_shmget};
use shmem_core::{KernelConfig, SegmentKey};
use std::time::Duration;

/// Table sizes to benchmark; key lookup is a linear scan.
const TABLE_SIZES: &[usize] = &[16, 128, 1024];

/// Benchmark allocate-then-release of a private segment.
fn bench_allocate_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_allocate_release");
    group.measurement_time(Duration::from_secs(3));

    for &capacity in TABLE_SIZES {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let config = KernelConfig {
                    table_capacity: capacity,
                    ..KernelConfig::default()
                };
                let (kernel, pid) = bench_kernel(config).expect("Failed to build kernel");

                b.iter(|| {
                    let id = kernel
                        .shmget(pid, SegmentKey::PRIVATE, black_box(4096))
                        .expect("Allocation failed");
                    kernel.release(pid, id).expect("Release failed");
                });
            },
        );
    }

    group.finish();
}

/// Benchmark joining the last descriptor of a full table.
fn bench_join_existing(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_join");
    group.measurement_time(Duration::from_secs(3));

    for &capacity in TABLE_SIZES {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let config = KernelConfig {
                    table_capacity: capacity,
                    physical_pages: capacity,
                    ..KernelConfig::default()
                };
                let (kernel, pid) = bench_kernel(config).expect("Failed to build kernel");
                for key in 1..=capacity as i32 {
                    kernel
                        .shmget(pid, SegmentKey::new(key), 64)
                        .expect("Allocation failed");
                }
                let last = SegmentKey::new(capacity as i32);

                b.iter(|| {
                    let id = kernel.shmget(pid, black_box(last), 64).expect("Join failed");
                    kernel.release(pid, id).expect("Release failed");
                });
            },
        );
    }

    group.finish();
}

/// Benchmark a full attach/detach cycle through the sentinel entry points.
fn bench_attach_detach(c: &mut Criterion) {
    c.bench_function("syscall_attach_detach", |b| {
        let (kernel, pid) = bench_kernel(KernelConfig::default()).expect("Failed to build kernel");
        let id = sys_shmget(&kernel, pid, 1, 4096) as i32;

        b.iter(|| {
            let va = sys_shmat(&kernel, pid, black_box(id));
            black_box(sys_shmdt(&kernel, pid, va as u64));
        });
    });
}

/// Benchmark word access through a process page table.
fn bench_user_access(c: &mut Criterion) {
    c.bench_function("user_load_store_u32", |b| {
        let (kernel, pid) = bench_kernel(KernelConfig::default()).expect("Failed to build kernel");
        let id = kernel
            .shmget(pid, SegmentKey::new(1), 4096)
            .expect("Allocation failed");
        let va = kernel.shmat(pid, id).expect("Attach failed");

        b.iter(|| {
            let value = kernel.load_u32(pid, va).expect("Load failed");
            kernel
                .store_u32(pid, va, black_box(value.wrapping_add(1)))
                .expect("Store failed");
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_release,
    bench_join_existing,
    bench_attach_detach,
    bench_user_access,
);

criterion_main!(benches);
