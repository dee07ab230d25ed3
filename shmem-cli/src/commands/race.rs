// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmctl race` command - Lost updates on an unsynchronized shared counter.
//!
//! Each process runs on its own blocking task and increments one word of a
//! shared page with a plain load followed by a store.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use shmem_core::{Kernel, SegmentKey, ShmResult};

use super::CommandError;

const RACE_KEY: i32 = 0x7ace;

/// Outcome of one race run.
#[derive(Debug, Clone, Serialize)]
pub struct RaceReport {
    pub processes: usize,
    pub iterations: u32,
    pub expected: u64,
    pub observed: u32,
    pub lost: u64,
    pub elapsed_ms: u128,
}

pub async fn execute(
    config_path: Option<&str>,
    processes: usize,
    iterations: u32,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let kernel = Arc::new(super::boot(config_path)?);
    let report = run(kernel, processes, iterations).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Shared counter race");
    println!("  Processes:  {}", report.processes);
    println!("  Iterations: {} each", report.iterations);
    println!("  Expected:   {}", report.expected);
    println!("  Observed:   {}", report.observed);
    println!("  Lost:       {}", report.lost);
    println!("  Elapsed:    {}ms", report.elapsed_ms);
    Ok(())
}

async fn run(
    kernel: Arc<Kernel>,
    processes: usize,
    iterations: u32,
) -> Result<RaceReport, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let key = SegmentKey::new(RACE_KEY);
    let mut handles = Vec::with_capacity(processes);

    // The observer keeps the counter alive after every racer has exited.
    let observer = kernel.spawn();
    let id = kernel.shmget(observer, key, 4)?;
    let va = kernel.shmat(observer, id)?;

    for _ in 0..processes {
        let kernel = Arc::clone(&kernel);
        let pid = kernel.spawn();
        handles.push(tokio::task::spawn_blocking(move || -> ShmResult<()> {
            let id = kernel.shmget(pid, key, 4)?;
            let va = kernel.shmat(pid, id)?;
            for _ in 0..iterations {
                let value = kernel.load_u32(pid, va)?;
                kernel.store_u32(pid, va, value.wrapping_add(1))?;
            }
            kernel.exit(pid)
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| CommandError::Worker(e.to_string()))??;
    }

    let observed = kernel.load_u32(observer, va)?;
    kernel.exit(observer)?;

    let expected = processes as u64 * u64::from(iterations);
    tracing::debug!(expected = expected, observed = observed, "Race finished");

    Ok(RaceReport {
        processes,
        iterations,
        expected,
        observed,
        lost: expected.saturating_sub(u64::from(observed)),
        elapsed_ms: start.elapsed().as_millis(),
    })
}
