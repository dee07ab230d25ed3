// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmctl rendezvous` command - Two processes meet on one key.
//!
//! Both processes go through the raw entry points, so every step reports
//! the sentinel value a user program would see.

use shmem_core::syscall::{sys_shmat, sys_shmdt, sys_shmget, SYSCALL_ERROR};
use shmem_core::{Kernel, ProcessId, SegmentId, VirtAddr, PAGE_SIZE};

use super::CommandError;

const MAGIC: u32 = 0x5eed_cafe;

fn check(call: &'static str, pid: ProcessId, ret: i64) -> Result<i64, CommandError> {
    println!("  [pid {}] {:<6} -> {}", pid, call, ret);
    if ret == SYSCALL_ERROR {
        return Err(CommandError::CallFailed {
            call,
            pid: pid.value(),
        });
    }
    Ok(ret)
}

pub async fn execute(config_path: Option<&str>, key: i32) -> Result<(), Box<dyn std::error::Error>> {
    let kernel = super::boot(config_path)?;
    run(&kernel, key)?;
    Ok(())
}

fn run(kernel: &Kernel, key: i32) -> Result<(), Box<dyn std::error::Error>> {
    let a = kernel.spawn();
    let b = kernel.spawn();
    let size = PAGE_SIZE as i32;

    println!("Rendezvous on key {} ({} bytes)", key, size);

    let id_a = check("shmget", a, sys_shmget(kernel, a, key, size))?;
    let id_b = check("shmget", b, sys_shmget(kernel, b, key, size))?;
    if let Some(info) = SegmentId::from_raw(id_b).and_then(|id| kernel.segments().get(id).ok()) {
        println!("  segment {} refcount {}", info.id, info.refcount);
    }

    let va_a = check("shmat", a, sys_shmat(kernel, a, id_a as i32))?;
    let va_b = check("shmat", b, sys_shmat(kernel, b, id_b as i32))?;

    let va_a = VirtAddr::new(va_a as u64);
    let va_b = VirtAddr::new(va_b as u64);
    kernel.store_u32(a, va_a, MAGIC)?;
    let seen = kernel.load_u32(b, va_b)?;
    println!("  [pid {}] wrote {:#x} at {}", a, MAGIC, va_a);
    println!("  [pid {}] read  {:#x} at {}", b, seen, va_b);

    if seen != MAGIC {
        return Err(CommandError::ValueMismatch {
            written: MAGIC,
            read: seen,
        }
        .into());
    }

    check("shmdt", a, sys_shmdt(kernel, a, va_a.as_u64()))?;
    check("shmdt", b, sys_shmdt(kernel, b, va_b.as_u64()))?;
    kernel.exit(a)?;
    kernel.exit(b)?;

    println!("✓ Both processes observed the same page");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shmem_core::{KernelConfig, SegmentKey};

    #[test]
    fn test_rendezvous_succeeds() {
        let kernel = Kernel::new(KernelConfig::default()).unwrap();
        let free_pages = kernel.memory().available();
        run(&kernel, 5000).unwrap();

        // Exiting drops both shmget references, so the page is free again.
        assert_eq!(kernel.stats().in_use, 0);
        assert_eq!(kernel.memory().available(), free_pages);
        assert!(kernel.processes().is_empty());

        // A later run on another key starts from a clean table.
        run(&kernel, 5001).unwrap();
    }

    #[test]
    fn test_rendezvous_fails_on_full_table() {
        let config = KernelConfig {
            table_capacity: 1,
            ..KernelConfig::default()
        };
        let kernel = Kernel::new(config).unwrap();
        let holder = kernel.spawn();
        kernel.shmget(holder, SegmentKey::new(1), 1).unwrap();
        assert!(run(&kernel, 2).is_err());
    }
}
