//! `shmctl stats` command - Show segment table statistics.
//!
//! Allocates one segment per key from a single process and prints the table.

use shmem_core::syscall::{sys_shmget, SYSCALL_ERROR};
use shmem_core::{Kernel, TableStats};

pub async fn execute(
    config_path: Option<&str>,
    keys: &[i32],
    size: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let kernel = super::boot(config_path)?;
    let stats = populate(&kernel, keys, size);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!(
        "Segment table: {} / {} in use, {} free",
        stats.in_use, stats.capacity, stats.free_slots
    );
    println!(
        "Physical memory: {} / {} pages free",
        kernel.memory().available(),
        kernel.memory().capacity()
    );
    println!();
    println!("{:<6} {:<10} {:<8} {:<9} FRAME", "ID", "KEY", "SIZE", "REFCOUNT");
    for segment in &stats.segments {
        println!(
            "{:<6} {:<10} {:<8} {:<9} {}",
            segment.id.to_string(),
            segment.key.to_string(),
            segment.size,
            segment.refcount,
            segment.frame.start()
        );
    }
    Ok(())
}

fn populate(kernel: &Kernel, keys: &[i32], size: usize) -> TableStats {
    let pid = kernel.spawn();
    let size = i32::try_from(size).unwrap_or(i32::MAX);

    for &key in keys {
        if sys_shmget(kernel, pid, key, size) == SYSCALL_ERROR {
            tracing::warn!(key = key, size = size, "Segment allocation refused");
        }
    }
    kernel.stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shmem_core::KernelConfig;

    #[test]
    fn test_repeated_keys_join() {
        let kernel = Kernel::new(KernelConfig::default()).unwrap();
        let stats = populate(&kernel, &[4, 4, 9], 100);

        assert_eq!(stats.in_use, 2);
        assert_eq!(stats.segments[0].refcount, 2);
        assert_eq!(stats.segments[0].size, 4096);
        assert_eq!(stats.segments[1].refcount, 1);
    }

    #[test]
    fn test_refused_keys_are_skipped() {
        let kernel = Kernel::new(KernelConfig::default()).unwrap();
        let stats = populate(&kernel, &[1, 2], 8192);
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.free_slots, stats.capacity);
    }

    #[test]
    fn test_stats_serialize() {
        let kernel = Kernel::new(KernelConfig::default()).unwrap();
        let stats = populate(&kernel, &[1], 1);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["in_use"], 1);
        assert_eq!(json["segments"][0]["refcount"], 1);
    }
}
