// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Raw entry points with sentinel returns.
//!
//! Every failure collapses to `-1` here and nowhere else; the typed error is
//! logged at debug level before it is discarded.

use crate::error::{SegmentError, ShmResult};
use crate::kernel::Kernel;
use crate::types::{ProcessId, SegmentId, SegmentKey, VirtAddr, PAGE_SIZE};

/// Returned by every entry point on failure.
pub const SYSCALL_ERROR: i64 = -1;

fn collapse<T>(call: &'static str, pid: ProcessId, result: ShmResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(call = call, pid = %pid, error = %e, "System call failed");
            None
        }
    }
}

fn reject(call: &'static str, pid: ProcessId, e: SegmentError) -> i64 {
    tracing::debug!(call = call, pid = %pid, error = %e, "System call rejected");
    SYSCALL_ERROR
}

/// Allocate or join the segment for `key`. Returns the id or `-1`.
pub fn sys_shmget(kernel: &Kernel, pid: ProcessId, key: i32, size: i32) -> i64 {
    if size <= 0 || size as usize > PAGE_SIZE {
        let e = SegmentError::UnsupportedSize {
            size: i64::from(size),
            max: PAGE_SIZE,
        };
        return reject("shmget", pid, e);
    }

    collapse(
        "shmget",
        pid,
        kernel.shmget(pid, SegmentKey::new(key), size as usize),
    )
    .map_or(SYSCALL_ERROR, |id| id.index() as i64)
}

/// Attach segment `id`. Returns the virtual address or `-1`.
pub fn sys_shmat(kernel: &Kernel, pid: ProcessId, id: i32) -> i64 {
    let Some(id) = SegmentId::from_raw(i64::from(id)) else {
        let e = SegmentError::NotFound(SegmentId::new(usize::MAX));
        return reject("shmat", pid, e);
    };

    collapse("shmat", pid, kernel.shmat(pid, id))
        .and_then(|addr| i64::try_from(addr.as_u64()).ok())
        .unwrap_or(SYSCALL_ERROR)
}

/// Detach the segment attached at `addr`. Returns `0` or `-1`.
pub fn sys_shmdt(kernel: &Kernel, pid: ProcessId, addr: u64) -> i64 {
    collapse("shmdt", pid, kernel.shmdt(pid, VirtAddr::new(addr))).map_or(SYSCALL_ERROR, |()| 0)
}
