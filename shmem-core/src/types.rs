// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for keys, ids and addresses.
//!
//! Following the "Newtype" pattern in Rust so that a segment id can never be
//! confused with a key, or a virtual address with a physical one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Size of one physical page and of every segment.
pub const PAGE_SIZE: usize = 4096;

/// Round `size` up to the next page boundary, or `None` if that overflows.
pub const fn page_round_up(size: usize) -> Option<usize> {
    size.checked_next_multiple_of(PAGE_SIZE)
}

/// Round `addr` down to its page boundary.
pub const fn page_round_down(addr: u64) -> u64 {
    addr & !(PAGE_SIZE as u64 - 1)
}

/// Caller-chosen rendezvous key.
/// Key 0 is private: it never matches another allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentKey(i32);

impl SegmentKey {
    /// The private (unnamed) key.
    pub const PRIVATE: Self = Self(0);

    pub const fn new(key: i32) -> Self {
        Self(key)
    }

    pub const fn is_private(&self) -> bool {
        self.0 == 0
    }

    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_private() {
            write!(f, "private")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Index of a descriptor in the segment table.
/// Stable while the descriptor is valid; reused after it is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(usize);

impl SegmentId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Convert a raw syscall argument. Negative values never name a segment.
    pub fn from_raw(raw: i64) -> Option<Self> {
        usize::try_from(raw).ok().map(Self)
    }

    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated process ID.
/// Must be positive (non-zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Create a new ProcessId with validation.
    pub fn new(pid: u32) -> Result<Self, HardValidationError> {
        if pid == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "process_id",
                value: "0".to_string(),
                reason: "Process ID 0 is reserved".to_string(),
            });
        }
        Ok(Self(pid))
    }

    /// Get the inner PID value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ProcessId> for u32 {
    fn from(pid: ProcessId) -> Self {
        pid.0
    }
}

/// User virtual address inside one process's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VirtAddr(u64);

impl VirtAddr {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn is_page_aligned(&self) -> bool {
        self.0 % PAGE_SIZE as u64 == 0
    }

    /// Start of the page containing this address.
    pub const fn page_base(&self) -> Self {
        Self(page_round_down(self.0))
    }

    /// Byte offset inside the containing page.
    pub const fn page_offset(&self) -> usize {
        (self.0 % PAGE_SIZE as u64) as usize
    }

    /// Smallest page-aligned address not below this one.
    pub const fn page_round_up(&self) -> Self {
        Self(page_round_down(self.0 + PAGE_SIZE as u64 - 1))
    }

    pub fn checked_add(&self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Physical address of a page frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysAddr(u64);

impl PhysAddr {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
