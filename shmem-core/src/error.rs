//! Custom error types for the segment manager.
//!
//! All errors are explicit enums. Inside the crate every failure keeps its
//! own variant; only the system-call boundary collapses them to `-1`.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ProcessId, SegmentId, SegmentKey, VirtAddr};

/// Top-level error type for the segment manager.
#[derive(Debug, Error)]
pub enum ShmError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Segment Errors - collapsed to a sentinel at the syscall boundary
    // =========================================================================
    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    // =========================================================================
    // Process Errors
    // =========================================================================
    #[error("Process not found: {0}")]
    ProcessNotFound(ProcessId),

    #[error("Page fault in process {pid} at {addr}: {reason}")]
    PageFault {
        pid: ProcessId,
        addr: VirtAddr,
        reason: &'static str,
    },

    #[error("Physical memory setup failed: {reason}")]
    PhysicalMemory { reason: String },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration and newtype validation errors.
/// An invalid field prevents the kernel context from being built.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Capacity out of bounds: {field} = {value} (min: {min}, max: {max})")]
    CapacityOutOfBounds {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("Address {field} = {value:#x} is not page aligned")]
    UnalignedAddress { field: &'static str, value: u64 },
}

/// Segment table and attach/detach failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Out of physical memory")]
    OutOfMemory,

    #[error("Segment table full ({capacity} descriptors in use)")]
    TableFull { capacity: usize },

    #[error("Segment {id} with key {key} has size {existing}, requested {requested}")]
    SizeMismatch {
        key: SegmentKey,
        id: SegmentId,
        existing: usize,
        requested: usize,
    },

    #[error("Unsupported segment size {size} (must be in 1..={max})")]
    UnsupportedSize { size: i64, max: usize },

    #[error("Segment {0} not found")]
    NotFound(SegmentId),

    #[error("Process {pid} has no free attach slots ({capacity} in use)")]
    NoFreeSlots { pid: ProcessId, capacity: usize },

    #[error("Failed to map segment at {addr}: {source}")]
    MapFailed {
        addr: VirtAddr,
        #[source]
        source: MapError,
    },

    #[error("No segment attached at {0}")]
    NotAttached(VirtAddr),

    #[error("Process {pid} holds no allocation reference to segment {id}")]
    NotHeld { pid: ProcessId, id: SegmentId },
}

/// Reasons a virtual memory mapper refuses a request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("address {0} is not page aligned")]
    Unaligned(VirtAddr),

    #[error("address {addr} is outside the user range (limit {limit})")]
    OutOfRange { addr: VirtAddr, limit: VirtAddr },

    #[error("address {0} is already mapped")]
    AlreadyMapped(VirtAddr),

    #[error("address {0} is not mapped")]
    NotMapped(VirtAddr),
}

/// Result type alias using ShmError.
pub type ShmResult<T> = Result<T, ShmError>;
