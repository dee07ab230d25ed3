//! Shmem Core Library
//!
//! Keyed shared-memory segments for a small multi-process kernel model.
//! Provides the segment table, the attach/detach protocol, simulated
//! physical memory and address spaces, configuration parsing and the
//! sentinel-returning system call entry points.

pub mod attach;
pub mod config;
pub mod error;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod segment;
pub mod stats;
pub mod syscall;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigLoader, ForkPolicy, KernelConfig};
pub use error::{HardValidationError, MapError, SegmentError, ShmError, ShmResult};
pub use kernel::Kernel;
pub use mm::{FramePool, PageAllocator, PageFlags, PageTable, VirtualMapper};
pub use process::{AttachSlot, Process, ProcessTable};
pub use segment::{SegmentState, SegmentTable};
pub use stats::{SegmentInfo, TableStats};
pub use types::{ProcessId, SegmentId, SegmentKey, VirtAddr, PAGE_SIZE};
