// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Memory collaborators.
//!
//! The physical page allocator and the virtual memory mapper, each as a
//! trait contract plus the host simulation used by the kernel context.

mod frame;
mod page_table;

pub use frame::{FramePool, PageAllocator, PhysFrame, PHYS_BASE};
pub use page_table::{Mapping, PageFlags, PageTable, Translation, VirtualMapper};
