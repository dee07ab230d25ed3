// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Process abstraction consumed by the attach/detach protocol.
//!
//! A process owns its address space, a growable extent ("highest used
//! address") and a fixed array of attach slots. It also records the
//! allocation references it took through `shmget`, so only the holder can
//! drop them and exit drops whatever is left.

mod registry;
mod slots;

pub use registry::ProcessTable;
pub use slots::{AttachSlot, AttachSlots};

use std::collections::BTreeMap;

use crate::mm::{PageTable, VirtualMapper};
use crate::types::{ProcessId, SegmentId, VirtAddr};

/// One user process as seen by the segment manager.
#[derive(Debug)]
pub struct Process<M: VirtualMapper = PageTable> {
    pid: ProcessId,
    extent: VirtAddr,
    slots: AttachSlots,
    allocations: BTreeMap<SegmentId, u32>,
    space: M,
}

impl<M: VirtualMapper> Process<M> {
    /// Create a process with empty attach slots.
    pub fn new(pid: ProcessId, extent: VirtAddr, slot_capacity: usize, space: M) -> Self {
        Self {
            pid,
            extent,
            slots: AttachSlots::new(slot_capacity),
            allocations: BTreeMap::new(),
            space,
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// End of the used part of the address space.
    pub fn extent(&self) -> VirtAddr {
        self.extent
    }

    pub fn set_extent(&mut self, extent: VirtAddr) {
        self.extent = extent;
    }

    pub fn slots(&self) -> &AttachSlots {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut AttachSlots {
        &mut self.slots
    }

    /// Record one allocation reference on `id`.
    pub fn hold(&mut self, id: SegmentId) {
        *self.allocations.entry(id).or_insert(0) += 1;
    }

    /// Give up one allocation reference on `id`. Returns false if none is held.
    pub fn unhold(&mut self, id: SegmentId) -> bool {
        match self.allocations.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.allocations.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Allocation references held on `id`.
    pub fn held(&self, id: SegmentId) -> u32 {
        self.allocations.get(&id).copied().unwrap_or(0)
    }

    /// Remove every allocation reference, as (segment, count) pairs.
    pub fn take_allocations(&mut self) -> BTreeMap<SegmentId, u32> {
        std::mem::take(&mut self.allocations)
    }

    pub fn space(&self) -> &M {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut M {
        &mut self.space
    }
}
