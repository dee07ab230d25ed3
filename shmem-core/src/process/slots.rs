// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-process attach records.

use serde::Serialize;

use crate::types::{SegmentId, VirtAddr};

/// One attachment: a page at `addr` mapped to segment `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttachSlot {
    pub addr: VirtAddr,
    pub id: SegmentId,
}

/// Fixed-capacity array of attach slots, empty at process creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachSlots {
    slots: Vec<Option<AttachSlot>>,
}

impl AttachSlots {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the first empty slot.
    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Index of the slot recording exactly `addr`.
    pub fn find(&self, addr: VirtAddr) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|s| s.addr == addr))
    }

    pub fn get(&self, index: usize) -> Option<AttachSlot> {
        self.slots.get(index).copied().flatten()
    }

    /// Fill slot `index`. Returns false if it is out of range or occupied.
    pub fn record(&mut self, index: usize, slot: AttachSlot) -> bool {
        match self.slots.get_mut(index) {
            Some(entry @ None) => {
                *entry = Some(slot);
                true
            }
            _ => false,
        }
    }

    /// Empty slot `index` and return what it held.
    pub fn clear(&mut self, index: usize) -> Option<AttachSlot> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = AttachSlot> + '_ {
        self.slots.iter().flatten().copied()
    }

    /// Occupied slots paired with their slot index.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, AttachSlot)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, s)| s.map(|s| (index, s)))
    }

    pub fn attached(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.attached() == 0
    }
}
