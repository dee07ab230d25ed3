// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use serde::Serialize;

use crate::mm::PhysFrame;
use crate::types::{SegmentId, SegmentKey};

/// Snapshot of one valid descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub id: SegmentId,
    pub key: SegmentKey,
    pub size: usize,
    pub refcount: u32,
    pub frame: PhysFrame,
}

/// Consistent view of the whole segment table, taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub capacity: usize,
    pub in_use: usize,
    pub free_slots: usize,
    pub segments: Vec<SegmentInfo>,
}

impl TableStats {
    /// Look up a segment in the snapshot.
    pub fn segment(&self, id: SegmentId) -> Option<&SegmentInfo> {
        self.segments.iter().find(|s| s.id == id)
    }
}
