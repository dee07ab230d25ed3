// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fixed-capacity segment table.
//!
//! Every lookup-then-act operation runs under one table-wide mutex. The
//! physical page of a descriptor is owned by the table from allocation until
//! the reference count drops to zero, when it goes straight back to the
//! allocator.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::SegmentError;
use crate::mm::{PageAllocator, PhysFrame};
use crate::segment::state::{Release, SegmentState};
use crate::stats::{SegmentInfo, TableStats};
use crate::types::{page_round_up, SegmentId, SegmentKey, PAGE_SIZE};

/// One table slot. Valid exactly while `state` is Allocated.
#[derive(Debug, Clone, Default)]
struct SegmentDescriptor {
    key: SegmentKey,
    size: usize,
    frame: Option<PhysFrame>,
    state: SegmentState,
}

impl SegmentDescriptor {
    fn info(&self, id: SegmentId) -> Option<SegmentInfo> {
        if !self.state.is_allocated() {
            return None;
        }
        self.frame.map(|frame| SegmentInfo {
            id,
            key: self.key,
            size: self.size,
            refcount: self.state.refcount(),
            frame,
        })
    }
}

/// Table of shared segments with reference-counted lifetime.
#[derive(Debug)]
pub struct SegmentTable<A: PageAllocator> {
    allocator: A,
    descriptors: Mutex<Vec<SegmentDescriptor>>,
}

impl<A: PageAllocator> SegmentTable<A> {
    /// Create a table with `capacity` free descriptors.
    pub fn new(capacity: usize, allocator: A) -> Self {
        Self {
            allocator,
            descriptors: Mutex::new(vec![SegmentDescriptor::default(); capacity]),
        }
    }

    /// Number of descriptors.
    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// The page allocator backing this table.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Id of the first valid segment with this key. Private keys never match.
    pub fn find_by_key(&self, key: SegmentKey) -> Option<SegmentId> {
        Self::find_locked(&self.lock(), key)
    }

    /// Join the segment registered under `key`, or allocate a new one.
    ///
    /// Joining takes one more reference on the existing descriptor. A new
    /// descriptor starts with a reference count of one and a zeroed page.
    pub fn allocate_or_join(
        &self,
        key: SegmentKey,
        requested_size: usize,
    ) -> Result<SegmentId, SegmentError> {
        if requested_size == 0 {
            return Err(SegmentError::UnsupportedSize {
                size: 0,
                max: PAGE_SIZE,
            });
        }
        let size = page_round_up(requested_size).ok_or(SegmentError::UnsupportedSize {
            size: i64::try_from(requested_size).unwrap_or(i64::MAX),
            max: PAGE_SIZE,
        })?;

        let mut descriptors = self.lock();

        if let Some(id) = Self::find_locked(&descriptors, key) {
            let desc = &mut descriptors[id.index()];
            if desc.size != size {
                return Err(SegmentError::SizeMismatch {
                    key,
                    id,
                    existing: desc.size,
                    requested: size,
                });
            }
            desc.state.retain();
            tracing::debug!(
                id = %id,
                key = %key,
                refcount = desc.state.refcount(),
                "Joined segment"
            );
            return Ok(id);
        }

        let capacity = descriptors.len();
        let index = descriptors
            .iter()
            .position(|d| !d.state.is_allocated())
            .ok_or(SegmentError::TableFull { capacity })?;

        if size > PAGE_SIZE {
            return Err(SegmentError::UnsupportedSize {
                size: i64::try_from(requested_size).unwrap_or(i64::MAX),
                max: PAGE_SIZE,
            });
        }

        let frame = self.allocator.acquire().ok_or(SegmentError::OutOfMemory)?;
        self.allocator.zero(frame);

        let desc = &mut descriptors[index];
        desc.key = key;
        desc.size = size;
        desc.frame = Some(frame);
        desc.state.allocate();

        let id = SegmentId::new(index);
        tracing::debug!(
            id = %id,
            key = %key,
            frame = %frame.start(),
            "Allocated segment"
        );
        Ok(id)
    }

    /// Snapshot of a valid descriptor.
    ///
    /// This is an advisory pre-check: the answer can be stale by the time
    /// the caller acts on it. Transitions re-validate under the lock.
    pub fn get(&self, id: SegmentId) -> Result<SegmentInfo, SegmentError> {
        self.lock()
            .get(id.index())
            .and_then(|d| d.info(id))
            .ok_or(SegmentError::NotFound(id))
    }

    /// Take one reference on a valid segment and return its snapshot.
    pub fn pin(&self, id: SegmentId) -> Result<SegmentInfo, SegmentError> {
        let mut descriptors = self.lock();
        let desc = descriptors
            .get_mut(id.index())
            .filter(|d| d.state.is_allocated())
            .ok_or(SegmentError::NotFound(id))?;

        desc.state.retain();
        desc.info(id).ok_or(SegmentError::NotFound(id))
    }

    /// Add one reference. Stale ids are ignored.
    pub fn increment_ref(&self, id: SegmentId) {
        let mut descriptors = self.lock();
        if let Some(desc) = descriptors.get_mut(id.index()) {
            if desc.state.retain() {
                tracing::trace!(id = %id, refcount = desc.state.refcount(), "Segment retained");
            }
        }
    }

    /// Drop one reference. Stale ids are ignored.
    ///
    /// The last reference frees the page and invalidates the descriptor.
    pub fn decrement_ref(&self, id: SegmentId) {
        let mut descriptors = self.lock();
        let Some(desc) = descriptors.get_mut(id.index()) else {
            return;
        };

        match desc.state.release() {
            Release::Stale => {}
            Release::Retained(refcount) => {
                tracing::trace!(id = %id, refcount = refcount, "Segment released");
            }
            Release::Reclaimed => {
                if let Some(frame) = desc.frame.take() {
                    self.allocator.release(frame);
                    tracing::debug!(
                        id = %id,
                        key = %desc.key,
                        frame = %frame.start(),
                        "Freed segment"
                    );
                }
            }
        }
    }

    /// Number of descriptors not in use.
    pub fn free_slots(&self) -> usize {
        self.lock()
            .iter()
            .filter(|d| !d.state.is_allocated())
            .count()
    }

    /// Consistent snapshot of every valid segment.
    pub fn stats(&self) -> TableStats {
        let descriptors = self.lock();
        let segments: Vec<SegmentInfo> = descriptors
            .iter()
            .enumerate()
            .filter_map(|(index, d)| d.info(SegmentId::new(index)))
            .collect();

        TableStats {
            capacity: descriptors.len(),
            in_use: segments.len(),
            free_slots: descriptors.len() - segments.len(),
            segments,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SegmentDescriptor>> {
        self.descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn find_locked(descriptors: &[SegmentDescriptor], key: SegmentKey) -> Option<SegmentId> {
        if key.is_private() {
            return None;
        }
        descriptors
            .iter()
            .position(|d| d.state.is_allocated() && d.key == key)
            .map(SegmentId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::FramePool;

    fn table(capacity: usize, frames: usize) -> SegmentTable<FramePool> {
        SegmentTable::new(capacity, FramePool::new(frames).unwrap())
    }

    #[test]
    fn test_allocate_then_join() {
        let table = table(4, 4);
        let key = SegmentKey::new(5000);

        let first = table.allocate_or_join(key, 4096).unwrap();
        assert_eq!(first, SegmentId::new(0));

        for expected_refs in 2..=5 {
            let id = table.allocate_or_join(key, 4096).unwrap();
            assert_eq!(id, first);
            assert_eq!(table.get(id).unwrap().refcount, expected_refs);
        }
        assert_eq!(table.allocator().available(), 3);
    }

    #[test]
    fn test_size_rounds_to_page() {
        let table = table(4, 4);
        let key = SegmentKey::new(7);

        let id = table.allocate_or_join(key, 100).unwrap();
        assert_eq!(table.get(id).unwrap().size, PAGE_SIZE);

        // 1 byte and 4096 bytes round to the same page.
        assert_eq!(table.allocate_or_join(key, PAGE_SIZE).unwrap(), id);
    }

    #[test]
    fn test_size_mismatch_leaves_state() {
        let table = table(4, 4);
        let key = SegmentKey::new(42);
        let id = table.allocate_or_join(key, 4096).unwrap();
        let before = table.get(id).unwrap();

        let err = table.allocate_or_join(key, 5000).unwrap_err();
        assert!(matches!(err, SegmentError::SizeMismatch { existing: 4096, requested: 8192, .. }));
        assert_eq!(table.get(id).unwrap(), before);
    }

    #[test]
    fn test_private_key_never_joins() {
        let table = table(4, 4);
        let a = table
            .allocate_or_join(SegmentKey::PRIVATE, 4096)
            .unwrap();
        let b = table
            .allocate_or_join(SegmentKey::PRIVATE, 4096)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(table.find_by_key(SegmentKey::PRIVATE), None);
        assert_eq!(table.get(a).unwrap().refcount, 1);
    }

    #[test]
    fn test_oversized_rejected() {
        let table = table(4, 4);
        let free_before = table.free_slots();

        let err = table.allocate_or_join(SegmentKey::new(1), 5000).unwrap_err();
        assert_eq!(
            err,
            SegmentError::UnsupportedSize {
                size: 5000,
                max: PAGE_SIZE
            }
        );
        assert_eq!(table.free_slots(), free_before);
        assert_eq!(table.allocator().available(), 4);
    }

    #[test]
    fn test_huge_size_rejected() {
        let table = table(4, 4);
        let free_before = table.free_slots();

        let err = table
            .allocate_or_join(SegmentKey::new(1), usize::MAX)
            .unwrap_err();
        assert_eq!(
            err,
            SegmentError::UnsupportedSize {
                size: i64::MAX,
                max: PAGE_SIZE
            }
        );
        assert_eq!(table.free_slots(), free_before);
        assert_eq!(table.allocator().available(), 4);
        assert!(table.stats().segments.is_empty());
    }

    #[test]
    fn test_zero_size_rejected() {
        let table = table(4, 4);
        assert!(matches!(
            table.allocate_or_join(SegmentKey::new(1), 0),
            Err(SegmentError::UnsupportedSize { size: 0, .. })
        ));
    }

    #[test]
    fn test_table_full() {
        let table = table(2, 8);
        table.allocate_or_join(SegmentKey::new(1), 1).unwrap();
        table.allocate_or_join(SegmentKey::new(2), 1).unwrap();

        assert_eq!(
            table.allocate_or_join(SegmentKey::new(3), 1),
            Err(SegmentError::TableFull { capacity: 2 })
        );
        // Joining still works on a full table.
        assert!(table.allocate_or_join(SegmentKey::new(1), 1).is_ok());
    }

    #[test]
    fn test_out_of_memory() {
        let table = table(4, 1);
        table.allocate_or_join(SegmentKey::new(1), 1).unwrap();
        assert_eq!(
            table.allocate_or_join(SegmentKey::new(2), 1),
            Err(SegmentError::OutOfMemory)
        );
        assert_eq!(table.free_slots(), 3);
    }

    #[test]
    fn test_decrement_to_zero_frees_once() {
        let table = table(2, 2);
        let key = SegmentKey::new(9);
        let id = table.allocate_or_join(key, 4096).unwrap();
        let frame = table.get(id).unwrap().frame;
        table.increment_ref(id);

        table.decrement_ref(id);
        assert!(table.allocator().is_allocated(frame));

        table.decrement_ref(id);
        assert!(!table.allocator().is_allocated(frame));
        assert_eq!(table.get(id), Err(SegmentError::NotFound(id)));
        assert_eq!(table.allocator().available(), 2);

        // Further decrements on the stale id are no-ops.
        table.decrement_ref(id);
        assert_eq!(table.allocator().available(), 2);

        let fresh = table.allocate_or_join(key, 4096).unwrap();
        assert_eq!(table.get(fresh).unwrap().refcount, 1);
    }

    #[test]
    fn test_increment_stale_is_ignored() {
        let table = table(2, 2);
        table.increment_ref(SegmentId::new(1));
        table.increment_ref(SegmentId::new(99));
        assert_eq!(table.free_slots(), 2);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let table = table(2, 2);
        assert_eq!(
            table.get(SegmentId::new(2)),
            Err(SegmentError::NotFound(SegmentId::new(2)))
        );
    }

    #[test]
    fn test_pin_revalidates() {
        let table = table(2, 2);
        let id = table.allocate_or_join(SegmentKey::new(3), 1).unwrap();
        assert_eq!(table.pin(id).unwrap().refcount, 2);

        table.decrement_ref(id);
        table.decrement_ref(id);
        assert_eq!(table.pin(id), Err(SegmentError::NotFound(id)));
    }

    #[test]
    fn test_new_page_is_zeroed() {
        let table = table(1, 1);
        let id = table.allocate_or_join(SegmentKey::new(1), 1).unwrap();
        let frame = table.get(id).unwrap().frame;
        table.allocator().store_u32(frame, 0, 77).unwrap();
        table.decrement_ref(id);

        let id = table.allocate_or_join(SegmentKey::new(2), 1).unwrap();
        let frame = table.get(id).unwrap().frame;
        assert_eq!(table.allocator().load_u32(frame, 0), Some(0));
    }

    #[test]
    fn test_stats_snapshot() {
        let table = table(3, 3);
        let id = table.allocate_or_join(SegmentKey::new(11), 1).unwrap();
        table.allocate_or_join(SegmentKey::new(11), 1).unwrap();

        let stats = table.stats();
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.free_slots, 2);
        assert_eq!(stats.segment(id).unwrap().refcount, 2);
    }

    #[test]
    fn test_concurrent_join() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(table(4, 4));
        let key = SegmentKey::new(5000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || table.allocate_or_join(key, 4096).unwrap())
            })
            .collect();

        let ids: Vec<SegmentId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(table.get(ids[0]).unwrap().refcount, 8);
        assert_eq!(table.stats().in_use, 1);
    }
}
