// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Attach/detach protocol.
//!
//! Maps segment pages into a process's address space and keeps the process's
//! attach slots and the table's reference counts in step. Lock order is
//! always process, then table, then allocator.

use crate::error::SegmentError;
use crate::mm::{PageAllocator, PageFlags, VirtualMapper};
use crate::process::{AttachSlot, Process};
use crate::segment::SegmentTable;
use crate::types::{SegmentId, VirtAddr, PAGE_SIZE};

/// Map segment `id` just above the process's extent and return the address.
///
/// The reference is taken under the table lock before mapping, so the page
/// cannot be reclaimed between the lookup and the mapping.
pub fn attach<A, M>(
    table: &SegmentTable<A>,
    process: &mut Process<M>,
    id: SegmentId,
) -> Result<VirtAddr, SegmentError>
where
    A: PageAllocator,
    M: VirtualMapper,
{
    // Advisory pre-check, no reference taken yet.
    table.get(id)?;

    let slot = process
        .slots()
        .free_slot()
        .ok_or(SegmentError::NoFreeSlots {
            pid: process.pid(),
            capacity: process.slots().capacity(),
        })?;

    let addr = process.extent().page_round_up();
    let segment = table.pin(id)?;

    if let Err(source) = process
        .space_mut()
        .map(addr, segment.frame, PageFlags::SHARED_SEGMENT)
    {
        table.decrement_ref(id);
        return Err(SegmentError::MapFailed { addr, source });
    }

    // The mapper accepted the page, so it lies below the user limit.
    if let Some(end) = addr.checked_add(PAGE_SIZE as u64) {
        process.set_extent(end);
    }
    process.slots_mut().record(slot, AttachSlot { addr, id });

    tracing::debug!(
        pid = %process.pid(),
        id = %id,
        addr = %addr,
        refcount = segment.refcount,
        "Attached segment"
    );
    Ok(addr)
}

/// Unmap the segment attached at exactly `addr` and drop its reference.
pub fn detach<A, M>(
    table: &SegmentTable<A>,
    process: &mut Process<M>,
    addr: VirtAddr,
) -> Result<(), SegmentError>
where
    A: PageAllocator,
    M: VirtualMapper,
{
    let index = process
        .slots()
        .find(addr)
        .ok_or(SegmentError::NotAttached(addr))?;

    release_slot(table, process, index);
    Ok(())
}

/// Detach every outstanding attachment, newest address first.
/// Returns how many segments were detached.
pub fn detach_all<A, M>(table: &SegmentTable<A>, process: &mut Process<M>) -> usize
where
    A: PageAllocator,
    M: VirtualMapper,
{
    let mut attached: Vec<(usize, VirtAddr)> = (0..process.slots().capacity())
        .filter_map(|index| process.slots().get(index).map(|s| (index, s.addr)))
        .collect();
    // Top-down so the extent can shrink back page by page.
    attached.sort_unstable_by(|a, b| b.1.cmp(&a.1));

    for (index, _) in &attached {
        release_slot(table, process, *index);
    }
    attached.len()
}

/// Give `child` its own reference and mapping for each of `inherited`, at
/// the same addresses and slot indices the parent uses.
///
/// The caller keeps the parent's attachments in place for the whole call so
/// every inherited segment is still pinned by the parent.
///
/// On failure the attachments made so far stay recorded in the child; the
/// caller tears the child down with [`detach_all`].
pub fn inherit<A, M>(
    table: &SegmentTable<A>,
    child: &mut Process<M>,
    inherited: &[(usize, AttachSlot)],
) -> Result<(), SegmentError>
where
    A: PageAllocator,
    M: VirtualMapper,
{
    for &(index, slot) in inherited {
        let segment = table.pin(slot.id)?;

        if let Err(source) = child
            .space_mut()
            .map(slot.addr, segment.frame, PageFlags::SHARED_SEGMENT)
        {
            table.decrement_ref(slot.id);
            return Err(SegmentError::MapFailed {
                addr: slot.addr,
                source,
            });
        }

        if !child.slots_mut().record(index, slot) {
            // Child has fewer slots than the parent.
            if let Err(e) = child.space_mut().unmap(slot.addr) {
                tracing::warn!(
                    pid = %child.pid(),
                    addr = %slot.addr,
                    error = %e,
                    "Inherited page vanished before rollback"
                );
            }
            table.decrement_ref(slot.id);
            return Err(SegmentError::NoFreeSlots {
                pid: child.pid(),
                capacity: child.slots().capacity(),
            });
        }
    }
    Ok(())
}

fn release_slot<A, M>(table: &SegmentTable<A>, process: &mut Process<M>, index: usize)
where
    A: PageAllocator,
    M: VirtualMapper,
{
    let Some(slot) = process.slots_mut().clear(index) else {
        return;
    };

    if let Err(e) = process.space_mut().unmap(slot.addr) {
        tracing::warn!(
            pid = %process.pid(),
            addr = %slot.addr,
            error = %e,
            "Attach slot had no mapping"
        );
    }

    table.decrement_ref(slot.id);

    // Give the page back to the extent if it was the topmost one.
    if slot.addr.checked_add(PAGE_SIZE as u64) == Some(process.extent()) {
        process.set_extent(slot.addr);
    }

    tracing::debug!(
        pid = %process.pid(),
        id = %slot.id,
        addr = %slot.addr,
        "Detached segment"
    );
}
