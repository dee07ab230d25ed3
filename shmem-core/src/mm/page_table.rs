// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Simulated per-process address space.
//!
//! Records leaf mappings from page-aligned user addresses to physical frames.
//! Only the map/unmap/translate contract matters to the segment manager.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::error::MapError;
use crate::mm::frame::PhysFrame;
use crate::types::VirtAddr;

bitflags! {
    /// Leaf permission bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u8 {
        const VALID = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const EXEC = 1 << 3;
        const USER = 1 << 4;
    }
}

impl PageFlags {
    /// Uniform permission set of every shared segment mapping.
    pub const SHARED_SEGMENT: Self = Self::READ.union(Self::WRITE).union(Self::USER);
}

/// One installed leaf mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub frame: PhysFrame,
    pub flags: PageFlags,
}

/// Result of translating a user address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub frame: PhysFrame,
    pub offset: usize,
    pub flags: PageFlags,
}

/// Map/unmap contract of the virtual memory mapper, one address space per
/// implementor.
pub trait VirtualMapper {
    /// Install a single page mapping `va -> frame`.
    fn map(&mut self, va: VirtAddr, frame: PhysFrame, flags: PageFlags) -> Result<(), MapError>;

    /// Remove the mapping at `va` and return the frame it pointed to.
    /// The frame itself is not released.
    fn unmap(&mut self, va: VirtAddr) -> Result<PhysFrame, MapError>;

    /// Resolve `va` to its frame and in-page offset.
    fn translate(&self, va: VirtAddr) -> Option<Translation>;
}

/// Address space with user mappings below `limit`.
#[derive(Debug, Clone)]
pub struct PageTable {
    limit: VirtAddr,
    entries: BTreeMap<VirtAddr, Mapping>,
}

impl PageTable {
    pub fn new(limit: VirtAddr) -> Self {
        Self {
            limit,
            entries: BTreeMap::new(),
        }
    }

    /// Exclusive upper bound for mappable addresses.
    pub fn limit(&self) -> VirtAddr {
        self.limit
    }

    /// Number of installed mappings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate installed mappings in address order.
    pub fn mappings(&self) -> impl Iterator<Item = (VirtAddr, Mapping)> + '_ {
        self.entries.iter().map(|(va, m)| (*va, *m))
    }
}

impl VirtualMapper for PageTable {
    fn map(&mut self, va: VirtAddr, frame: PhysFrame, flags: PageFlags) -> Result<(), MapError> {
        if !va.is_page_aligned() {
            return Err(MapError::Unaligned(va));
        }
        if va >= self.limit {
            return Err(MapError::OutOfRange {
                addr: va,
                limit: self.limit,
            });
        }
        if self.entries.contains_key(&va) {
            return Err(MapError::AlreadyMapped(va));
        }

        self.entries.insert(
            va,
            Mapping {
                frame,
                flags: flags | PageFlags::VALID,
            },
        );
        Ok(())
    }

    fn unmap(&mut self, va: VirtAddr) -> Result<PhysFrame, MapError> {
        if !va.is_page_aligned() {
            return Err(MapError::Unaligned(va));
        }
        self.entries
            .remove(&va)
            .map(|m| m.frame)
            .ok_or(MapError::NotMapped(va))
    }

    fn translate(&self, va: VirtAddr) -> Option<Translation> {
        self.entries.get(&va.page_base()).map(|m| Translation {
            frame: m.frame,
            offset: va.page_offset(),
            flags: m.flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PhysAddr;

    fn frame(addr: u64) -> PhysFrame {
        PhysFrame::containing(PhysAddr::new(addr))
    }

    #[test]
    fn test_map_translate_unmap() {
        let mut pt = PageTable::new(VirtAddr::new(0x10_0000));
        let f = frame(0x8000_1000);

        pt.map(VirtAddr::new(0x5000), f, PageFlags::SHARED_SEGMENT)
            .unwrap();
        let t = pt.translate(VirtAddr::new(0x5010)).unwrap();
        assert_eq!(t.frame, f);
        assert_eq!(t.offset, 0x10);
        assert!(t.flags.contains(PageFlags::VALID | PageFlags::USER | PageFlags::WRITE));

        assert_eq!(pt.unmap(VirtAddr::new(0x5000)), Ok(f));
        assert!(pt.translate(VirtAddr::new(0x5000)).is_none());
        assert!(pt.is_empty());
    }

    #[test]
    fn test_map_rejections() {
        let limit = VirtAddr::new(0x10_0000);
        let mut pt = PageTable::new(limit);
        let f = frame(0x8000_0000);

        assert_eq!(
            pt.map(VirtAddr::new(0x5001), f, PageFlags::READ),
            Err(MapError::Unaligned(VirtAddr::new(0x5001)))
        );
        assert_eq!(
            pt.map(limit, f, PageFlags::READ),
            Err(MapError::OutOfRange { addr: limit, limit })
        );

        pt.map(VirtAddr::new(0x5000), f, PageFlags::READ).unwrap();
        assert_eq!(
            pt.map(VirtAddr::new(0x5000), f, PageFlags::READ),
            Err(MapError::AlreadyMapped(VirtAddr::new(0x5000)))
        );
        assert_eq!(pt.len(), 1);
    }

    #[test]
    fn test_unmap_missing() {
        let mut pt = PageTable::new(VirtAddr::new(0x10_0000));
        assert_eq!(
            pt.unmap(VirtAddr::new(0x6000)),
            Err(MapError::NotMapped(VirtAddr::new(0x6000)))
        );
    }
}
