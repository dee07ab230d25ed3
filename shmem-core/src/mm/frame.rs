// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Simulated physical memory.
//!
//! A page-aligned anonymous mapping is carved into fixed-size frames. Frames
//! are handed out through the [`PageAllocator`] contract; user loads and
//! stores reach them through the word/byte accessors below.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::ShmError;
use crate::types::{PhysAddr, PAGE_SIZE};

/// Physical address of the first frame.
pub const PHYS_BASE: u64 = 0x8000_0000;

/// Handle to one physical page frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PhysFrame(PhysAddr);

impl PhysFrame {
    pub const fn containing(addr: PhysAddr) -> Self {
        Self(PhysAddr::new(addr.as_u64() & !(PAGE_SIZE as u64 - 1)))
    }

    pub const fn start(&self) -> PhysAddr {
        self.0
    }
}

/// Acquire/release contract of the physical page allocator.
pub trait PageAllocator: Send + Sync {
    /// Take one free page, or `None` when memory is exhausted.
    fn acquire(&self) -> Option<PhysFrame>;

    /// Return a page previously obtained from [`acquire`](Self::acquire).
    fn release(&self, frame: PhysFrame);

    /// Fill the page with zero bytes.
    fn zero(&self, frame: PhysFrame);
}

impl<T: PageAllocator + ?Sized> PageAllocator for Arc<T> {
    fn acquire(&self) -> Option<PhysFrame> {
        (**self).acquire()
    }

    fn release(&self, frame: PhysFrame) {
        (**self).release(frame)
    }

    fn zero(&self, frame: PhysFrame) {
        (**self).zero(frame)
    }
}

#[derive(Debug)]
struct FreeList {
    free: Vec<usize>,
    in_use: Vec<bool>,
}

/// Fixed pool of page frames backed by an anonymous mmap arena.
///
/// The pool owns the arena and unmaps it on drop.
pub struct FramePool {
    base: NonNull<u8>,
    frames: usize,
    state: Mutex<FreeList>,
}

// SAFETY: the arena is owned by the pool for its whole lifetime. Frame
// contents are only touched through atomic accessors or while a frame is
// exclusively owned (zeroing right after acquire).
unsafe impl Send for FramePool {}

// SAFETY: see above; the free list is behind a mutex.
unsafe impl Sync for FramePool {}

impl FramePool {
    /// Reserve `frames` pages of zeroed memory.
    pub fn new(frames: usize) -> Result<Self, ShmError> {
        if frames == 0 {
            return Err(ShmError::PhysicalMemory {
                reason: "Frame pool needs at least one frame".to_string(),
            });
        }

        let len = frames
            .checked_mul(PAGE_SIZE)
            .ok_or_else(|| ShmError::PhysicalMemory {
                reason: format!("Frame count {} overflows the arena size", frames),
            })?;

        // SAFETY: anonymous private mapping, no fd, length validated above
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(ShmError::PhysicalMemory {
                reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        let base = NonNull::new(ptr as *mut u8).ok_or_else(|| ShmError::PhysicalMemory {
            reason: "mmap returned null".to_string(),
        })?;

        tracing::debug!(frames = frames, bytes = len, "Reserved physical frame arena");

        // Lowest frames are handed out first.
        let free = (0..frames).rev().collect();

        Ok(Self {
            base,
            frames,
            state: Mutex::new(FreeList {
                free,
                in_use: vec![false; frames],
            }),
        })
    }

    /// Total number of frames in the pool.
    pub fn capacity(&self) -> usize {
        self.frames
    }

    /// Number of frames currently free.
    pub fn available(&self) -> usize {
        self.lock().free.len()
    }

    /// Whether `frame` is currently handed out.
    pub fn is_allocated(&self, frame: PhysFrame) -> bool {
        match self.index_of(frame) {
            Some(index) => self.lock().in_use[index],
            None => false,
        }
    }

    /// Atomic 32-bit load at `offset` inside `frame`.
    pub fn load_u32(&self, frame: PhysFrame, offset: usize) -> Option<u32> {
        self.word(frame, offset).map(|w| w.load(Ordering::Relaxed))
    }

    /// Atomic 32-bit store at `offset` inside `frame`.
    pub fn store_u32(&self, frame: PhysFrame, offset: usize, value: u32) -> Option<()> {
        self.word(frame, offset)
            .map(|w| w.store(value, Ordering::Relaxed))
    }

    /// Copy bytes out of `frame` starting at `offset`.
    pub fn read_bytes(&self, frame: PhysFrame, offset: usize, buf: &mut [u8]) -> Option<()> {
        let bytes = self.bytes(frame, offset, buf.len())?;
        for (dst, src) in buf.iter_mut().zip(bytes) {
            *dst = src.load(Ordering::Relaxed);
        }
        Some(())
    }

    /// Copy bytes into `frame` starting at `offset`.
    pub fn write_bytes(&self, frame: PhysFrame, offset: usize, data: &[u8]) -> Option<()> {
        let bytes = self.bytes(frame, offset, data.len())?;
        for (dst, src) in bytes.iter().zip(data) {
            dst.store(*src, Ordering::Relaxed);
        }
        Some(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FreeList> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index_of(&self, frame: PhysFrame) -> Option<usize> {
        let addr = frame.start().as_u64().checked_sub(PHYS_BASE)?;
        let index = usize::try_from(addr / PAGE_SIZE as u64).ok()?;
        (index < self.frames).then_some(index)
    }

    fn frame_at(index: usize) -> PhysFrame {
        PhysFrame(PhysAddr::new(PHYS_BASE + (index * PAGE_SIZE) as u64))
    }

    fn frame_ptr(&self, frame: PhysFrame) -> Option<*mut u8> {
        let index = self.index_of(frame)?;
        // SAFETY: index < frames, so the offset stays inside the arena
        Some(unsafe { self.base.as_ptr().add(index * PAGE_SIZE) })
    }

    fn word(&self, frame: PhysFrame, offset: usize) -> Option<&AtomicU32> {
        if offset % 4 != 0 || offset.checked_add(4)? > PAGE_SIZE {
            return None;
        }
        let ptr = self.frame_ptr(frame)?;
        // SAFETY: in-bounds, 4-byte aligned (arena is page aligned) and the
        // arena outlives the returned borrow of self
        Some(unsafe { &*(ptr.add(offset) as *const AtomicU32) })
    }

    fn bytes(&self, frame: PhysFrame, offset: usize, len: usize) -> Option<&[AtomicU8]> {
        if offset.checked_add(len)? > PAGE_SIZE {
            return None;
        }
        let ptr = self.frame_ptr(frame)?;
        // SAFETY: range checked against the page; AtomicU8 has the layout of u8
        Some(unsafe { std::slice::from_raw_parts(ptr.add(offset) as *const AtomicU8, len) })
    }
}

impl PageAllocator for FramePool {
    fn acquire(&self) -> Option<PhysFrame> {
        let mut state = self.lock();
        let index = state.free.pop()?;
        state.in_use[index] = true;
        Some(Self::frame_at(index))
    }

    fn release(&self, frame: PhysFrame) {
        let Some(index) = self.index_of(frame) else {
            tracing::error!(frame = %frame.start(), "Release of a frame outside the pool");
            return;
        };

        let mut state = self.lock();
        if !state.in_use[index] {
            tracing::error!(frame = %frame.start(), "Double release of physical frame");
            return;
        }
        state.in_use[index] = false;
        state.free.push(index);
    }

    fn zero(&self, frame: PhysFrame) {
        if let Some(bytes) = self.bytes(frame, 0, PAGE_SIZE) {
            for byte in bytes {
                byte.store(0, Ordering::Relaxed);
            }
        }
    }
}

impl Drop for FramePool {
    fn drop(&mut self) {
        // SAFETY: base and length are exactly what mmap returned
        let result = unsafe {
            libc::munmap(
                self.base.as_ptr() as *mut libc::c_void,
                self.frames * PAGE_SIZE,
            )
        };
        if result < 0 {
            tracing::error!(
                error = %std::io::Error::last_os_error(),
                "Failed to unmap physical frame arena"
            );
        }
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool")
            .field("frames", &self.frames)
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_rejected() {
        assert!(FramePool::new(0).is_err());
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let pool = FramePool::new(2).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.start(), PhysAddr::new(PHYS_BASE));
        assert!(pool.acquire().is_none());
        assert_eq!(pool.available(), 0);

        pool.release(a);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.acquire(), Some(a));
    }

    #[test]
    fn test_double_release_ignored() {
        let pool = FramePool::new(2).unwrap();
        let frame = pool.acquire().unwrap();
        pool.release(frame);
        pool.release(frame);
        assert_eq!(pool.available(), 2);
        assert!(!pool.is_allocated(frame));
    }

    #[test]
    fn test_foreign_frame_ignored() {
        let pool = FramePool::new(1).unwrap();
        pool.release(PhysFrame::containing(PhysAddr::new(0x1000)));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_word_access_and_zero() {
        let pool = FramePool::new(1).unwrap();
        let frame = pool.acquire().unwrap();

        pool.store_u32(frame, 8, 0xdead_beef).unwrap();
        assert_eq!(pool.load_u32(frame, 8), Some(0xdead_beef));

        // Misaligned and out-of-page accesses are refused.
        assert!(pool.load_u32(frame, 2).is_none());
        assert!(pool.load_u32(frame, PAGE_SIZE).is_none());

        pool.zero(frame);
        assert_eq!(pool.load_u32(frame, 8), Some(0));
    }

    #[test]
    fn test_byte_access() {
        let pool = FramePool::new(1).unwrap();
        let frame = pool.acquire().unwrap();

        pool.write_bytes(frame, 100, b"hello").unwrap();
        let mut buf = [0u8; 5];
        pool.read_bytes(frame, 100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        assert!(pool.write_bytes(frame, PAGE_SIZE - 2, b"abc").is_none());
    }
}
