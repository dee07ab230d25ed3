// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Kernel context owning the segment table, physical memory and processes.
//!
//! There is no global state: every table lives inside one `Kernel` and tests
//! build as many isolated instances as they need.

use std::sync::Arc;

use crate::attach;
use crate::config::{ForkPolicy, KernelConfig};
use crate::error::{SegmentError, ShmError, ShmResult};
use crate::mm::{FramePool, PageFlags, PageTable, PhysFrame, VirtualMapper};
use crate::process::{AttachSlot, Process, ProcessTable};
use crate::segment::SegmentTable;
use crate::stats::TableStats;
use crate::types::{ProcessId, SegmentId, SegmentKey, VirtAddr, PAGE_SIZE};

/// One isolated instance of the segment manager and its collaborators.
#[derive(Debug)]
pub struct Kernel {
    config: KernelConfig,
    memory: Arc<FramePool>,
    segments: SegmentTable<Arc<FramePool>>,
    processes: ProcessTable,
}

impl Kernel {
    /// Build a kernel context from a validated configuration.
    pub fn new(config: KernelConfig) -> ShmResult<Self> {
        let memory = Arc::new(FramePool::new(config.physical_pages)?);
        let segments = SegmentTable::new(config.table_capacity, Arc::clone(&memory));

        tracing::info!(
            table_capacity = config.table_capacity,
            attach_slots = config.attach_slots,
            physical_pages = config.physical_pages,
            fork_policy = ?config.fork_policy,
            "Kernel context ready"
        );

        Ok(Self {
            config,
            memory,
            segments,
            processes: ProcessTable::new(),
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The segment table.
    pub fn segments(&self) -> &SegmentTable<Arc<FramePool>> {
        &self.segments
    }

    /// The simulated physical memory.
    pub fn memory(&self) -> &FramePool {
        &self.memory
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    /// Create a fresh process with no attachments.
    pub fn spawn(&self) -> ProcessId {
        let pid = self.processes.allocate_pid();
        self.processes.insert(self.new_process(pid));
        tracing::debug!(pid = %pid, "Spawned process");
        pid
    }

    /// Duplicate `parent`. Attachments follow the configured fork policy.
    ///
    /// Allocation references stay with the parent; the child only gets its
    /// own attach references.
    pub fn fork(&self, parent: ProcessId) -> ShmResult<ProcessId> {
        let pid = self.processes.allocate_pid();
        let mut child = self.new_process(pid);

        {
            // The parent stays locked until the child holds its own
            // references, so none of its attachments can go away meanwhile.
            let guard = self.processes.get(parent)?;
            child.set_extent(guard.extent());

            if self.config.fork_policy == ForkPolicy::Inherit {
                let inherited: Vec<_> = guard.slots().occupied().collect();
                if let Err(e) = attach::inherit(&self.segments, &mut child, &inherited) {
                    drop(guard);
                    attach::detach_all(&self.segments, &mut child);
                    return Err(e.into());
                }
            }
        }

        tracing::debug!(
            parent = %parent,
            child = %pid,
            inherited = child.slots().attached(),
            "Forked process"
        );
        // Parent and child may share a map shard, so insert after the guard.
        self.processes.insert(child);
        Ok(pid)
    }

    /// Tear down a process: detach everything it still has attached and
    /// drop the allocation references it never released.
    pub fn exit(&self, pid: ProcessId) -> ShmResult<()> {
        let mut process = self.processes.remove(pid)?;
        let detached = attach::detach_all(&self.segments, &mut process);

        let mut released = 0;
        for (id, count) in process.take_allocations() {
            for _ in 0..count {
                self.segments.decrement_ref(id);
            }
            released += count;
        }

        tracing::debug!(
            pid = %pid,
            detached = detached,
            released = released,
            "Process exited"
        );
        Ok(())
    }

    /// Allocate or join the segment for `key` on behalf of `pid`.
    ///
    /// The reference taken here belongs to `pid` until it calls
    /// [`release`](Self::release) or exits.
    pub fn shmget(&self, pid: ProcessId, key: SegmentKey, size: usize) -> ShmResult<SegmentId> {
        let mut process = self.processes.get_mut(pid)?;
        let id = self.segments.allocate_or_join(key, size)?;
        process.hold(id);
        Ok(id)
    }

    /// Attach segment `id` into the address space of `pid`.
    pub fn shmat(&self, pid: ProcessId, id: SegmentId) -> ShmResult<VirtAddr> {
        let mut process = self.processes.get_mut(pid)?;
        Ok(attach::attach(&self.segments, &mut process, id)?)
    }

    /// Detach the segment attached at `addr` in `pid`.
    pub fn shmdt(&self, pid: ProcessId, addr: VirtAddr) -> ShmResult<()> {
        let mut process = self.processes.get_mut(pid)?;
        Ok(attach::detach(&self.segments, &mut process, addr)?)
    }

    /// Drop one allocation reference that `pid` took with
    /// [`shmget`](Self::shmget). Attach references are not touched.
    pub fn release(&self, pid: ProcessId, id: SegmentId) -> ShmResult<()> {
        let mut process = self.processes.get_mut(pid)?;
        if !process.unhold(id) {
            return Err(SegmentError::NotHeld { pid, id }.into());
        }
        self.segments.decrement_ref(id);
        tracing::debug!(pid = %pid, id = %id, "Released allocation reference");
        Ok(())
    }

    /// Allocation references `pid` holds on `id`.
    pub fn held(&self, pid: ProcessId, id: SegmentId) -> ShmResult<u32> {
        Ok(self.processes.get(pid)?.held(id))
    }

    /// Load a 32-bit word from user memory of `pid`.
    pub fn load_u32(&self, pid: ProcessId, addr: VirtAddr) -> ShmResult<u32> {
        let (frame, offset) = self.resolve(pid, addr)?;
        self.memory
            .load_u32(frame, offset)
            .ok_or(ShmError::PageFault {
                pid,
                addr,
                reason: "misaligned word access",
            })
    }

    /// Store a 32-bit word into user memory of `pid`.
    pub fn store_u32(&self, pid: ProcessId, addr: VirtAddr, value: u32) -> ShmResult<()> {
        let (frame, offset) = self.resolve(pid, addr)?;
        self.memory
            .store_u32(frame, offset, value)
            .ok_or(ShmError::PageFault {
                pid,
                addr,
                reason: "misaligned word access",
            })
    }

    /// Copy `buf.len()` bytes out of user memory of `pid`.
    pub fn read_bytes(&self, pid: ProcessId, addr: VirtAddr, buf: &mut [u8]) -> ShmResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let at = self.offset_addr(pid, addr, done)?;
            let (frame, offset) = self.resolve(pid, at)?;
            let chunk = (PAGE_SIZE - offset).min(buf.len() - done);
            self.memory
                .read_bytes(frame, offset, &mut buf[done..done + chunk])
                .ok_or(ShmError::PageFault {
                    pid,
                    addr: at,
                    reason: "frame outside physical memory",
                })?;
            done += chunk;
        }
        Ok(())
    }

    /// Copy `data` into user memory of `pid`.
    pub fn write_bytes(&self, pid: ProcessId, addr: VirtAddr, data: &[u8]) -> ShmResult<()> {
        let mut done = 0;
        while done < data.len() {
            let at = self.offset_addr(pid, addr, done)?;
            let (frame, offset) = self.resolve(pid, at)?;
            let chunk = (PAGE_SIZE - offset).min(data.len() - done);
            self.memory
                .write_bytes(frame, offset, &data[done..done + chunk])
                .ok_or(ShmError::PageFault {
                    pid,
                    addr: at,
                    reason: "frame outside physical memory",
                })?;
            done += chunk;
        }
        Ok(())
    }

    /// Current extent of `pid`.
    pub fn extent(&self, pid: ProcessId) -> ShmResult<VirtAddr> {
        Ok(self.processes.get(pid)?.extent())
    }

    /// Occupied attach slots of `pid`.
    pub fn attachments(&self, pid: ProcessId) -> ShmResult<Vec<AttachSlot>> {
        Ok(self.processes.get(pid)?.slots().iter().collect())
    }

    /// Snapshot of the segment table.
    pub fn stats(&self) -> TableStats {
        self.segments.stats()
    }

    fn new_process(&self, pid: ProcessId) -> Process {
        Process::new(
            pid,
            VirtAddr::new(self.config.user_base),
            self.config.attach_slots,
            PageTable::new(VirtAddr::new(self.config.user_limit)),
        )
    }

    fn offset_addr(&self, pid: ProcessId, addr: VirtAddr, bytes: usize) -> ShmResult<VirtAddr> {
        addr.checked_add(bytes as u64).ok_or(ShmError::PageFault {
            pid,
            addr,
            reason: "address overflow",
        })
    }

    fn resolve(&self, pid: ProcessId, addr: VirtAddr) -> ShmResult<(PhysFrame, usize)> {
        let process = self.processes.get(pid)?;
        let translation = process.space().translate(addr).ok_or(ShmError::PageFault {
            pid,
            addr,
            reason: "address not mapped",
        })?;

        if !translation.flags.contains(PageFlags::USER) {
            return Err(ShmError::PageFault {
                pid,
                addr,
                reason: "page not user accessible",
            });
        }
        Ok((translation.frame, translation.offset))
    }
}
