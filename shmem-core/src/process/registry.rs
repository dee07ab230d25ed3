//! Thread-safe process table using DashMap.
//!
//! Each process sits behind its own map entry, so operations on different
//! processes only contend when they hash to the same shard.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;

use crate::error::{ShmError, ShmResult};
use crate::mm::{PageTable, VirtualMapper};
use crate::process::Process;
use crate::types::ProcessId;

/// Registry of live processes keyed by pid.
#[derive(Debug)]
pub struct ProcessTable<M: VirtualMapper = PageTable> {
    processes: DashMap<ProcessId, Process<M>>,
    next_pid: AtomicU32,
}

impl<M: VirtualMapper> ProcessTable<M> {
    /// Create a new empty table. Pids start at 1.
    pub fn new() -> Self {
        Self {
            processes: DashMap::new(),
            next_pid: AtomicU32::new(1),
        }
    }

    /// Hand out the next unused pid.
    pub fn allocate_pid(&self) -> ProcessId {
        loop {
            let raw = self.next_pid.fetch_add(1, Ordering::Relaxed);
            // Zero is reserved; skip it after wrap-around.
            if let Ok(pid) = ProcessId::new(raw) {
                if !self.processes.contains_key(&pid) {
                    return pid;
                }
            }
        }
    }

    /// Register a process under its own pid.
    pub fn insert(&self, process: Process<M>) {
        self.processes.insert(process.pid(), process);
    }

    /// Remove a process and hand it back to the caller for teardown.
    pub fn remove(&self, pid: ProcessId) -> ShmResult<Process<M>> {
        self.processes
            .remove(&pid)
            .map(|(_, process)| process)
            .ok_or(ShmError::ProcessNotFound(pid))
    }

    /// Shared access to one process.
    pub fn get(&self, pid: ProcessId) -> ShmResult<Ref<'_, ProcessId, Process<M>>> {
        self.processes
            .get(&pid)
            .ok_or(ShmError::ProcessNotFound(pid))
    }

    /// Exclusive access to one process.
    pub fn get_mut(&self, pid: ProcessId) -> ShmResult<RefMut<'_, ProcessId, Process<M>>> {
        self.processes
            .get_mut(&pid)
            .ok_or(ShmError::ProcessNotFound(pid))
    }

    /// Check if a process exists.
    pub fn contains(&self, pid: ProcessId) -> bool {
        self.processes.contains_key(&pid)
    }

    /// Get the number of live processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Get a sorted list of all pids.
    pub fn pids(&self) -> Vec<ProcessId> {
        let mut pids: Vec<ProcessId> = self.processes.iter().map(|r| *r.key()).collect();
        pids.sort_unstable();
        pids
    }
}

impl<M: VirtualMapper> Default for ProcessTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VirtAddr;
    use std::sync::Arc;

    fn make_process(table: &ProcessTable) -> Process {
        Process::new(
            table.allocate_pid(),
            VirtAddr::new(0x4000),
            4,
            PageTable::new(VirtAddr::new(1 << 38)),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let table: ProcessTable = ProcessTable::new();
        let process = make_process(&table);
        let pid = process.pid();
        table.insert(process);

        assert!(table.contains(pid));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(pid).unwrap().extent(), VirtAddr::new(0x4000));
    }

    #[test]
    fn test_pids_are_unique() {
        let table: ProcessTable = ProcessTable::new();
        let a = table.allocate_pid();
        let b = table.allocate_pid();
        assert_ne!(a, b);
        assert_eq!(a.value(), 1);
    }

    #[test]
    fn test_remove_missing() {
        let table: ProcessTable = ProcessTable::new();
        let pid = ProcessId::new(7).unwrap();
        assert!(matches!(table.remove(pid), Err(ShmError::ProcessNotFound(p)) if p == pid));
        assert!(table.get_mut(pid).is_err());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let table: Arc<ProcessTable> = Arc::new(ProcessTable::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    let process = make_process(&table);
                    table.insert(process);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len(), 10);
        assert_eq!(table.pids().len(), 10);
    }
}
