// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod race;
pub mod rendezvous;
pub mod stats;
pub mod validate;

use shmem_core::{ConfigLoader, Kernel, KernelConfig, ShmResult};

/// A demonstration step that the kernel refused.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{call} failed for process {pid}")]
    CallFailed { call: &'static str, pid: u32 },

    #[error("Value mismatch: wrote {written:#x}, read back {read:#x}")]
    ValueMismatch { written: u32, read: u32 },

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Build a kernel from the given file, or from defaults when none is given.
pub fn boot(config_path: Option<&str>) -> ShmResult<Kernel> {
    let config = match config_path {
        Some(path) => ConfigLoader::load_file(path)?,
        None => KernelConfig::default(),
    };
    Kernel::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_boot_defaults() {
        let kernel = boot(None).unwrap();
        assert_eq!(kernel.config(), &KernelConfig::default());
    }

    #[test]
    fn test_boot_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "kernel:\n  table_capacity: 3").unwrap();

        let kernel = boot(file.path().to_str()).unwrap();
        assert_eq!(kernel.segments().capacity(), 3);
    }

    #[test]
    fn test_boot_missing_file() {
        assert!(boot(Some("/nonexistent/kernel.yaml")).is_err());
    }
}
