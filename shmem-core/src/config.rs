// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! Capacities and the user address range are fixed when the kernel context
//! is built. Any invalid field results in a HardValidationError.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, ShmError, ShmResult};
use crate::types::PAGE_SIZE;

const MAX_TABLE_CAPACITY: usize = 1024;
const MAX_ATTACH_SLOTS: usize = 1024;
const MAX_PHYSICAL_PAGES: usize = 65536;

/// What a duplicated process receives from its parent's attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkPolicy {
    /// The child maps every attached segment at the same address and holds
    /// its own reference to each.
    #[default]
    Inherit,
    /// The child starts with no attachments.
    Reset,
}

/// Raw kernel configuration as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawKernelConfig {
    #[serde(default = "default_table_capacity")]
    table_capacity: usize,
    #[serde(default = "default_attach_slots")]
    attach_slots: usize,
    #[serde(default = "default_physical_pages")]
    physical_pages: usize,
    #[serde(default = "default_user_base")]
    user_base: u64,
    #[serde(default = "default_user_limit")]
    user_limit: u64,
    #[serde(default)]
    fork_policy: ForkPolicy,
}

fn default_table_capacity() -> usize {
    16
}

fn default_attach_slots() -> usize {
    16
}

fn default_physical_pages() -> usize {
    256
}

fn default_user_base() -> u64 {
    0x4000
}

fn default_user_limit() -> u64 {
    1 << 38
}

impl Default for RawKernelConfig {
    fn default() -> Self {
        Self {
            table_capacity: default_table_capacity(),
            attach_slots: default_attach_slots(),
            physical_pages: default_physical_pages(),
            user_base: default_user_base(),
            user_limit: default_user_limit(),
            fork_policy: ForkPolicy::default(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    kernel: RawKernelConfig,
}

/// Validated kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelConfig {
    /// Number of descriptors in the segment table.
    pub table_capacity: usize,
    /// Attach slots per process.
    pub attach_slots: usize,
    /// Frames in the simulated physical memory.
    pub physical_pages: usize,
    /// Initial extent of every new process.
    pub user_base: u64,
    /// Exclusive upper bound of mappable user addresses.
    pub user_limit: u64,
    pub fork_policy: ForkPolicy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        // Defaults always validate.
        let raw = RawKernelConfig::default();
        Self {
            table_capacity: raw.table_capacity,
            attach_slots: raw.attach_slots,
            physical_pages: raw.physical_pages,
            user_base: raw.user_base,
            user_limit: raw.user_limit,
            fork_policy: raw.fork_policy,
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> ShmResult<KernelConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ShmError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ShmError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> ShmResult<KernelConfig> {
        let raw: Option<RawConfig> =
            serde_yaml::from_str(content).map_err(|e| ShmError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        // An empty document means "all defaults".
        Self::validate(raw.unwrap_or_default().kernel)
    }

    /// Validate raw configuration and convert to the typed config.
    fn validate(raw: RawKernelConfig) -> ShmResult<KernelConfig> {
        Self::check_capacity("table_capacity", raw.table_capacity, MAX_TABLE_CAPACITY)?;
        Self::check_capacity("attach_slots", raw.attach_slots, MAX_ATTACH_SLOTS)?;
        Self::check_capacity("physical_pages", raw.physical_pages, MAX_PHYSICAL_PAGES)?;

        Self::check_aligned("user_base", raw.user_base)?;
        Self::check_aligned("user_limit", raw.user_limit)?;

        if raw.user_limit <= raw.user_base {
            return Err(HardValidationError::InvalidFieldValue {
                field: "user_limit",
                value: format!("{:#x}", raw.user_limit),
                reason: format!("Must be above user_base ({:#x})", raw.user_base),
            }
            .into());
        }

        Ok(KernelConfig {
            table_capacity: raw.table_capacity,
            attach_slots: raw.attach_slots,
            physical_pages: raw.physical_pages,
            user_base: raw.user_base,
            user_limit: raw.user_limit,
            fork_policy: raw.fork_policy,
        })
    }

    fn check_capacity(field: &'static str, value: usize, max: usize) -> ShmResult<()> {
        if value == 0 || value > max {
            return Err(HardValidationError::CapacityOutOfBounds {
                field,
                value,
                min: 1,
                max,
            }
            .into());
        }
        Ok(())
    }

    fn check_aligned(field: &'static str, value: u64) -> ShmResult<()> {
        if value % PAGE_SIZE as u64 != 0 {
            return Err(HardValidationError::UnalignedAddress { field, value }.into());
        }
        Ok(())
    }
}
