// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmctl validate` command - Validate configuration file.

use shmem_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Kernel Settings:");
            println!("  Segment Table:   {} descriptors", config.table_capacity);
            println!("  Attach Slots:    {} per process", config.attach_slots);
            println!("  Physical Memory: {} pages", config.physical_pages);
            println!(
                "  User Range:      {:#x} .. {:#x}",
                config.user_base, config.user_limit
            );
            println!("  Fork Policy:     {:?}", config.fork_policy);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
