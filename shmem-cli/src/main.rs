// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shmem CLI
//!
//! Command-line driver for the shared-memory segment manager.

use clap::{Parser, Subcommand};

mod commands;

/// shmctl - Keyed shared-memory segments on a simulated kernel
#[derive(Parser)]
#[command(name = "shmctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Kernel configuration file path (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Two processes rendezvous on one key and exchange a value
    Rendezvous {
        /// Segment key both processes use
        #[arg(short, long, default_value_t = 5000)]
        key: i32,
    },

    /// Unsynchronized shared-counter race between processes
    Race {
        /// Number of racing processes
        #[arg(short, long, default_value_t = 4)]
        processes: usize,

        /// Increments per process
        #[arg(short, long, default_value_t = 10_000)]
        iterations: u32,
    },

    /// Allocate segments for a list of keys and print the table
    Stats {
        /// Comma separated segment keys
        #[arg(short, long, value_delimiter = ',', default_value = "1,2,3")]
        keys: Vec<i32>,

        /// Requested size of every segment in bytes
        #[arg(short, long, default_value_t = 4096)]
        size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Rendezvous { key } => commands::rendezvous::execute(config, key).await,
        Commands::Race {
            processes,
            iterations,
        } => commands::race::execute(config, processes, iterations, cli.json).await,
        Commands::Stats { keys, size } => {
            commands::stats::execute(config, &keys, size, cli.json).await
        }
    }
}
