// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! JSON report files.

use crate::metrics::BenchmarkReport;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes reports as timestamped JSON files into one directory.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Create a reporter, creating `output_dir` if needed.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Reporter writing into the crate's `data/` directory.
    pub fn default_location() -> Result<Self, ReporterError> {
        Self::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("data"))
    }

    /// Save `report` and return the file it was written to.
    ///
    /// The file name carries the report timestamp down to milliseconds.
    pub fn save(&self, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let filename = format!(
            "shmem_{}.json",
            report.timestamp.format("%Y-%m-%dT%H-%M-%S%.3fZ")
        );
        let path = self.output_dir.join(filename);

        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, report)?;
        Ok(path)
    }

    /// Load a previously saved report.
    pub fn load(path: impl AsRef<Path>) -> Result<BenchmarkReport, ReporterError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}
