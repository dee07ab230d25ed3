// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Segment table and descriptor lifecycle.

mod state;
mod table;

pub use state::{Release, SegmentState};
pub use table::SegmentTable;
