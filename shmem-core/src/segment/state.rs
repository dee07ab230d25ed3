// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Segment lifecycle state machine.
//!
//! Implements Unallocated → Allocated(1) → Allocated(k±1) → Unallocated.
//! No state persists at reference count zero.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one table descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentState {
    /// Free table slot. Initial and terminal state.
    #[default]
    Unallocated,

    /// Valid segment holding `refcount` outstanding references.
    Allocated { refcount: u32 },
}

/// Outcome of dropping one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The descriptor was not allocated; nothing changed.
    Stale,
    /// References remain.
    Retained(u32),
    /// The last reference went away; the descriptor is Unallocated again.
    Reclaimed,
}

impl SegmentState {
    /// Get the state name for log messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unallocated => "Unallocated",
            Self::Allocated { .. } => "Allocated",
        }
    }

    pub const fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated { .. })
    }

    pub const fn refcount(&self) -> u32 {
        match self {
            Self::Unallocated => 0,
            Self::Allocated { refcount } => *refcount,
        }
    }

    /// Unallocated → Allocated(1). Returns false if already allocated.
    pub fn allocate(&mut self) -> bool {
        if self.is_allocated() {
            return false;
        }
        *self = Self::Allocated { refcount: 1 };
        true
    }

    /// Allocated(k) → Allocated(k+1). Returns false if unallocated.
    pub fn retain(&mut self) -> bool {
        match self {
            Self::Allocated { refcount } => {
                *refcount = refcount.saturating_add(1);
                true
            }
            Self::Unallocated => false,
        }
    }

    /// Allocated(k) → Allocated(k-1), or Unallocated when k-1 reaches zero.
    pub fn release(&mut self) -> Release {
        match self {
            Self::Allocated { refcount } if *refcount > 1 => {
                *refcount -= 1;
                Release::Retained(*refcount)
            }
            Self::Allocated { .. } => {
                *self = Self::Unallocated;
                Release::Reclaimed
            }
            Self::Unallocated => Release::Stale,
        }
    }
}

impl std::fmt::Display for SegmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unallocated => write!(f, "{}", self.name()),
            Self::Allocated { refcount } => write!(f, "{}({})", self.name(), refcount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = SegmentState::default();
        assert_eq!(state, SegmentState::Unallocated);
        assert_eq!(state.refcount(), 0);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut state = SegmentState::default();

        assert!(state.allocate());
        assert_eq!(state, SegmentState::Allocated { refcount: 1 });

        assert!(state.retain());
        assert!(state.retain());
        assert_eq!(state.refcount(), 3);

        assert_eq!(state.release(), Release::Retained(2));
        assert_eq!(state.release(), Release::Retained(1));
        assert_eq!(state.release(), Release::Reclaimed);
        assert_eq!(state, SegmentState::Unallocated);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut state = SegmentState::default();
        assert!(!state.retain());
        assert_eq!(state.release(), Release::Stale);
        assert_eq!(state, SegmentState::Unallocated);

        state.allocate();
        assert!(!state.allocate());
        assert_eq!(state.refcount(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(SegmentState::Unallocated.to_string(), "Unallocated");
        assert_eq!(
            SegmentState::Allocated { refcount: 2 }.to_string(),
            "Allocated(2)"
        );
    }
}
