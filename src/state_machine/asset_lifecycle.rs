// Copyright (c) 2025 - Cowboy AI, Inc.
//! Asset Lifecycle State Machine
//!
//! An asset's lifecycle is the pair `(status, state)`:
//!
//! - **status** is the provisioning stage, moved along a directed graph
//! - **state** is monitoring visibility, constrained per status
//!
//! # Status graph
//!
//! ```text
//! Incomplete     → Unallocated
//! Unallocated    → Provisioning
//! Provisioning   → Unallocated | Allocated
//! Allocated      → Cancelled | Maintenance
//! Cancelled      → Decommissioned
//! Decommissioned → Provisioning
//! Maintenance    → Unallocated | Allocated
//! New, Provisioned → (terminal)
//! ```
//!
//! # State legality
//!
//! Unallocated, Provisioning, Allocated, Cancelled, Decommissioned and
//! Maintenance accept `Discovered` or `Disappeared`. Incomplete, New and
//! Provisioned accept no state at all, so discovery logic can never move an
//! asset into or within those statuses.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{StateMachine, TransitionError, TransitionResult};

/// Provisioning stage of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Incomplete,
    New,
    Unallocated,
    Provisioning,
    Provisioned,
    Allocated,
    Cancelled,
    Decommissioned,
    Maintenance,
}

impl AssetStatus {
    /// Every status, in declaration order
    pub const ALL: [AssetStatus; 9] = [
        AssetStatus::Incomplete,
        AssetStatus::New,
        AssetStatus::Unallocated,
        AssetStatus::Provisioning,
        AssetStatus::Provisioned,
        AssetStatus::Allocated,
        AssetStatus::Cancelled,
        AssetStatus::Decommissioned,
        AssetStatus::Maintenance,
    ];

    /// Whether the status graph has a direct edge from `self` to `target`.
    ///
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(&self, target: &AssetStatus) -> bool {
        use AssetStatus::*;

        if self == target {
            return true;
        }

        matches!(
            (self, target),
            (Incomplete, Unallocated)
                | (Unallocated, Provisioning)
                | (Provisioning, Unallocated)
                | (Provisioning, Allocated)
                | (Allocated, Cancelled)
                | (Allocated, Maintenance)
                | (Cancelled, Decommissioned)
                | (Decommissioned, Provisioning)
                | (Maintenance, Unallocated)
                | (Maintenance, Allocated)
        )
    }

    /// States an asset may hold while in this status
    pub fn valid_states(&self) -> &'static [AssetState] {
        use AssetStatus::*;

        const VISIBLE: &[AssetState] = &[AssetState::Discovered, AssetState::Disappeared];

        match self {
            Unallocated | Provisioning | Allocated | Cancelled | Decommissioned | Maintenance => {
                VISIBLE
            }
            Incomplete | New | Provisioned => &[],
        }
    }

    /// Whether `state` is legal for this status
    pub fn allows_state(&self, state: AssetState) -> bool {
        self.valid_states().contains(&state)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Incomplete => "incomplete",
            AssetStatus::New => "new",
            AssetStatus::Unallocated => "unallocated",
            AssetStatus::Provisioning => "provisioning",
            AssetStatus::Provisioned => "provisioned",
            AssetStatus::Allocated => "allocated",
            AssetStatus::Cancelled => "cancelled",
            AssetStatus::Decommissioned => "decommissioned",
            AssetStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitoring visibility of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    #[default]
    Unknown,
    Discovered,
    Disappeared,
}

impl AssetState {
    pub const ALL: [AssetState; 3] = [
        AssetState::Unknown,
        AssetState::Discovered,
        AssetState::Disappeared,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetState::Unknown => "unknown",
            AssetState::Discovered => "discovered",
            AssetState::Disappeared => "disappeared",
        }
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `(status, state)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetLifecycle {
    pub status: AssetStatus,
    pub state: AssetState,
}

impl AssetLifecycle {
    pub fn new(status: AssetStatus, state: AssetState) -> Self {
        Self { status, state }
    }

    /// Lifecycle of an asset seen for the first time
    pub fn first_sighting() -> Self {
        Self::new(AssetStatus::Unallocated, AssetState::Discovered)
    }
}

impl fmt::Display for AssetLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.status, self.state)
    }
}

/// The input is the requested target lifecycle. The output reports whether
/// anything actually changes, so callers can skip persisting no-ops.
impl StateMachine for AssetLifecycle {
    type Input = AssetLifecycle;
    type Output = bool;

    fn transition(&self, target: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        if self == target {
            return Ok((*self, false));
        }

        if !self.status.can_transition_to(&target.status) {
            return Err(TransitionError::TransitionNotAllowed {
                from: self.status,
                to: target.status,
            });
        }

        if !target.status.allows_state(target.state) {
            return Err(TransitionError::StateNotValidForStatus {
                state: target.state,
                status: target.status,
            });
        }

        Ok((*target, true))
    }
}
