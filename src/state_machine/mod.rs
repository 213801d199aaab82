// Copyright (c) 2025 - Cowboy AI, Inc.
//! Asset lifecycle state machine
//!
//! Validation is pure: [`StateMachine::transition`] computes the next value
//! and never persists it. Committing is left to [`crate::inventory::Asset`],
//! which records a [`Transition`] only once the backend accepted the change.
//!
//! ```text
//! (current lifecycle, requested lifecycle) → Ok((next, changed)) | Err(TransitionError)
//! ```

pub mod asset_lifecycle;

pub use asset_lifecycle::{AssetLifecycle, AssetState, AssetStatus};

pub type TransitionResult<S> = Result<S, TransitionError>;

/// Why a requested lifecycle was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The status graph has no edge from the current status to the target
    #[error("transition from {from} to {to} is not allowed")]
    TransitionNotAllowed { from: AssetStatus, to: AssetStatus },

    /// The target state is not legal for the target status
    #[error("state {state} is not valid for status {status}")]
    StateNotValidForStatus {
        state: AssetState,
        status: AssetStatus,
    },
}

/// A value that moves between states in response to typed input
pub trait StateMachine: Sized + Clone {
    type Input;

    /// Extra information a successful transition reports to the caller
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }
}

/// Audit record of one committed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<S> Transition<S> {
    pub fn new(from: S, to: S, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            from,
            to,
            timestamp,
        }
    }
}
