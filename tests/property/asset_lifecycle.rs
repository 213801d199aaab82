// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for the Asset Lifecycle
//!
//! Random sequences of requested (status, state) changes are applied to one
//! asset. Whatever the sequence, the asset must only ever hold legal
//! lifecycles, rejected requests must leave it untouched, and the backend
//! must see exactly the accepted changes.

use std::sync::Mutex;

use async_trait::async_trait;
use proptest::prelude::*;

use cim_cluster_manager::inventory::{Asset, AssetBackend, InventoryError, InventoryResult};
use cim_cluster_manager::state_machine::{
    AssetLifecycle, AssetState, AssetStatus, TransitionError,
};

// ============================================================================
// Recording backend
// ============================================================================

/// Records every write; optionally rejects all of them
#[derive(Default)]
struct RecordingBackend {
    reject: bool,
    writes: Mutex<Vec<AssetLifecycle>>,
}

#[async_trait]
impl AssetBackend for RecordingBackend {
    async fn set_asset_status(
        &self,
        name: &str,
        status: AssetStatus,
        state: AssetState,
        _description: &str,
    ) -> InventoryResult<()> {
        if self.reject {
            return Err(InventoryError::Backend {
                name: name.to_string(),
                message: "store offline".to_string(),
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push(AssetLifecycle::new(status, state));
        Ok(())
    }
}

// ============================================================================
// Strategies
// ============================================================================

fn arb_status() -> impl Strategy<Value = AssetStatus> {
    prop::sample::select(AssetStatus::ALL.to_vec())
}

fn arb_state() -> impl Strategy<Value = AssetState> {
    prop::sample::select(AssetState::ALL.to_vec())
}

fn arb_request() -> impl Strategy<Value = AssetLifecycle> {
    (arb_status(), arb_state()).prop_map(|(status, state)| AssetLifecycle::new(status, state))
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// The asset only ever holds legal lifecycles and the backend sees
    /// exactly the changes that were accepted and not no-ops
    #[test]
    fn prop_only_legal_changes_are_committed(
        requests in prop::collection::vec(arb_request(), 1..40)
    ) {
        let backend = RecordingBackend::default();
        let mut asset = Asset::new("node-SN1", AssetLifecycle::first_sighting());
        let mut expected_writes = Vec::new();

        for request in requests {
            let before = asset.lifecycle();
            let result = block_on(asset.set_status(&backend, request.status, request.state));

            let status_ok = before.status.can_transition_to(&request.status);
            let state_ok = request.status.allows_state(request.state);

            match result {
                Ok(()) => {
                    prop_assert!(status_ok && state_ok);
                    prop_assert_eq!(asset.lifecycle(), request);
                    if before != request {
                        expected_writes.push(request);
                    }
                }
                Err(InventoryError::Transition { name, source }) => {
                    prop_assert_eq!(name, "node-SN1");
                    prop_assert_eq!(asset.lifecycle(), before);
                    match source {
                        TransitionError::TransitionNotAllowed { from, to } => {
                            prop_assert!(!status_ok);
                            prop_assert_eq!(from, before.status);
                            prop_assert_eq!(to, request.status);
                        }
                        TransitionError::StateNotValidForStatus { state, status } => {
                            prop_assert!(status_ok && !state_ok);
                            prop_assert_eq!(state, request.state);
                            prop_assert_eq!(status, request.status);
                        }
                    }
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }

            prop_assert!(asset.lifecycle().status.allows_state(asset.lifecycle().state));
        }

        prop_assert_eq!(&*backend.writes.lock().unwrap(), &expected_writes);
    }

    /// A failing backend never lets the in-memory value move
    #[test]
    fn prop_backend_failure_is_fail_closed(
        requests in prop::collection::vec(arb_request(), 1..20)
    ) {
        let backend = RecordingBackend { reject: true, ..Default::default() };
        let mut asset = Asset::new("node-SN1", AssetLifecycle::first_sighting());

        for request in requests {
            let _ = block_on(asset.set_status(&backend, request.status, request.state));
            prop_assert_eq!(asset.lifecycle(), AssetLifecycle::first_sighting());
            prop_assert_eq!(asset.previous(), None);
        }
    }
}
