// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inventory: the persisted provisioning record of every managed node.
//!
//! ```text
//! Workflow ──SetAsset*(name)──► Inventory ──► Asset::set_status ──► AssetBackend
//!                                   │              (validate)        (persist)
//!                                   └── in-memory Asset map (commit last)
//! ```
//!
//! The orchestration core only ever sees the [`Inventory`] trait. Which store
//! sits behind [`AssetBackend`] (the local key-value store or a remote asset
//! database) is invisible to it.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::state_machine::{
    AssetLifecycle, AssetState, AssetStatus, StateMachine, Transition, TransitionError,
};

pub use memory::{AssetRecord, MemoryBackend};

/// Errors raised by the inventory collaborator. Every variant names the asset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("asset {name}: {source}")]
    Transition {
        name: String,
        #[source]
        source: TransitionError,
    },

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("asset already exists: {0}")]
    AlreadyExists(String),

    #[error("inventory backend failed for asset {name}: {message}")]
    Backend { name: String, message: String },
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Persistence seam for asset status changes
#[async_trait]
pub trait AssetBackend: Send + Sync {
    /// Persist the lifecycle of one asset
    async fn set_asset_status(
        &self,
        name: &str,
        status: AssetStatus,
        state: AssetState,
        description: &str,
    ) -> InventoryResult<()>;

    /// Assets already known to the store, used to restore an inventory
    async fn load_assets(&self) -> InventoryResult<Vec<(String, AssetLifecycle)>> {
        Ok(Vec::new())
    }
}

/// One managed node's provisioning record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    name: String,
    current: AssetLifecycle,
    previous: Option<AssetLifecycle>,
    last_transition: Option<Transition<AssetLifecycle>>,
}

impl Asset {
    pub fn new(name: impl Into<String>, lifecycle: AssetLifecycle) -> Self {
        Self {
            name: name.into(),
            current: lifecycle,
            previous: None,
            last_transition: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_status(&self) -> (AssetStatus, AssetState) {
        (self.current.status, self.current.state)
    }

    pub fn lifecycle(&self) -> AssetLifecycle {
        self.current
    }

    /// Lifecycle held before the last committed change
    pub fn previous(&self) -> Option<AssetLifecycle> {
        self.previous
    }

    pub fn last_transition(&self) -> Option<&Transition<AssetLifecycle>> {
        self.last_transition.as_ref()
    }

    /// Validate, persist, then commit a status change.
    ///
    /// The in-memory value only changes after the backend accepted the new
    /// lifecycle. Requesting the current lifecycle is a no-op success and
    /// does not reach the backend.
    pub async fn set_status(
        &mut self,
        backend: &dyn AssetBackend,
        status: AssetStatus,
        state: AssetState,
    ) -> InventoryResult<()> {
        let target = AssetLifecycle::new(status, state);
        let (next, changed) =
            self.current
                .transition(&target)
                .map_err(|source| InventoryError::Transition {
                    name: self.name.clone(),
                    source,
                })?;

        if !changed {
            return Ok(());
        }

        let description = format!("{} -> {}", self.current, next);
        backend
            .set_asset_status(&self.name, next.status, next.state, &description)
            .await?;

        debug!(asset = %self.name, %description, "asset status changed");
        self.last_transition = Some(Transition::new(self.current, next, Utc::now()));
        self.previous = Some(self.current);
        self.current = next;
        Ok(())
    }
}

/// A single requested change to an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetChange {
    /// Move to a new status, keeping the current state
    Status(AssetStatus),
    /// Change visibility, keeping the current status
    State(AssetState),
}

/// Inventory collaborator consumed by the orchestration core
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Register a newly observed asset as unallocated and discovered
    async fn add_asset(&self, name: &str) -> InventoryResult<()>;

    async fn get_asset(&self, name: &str) -> InventoryResult<(AssetStatus, AssetState)>;

    async fn change_asset(&self, name: &str, change: AssetChange) -> InventoryResult<()>;

    async fn set_asset_discovered(&self, name: &str) -> InventoryResult<()> {
        self.change_asset(name, AssetChange::State(AssetState::Discovered))
            .await
    }

    async fn set_asset_disappeared(&self, name: &str) -> InventoryResult<()> {
        self.change_asset(name, AssetChange::State(AssetState::Disappeared))
            .await
    }

    async fn set_asset_provisioning(&self, name: &str) -> InventoryResult<()> {
        self.change_asset(name, AssetChange::Status(AssetStatus::Provisioning))
            .await
    }

    async fn set_asset_commissioned(&self, name: &str) -> InventoryResult<()> {
        self.change_asset(name, AssetChange::Status(AssetStatus::Allocated))
            .await
    }

    async fn set_asset_cancelled(&self, name: &str) -> InventoryResult<()> {
        self.change_asset(name, AssetChange::Status(AssetStatus::Cancelled))
            .await
    }

    async fn set_asset_decommissioned(&self, name: &str) -> InventoryResult<()> {
        self.change_asset(name, AssetChange::Status(AssetStatus::Decommissioned))
            .await
    }

    async fn set_asset_in_maintenance(&self, name: &str) -> InventoryResult<()> {
        self.change_asset(name, AssetChange::Status(AssetStatus::Maintenance))
            .await
    }

    async fn set_asset_unallocated(&self, name: &str) -> InventoryResult<()> {
        self.change_asset(name, AssetChange::Status(AssetStatus::Unallocated))
            .await
    }
}

/// [`Inventory`] keeping assets in memory and persisting through a backend
pub struct AssetInventory<B> {
    backend: B,
    assets: Mutex<HashMap<String, Asset>>,
}

impl<B: AssetBackend> AssetInventory<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            assets: Mutex::new(HashMap::new()),
        }
    }

    /// Build an inventory pre-populated with the assets the backend knows
    pub async fn restore(backend: B) -> InventoryResult<Self> {
        let known = backend.load_assets().await?;
        let assets = known
            .into_iter()
            .map(|(name, lifecycle)| (name.clone(), Asset::new(name, lifecycle)))
            .collect::<HashMap<_, _>>();

        info!(count = assets.len(), "restored assets from inventory backend");

        Ok(Self {
            backend,
            assets: Mutex::new(assets),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Copy of the asset record, including its audit fields
    pub async fn asset(&self, name: &str) -> Option<Asset> {
        self.assets.lock().await.get(name).cloned()
    }
}

#[async_trait]
impl<B: AssetBackend> Inventory for AssetInventory<B> {
    async fn add_asset(&self, name: &str) -> InventoryResult<()> {
        let mut assets = self.assets.lock().await;
        if assets.contains_key(name) {
            return Err(InventoryError::AlreadyExists(name.to_string()));
        }

        let lifecycle = AssetLifecycle::first_sighting();
        self.backend
            .set_asset_status(name, lifecycle.status, lifecycle.state, "asset added")
            .await?;

        info!(asset = %name, "added asset to inventory");
        assets.insert(name.to_string(), Asset::new(name, lifecycle));
        Ok(())
    }

    async fn get_asset(&self, name: &str) -> InventoryResult<(AssetStatus, AssetState)> {
        self.assets
            .lock()
            .await
            .get(name)
            .map(Asset::get_status)
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))
    }

    async fn change_asset(&self, name: &str, change: AssetChange) -> InventoryResult<()> {
        let mut assets = self.assets.lock().await;
        let asset = assets
            .get_mut(name)
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))?;

        let (status, state) = match (change, asset.get_status()) {
            (AssetChange::Status(status), (_, state)) => (status, state),
            (AssetChange::State(state), (status, _)) => (status, state),
        };

        asset.set_status(&self.backend, status, state).await
    }
}
