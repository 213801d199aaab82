// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process key-value asset store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{AssetBackend, InventoryResult};
use crate::state_machine::{AssetLifecycle, AssetState, AssetStatus};

/// Last persisted value for one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub status: AssetStatus,
    pub state: AssetState,
    pub description: String,
}

/// Key-value backend keyed by asset name
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<String, AssetRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, name: &str) -> Option<AssetRecord> {
        self.records.read().await.get(name).cloned()
    }
}

#[async_trait]
impl AssetBackend for MemoryBackend {
    async fn set_asset_status(
        &self,
        name: &str,
        status: AssetStatus,
        state: AssetState,
        description: &str,
    ) -> InventoryResult<()> {
        self.records.write().await.insert(
            name.to_string(),
            AssetRecord {
                status,
                state,
                description: description.to_string(),
            },
        );
        Ok(())
    }

    async fn load_assets(&self) -> InventoryResult<Vec<(String, AssetLifecycle)>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    AssetLifecycle::new(record.status, record.state),
                )
            })
            .collect())
    }
}
