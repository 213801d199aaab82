// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node aggregate and registry
//!
//! A [`Node`] merges three views of one host, keyed by the name monitoring
//! derives from label and serial:
//!
//! - **monitoring**: label, serial and management address from gossip
//! - **inventory**: the asset record, reached through [`AssetRef`]
//! - **configuration**: host tag, group and variables for the config tool
//!
//! The registry is owned by the dispatcher and is only mutated while it
//! processes an event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::configurator::{HostConfig, HostGroup};
use crate::errors::ManagerResult;
use crate::inventory::{Inventory, InventoryResult};
use crate::monitoring::MemberInfo;
use crate::state_machine::{AssetState, AssetStatus};

/// Narrow capability onto one asset in the inventory
#[derive(Clone)]
pub struct AssetRef {
    name: String,
    inventory: Arc<dyn Inventory>,
}

impl AssetRef {
    pub fn new(name: impl Into<String>, inventory: Arc<dyn Inventory>) -> Self {
        Self {
            name: name.into(),
            inventory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get_status(&self) -> InventoryResult<(AssetStatus, AssetState)> {
        self.inventory.get_asset(&self.name).await
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetRef").field("name", &self.name).finish()
    }
}

/// Orchestration-level aggregate for one host
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub monitoring: Option<MemberInfo>,
    pub inventory: Option<AssetRef>,
    pub configuration: Option<HostConfig>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            monitoring: None,
            inventory: None,
            configuration: None,
        }
    }

    /// Management address as last reported by monitoring
    pub fn address(&self) -> Option<&str> {
        self.monitoring.as_ref().map(|m| m.address.as_str())
    }

    pub fn group(&self) -> Option<HostGroup> {
        self.configuration.as_ref().map(|c| c.group)
    }

    pub fn in_group(&self, group: HostGroup) -> bool {
        self.group() == Some(group)
    }

    /// Inventory status and state, `None` while the inventory view is absent
    pub async fn lifecycle(&self) -> ManagerResult<Option<(AssetStatus, AssetState)>> {
        match &self.inventory {
            Some(asset) => Ok(Some(asset.get_status().await?)),
            None => Ok(None),
        }
    }

    /// Discovered by monitoring and allocated in inventory
    pub async fn is_commissioned(&self) -> ManagerResult<bool> {
        Ok(matches!(
            self.lifecycle().await?,
            Some((AssetStatus::Allocated, AssetState::Discovered))
        ))
    }

    /// A lifecycle the inventory cannot report shows as absent rather than
    /// failing the whole read
    pub async fn view(&self) -> NodeView {
        let lifecycle = self.lifecycle().await.unwrap_or_else(|e| {
            warn!(node = %self.name, error = %e, "inventory lifecycle unavailable");
            None
        });
        NodeView {
            name: self.name.clone(),
            monitoring: self.monitoring.clone(),
            configuration: self.configuration.clone(),
            status: lifecycle.map(|(status, _)| status),
            state: lifecycle.map(|(_, state)| state),
        }
    }
}

/// Serializable view of a node for the node/nodes queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub name: String,
    pub monitoring: Option<MemberInfo>,
    pub configuration: Option<HostConfig>,
    pub status: Option<AssetStatus>,
    pub state: Option<AssetState>,
}

/// Nodes keyed by name, iterated in name order
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.name.clone(), node)
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Nodes other than the named ones
    pub fn others<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .values()
            .filter(move |node| !names.contains(&node.name))
    }

    pub fn find_by_address(&self, address: &str) -> Option<&Node> {
        self.nodes
            .values()
            .find(|node| node.address() == Some(address))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
