// Copyright (c) 2025 - Cowboy AI, Inc.
//! Monitoring collaborator
//!
//! The gossip membership client pushes sightings into the manager through
//! [`MembershipObserver`]. The core never polls the monitoring fabric.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ManagerResult;

/// What monitoring knows about one cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Member label announced over gossip
    pub label: String,
    /// Hardware serial number
    pub serial: String,
    /// Management address
    pub address: String,
}

impl MemberInfo {
    pub fn new(
        label: impl Into<String>,
        serial: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            serial: serial.into(),
            address: address.into(),
        }
    }

    /// Registry key for this member
    pub fn node_name(&self) -> String {
        node_name(&self.label, &self.serial)
    }
}

/// Derive a node name from a monitoring label and hardware serial
pub fn node_name(label: &str, serial: &str) -> String {
    format!("{}-{}", label, serial)
}

/// Callback interface the monitoring backend delivers sightings to
#[async_trait]
pub trait MembershipObserver: Send + Sync {
    async fn member_discovered(&self, member: MemberInfo) -> ManagerResult<()>;

    async fn member_disappeared(&self, member: MemberInfo) -> ManagerResult<()>;
}
