//! Cluster node lifecycle orchestration for the Composable Information Machine
//!
//! This crate tracks the hosts known to a cluster, reconciles their monitoring
//! visibility with an inventory store, and drives an external configuration
//! tool to bring nodes into or out of service. All orchestration runs on one
//! serialized event dispatcher with at most one long-running job in flight.

pub mod config;
pub mod configurator;
pub mod errors;
pub mod inventory;
pub mod job;
pub mod manager;
pub mod monitoring;
pub mod node;
pub mod state_machine;

// Re-export commonly used types
pub use config::ManagerConfig;
pub use configurator::{Configurator, ExtraVars, HostConfig, HostGroup};
pub use errors::{ManagerError, ManagerResult};
pub use inventory::{AssetInventory, Inventory, InventoryError, MemoryBackend};
pub use job::{Job, JobError, JobSnapshot, JobStatus};
pub use manager::{Event, Manager, ManagerHandle, ManagerSnapshot};
pub use monitoring::{MemberInfo, MembershipObserver};
pub use node::{Node, NodeRegistry, NodeView};
pub use state_machine::{AssetLifecycle, AssetState, AssetStatus};
