//! Error types for cluster manager operations

use thiserror::Error;

use crate::inventory::InventoryError;
use crate::job::JobError;

/// Errors surfaced by the orchestration core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// No node is registered under this name
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// The node is registered but monitoring does not currently see it
    #[error("node {0} is not discovered")]
    NodeNotDiscovered(String),

    /// The node has no configuration view yet
    #[error("node {0} has no host configuration")]
    NodeNotConfigured(String),

    /// A lifecycle event arrived while another job is still running
    #[error("a job is already active: {0}")]
    ActiveJob(String),

    /// Masters are decommissioned only after every worker
    #[error("cannot decommission master {master} before worker {worker}")]
    MasterBeforeWorkers { master: String, worker: String },

    /// The management address already belongs to a node
    #[error("address {address} is already bound to node {node}")]
    AddressInUse { address: String, node: String },

    /// Group name is not one of the assignable host groups
    #[error("invalid host group: {0}")]
    InvalidGroup(String),

    /// Regrouping would leave the cluster without a master
    #[error("moving {0} out of the master group would leave no master")]
    NoMasterRemaining(String),

    /// Workers need a commissioned master to join
    #[error("no commissioned master for {0} to join")]
    NoMasterToJoin(String),

    /// A command named no nodes
    #[error("no nodes given")]
    NoNodes,

    /// Extra variables were not a JSON object
    #[error("invalid extra variables: {0}")]
    InvalidExtraVars(String),

    /// Inventory collaborator error, propagated unchanged
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Job engine error
    #[error(transparent)]
    Job(#[from] JobError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The event queue is closed; the dispatcher has stopped
    #[error("event queue is closed")]
    QueueClosed,
}

/// Result type for cluster manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

impl ManagerError {
    /// Concurrency conflicts clear on their own; callers may retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ManagerError::ActiveJob(_))
    }
}

impl From<serde_json::Error> for ManagerError {
    fn from(err: serde_json::Error) -> Self {
        ManagerError::InvalidExtraVars(err.to_string())
    }
}
