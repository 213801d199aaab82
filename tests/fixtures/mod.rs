// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-cluster-manager
//!
//! Provides scripted collaborators and a running manager for integration tests.
//!
//! # Design Principles
//! - Configuration actions succeed unless a test scripts another outcome
//! - Every action call is recorded with its hosts and variables
//! - Nodes enter the registry only through monitoring sightings, as in production
//! - Waiting is bounded; a stuck workflow fails the test instead of hanging it

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use cim_cluster_manager::configurator::{
    ActionError, ActionRun, ConfigAction, Configurator, ExtraVars, HostConfig,
};
use cim_cluster_manager::inventory::{
    AssetBackend, AssetInventory, AssetRecord, InventoryError, InventoryResult, MemoryBackend,
};
use cim_cluster_manager::state_machine::{AssetLifecycle, AssetState, AssetStatus};
use cim_cluster_manager::{
    Manager, ManagerConfig, ManagerHandle, ManagerSnapshot, MemberInfo, MembershipObserver,
    NodeView,
};

/// Fixed serial shared by every test member
pub const SERIAL: &str = "SN1";

/// How long helpers wait for the dispatcher before failing the test
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Install a test-writer subscriber once; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Outcome a scripted configuration action reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail(String),
    /// Refuse to start at all
    Unavailable,
    /// Run until the action's cancel token is tripped
    Hang,
}

/// One recorded configuration action call
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub action: ConfigAction,
    pub hosts: Vec<HostConfig>,
    pub vars: ExtraVars,
}

/// Configurator that records calls and plays back scripted outcomes
#[derive(Debug, Default)]
pub struct FakeConfigurator {
    script: Mutex<Vec<(ConfigAction, Outcome)>>,
    calls: Mutex<Vec<ActionCall>>,
}

impl FakeConfigurator {
    /// The next call of `action` reports `outcome`; later calls succeed
    pub fn script(&self, action: ConfigAction, outcome: Outcome) {
        self.script.lock().unwrap().push((action, outcome));
    }

    pub fn calls(&self) -> Vec<ActionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<ConfigAction> {
        self.calls().into_iter().map(|call| call.action).collect()
    }

    pub fn last_call(&self, action: ConfigAction) -> Option<ActionCall> {
        self.calls()
            .into_iter()
            .rev()
            .find(|call| call.action == action)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn start(
        &self,
        action: ConfigAction,
        hosts: &[HostConfig],
        extra_vars: &ExtraVars,
    ) -> Result<ActionRun, ActionError> {
        self.calls.lock().unwrap().push(ActionCall {
            action,
            hosts: hosts.to_vec(),
            vars: extra_vars.clone(),
        });

        let outcome = {
            let mut script = self.script.lock().unwrap();
            match script.iter().position(|(scripted, _)| *scripted == action) {
                Some(index) => script.remove(index).1,
                None => Outcome::Succeed,
            }
        };

        if outcome == Outcome::Unavailable {
            return Err(ActionError::Unavailable {
                action: action.to_string(),
                message: "runner not installed".to_string(),
            });
        }

        let (run, reporter) = ActionRun::channel(16);
        let host_count = hosts.len();
        tokio::spawn(async move {
            let _ = reporter
                .output
                .send(format!("PLAY [{}] hosts={}", action, host_count))
                .await;

            let result = match outcome {
                Outcome::Fail(message) => Err(ActionError::Failed {
                    action: action.to_string(),
                    message,
                }),
                Outcome::Hang => {
                    reporter.cancel.cancelled().await;
                    Err(ActionError::Failed {
                        action: action.to_string(),
                        message: "interrupted".to_string(),
                    })
                }
                Outcome::Succeed | Outcome::Unavailable => Ok(()),
            };
            let _ = reporter.result.send(result);
        });

        Ok(run)
    }
}

#[async_trait]
impl Configurator for FakeConfigurator {
    async fn configure(
        &self,
        hosts: &[HostConfig],
        extra_vars: &ExtraVars,
    ) -> Result<ActionRun, ActionError> {
        self.start(ConfigAction::Configure, hosts, extra_vars)
    }

    async fn cleanup(
        &self,
        hosts: &[HostConfig],
        extra_vars: &ExtraVars,
    ) -> Result<ActionRun, ActionError> {
        self.start(ConfigAction::Cleanup, hosts, extra_vars)
    }

    async fn upgrade(
        &self,
        hosts: &[HostConfig],
        extra_vars: &ExtraVars,
    ) -> Result<ActionRun, ActionError> {
        self.start(ConfigAction::Upgrade, hosts, extra_vars)
    }
}

/// Memory backend that rejects chosen (asset, status) writes
#[derive(Debug, Default)]
pub struct FaultyBackend {
    inner: MemoryBackend,
    failures: Mutex<Vec<(String, AssetStatus)>>,
}

impl FaultyBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Every write moving `name` to `status` fails until cleared
    pub fn fail_on(&self, name: &str, status: AssetStatus) {
        self.failures
            .lock()
            .unwrap()
            .push((name.to_string(), status));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub async fn record(&self, name: &str) -> Option<AssetRecord> {
        self.inner.record(name).await
    }
}

#[async_trait]
impl AssetBackend for FaultyBackend {
    async fn set_asset_status(
        &self,
        name: &str,
        status: AssetStatus,
        state: AssetState,
        description: &str,
    ) -> InventoryResult<()> {
        let rejected = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|(failing, failing_status)| failing == name && *failing_status == status);
        if rejected {
            return Err(InventoryError::Backend {
                name: name.to_string(),
                message: format!("write of {} rejected", status),
            });
        }
        self.inner
            .set_asset_status(name, status, state, description)
            .await
    }

    async fn load_assets(&self) -> InventoryResult<Vec<(String, AssetLifecycle)>> {
        self.inner.load_assets().await
    }
}

/// A running manager with its fake collaborators
pub struct Cluster {
    pub handle: ManagerHandle,
    pub configurator: Arc<FakeConfigurator>,
    pub inventory: Arc<AssetInventory<FaultyBackend>>,
    pub dispatcher: JoinHandle<()>,
}

impl Cluster {
    pub async fn start() -> Self {
        Self::with_backend(MemoryBackend::new()).await
    }

    /// Start on top of assets already recorded in `backend`
    pub async fn with_backend(backend: MemoryBackend) -> Self {
        init_tracing();
        let configurator = Arc::new(FakeConfigurator::default());
        let inventory = Arc::new(
            AssetInventory::restore(FaultyBackend::new(backend))
                .await
                .unwrap(),
        );
        let (manager, handle) = Manager::new(
            &ManagerConfig::default(),
            inventory.clone(),
            configurator.clone(),
        );
        let dispatcher = tokio::spawn(manager.run());

        Self {
            handle,
            configurator,
            inventory,
            dispatcher,
        }
    }

    pub fn backend(&self) -> &FaultyBackend {
        self.inventory.backend()
    }

    /// Status and state as last persisted, bypassing the in-memory inventory
    pub async fn backend_record(&self, name: &str) -> Option<(AssetStatus, AssetState)> {
        self.backend()
            .record(name)
            .await
            .map(|record| (record.status, record.state))
    }

    /// Report `label` to the manager as monitoring would, and wait until the
    /// sighting is processed
    pub async fn sight(&self, label: &str, address: &str) -> String {
        let member = member(label, address);
        let name = member.node_name();
        self.handle.member_discovered(member).await.unwrap();
        self.snapshot().await;
        name
    }

    pub async fn lose(&self, label: &str, address: &str) {
        self.handle
            .member_disappeared(member(label, address))
            .await
            .unwrap();
        self.snapshot().await;
    }

    pub async fn snapshot(&self) -> ManagerSnapshot {
        self.handle.snapshot().await.unwrap()
    }

    pub async fn node(&self, name: &str) -> NodeView {
        self.handle.node(name).await.unwrap()
    }

    pub async fn status(&self, name: &str) -> (AssetStatus, AssetState) {
        let view = self.node(name).await;
        (view.status.unwrap(), view.state.unwrap())
    }

    /// Wait until no job holds the slot
    pub async fn wait_idle(&self) -> ManagerSnapshot {
        tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                let snapshot = self.snapshot().await;
                if !snapshot.job_active {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    /// Wait until the active job's first action is running
    pub async fn wait_for_action(&self, action: ConfigAction) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while !self.configurator.actions().contains(&action) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("action was never started")
    }

    /// Commission `names` and wait for the job to settle
    pub async fn commission(&self, names: &[&str]) -> ManagerSnapshot {
        self.handle
            .commission(to_names(names), ExtraVars::new())
            .await
            .unwrap();
        self.wait_idle().await
    }
}

pub fn member(label: &str, address: &str) -> MemberInfo {
    MemberInfo::new(label, SERIAL, address)
}

pub fn node_name(label: &str) -> String {
    format!("{}-{}", label, SERIAL)
}

pub fn to_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}
