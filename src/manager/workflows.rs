// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle workflows run by the dispatcher
//!
//! Every user-triggered workflow follows the same shape:
//!
//! 1. refuse while a job is in flight
//! 2. validate the named nodes
//! 3. move their assets to the intermediate status
//! 4. start a job running external configuration actions
//! 5. settle the assets in the job's done callback, then free the job slot

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::{batch, Manager};
use crate::configurator::{
    merge_vars, run_action, ConfigAction, Configurator, ExtraVars, HostConfig, HostGroup,
};
use crate::errors::{ManagerError, ManagerResult};
use crate::inventory::{AssetChange, Inventory, InventoryError};
use crate::job::{Job, JobContext, JobError};
use crate::monitoring::MemberInfo;
use crate::node::{AssetRef, Node};
use crate::state_machine::{AssetState, AssetStatus, TransitionError};

/// Configuration variable carrying the master's management address to workers
pub const MASTER_ADDRESS_VAR: &str = "master_address";

/// Configuration variable carrying the master's node name to workers
pub const MASTER_NAME_VAR: &str = "master_name";

/// Which of the two regrouping workflows is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Reconfigure {
    /// cleanup, configure
    Maintenance,
    /// cleanup, upgrade, configure
    Update,
}

impl Reconfigure {
    fn actions(self) -> &'static [ConfigAction] {
        match self {
            Reconfigure::Maintenance => &[ConfigAction::Configure],
            Reconfigure::Update => &[ConfigAction::Upgrade, ConfigAction::Configure],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Reconfigure::Maintenance => "maintenance",
            Reconfigure::Update => "update",
        }
    }
}

/// A commissioned master other nodes can join as workers
#[derive(Debug, Clone)]
struct MasterRef {
    name: String,
    address: String,
}

/// Status change applied to one asset, usable with the batch helpers
fn set_status(
    inventory: &Arc<dyn Inventory>,
    status: AssetStatus,
) -> impl FnMut(String) -> BoxFuture<'static, ManagerResult<()>> {
    let inventory = inventory.clone();
    move |name| {
        let inventory = inventory.clone();
        async move {
            inventory
                .change_asset(&name, AssetChange::Status(status))
                .await
                .map_err(ManagerError::from)
        }
        .boxed()
    }
}

/// Point `config` at `master` as a worker, or make it a master when none exists
fn assign_role(config: &mut HostConfig, master: Option<&MasterRef>) {
    match master {
        Some(master) => {
            config.group = HostGroup::Worker;
            config.vars.insert(
                MASTER_ADDRESS_VAR.to_string(),
                Value::String(master.address.clone()),
            );
            config
                .vars
                .insert(MASTER_NAME_VAR.to_string(), Value::String(master.name.clone()));
        }
        None => {
            config.group = HostGroup::Master;
            config.vars.remove(MASTER_ADDRESS_VAR);
            config.vars.remove(MASTER_NAME_VAR);
        }
    }
}

/// Run `actions` in order. A failure after the leading cleanup triggers a
/// compensating cleanup; the failing action's error is what the job reports.
async fn run_with_compensation(
    configurator: &dyn Configurator,
    leading_cleanup: bool,
    actions: &[ConfigAction],
    hosts: &[HostConfig],
    vars: &ExtraVars,
    ctx: &JobContext,
) -> Result<(), JobError> {
    if leading_cleanup {
        run_action(configurator, ConfigAction::Cleanup, hosts, vars, ctx).await?;
    }

    for action in actions {
        if let Err(e) = run_action(configurator, *action, hosts, vars, ctx).await {
            warn!(job = %ctx.job_id, %action, error = %e, "action failed, running compensating cleanup");
            if let Err(cleanup) = run_action(
                configurator,
                ConfigAction::Cleanup,
                hosts,
                vars,
                &ctx.compensation(),
            )
            .await
            {
                warn!(job = %ctx.job_id, error = %cleanup, "compensating cleanup failed");
            }
            return Err(e);
        }
    }

    Ok(())
}

impl Manager {
    /// Known, discovered and configured, for every name
    async fn ensure_ready(&self, names: &[String]) -> ManagerResult<()> {
        if names.is_empty() {
            return Err(ManagerError::NoNodes);
        }

        for name in names {
            let node = self.node(name)?;
            match node.lifecycle().await? {
                Some((_, AssetState::Discovered)) => {}
                _ => return Err(ManagerError::NodeNotDiscovered(name.clone())),
            }
            if node.configuration.is_none() {
                return Err(ManagerError::NodeNotConfigured(name.clone()));
            }
        }
        Ok(())
    }

    fn node(&self, name: &str) -> ManagerResult<&Node> {
        self.registry
            .get(name)
            .ok_or_else(|| ManagerError::UnknownNode(name.to_string()))
    }

    fn configuration_mut(&mut self, name: &str) -> ManagerResult<&mut HostConfig> {
        self.registry
            .get_mut(name)
            .ok_or_else(|| ManagerError::UnknownNode(name.to_string()))?
            .configuration
            .as_mut()
            .ok_or_else(|| ManagerError::NodeNotConfigured(name.to_string()))
    }

    fn host_configs(&self, names: &[String]) -> ManagerResult<Vec<HostConfig>> {
        names
            .iter()
            .map(|name| {
                self.node(name)?
                    .configuration
                    .clone()
                    .ok_or_else(|| ManagerError::NodeNotConfigured(name.clone()))
            })
            .collect()
    }

    /// First commissioned master outside `exclude`, in name order
    async fn find_master(&self, exclude: &[String]) -> ManagerResult<Option<MasterRef>> {
        for node in self.registry.others(exclude) {
            if !node.in_group(HostGroup::Master) || !node.is_commissioned().await? {
                continue;
            }
            let address = node
                .address()
                .map(str::to_string)
                .or_else(|| node.configuration.as_ref().map(|c| c.host.clone()));
            if let Some(address) = address {
                return Ok(Some(MasterRef {
                    name: node.name.clone(),
                    address,
                }));
            }
        }
        Ok(None)
    }

    fn action_vars(&self, extra_vars: &ExtraVars) -> ExtraVars {
        merge_vars(&self.globals, extra_vars)
    }

    pub(super) async fn commission(
        &mut self,
        names: Vec<String>,
        extra_vars: ExtraVars,
    ) -> ManagerResult<()> {
        self.ensure_no_active_job()?;
        self.ensure_ready(&names).await?;

        batch::atomic(
            &names,
            set_status(&self.inventory, AssetStatus::Provisioning),
            set_status(&self.inventory, AssetStatus::Unallocated),
        )
        .await?;

        let master = self.find_master(&names).await?;
        match &master {
            Some(master) => info!(master = %master.name, "joining nodes as workers"),
            None => info!("no commissioned master, nodes become masters"),
        }
        for name in &names {
            assign_role(self.configuration_mut(name)?, master.as_ref());
        }

        let hosts = self.host_configs(&names)?;
        let vars = self.action_vars(&extra_vars);
        let configurator = self.configurator.clone();
        let inventory = self.inventory.clone();
        let job_id = Uuid::now_v7();
        let finisher = self.job_finisher(job_id);

        let job = Job::with_id(
            job_id,
            format!("commission {}", names.join(", ")),
            move |ctx: JobContext| async move {
                run_with_compensation(
                    configurator.as_ref(),
                    false,
                    &[ConfigAction::Configure],
                    &hosts,
                    &vars,
                    &ctx,
                )
                .await
            },
            move |_status, error: Option<JobError>| async move {
                match error {
                    Some(e) => {
                        warn!(error = %e, "commission failed, reverting to unallocated");
                        batch::best_effort(
                            &names,
                            set_status(&inventory, AssetStatus::Unallocated),
                        )
                        .await;
                    }
                    None => {
                        batch::best_effort(&names, set_status(&inventory, AssetStatus::Allocated))
                            .await;
                    }
                }
                finisher.finish().await;
            },
        );

        self.start_job(job);
        Ok(())
    }

    pub(super) async fn decommission(
        &mut self,
        names: Vec<String>,
        extra_vars: ExtraVars,
    ) -> ManagerResult<()> {
        self.ensure_no_active_job()?;
        if names.is_empty() {
            return Err(ManagerError::NoNodes);
        }

        for name in &names {
            if !self.node(name)?.in_group(HostGroup::Master) {
                continue;
            }
            for other in self.registry.others(&names) {
                if other.in_group(HostGroup::Worker) && other.is_commissioned().await? {
                    return Err(ManagerError::MasterBeforeWorkers {
                        master: name.clone(),
                        worker: other.name.clone(),
                    });
                }
            }
        }

        let hosts = self.host_configs(&names)?;

        // Cancelled is a one-way status, so check every asset before moving any.
        for name in &names {
            let (status, _) = self.inventory.get_asset(name).await?;
            if !status.can_transition_to(&AssetStatus::Cancelled) {
                return Err(InventoryError::Transition {
                    name: name.clone(),
                    source: TransitionError::TransitionNotAllowed {
                        from: status,
                        to: AssetStatus::Cancelled,
                    },
                }
                .into());
            }
        }
        for name in &names {
            self.inventory.set_asset_cancelled(name).await?;
        }

        let vars = self.action_vars(&extra_vars);
        let configurator = self.configurator.clone();
        let inventory = self.inventory.clone();
        let job_id = Uuid::now_v7();
        let finisher = self.job_finisher(job_id);

        let job = Job::with_id(
            job_id,
            format!("decommission {}", names.join(", ")),
            move |ctx: JobContext| async move {
                run_action(
                    configurator.as_ref(),
                    ConfigAction::Cleanup,
                    &hosts,
                    &vars,
                    &ctx,
                )
                .await
            },
            move |_status, error: Option<JobError>| async move {
                if let Some(e) = error {
                    warn!(error = %e, "cleanup failed, decommissioning anyway");
                }
                batch::best_effort(
                    &names,
                    set_status(&inventory, AssetStatus::Decommissioned),
                )
                .await;
                finisher.finish().await;
            },
        );

        self.start_job(job);
        Ok(())
    }

    pub(super) async fn discover(
        &mut self,
        address: String,
        extra_vars: ExtraVars,
    ) -> ManagerResult<()> {
        self.ensure_no_active_job()?;

        if let Some(node) = self.registry.find_by_address(&address) {
            return Err(ManagerError::AddressInUse {
                address,
                node: node.name.clone(),
            });
        }

        let hosts = vec![HostConfig::new(address.clone(), HostGroup::Discover)];
        let vars = self.action_vars(&extra_vars);
        let configurator = self.configurator.clone();
        let job_id = Uuid::now_v7();
        let finisher = self.job_finisher(job_id);

        let job = Job::with_id(
            job_id,
            format!("discover {}", address),
            move |ctx: JobContext| async move {
                run_action(
                    configurator.as_ref(),
                    ConfigAction::Configure,
                    &hosts,
                    &vars,
                    &ctx,
                )
                .await
            },
            move |_status, error: Option<JobError>| async move {
                match error {
                    Some(e) => warn!(%address, error = %e, "discovery bootstrap failed"),
                    None => info!(%address, "discovery bootstrap finished"),
                }
                finisher.finish().await;
            },
        );

        self.start_job(job);
        Ok(())
    }

    /// Maintenance and update: optional regroup, then reconfigure in place
    pub(super) async fn reconfigure(
        &mut self,
        kind: Reconfigure,
        names: Vec<String>,
        group: Option<String>,
        extra_vars: ExtraVars,
    ) -> ManagerResult<()> {
        self.ensure_no_active_job()?;
        self.ensure_ready(&names).await?;

        let target = group.as_deref().map(str::parse::<HostGroup>).transpose()?;

        if let Some(target) = target.filter(|group| *group != HostGroup::Master) {
            self.ensure_master_remains(&names, target).await?;
        }

        let master = match target {
            Some(HostGroup::Worker) => match self.find_master(&names).await? {
                Some(master) => Some(master),
                None => {
                    warn!(nodes = ?names, "no commissioned master for workers to join");
                    return Err(ManagerError::NoMasterToJoin(names.join(", ")));
                }
            },
            _ => None,
        };

        batch::atomic(
            &names,
            set_status(&self.inventory, AssetStatus::Maintenance),
            set_status(&self.inventory, AssetStatus::Allocated),
        )
        .await?;

        match target {
            Some(HostGroup::Worker) => {
                for name in &names {
                    assign_role(self.configuration_mut(name)?, master.as_ref());
                }
            }
            Some(group) => {
                for name in &names {
                    let config = self.configuration_mut(name)?;
                    config.group = group;
                    config.vars.remove(MASTER_ADDRESS_VAR);
                    config.vars.remove(MASTER_NAME_VAR);
                }
            }
            None => {}
        }

        let hosts = self.host_configs(&names)?;
        let vars = self.action_vars(&extra_vars);
        let configurator = self.configurator.clone();
        let inventory = self.inventory.clone();
        let job_id = Uuid::now_v7();
        let finisher = self.job_finisher(job_id);

        let job = Job::with_id(
            job_id,
            format!("{} {}", kind.as_str(), names.join(", ")),
            move |ctx: JobContext| async move {
                run_with_compensation(
                    configurator.as_ref(),
                    true,
                    kind.actions(),
                    &hosts,
                    &vars,
                    &ctx,
                )
                .await
            },
            move |_status, error: Option<JobError>| async move {
                match error {
                    Some(e) => {
                        warn!(error = %e, workflow = kind.as_str(), "reconfiguration failed, reverting to unallocated");
                        batch::best_effort(
                            &names,
                            set_status(&inventory, AssetStatus::Unallocated),
                        )
                        .await;
                    }
                    None => {
                        batch::best_effort(&names, set_status(&inventory, AssetStatus::Allocated))
                            .await;
                    }
                }
                finisher.finish().await;
            },
        );

        self.start_job(job);
        Ok(())
    }

    /// Moving masters into `target` must leave another commissioned master
    async fn ensure_master_remains(&self, names: &[String], target: HostGroup) -> ManagerResult<()> {
        let leaving = names
            .iter()
            .find(|name| {
                self.registry
                    .get(name)
                    .is_some_and(|node| node.in_group(HostGroup::Master))
            })
            .cloned();

        let Some(leaving) = leaving else {
            return Ok(());
        };

        for other in self.registry.others(names) {
            if other.in_group(HostGroup::Master) && other.is_commissioned().await? {
                return Ok(());
            }
        }

        warn!(node = %leaving, %target, "refusing to regroup the last master");
        Err(ManagerError::NoMasterRemaining(leaving))
    }

    pub(super) async fn member_discovered(&mut self, member: MemberInfo) -> ManagerResult<()> {
        let name = member.node_name();

        if let Some(node) = self.registry.get_mut(&name) {
            node.monitoring = Some(member);
            if node.inventory.is_some() {
                info!(node = %name, "node sighted again");
                return Ok(self.inventory.set_asset_discovered(&name).await?);
            }
            return self.attach_asset(&name).await;
        }

        let mut node = Node::new(name.clone());
        node.configuration = Some(HostConfig::new(member.address.clone(), HostGroup::Master));
        node.monitoring = Some(member);
        self.registry.insert(node);

        self.attach_asset(&name).await
    }

    /// Restore or create the node's asset, then attach the inventory view.
    /// The view stays absent while the inventory write fails, so the next
    /// sighting retries.
    async fn attach_asset(&mut self, name: &str) -> ManagerResult<()> {
        match self.inventory.get_asset(name).await {
            Ok(_) => {
                info!(node = %name, "restored node from inventory");
                self.inventory.set_asset_discovered(name).await?;
            }
            Err(InventoryError::NotFound(_)) => {
                info!(node = %name, "new node discovered");
                self.inventory.add_asset(name).await?;
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(node) = self.registry.get_mut(name) {
            node.inventory = Some(AssetRef::new(name, self.inventory.clone()));
        }
        Ok(())
    }

    pub(super) async fn member_disappeared(&mut self, member: MemberInfo) -> ManagerResult<()> {
        let name = member.node_name();
        let node = self
            .registry
            .get_mut(&name)
            .ok_or_else(|| ManagerError::UnknownNode(name.clone()))?;

        node.monitoring = Some(member);
        info!(node = %name, "node disappeared");
        Ok(self.inventory.set_asset_disappeared(&name).await?)
    }
}
