// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event-driven orchestration engine
//!
//! ```text
//! API / monitoring / SIGHUP ──► ManagerHandle ──mpsc──► Manager::run
//!                                    ▲                      │ one event at a time
//!                                    │ oneshot reply        ▼
//!                                    └──────────────── workflows ──► Job (spawned)
//!                                                                     │
//!                              Event::JobFinished ◄── done callback ◄─┘
//! ```
//!
//! [`Manager`] is the only writer of the node registry, the globals and the
//! active job slot. Everything outside the dispatcher task reaches that state
//! through events, including reads.

pub mod batch;
pub mod events;
#[cfg(unix)]
pub mod reload;
mod workflows;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{load_globals, ManagerConfig};
use crate::configurator::{Configurator, ExtraVars};
use crate::errors::{ManagerError, ManagerResult};
use crate::inventory::Inventory;
use crate::job::{Job, JobError, JobSnapshot};
use crate::monitoring::{MemberInfo, MembershipObserver};
use crate::node::{NodeRegistry, NodeView};

pub use events::{Event, ManagerSnapshot, Waitable};
pub use workflows::{MASTER_ADDRESS_VAR, MASTER_NAME_VAR};

/// Single-consumer orchestrator owning all mutable cluster state
pub struct Manager {
    inventory: Arc<dyn Inventory>,
    configurator: Arc<dyn Configurator>,
    registry: NodeRegistry,
    globals: ExtraVars,
    active_job: Option<Arc<Job>>,
    last_job: Option<Arc<Job>>,
    events: mpsc::Receiver<Event>,
    /// Handed to job callbacks; weak so the queue closes once every handle is gone
    requeue: mpsc::WeakSender<Event>,
}

impl Manager {
    pub fn new(
        config: &ManagerConfig,
        inventory: Arc<dyn Inventory>,
        configurator: Arc<dyn Configurator>,
    ) -> (Self, ManagerHandle) {
        let (sender, events) = mpsc::channel(config.queue_capacity.max(1));
        let manager = Self {
            inventory,
            configurator,
            registry: NodeRegistry::new(),
            globals: ExtraVars::new(),
            active_job: None,
            last_job: None,
            events,
            requeue: sender.downgrade(),
        };
        (manager, ManagerHandle { sender })
    }

    /// Load globals, spawn the dispatcher and, when a globals file is
    /// configured, the SIGHUP reload listener.
    pub async fn start(
        config: ManagerConfig,
        inventory: Arc<dyn Inventory>,
        configurator: Arc<dyn Configurator>,
    ) -> ManagerResult<(ManagerHandle, JoinHandle<()>)> {
        let (mut manager, handle) = Manager::new(&config, inventory, configurator);

        if let Some(path) = &config.globals_path {
            manager.globals = load_globals(path).await?;

            #[cfg(unix)]
            {
                let reload_handle = handle.clone();
                let path = path.clone();
                tokio::spawn(async move {
                    if let Err(e) = reload::reload_on_hangup(reload_handle, path).await {
                        error!(error = %e, "globals reload listener stopped");
                    }
                });
            }
        }

        let dispatcher = tokio::spawn(manager.run());
        Ok((handle, dispatcher))
    }

    /// Dispatch loop. Returns only once every sender is gone.
    pub async fn run(mut self) {
        info!("cluster manager dispatcher started");

        while let Some(event) = self.events.recv().await {
            debug!(%event, "processing event");
            let label = event.to_string();
            if let Err(e) = self.process(event).await {
                error!(event = %label, error = %e, "event processing failed");
            }
        }

        info!("event queue closed, dispatcher stopped");
    }

    fn process(&mut self, event: Event) -> BoxFuture<'_, ManagerResult<()>> {
        async move {
            match event {
                Event::Commission { names, extra_vars } => {
                    self.commission(names, extra_vars).await
                }
                Event::Decommission { names, extra_vars } => {
                    self.decommission(names, extra_vars).await
                }
                Event::Discover {
                    address,
                    extra_vars,
                } => self.discover(address, extra_vars).await,
                Event::Maintenance {
                    names,
                    group,
                    extra_vars,
                } => {
                    self.reconfigure(workflows::Reconfigure::Maintenance, names, group, extra_vars)
                        .await
                }
                Event::Update {
                    names,
                    group,
                    extra_vars,
                } => {
                    self.reconfigure(workflows::Reconfigure::Update, names, group, extra_vars)
                        .await
                }
                Event::SetGlobals { globals } => {
                    info!(keys = globals.len(), "globals replaced");
                    self.globals = globals;
                    Ok(())
                }
                Event::MemberDiscovered(member) => self.member_discovered(member).await,
                Event::MemberDisappeared(member) => self.member_disappeared(member).await,
                Event::CancelJob => self.cancel_active_job(),
                Event::JobFinished { job_id } => {
                    self.job_finished(job_id);
                    Ok(())
                }
                Event::Snapshot(reply) => {
                    let snapshot = self.snapshot().await;
                    let result = snapshot.as_ref().map(|_| ()).map_err(Clone::clone);
                    if reply.send(snapshot).is_err() {
                        debug!("snapshot requester went away");
                    }
                    result
                }
                Event::Waitable(Waitable { event, reply }) => {
                    let result = self.process(*event).await;
                    if reply.send(result.clone()).is_err() {
                        warn!("waitable caller went away before the result was ready");
                    }
                    result
                }
            }
        }
        .boxed()
    }

    fn in_flight_job(&self) -> Option<&Arc<Job>> {
        self.active_job.as_ref().filter(|job| !job.is_resolved())
    }

    /// Fails with the in-flight job while one has not fully resolved
    fn ensure_no_active_job(&self) -> ManagerResult<()> {
        match self.in_flight_job() {
            Some(job) => Err(ManagerError::ActiveJob(job.to_string())),
            None => Ok(()),
        }
    }

    fn start_job(&mut self, job: Arc<Job>) {
        info!(job = %job.id(), description = %job.description(), "starting job");
        self.active_job = Some(job.clone());
        self.last_job = Some(job.clone());
        tokio::spawn(job.run());
    }

    /// Notifier the done callback of job `job_id` calls last
    fn job_finisher(&self, job_id: Uuid) -> JobFinisher {
        JobFinisher {
            job_id,
            sender: self.requeue.upgrade(),
        }
    }

    fn job_finished(&mut self, job_id: Uuid) {
        match &self.active_job {
            Some(job) if job.id() == job_id => {
                debug!(job = %job_id, "clearing active job slot");
                self.active_job = None;
            }
            _ => debug!(job = %job_id, "finished job is not the active one, ignoring"),
        }
    }

    fn cancel_active_job(&self) -> ManagerResult<()> {
        match self.in_flight_job() {
            Some(job) => Ok(job.cancel()?),
            None => Err(JobError::NotRunning.into()),
        }
    }

    async fn snapshot(&self) -> ManagerResult<ManagerSnapshot> {
        let mut nodes = Vec::with_capacity(self.registry.len());
        for node in self.registry.iter() {
            nodes.push(node.view().await);
        }

        let job = self
            .active_job
            .as_ref()
            .or(self.last_job.as_ref())
            .map(|job| job.snapshot());

        Ok(ManagerSnapshot {
            nodes,
            globals: self.globals.clone(),
            job,
            job_active: self.in_flight_job().is_some(),
        })
    }
}

/// Carried into a job's done callback to free the job slot afterwards
struct JobFinisher {
    job_id: Uuid,
    sender: Option<mpsc::Sender<Event>>,
}

impl JobFinisher {
    async fn finish(self) {
        let Some(sender) = self.sender else {
            return;
        };
        if sender
            .send(Event::JobFinished {
                job_id: self.job_id,
            })
            .await
            .is_err()
        {
            debug!(job = %self.job_id, "dispatcher gone, job slot not cleared");
        }
    }
}

/// Cloneable producer side of the manager's event queue
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    sender: mpsc::Sender<Event>,
}

impl ManagerHandle {
    /// Enqueue without waiting for processing; waits while the queue is full
    pub async fn enqueue(&self, event: Event) -> ManagerResult<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| ManagerError::QueueClosed)
    }

    /// Enqueue and wait until the dispatcher has processed the event
    pub async fn submit(&self, event: Event) -> ManagerResult<()> {
        let (waitable, reply) = Waitable::new(event);
        self.enqueue(Event::Waitable(waitable)).await?;
        reply.await.map_err(|_| ManagerError::QueueClosed)?
    }

    pub async fn commission(&self, names: Vec<String>, extra_vars: ExtraVars) -> ManagerResult<()> {
        self.submit(Event::Commission { names, extra_vars }).await
    }

    pub async fn decommission(
        &self,
        names: Vec<String>,
        extra_vars: ExtraVars,
    ) -> ManagerResult<()> {
        self.submit(Event::Decommission { names, extra_vars }).await
    }

    pub async fn discover(
        &self,
        address: impl Into<String>,
        extra_vars: ExtraVars,
    ) -> ManagerResult<()> {
        self.submit(Event::Discover {
            address: address.into(),
            extra_vars,
        })
        .await
    }

    pub async fn maintenance(
        &self,
        names: Vec<String>,
        group: Option<String>,
        extra_vars: ExtraVars,
    ) -> ManagerResult<()> {
        self.submit(Event::Maintenance {
            names,
            group,
            extra_vars,
        })
        .await
    }

    pub async fn update(
        &self,
        names: Vec<String>,
        group: Option<String>,
        extra_vars: ExtraVars,
    ) -> ManagerResult<()> {
        self.submit(Event::Update {
            names,
            group,
            extra_vars,
        })
        .await
    }

    pub async fn set_globals(&self, globals: ExtraVars) -> ManagerResult<()> {
        self.submit(Event::SetGlobals { globals }).await
    }

    pub async fn cancel_job(&self) -> ManagerResult<()> {
        self.submit(Event::CancelJob).await
    }

    pub async fn snapshot(&self) -> ManagerResult<ManagerSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Event::Snapshot(reply)).await?;
        rx.await.map_err(|_| ManagerError::QueueClosed)?
    }

    pub async fn node(&self, name: &str) -> ManagerResult<NodeView> {
        self.snapshot()
            .await?
            .nodes
            .into_iter()
            .find(|node| node.name == name)
            .ok_or_else(|| ManagerError::UnknownNode(name.to_string()))
    }

    pub async fn nodes(&self) -> ManagerResult<Vec<NodeView>> {
        Ok(self.snapshot().await?.nodes)
    }

    pub async fn globals(&self) -> ManagerResult<ExtraVars> {
        Ok(self.snapshot().await?.globals)
    }

    /// Active job, or the most recent one once it finished
    pub async fn job_status(&self) -> ManagerResult<Option<JobSnapshot>> {
        Ok(self.snapshot().await?.job)
    }
}

#[async_trait]
impl MembershipObserver for ManagerHandle {
    async fn member_discovered(&self, member: MemberInfo) -> ManagerResult<()> {
        self.enqueue(Event::MemberDiscovered(member)).await
    }

    async fn member_disappeared(&self, member: MemberInfo) -> ManagerResult<()> {
        self.enqueue(Event::MemberDisappeared(member)).await
    }
}
