// Copyright (c) 2025 - Cowboy AI, Inc.
//! Configuration collaborator
//!
//! The external configuration tool (a playbook runner) is driven through the
//! [`Configurator`] trait. Every action starts asynchronously and hands back
//! an [`ActionRun`]:
//!
//! ```text
//! output  ─── lines, streamed while the action runs
//! cancel  ─── token the runner trips to stop the external process
//! result  ─── fires once with the action's outcome
//! ```
//!
//! [`drive_action`] multiplexes those three against the job's own
//! cancellation token.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ManagerError, ManagerResult};
use crate::job::{JobContext, JobError};

/// Free-form variables passed through to the configuration tool
pub type ExtraVars = serde_json::Map<String, Value>;

/// Parse caller-supplied extra variables. An empty body means no variables.
pub fn parse_extra_vars(raw: &str) -> ManagerResult<ExtraVars> {
    if raw.trim().is_empty() {
        return Ok(ExtraVars::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(vars)) => Ok(vars),
        Ok(other) => Err(ManagerError::InvalidExtraVars(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ManagerError::InvalidExtraVars(e.to_string())),
    }
}

/// Overlay `overrides` on top of `base`; keys in `overrides` win
pub fn merge_vars(base: &ExtraVars, overrides: &ExtraVars) -> ExtraVars {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Configuration role of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostGroup {
    Master,
    Worker,
    /// Single-use group for bootstrapping a host not yet seen by monitoring
    Discover,
}

impl HostGroup {
    /// Groups an operator may move a commissioned node into
    pub const ASSIGNABLE: [HostGroup; 2] = [HostGroup::Master, HostGroup::Worker];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostGroup::Master => "master",
            HostGroup::Worker => "worker",
            HostGroup::Discover => "discover",
        }
    }
}

impl fmt::Display for HostGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostGroup {
    type Err = ManagerError;

    /// Only assignable groups parse; `discover` is internal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostGroup::ASSIGNABLE
            .into_iter()
            .find(|group| group.as_str() == s)
            .ok_or_else(|| ManagerError::InvalidGroup(s.to_string()))
    }
}

/// Configuration view of a node: how the configuration tool addresses it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host tag used in the generated inventory
    pub host: String,
    pub group: HostGroup,
    /// Per-host variables for the configuration tool
    pub vars: ExtraVars,
}

impl HostConfig {
    pub fn new(host: impl Into<String>, group: HostGroup) -> Self {
        Self {
            host: host.into(),
            group,
            vars: ExtraVars::new(),
        }
    }
}

/// External actions the configuration tool offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAction {
    Configure,
    Cleanup,
    Upgrade,
}

impl fmt::Display for ConfigAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigAction::Configure => "configure",
            ConfigAction::Cleanup => "cleanup",
            ConfigAction::Upgrade => "upgrade",
        };
        f.write_str(s)
    }
}

/// Failures of an external configuration action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{action} failed: {message}")]
    Failed { action: String, message: String },

    #[error("{action} could not be started: {message}")]
    Unavailable { action: String, message: String },

    #[error("{action} ended without reporting a result")]
    Abandoned { action: String },
}

/// Handles to one running external action
#[derive(Debug)]
pub struct ActionRun {
    pub output: mpsc::Receiver<String>,
    pub cancel: CancellationToken,
    pub result: oneshot::Receiver<Result<(), ActionError>>,
}

/// Producer side of an [`ActionRun`], held by configurator implementations
#[derive(Debug)]
pub struct ActionReporter {
    pub output: mpsc::Sender<String>,
    pub cancel: CancellationToken,
    pub result: oneshot::Sender<Result<(), ActionError>>,
}

impl ActionRun {
    /// Create a connected run/reporter pair
    pub fn channel(output_capacity: usize) -> (ActionRun, ActionReporter) {
        let (output_tx, output_rx) = mpsc::channel(output_capacity.max(1));
        let (result_tx, result_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        (
            ActionRun {
                output: output_rx,
                cancel: cancel.clone(),
                result: result_rx,
            },
            ActionReporter {
                output: output_tx,
                cancel,
                result: result_tx,
            },
        )
    }
}

/// Configuration collaborator consumed by the workflows
#[async_trait]
pub trait Configurator: Send + Sync {
    /// Bring the hosts to their configured role
    async fn configure(
        &self,
        hosts: &[HostConfig],
        extra_vars: &ExtraVars,
    ) -> Result<ActionRun, ActionError>;

    /// Remove configuration from the hosts
    async fn cleanup(
        &self,
        hosts: &[HostConfig],
        extra_vars: &ExtraVars,
    ) -> Result<ActionRun, ActionError>;

    /// Upgrade software on the hosts
    async fn upgrade(
        &self,
        hosts: &[HostConfig],
        extra_vars: &ExtraVars,
    ) -> Result<ActionRun, ActionError>;
}

/// Start `action` and drive it to completion inside a job
pub async fn run_action(
    configurator: &dyn Configurator,
    action: ConfigAction,
    hosts: &[HostConfig],
    extra_vars: &ExtraVars,
    ctx: &JobContext,
) -> Result<(), JobError> {
    debug!(job = %ctx.job_id, %action, hosts = hosts.len(), "starting configuration action");

    let run = match action {
        ConfigAction::Configure => configurator.configure(hosts, extra_vars).await?,
        ConfigAction::Cleanup => configurator.cleanup(hosts, extra_vars).await?,
        ConfigAction::Upgrade => configurator.upgrade(hosts, extra_vars).await?,
    };

    drive_action(action, run, ctx).await
}

/// Stream an action's output into the job log until it reports a result or
/// the job is cancelled, whichever happens first.
///
/// On cancellation the action's own token is tripped; stopping the external
/// process is up to the configurator.
pub async fn drive_action(
    action: ConfigAction,
    run: ActionRun,
    ctx: &JobContext,
) -> Result<(), JobError> {
    let ActionRun {
        mut output,
        cancel,
        mut result,
    } = run;
    let mut output_open = true;

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                warn!(job = %ctx.job_id, %action, "cancelling configuration action");
                cancel.cancel();
                return Err(JobError::Cancelled);
            }

            line = output.recv(), if output_open => match line {
                Some(line) => record_line(ctx, action, line),
                None => output_open = false,
            },

            outcome = &mut result => {
                while let Ok(line) = output.try_recv() {
                    record_line(ctx, action, line);
                }
                return match outcome {
                    Ok(outcome) => outcome.map_err(JobError::from),
                    Err(_) => Err(ActionError::Abandoned { action: action.to_string() }.into()),
                };
            }
        }
    }
}

fn record_line(ctx: &JobContext, action: ConfigAction, line: String) {
    info!(job = %ctx.job_id, %action, "{}", line);
    ctx.log.push(line);
}
