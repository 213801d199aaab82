// Copyright (c) 2025 - Cowboy AI, Inc.
//! Events processed by the dispatcher

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::configurator::ExtraVars;
use crate::errors::ManagerResult;
use crate::job::JobSnapshot;
use crate::monitoring::MemberInfo;
use crate::node::NodeView;

/// One unit of orchestration work
#[derive(Debug)]
pub enum Event {
    Commission {
        names: Vec<String>,
        extra_vars: ExtraVars,
    },
    Decommission {
        names: Vec<String>,
        extra_vars: ExtraVars,
    },
    /// Bootstrap a host not yet visible to monitoring, by management address
    Discover {
        address: String,
        extra_vars: ExtraVars,
    },
    Maintenance {
        names: Vec<String>,
        group: Option<String>,
        extra_vars: ExtraVars,
    },
    Update {
        names: Vec<String>,
        group: Option<String>,
        extra_vars: ExtraVars,
    },
    SetGlobals {
        globals: ExtraVars,
    },
    MemberDiscovered(MemberInfo),
    MemberDisappeared(MemberInfo),
    CancelJob,
    /// Sent by a job's done callback so the dispatcher can free the job slot
    JobFinished {
        job_id: Uuid,
    },
    Snapshot(oneshot::Sender<ManagerResult<ManagerSnapshot>>),
    Waitable(Waitable),
}

/// An event whose processing result is sent back to a waiting caller
#[derive(Debug)]
pub struct Waitable {
    pub event: Box<Event>,
    pub reply: oneshot::Sender<ManagerResult<()>>,
}

impl Waitable {
    pub fn new(event: Event) -> (Self, oneshot::Receiver<ManagerResult<()>>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                event: Box::new(event),
                reply,
            },
            rx,
        )
    }
}

/// Serialized read of the dispatcher-owned state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    pub nodes: Vec<NodeView>,
    pub globals: ExtraVars,
    /// Active job, or the most recent one when none is active
    pub job: Option<JobSnapshot>,
    /// Whether a job holds the slot, so lifecycle commands would be refused
    pub job_active: bool,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Commission { names, .. } => write!(f, "commission [{}]", names.join(", ")),
            Event::Decommission { names, .. } => {
                write!(f, "decommission [{}]", names.join(", "))
            }
            Event::Discover { address, .. } => write!(f, "discover {}", address),
            Event::Maintenance { names, group, .. } => write!(
                f,
                "maintenance [{}]{}",
                names.join(", "),
                group.as_deref().map(|g| format!(" -> {}", g)).unwrap_or_default()
            ),
            Event::Update { names, group, .. } => write!(
                f,
                "update [{}]{}",
                names.join(", "),
                group.as_deref().map(|g| format!(" -> {}", g)).unwrap_or_default()
            ),
            Event::SetGlobals { globals } => write!(f, "set globals ({} keys)", globals.len()),
            Event::MemberDiscovered(member) => {
                write!(f, "member discovered {} at {}", member.node_name(), member.address)
            }
            Event::MemberDisappeared(member) => {
                write!(f, "member disappeared {}", member.node_name())
            }
            Event::CancelJob => f.write_str("cancel job"),
            Event::JobFinished { job_id } => write!(f, "job finished {}", job_id),
            Event::Snapshot(_) => f.write_str("snapshot"),
            Event::Waitable(waitable) => write!(f, "waitable {}", waitable.event),
        }
    }
}
