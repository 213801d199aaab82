// Copyright (c) 2025 - Cowboy AI, Inc.
//! Job Engine
//!
//! A [`Job`] is one long-running unit of work with cooperative cancellation
//! and a completion callback.
//!
//! ```text
//! Queued ──run()──► Running ──runner Ok──► Complete ─┐
//!                      │                             ├─► done(status, error) ─► resolved
//!                      └──runner Err/panic──► Errored┘
//! ```
//!
//! The engine never schedules itself: the owner spawns `job.clone().run()`
//! on its own task. Status, error and output are guarded by plain mutexes so
//! that readers never wait on the runner.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::configurator::ActionError;

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Complete,
    Errored,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Errors produced by, or reported through, the job engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The runner observed the cancellation signal
    #[error("job was cancelled")]
    Cancelled,

    /// An external configuration action failed
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The runner panicked; the payload message is preserved
    #[error("job runner panicked: {0}")]
    Panicked(String),

    /// `cancel()` called on a job that is not running
    #[error("job is not running")]
    NotRunning,
}

/// Output lines streamed by a job's external actions
#[derive(Debug, Clone, Default)]
pub struct JobLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl JobLog {
    pub fn push(&self, line: impl Into<String>) {
        lock(&self.lines).push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

/// Handed to the runner when the job starts
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub cancel: CancellationToken,
    pub log: JobLog,
}

impl JobContext {
    /// Same job and log with a fresh token, so compensating actions still
    /// run after the job itself was cancelled
    pub fn compensation(&self) -> JobContext {
        JobContext {
            job_id: self.job_id,
            cancel: CancellationToken::new(),
            log: self.log.clone(),
        }
    }
}

type Runner = Box<dyn FnOnce(JobContext) -> BoxFuture<'static, Result<(), JobError>> + Send>;
type DoneCallback = Box<dyn FnOnce(JobStatus, Option<JobError>) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug)]
struct JobProgress {
    status: JobStatus,
    error: Option<JobError>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// Serializable view of a job for the job-status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub description: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub output: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A single in-flight long-running task
pub struct Job {
    id: Uuid,
    description: String,
    cancel: CancellationToken,
    log: JobLog,
    progress: Mutex<JobProgress>,
    work: Mutex<Option<(Runner, DoneCallback)>>,
    resolved: watch::Sender<bool>,
}

impl Job {
    pub fn new<R, RF, D, DF>(description: impl Into<String>, runner: R, done: D) -> Arc<Self>
    where
        R: FnOnce(JobContext) -> RF + Send + 'static,
        RF: Future<Output = Result<(), JobError>> + Send + 'static,
        D: FnOnce(JobStatus, Option<JobError>) -> DF + Send + 'static,
        DF: Future<Output = ()> + Send + 'static,
    {
        Self::with_id(Uuid::now_v7(), description, runner, done)
    }

    /// Build a job whose id is known up front, for callbacks that report it
    pub fn with_id<R, RF, D, DF>(
        id: Uuid,
        description: impl Into<String>,
        runner: R,
        done: D,
    ) -> Arc<Self>
    where
        R: FnOnce(JobContext) -> RF + Send + 'static,
        RF: Future<Output = Result<(), JobError>> + Send + 'static,
        D: FnOnce(JobStatus, Option<JobError>) -> DF + Send + 'static,
        DF: Future<Output = ()> + Send + 'static,
    {
        let runner: Runner = Box::new(move |ctx| runner(ctx).boxed());
        let done: DoneCallback = Box::new(move |status, error| done(status, error).boxed());
        let (resolved, _) = watch::channel(false);

        Arc::new(Self {
            id,
            description: description.into(),
            cancel: CancellationToken::new(),
            log: JobLog::default(),
            progress: Mutex::new(JobProgress {
                status: JobStatus::Queued,
                error: None,
                started_at: None,
                finished_at: None,
            }),
            work: Mutex::new(Some((runner, done))),
            resolved,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run the job to completion on the caller's task.
    ///
    /// The done callback fires exactly once, after the terminal status is
    /// recorded, whether the runner succeeded, failed or panicked. Running a
    /// job a second time does nothing.
    pub async fn run(self: Arc<Self>) {
        let Some((runner, done)) = lock(&self.work).take() else {
            warn!(job = %self.id, "job already ran, ignoring");
            return;
        };

        {
            let mut progress = lock(&self.progress);
            progress.status = JobStatus::Running;
            progress.started_at = Some(Utc::now());
        }
        info!(job = %self.id, description = %self.description, "job started");

        let ctx = JobContext {
            job_id: self.id,
            cancel: self.cancel.clone(),
            log: self.log.clone(),
        };

        let result = match AssertUnwindSafe(runner(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
        };

        let (status, job_error) = match result {
            Ok(()) => (JobStatus::Complete, None),
            Err(e) => (JobStatus::Errored, Some(e)),
        };

        {
            let mut progress = lock(&self.progress);
            progress.status = status;
            progress.error = job_error.clone();
            progress.finished_at = Some(Utc::now());
        }

        match &job_error {
            None => info!(job = %self.id, "job complete"),
            Some(e) => error!(job = %self.id, error = %e, "job errored"),
        }

        if let Err(payload) = AssertUnwindSafe(done(status, job_error))
            .catch_unwind()
            .await
        {
            error!(
                job = %self.id,
                panic = %panic_message(payload.as_ref()),
                "job done callback panicked"
            );
        }

        self.resolved.send_replace(true);
    }

    /// Signal cancellation to a running job without waiting for it to stop
    pub fn cancel(&self) -> Result<(), JobError> {
        let progress = lock(&self.progress);
        if progress.status != JobStatus::Running {
            return Err(JobError::NotRunning);
        }

        info!(job = %self.id, "cancelling job");
        self.cancel.cancel();
        Ok(())
    }

    pub fn status(&self) -> (JobStatus, Option<JobError>) {
        let progress = lock(&self.progress);
        (progress.status, progress.error.clone())
    }

    /// Whether the job finished and its done callback has returned
    pub fn is_resolved(&self) -> bool {
        *self.resolved.borrow()
    }

    /// Wait until the job finished and its done callback has returned
    pub async fn wait(&self) {
        let mut rx = self.resolved.subscribe();
        // The sender lives as long as `self`, so this only returns once resolved.
        let _ = rx.wait_for(|resolved| *resolved).await;
    }

    pub fn output(&self) -> Vec<String> {
        self.log.lines()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let progress = lock(&self.progress);
        JobSnapshot {
            id: self.id,
            description: self.description.clone(),
            status: progress.status,
            error: progress.error.as_ref().map(ToString::to_string),
            output: self.log.lines(),
            started_at: progress.started_at,
            finished_at: progress.finished_at,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("status", &lock(&self.progress).status)
            .finish()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.id)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
