// Copyright (c) 2025 - Cowboy AI, Inc.
//! Signal-driven globals reload

use std::path::{Path, PathBuf};

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use super::ManagerHandle;
use crate::config::load_globals;
use crate::errors::{ManagerError, ManagerResult};

/// Re-read the globals file and hand it to the dispatcher
pub async fn reload_globals(handle: &ManagerHandle, path: &Path) -> ManagerResult<()> {
    let globals = load_globals(path).await?;
    info!(path = %path.display(), keys = globals.len(), "reloading globals");
    handle.set_globals(globals).await
}

/// Reload globals on every SIGHUP until the manager's queue closes.
///
/// A bad globals file is logged and the previous globals stay in effect.
pub async fn reload_on_hangup(handle: ManagerHandle, path: PathBuf) -> ManagerResult<()> {
    let mut hangup = signal(SignalKind::hangup()).map_err(|e| {
        ManagerError::Configuration(format!("installing SIGHUP handler: {}", e))
    })?;

    while hangup.recv().await.is_some() {
        match reload_globals(&handle, &path).await {
            Ok(()) => {}
            Err(ManagerError::QueueClosed) => return Err(ManagerError::QueueClosed),
            Err(e) => warn!(path = %path.display(), error = %e, "globals reload failed"),
        }
    }

    Ok(())
}
