// Copyright (c) 2025 - Cowboy AI, Inc.
//! Manager configuration

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::configurator::ExtraVars;
use crate::errors::{ManagerError, ManagerResult};

/// Environment variable overriding [`ManagerConfig::queue_capacity`]
pub const QUEUE_CAPACITY_ENV: &str = "CLUSTER_MANAGER_QUEUE_CAPACITY";

/// Environment variable naming the globals file
pub const GLOBALS_ENV: &str = "CLUSTER_MANAGER_GLOBALS";

/// Configuration for the cluster manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Bound of the event queue; producers wait once it is full
    pub queue_capacity: usize,
    /// JSON file with global extra variables, re-read on SIGHUP
    pub globals_path: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            globals_path: None,
        }
    }
}

impl ManagerConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> ManagerResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(QUEUE_CAPACITY_ENV) {
            config.queue_capacity = parse_capacity(&raw)?;
        }

        if let Ok(path) = std::env::var(GLOBALS_ENV) {
            if !path.is_empty() {
                config.globals_path = Some(PathBuf::from(path));
            }
        }

        Ok(config)
    }
}

fn parse_capacity(raw: &str) -> ManagerResult<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ManagerError::Configuration(format!(
            "{} must be greater than zero",
            QUEUE_CAPACITY_ENV
        ))),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(ManagerError::Configuration(format!(
            "{} is not a number: {}",
            QUEUE_CAPACITY_ENV, e
        ))),
    }
}

/// Read global extra variables from a JSON object file
pub async fn load_globals(path: &Path) -> ManagerResult<ExtraVars> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        ManagerError::Configuration(format!("reading {}: {}", path.display(), e))
    })?;

    let value: Value = serde_json::from_str(&content).map_err(|e| {
        ManagerError::Configuration(format!("parsing {}: {}", path.display(), e))
    })?;

    match value {
        Value::Object(globals) => {
            debug!(path = %path.display(), keys = globals.len(), "loaded globals");
            Ok(globals)
        }
        _ => Err(ManagerError::Configuration(format!(
            "{} must contain a JSON object",
            path.display()
        ))),
    }
}
