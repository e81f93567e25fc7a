// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration.
//!
//! All settings have defaults from [`crate::constants`] and can be overridden with
//! environment variables. Role type to ClusterRole mappings can additionally be loaded
//! from a YAML file:
//!
//! ```yaml
//! admin: cf-k8s-controllers-admin
//! space_developer: cf-k8s-controllers-space-developer
//! ```

use crate::constants::{
    ADMIN_ROLE_TYPE, CLUSTER_ROLE_PREFIX, DEFAULT_BACKOFF_INITIAL_MILLIS, DEFAULT_BACKOFF_MAX_SECS,
    DEFAULT_DELETION_POLL_INTERVAL_MILLIS, DEFAULT_DELETION_TIMEOUT_SECS,
    DEFAULT_METRICS_BIND_ADDRESS, DEFAULT_RECONCILE_TIMEOUT_SECS, DEFAULT_ROLE_TYPES,
    DEFAULT_ROOT_NAMESPACE, DEFAULT_WORKERS_PER_CONTROLLER, WATCH_RESTART_DELAY_MILLIS,
};
use crate::engine::EngineConfig;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read role mappings from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse role mappings from {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("role mappings must include the '{0}' role type")]
    MissingAdminRole(String),
}

/// Configuration shared by every controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace holding Organizations and Roles; parent of every Organization namespace
    pub root_namespace: String,
    /// Worker pool size for each controller
    pub workers_per_controller: usize,
    /// Deadline for a single reconcile call
    pub reconcile_timeout: Duration,
    /// First backoff delay after a failed reconcile
    pub backoff_initial: Duration,
    /// Backoff ceiling
    pub backoff_max: Duration,
    /// Interval between deletion confirmation polls
    pub deletion_poll_interval: Duration,
    /// How long to wait for a deleted namespace to disappear before retrying later
    pub deletion_timeout: Duration,
    /// Address the metrics and health server listens on
    pub metrics_bind_address: String,
    /// Role type -> ClusterRole name
    pub role_mappings: BTreeMap<String, String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            root_namespace: DEFAULT_ROOT_NAMESPACE.to_string(),
            workers_per_controller: DEFAULT_WORKERS_PER_CONTROLLER,
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            backoff_initial: Duration::from_millis(DEFAULT_BACKOFF_INITIAL_MILLIS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            deletion_poll_interval: Duration::from_millis(DEFAULT_DELETION_POLL_INTERVAL_MILLIS),
            deletion_timeout: Duration::from_secs(DEFAULT_DELETION_TIMEOUT_SECS),
            metrics_bind_address: DEFAULT_METRICS_BIND_ADDRESS.to_string(),
            role_mappings: default_role_mappings(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// When `ROLE_MAPPINGS_PATH` is set, role mappings are read from that YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the role mappings file cannot be read or parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            root_namespace: env_var_or_default("ROOT_NAMESPACE", DEFAULT_ROOT_NAMESPACE.to_string()),
            workers_per_controller: env_var_or_default(
                "WORKERS_PER_CONTROLLER",
                DEFAULT_WORKERS_PER_CONTROLLER,
            )
            .max(1),
            reconcile_timeout: Duration::from_secs(env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            )),
            backoff_initial: Duration::from_millis(env_var_or_default(
                "BACKOFF_INITIAL_MILLIS",
                DEFAULT_BACKOFF_INITIAL_MILLIS,
            )),
            backoff_max: Duration::from_secs(env_var_or_default(
                "BACKOFF_MAX_SECS",
                DEFAULT_BACKOFF_MAX_SECS,
            )),
            deletion_poll_interval: Duration::from_millis(env_var_or_default(
                "DELETION_POLL_INTERVAL_MILLIS",
                DEFAULT_DELETION_POLL_INTERVAL_MILLIS,
            )),
            deletion_timeout: Duration::from_secs(env_var_or_default(
                "DELETION_TIMEOUT_SECS",
                DEFAULT_DELETION_TIMEOUT_SECS,
            )),
            metrics_bind_address: env_var_or_default(
                "METRICS_BIND_ADDRESS",
                DEFAULT_METRICS_BIND_ADDRESS.to_string(),
            ),
            role_mappings: default_role_mappings(),
        };

        if let Ok(path) = std::env::var("ROLE_MAPPINGS_PATH") {
            config.role_mappings = load_role_mappings(Path::new(&path))?;
        }

        Ok(config)
    }

    /// Engine settings derived from this configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers_per_controller: self.workers_per_controller,
            reconcile_timeout: self.reconcile_timeout,
            backoff_initial: self.backoff_initial,
            backoff_max: self.backoff_max,
            watch_restart_delay: Duration::from_millis(WATCH_RESTART_DELAY_MILLIS),
        }
    }

    /// ClusterRole granted for a role type, if the type is known.
    #[must_use]
    pub fn cluster_role_for(&self, role_type: &str) -> Option<&str> {
        self.role_mappings.get(role_type).map(String::as_str)
    }

    /// ClusterRole whose binding marks an Organization or Space as ready.
    #[must_use]
    pub fn admin_cluster_role(&self) -> String {
        self.cluster_role_for(ADMIN_ROLE_TYPE)
            .map_or_else(|| default_cluster_role_name(ADMIN_ROLE_TYPE), str::to_string)
    }
}

/// Default ClusterRole name for a role type: `cf-k8s-controllers-space-developer`.
#[must_use]
pub fn default_cluster_role_name(role_type: &str) -> String {
    format!("{CLUSTER_ROLE_PREFIX}-{}", role_type.replace('_', "-"))
}

/// Mappings for every built-in role type.
#[must_use]
pub fn default_role_mappings() -> BTreeMap<String, String> {
    DEFAULT_ROLE_TYPES
        .iter()
        .map(|role_type| ((*role_type).to_string(), default_cluster_role_name(role_type)))
        .collect()
}

/// Load role mappings from a YAML map of role type to ClusterRole name.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a string map, or lacks the
/// `admin` role type.
pub fn load_role_mappings(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    parse_role_mappings(&raw).map_err(|e| match e {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: display,
            source,
        },
        other => other,
    })
}

/// Parse role mappings from YAML text.
///
/// # Errors
///
/// Returns an error if the text is not a string map or lacks the `admin` role type.
pub fn parse_role_mappings(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mappings: BTreeMap<String, String> =
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
    if !mappings.contains_key(ADMIN_ROLE_TYPE) {
        return Err(ConfigError::MissingAdminRole(ADMIN_ROLE_TYPE.to_string()));
    }
    Ok(mappings)
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
