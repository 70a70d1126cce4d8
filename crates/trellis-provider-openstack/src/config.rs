//! Provider configuration
//!
//! Read from a YAML file at startup. Carries the etcd backup schedule and
//! the cluster context the manager binds this webhook deployment to.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use trellis_common::{Error, Result};
use trellis_webhook::ClusterContext;

/// Backup schedule used when the configuration does not set one
pub const DEFAULT_BACKUP_SCHEDULE: &str = "0 */24 * * *";

/// Top-level provider configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Etcd backup settings
    #[serde(default)]
    pub etcd_backup: EtcdBackupConfig,
    /// Cluster context handed to the ensurer with each admission call
    pub cluster: ClusterContext,
}

/// Etcd backup settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdBackupConfig {
    /// Full snapshot cron schedule; `None` falls back to
    /// [`DEFAULT_BACKUP_SCHEDULE`]
    #[serde(default)]
    pub schedule: Option<String>,
}

impl EtcdBackupConfig {
    /// The effective schedule
    pub fn schedule(&self) -> &str {
        self.schedule.as_deref().unwrap_or(DEFAULT_BACKUP_SCHEDULE)
    }
}

impl ProviderConfig {
    /// Load the configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    /// Parse the configuration from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::config(format!("cannot parse provider config: {}", e)))
    }
}
