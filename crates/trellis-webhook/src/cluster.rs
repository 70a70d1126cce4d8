//! Shoot/seed context passed to ensurers
//!
//! Each admission call carries read-only metadata about the shoot whose
//! control plane is being mutated and about the seed hosting it. Ensurers
//! never look this up themselves; the webhook wiring provides it.

use semver::Version;
use serde::{Deserialize, Serialize};

use trellis_common::Error;

/// Read-only cluster metadata exposed to ensurers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterContext {
    /// The shoot (managed cluster) whose control plane is being mutated
    pub shoot: ShootInfo,
    /// The seed (management cluster) hosting the control plane
    #[serde(default)]
    pub seed: SeedInfo,
}

/// Shoot metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootInfo {
    /// Technical id of the shoot (e.g. "shoot--proj--name"); also the
    /// control-plane namespace on the seed
    pub technical_id: String,
    /// UID of the shoot object
    pub uid: String,
    /// Kubernetes version the shoot runs
    pub kubernetes_version: String,
}

/// Seed metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedInfo {
    /// Backup profile of the seed; absence means backups are disabled,
    /// which is a valid configuration, not an error
    #[serde(default)]
    pub backup: Option<SeedBackupProfile>,
}

/// Seed-level backup profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedBackupProfile {
    /// Object store provider, when pinned by the seed
    #[serde(default)]
    pub provider: Option<String>,
    /// Object store region, when pinned by the seed
    #[serde(default)]
    pub region: Option<String>,
}

impl ClusterContext {
    /// Whether the seed has a backup profile configured
    pub fn backup_enabled(&self) -> bool {
        self.seed.backup.is_some()
    }

    /// Object store prefix for this shoot's backups: `<technical-id>--<uid>`
    pub fn store_prefix(&self) -> String {
        format!("{}--{}", self.shoot.technical_id, self.shoot.uid)
    }

    /// Parse the shoot's Kubernetes version
    pub fn shoot_kubernetes_version(&self) -> Result<Version, Error> {
        Version::parse(&self.shoot.kubernetes_version)
            .map_err(|e| Error::version(&self.shoot.kubernetes_version, e.to_string()))
    }
}
