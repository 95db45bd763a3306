//! Run settings for the sync engine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use ldap2nc_directory::normalize_identifier;

use crate::error::{SyncError, SyncResult};

/// `sync` section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Watermark profile name.
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Platform users that are never deleted.
    #[serde(default)]
    pub protected_users: Vec<String>,

    /// Groups that are never deleted and never removed from a user.
    #[serde(default)]
    pub protected_groups: Vec<String>,

    /// Rhai script with `create` and `update` functions.
    #[serde(default = "default_transformer_script")]
    pub transformer_script: PathBuf,

    /// Directory holding one watermark file per profile.
    #[serde(default = "default_watermark_dir")]
    pub watermark_dir: PathBuf,

    /// How long a fatal error waits for alert sinks to flush.
    #[serde(default = "default_abort_grace_secs")]
    pub abort_grace_secs: u64,

    /// Entries processed in parallel during the update/create phase.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_profile() -> String {
    "nextcloud-users".to_string()
}

fn default_transformer_script() -> PathBuf {
    PathBuf::from("config/transform.rhai")
}

fn default_watermark_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_abort_grace_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    1
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            protected_users: Vec::new(),
            protected_groups: Vec::new(),
            transformer_script: default_transformer_script(),
            watermark_dir: default_watermark_dir(),
            abort_grace_secs: default_abort_grace_secs(),
            concurrency: default_concurrency(),
        }
    }
}

impl SyncSettings {
    /// Normalized protected user identifiers.
    #[must_use]
    pub fn protected_user_set(&self) -> HashSet<String> {
        self.protected_users
            .iter()
            .map(|u| normalize_identifier(u))
            .collect()
    }

    /// Normalized protected group identifiers.
    #[must_use]
    pub fn protected_group_set(&self) -> HashSet<String> {
        self.protected_groups
            .iter()
            .map(|g| normalize_identifier(g))
            .collect()
    }

    #[must_use]
    pub fn abort_grace(&self) -> Duration {
        Duration::from_secs(self.abort_grace_secs)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.profile.trim().is_empty() {
            return Err(SyncError::configuration("sync.profile is required"));
        }
        if self.concurrency == 0 {
            return Err(SyncError::configuration(
                "sync.concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}
