//! Configuration file loading.
//!
//! One YAML document with the sections `ldap`, `nextcloud`, `sync` and
//! `attributes_map`. Secrets can be supplied through the environment instead
//! of the file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use ldap2nc_directory::LdapConfig;
use ldap2nc_nextcloud::NextcloudConfig;
use ldap2nc_sync::{AttributeMapConfig, SyncSettings};

use crate::error::{CliError, CliResult};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "LDAP2NC_CONFIG";

/// Used when neither `--config` nor `LDAP2NC_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/ldap2nc.yaml";

const LDAP_BIND_PASSWORD_ENV: &str = "LDAP2NC_LDAP_BIND_PASSWORD";
const NEXTCLOUD_PASSWORD_ENV: &str = "LDAP2NC_NEXTCLOUD_PASSWORD";

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub ldap: LdapConfig,
    pub nextcloud: NextcloudConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub attributes_map: AttributeMapConfig,
}

impl AppConfig {
    /// Read, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> CliResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> CliResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| CliError::Config(format!("Failed to parse config: {e}")))
    }

    /// `--config`, then `LDAP2NC_CONFIG`, then the default path.
    pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(password) = lookup(LDAP_BIND_PASSWORD_ENV).filter(|p| !p.is_empty()) {
            self.ldap.bind_password = Some(password);
        }
        if let Some(password) = lookup(NEXTCLOUD_PASSWORD_ENV).filter(|p| !p.is_empty()) {
            self.nextcloud.ocs_password = password;
        }
    }

    pub fn validate(&self) -> CliResult<()> {
        self.ldap
            .validate()
            .map_err(|e| CliError::Config(format!("ldap: {e}")))?;
        self.nextcloud
            .validate()
            .map_err(|e| CliError::Config(format!("nextcloud: {e}")))?;
        self.sync.validate()?;
        if self.nextcloud.ocs_password.is_empty() {
            return Err(CliError::Config(format!(
                "nextcloud.ocs_password is empty; set it in the file or in {NEXTCLOUD_PASSWORD_ENV}"
            )));
        }
        Ok(())
    }
}
