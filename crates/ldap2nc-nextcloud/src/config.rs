//! Connection settings for a Nextcloud instance.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NextcloudError, NextcloudResult};
use crate::retry::RetryPolicy;

/// Nextcloud OCS connection configuration.
///
/// The [`Debug`] impl redacts the OCS password.
#[derive(Clone, Serialize, Deserialize)]
pub struct NextcloudConfig {
    /// Instance root, e.g. `https://cloud.example.org`.
    pub base_url: String,

    /// Administrative account used for provisioning calls.
    pub ocs_user: String,

    /// Password or app token of `ocs_user`.
    #[serde(default)]
    pub ocs_password: String,

    /// Accept any TLS certificate. Only for test instances.
    #[serde(default)]
    pub trust_all_certificates: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Page size for user/group listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Rate-limit retry settings.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Serialized form of [`RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    500
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: s.max_attempts,
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
        }
    }
}

impl std::fmt::Debug for NextcloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextcloudConfig")
            .field("base_url", &self.base_url)
            .field("ocs_user", &self.ocs_user)
            .field("ocs_password", &"***REDACTED***")
            .field("trust_all_certificates", &self.trust_all_certificates)
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .field("retry", &self.retry)
            .finish()
    }
}

impl NextcloudConfig {
    /// Create a configuration with default timeouts and retry settings.
    pub fn new(
        base_url: impl Into<String>,
        ocs_user: impl Into<String>,
        ocs_password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            ocs_user: ocs_user.into(),
            ocs_password: ocs_password.into(),
            trust_all_certificates: false,
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            retry: RetrySettings::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> NextcloudResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(NextcloudError::InvalidConfig(
                "base_url is required".to_string(),
            ));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| NextcloudError::InvalidConfig(format!("base_url: {e}")))?;
        if self.ocs_user.trim().is_empty() {
            return Err(NextcloudError::InvalidConfig(
                "ocs_user is required".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(NextcloudError::InvalidConfig(
                "page_size must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(NextcloudError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
