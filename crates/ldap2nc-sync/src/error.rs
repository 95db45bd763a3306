//! Sync error types.

use ldap2nc_directory::DirectoryError;
use ldap2nc_nextcloud::NextcloudError;
use thiserror::Error;

use crate::transform::TransformError;

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Directory or platform unreachable.
    #[error("Connectivity error: {message}")]
    Connectivity { message: String },

    /// Non-success answer to a platform call, including exhausted rate-limit
    /// retries.
    #[error("API error: {message}")]
    Api { message: String },

    /// Mapper, transformer and settings disagree (e.g. unknown group id).
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The entry transformer failed.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Watermark could not be read or written.
    #[error("Watermark error: {message}")]
    Watermark { message: String },

    /// The directory answered with an error.
    #[error("Directory error: {message}")]
    Directory { message: String },
}

impl SyncError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn watermark(message: impl Into<String>) -> Self {
        Self::Watermark {
            message: message.into(),
        }
    }

    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            message: message.into(),
        }
    }

    /// Every sync error aborts the run; rate limiting is absorbed by the
    /// client and never reaches this type.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        true
    }

    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::Connectivity { .. })
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, SyncError::Configuration { .. })
    }
}

impl From<NextcloudError> for SyncError {
    fn from(e: NextcloudError) -> Self {
        match e {
            NextcloudError::Unreachable(_) => SyncError::connectivity(e.to_string()),
            NextcloudError::InvalidConfig(_) => SyncError::configuration(e.to_string()),
            other => SyncError::api(other.to_string()),
        }
    }
}

impl From<DirectoryError> for SyncError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::InvalidConfig(_) => SyncError::configuration(e.to_string()),
            DirectoryError::Search(_) => SyncError::directory(e.to_string()),
            DirectoryError::Connection { .. }
            | DirectoryError::Bind { .. }
            | DirectoryError::SearchStart(_) => SyncError::connectivity(e.to_string()),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
