//! CLI error types and exit codes

use ldap2nc_directory::DirectoryError;
use ldap2nc_nextcloud::NextcloudError;
use ldap2nc_sync::{SyncError, TransformError};
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 3: Directory or Nextcloud unreachable
/// - 4: Configuration error
/// - 5: Remote API error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {0}\n\nTroubleshooting:\n  - Check the ldap.host and nextcloud.base_url settings\n  - Verify the bind DN and OCS credentials\n  - Try again in a few moments")]
    Connectivity(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Watermark error: {0}")]
    Watermark(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Connectivity(_) => 3,
            CliError::Config(_) => 4,
            CliError::Api(_) => 5,
            CliError::Transform(_)
            | CliError::Directory(_)
            | CliError::Watermark(_)
            | CliError::Io(_) => 1,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some("Run 'ldap2nc check-config' to validate the configuration."),
            CliError::Transform(_) => {
                Some("Run 'ldap2nc test-transform' to try the script without touching Nextcloud.")
            }
            CliError::Watermark(_) => {
                Some("Remove the watermark file and run 'ldap2nc sync --full-sync'.")
            }
            _ => None,
        }
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Connectivity { message } => CliError::Connectivity(message),
            SyncError::Api { message } => CliError::Api(message),
            SyncError::Configuration { message } => CliError::Config(message),
            SyncError::Transform(t) => t.into(),
            SyncError::Watermark { message } => CliError::Watermark(message),
            SyncError::Directory { message } => CliError::Directory(message),
        }
    }
}

impl From<TransformError> for CliError {
    fn from(e: TransformError) -> Self {
        match e {
            TransformError::Io { .. }
            | TransformError::Compile(_)
            | TransformError::MissingFunction(_) => CliError::Config(e.to_string()),
            TransformError::Script { .. } | TransformError::InvalidResult { .. } => {
                CliError::Transform(e.to_string())
            }
        }
    }
}

impl From<DirectoryError> for CliError {
    fn from(e: DirectoryError) -> Self {
        SyncError::from(e).into()
    }
}

impl From<NextcloudError> for CliError {
    fn from(e: NextcloudError) -> Self {
        SyncError::from(e).into()
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Connectivity("refused".into()).exit_code(), 3);
        assert_eq!(CliError::Config("missing ldap".into()).exit_code(), 4);
        assert_eq!(CliError::Api("createUser".into()).exit_code(), 5);
        assert_eq!(CliError::Watermark("corrupt".into()).exit_code(), 1);
    }

    #[test]
    fn test_sync_error_mapping() {
        let e: CliError = SyncError::configuration("unknown group 'x'").into();
        assert!(matches!(e, CliError::Config(_)));

        let e: CliError = NextcloudError::Unreachable("timeout".into()).into();
        assert_eq!(e.exit_code(), 3);

        let e: CliError = NextcloudError::RetriesExhausted {
            operation: "addToGroup".into(),
            attempts: 5,
        }
        .into();
        assert_eq!(e.exit_code(), 5);
    }

    #[test]
    fn test_transform_error_mapping() {
        let e: CliError = TransformError::Compile("unexpected '{'".into()).into();
        assert_eq!(e.exit_code(), 4);

        let e: CliError = SyncError::Transform(TransformError::Script {
            operation: ldap2nc_sync::TransformOperation::Create,
            user: "alice".into(),
            message: "no mail".into(),
        })
        .into();
        assert!(matches!(e, CliError::Transform(_)));
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn test_directory_bind_is_connectivity() {
        let e: CliError = DirectoryError::Bind {
            bind_dn: "cn=admin".into(),
            message: "invalid credentials".into(),
        }
        .into();
        assert_eq!(e.exit_code(), 3);
    }

    #[test]
    fn test_search_start_exit_code() {
        let e: CliError = DirectoryError::SearchStart("timeout".into()).into();
        assert_eq!(e.exit_code(), 3);

        let e: CliError = DirectoryError::Search("size limit exceeded".into()).into();
        assert_eq!(e.exit_code(), 1);
    }
}
