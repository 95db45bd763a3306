//! Log level selection and subscriber setup.

use std::fmt;
use tracing_subscriber::EnvFilter;

/// Filter directive raising the ldap2nc crates to debug.
const DEBUG_DIRECTIVE: &str =
    "info,ldap2nc=debug,ldap2nc_directory=debug,ldap2nc_nextcloud=debug,ldap2nc_sync=debug";

/// Verbosity selected on the command line.
///
/// Levels are ordered: Normal < Debug < Trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    #[default]
    Normal,
    /// ldap2nc crates at debug
    Debug,
    /// Everything at trace, including HTTP and LDAP internals
    Trace,
}

impl LogLevel {
    /// Trace takes precedence over debug.
    pub fn from_flags(debug: bool, trace: bool) -> Self {
        if trace {
            Self::Trace
        } else if debug {
            Self::Debug
        } else {
            Self::Normal
        }
    }

    pub fn directive(&self) -> &'static str {
        match self {
            Self::Normal => "info",
            Self::Debug => DEBUG_DIRECTIVE,
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Trace => write!(f, "TRACE"),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the flags.
pub fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.directive()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(level >= LogLevel::Debug)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!(%level, "Logging initialized");
}
