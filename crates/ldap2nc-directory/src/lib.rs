//! LDAP directory reader.
//!
//! Extracts user entries with paged searches. Incremental runs substitute the
//! last sync timestamp into a filter template; epoch zero means full resync.

pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod reader;

pub use config::{LdapConfig, SearchScope};
pub use entry::{normalize_identifier, DirectoryEntry, DirectorySnapshot};
pub use error::{DirectoryError, DirectoryResult};
pub use filter::{full_resync, generalized_time, render_filter};
pub use reader::LdapDirectory;
