//! Nextcloud OCS provisioning API client.
//!
//! Users, groups and memberships are managed through the OCS v1 provisioning
//! endpoints; group renames use v2. Mutating calls retry on rate limiting with
//! exponential backoff, every other failure surfaces immediately.

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod ocs;
pub mod retry;

pub use client::NextcloudClient;
pub use config::{NextcloudConfig, RetrySettings};
pub use error::{NextcloudError, NextcloudResult};
pub use models::{NextcloudGroup, NextcloudUser, UserDraft, UserField};
pub use ocs::ApiVersion;
pub use retry::RetryPolicy;
