//! Sync watermark persistence.
//!
//! One timestamp per sync profile, never moved backwards. A missing watermark
//! reads as `None`; the engine then extracts from epoch zero.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Last committed timestamp of a profile.
    async fn load(&self, profile: &str) -> SyncResult<Option<DateTime<Utc>>>;

    /// Store `timestamp` unless an equal or later one is already stored.
    /// Returns the value now in effect.
    async fn commit(&self, profile: &str, timestamp: DateTime<Utc>) -> SyncResult<DateTime<Utc>>;
}

/// On-disk format of a watermark file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatermarkRecord {
    profile: String,
    last_sync: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// `<dir>/<profile>.json`, replaced atomically through a temporary file.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    dir: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of a profile's file. Anything but `[A-Za-z0-9._-]` becomes `_`.
    #[must_use]
    pub fn file_path(&self, profile: &str) -> PathBuf {
        let name: String = profile
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name.trim_start_matches('.')))
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self, profile: &str) -> SyncResult<Option<DateTime<Utc>>> {
        let path = self.file_path(profile);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(profile, path = %path.display(), "No watermark yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(SyncError::watermark(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        let record: WatermarkRecord = serde_json::from_str(&contents).map_err(|e| {
            SyncError::watermark(format!("Watermark file {} is corrupted: {e}", path.display()))
        })?;
        Ok(Some(record.last_sync))
    }

    async fn commit(&self, profile: &str, timestamp: DateTime<Utc>) -> SyncResult<DateTime<Utc>> {
        let effective = match self.load(profile).await? {
            Some(existing) if existing >= timestamp => return Ok(existing),
            _ => timestamp,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SyncError::watermark(format!("Failed to create {}: {e}", self.dir.display()))
        })?;

        let path = self.file_path(profile);
        let tmp = path.with_extension("json.tmp");
        let record = WatermarkRecord {
            profile: profile.to_string(),
            last_sync: effective,
            updated_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&record)
            .map_err(|e| SyncError::watermark(e.to_string()))?;

        tokio::fs::write(&tmp, contents).await.map_err(|e| {
            SyncError::watermark(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            SyncError::watermark(format!("Failed to replace {}: {e}", path.display()))
        })?;

        info!(profile, watermark = %effective, "Watermark committed");
        Ok(effective)
    }
}

/// In-process store for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    values: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryWatermarkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one profile.
    #[must_use]
    pub fn with_value(profile: &str, timestamp: DateTime<Utc>) -> Self {
        let mut values = HashMap::new();
        values.insert(profile.to_string(), timestamp);
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self, profile: &str) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self.values.lock().await.get(profile).copied())
    }

    async fn commit(&self, profile: &str, timestamp: DateTime<Utc>) -> SyncResult<DateTime<Utc>> {
        let mut values = self.values.lock().await;
        let entry = values.entry(profile.to_string()).or_insert(timestamp);
        if timestamp > *entry {
            *entry = timestamp;
        }
        Ok(*entry)
    }
}
