//! Run statistics tracking.
//!
//! Counters are updated from concurrent entry workers and snapshotted into a
//! serializable [`RunStatistics`] at the end of a run.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Counters for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Entries extracted from the directory.
    #[serde(default)]
    pub entries_total: u32,
    /// Entries fully applied.
    #[serde(default)]
    pub entries_processed: u32,
    #[serde(default)]
    pub users_created: u32,
    #[serde(default)]
    pub users_updated: u32,
    /// Updates that needed no call.
    #[serde(default)]
    pub users_unchanged: u32,
    #[serde(default)]
    pub users_deleted: u32,
    /// Platform users kept only because they are protected.
    #[serde(default)]
    pub users_ignored: u32,
    #[serde(default)]
    pub groups_created: u32,
    #[serde(default)]
    pub groups_renamed: u32,
    #[serde(default)]
    pub groups_deleted: u32,
    #[serde(default)]
    pub memberships_added: u32,
    #[serde(default)]
    pub memberships_removed: u32,
    #[serde(default)]
    pub fields_updated: u32,
    /// Total duration in seconds.
    #[serde(default)]
    pub duration_seconds: u64,
}

impl RunStatistics {
    /// Whether the run changed anything on the platform.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.users_created
            + self.users_updated
            + self.users_deleted
            + self.groups_created
            + self.groups_renamed
            + self.groups_deleted
            + self.memberships_added
            + self.memberships_removed
            + self.fields_updated
            > 0
    }
}

impl std::fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "users created={} updated={} unchanged={} deleted={} ignored={}, groups created={} renamed={} \
             deleted={}, memberships added={} removed={}, fields updated={}",
            self.users_created,
            self.users_updated,
            self.users_unchanged,
            self.users_deleted,
            self.users_ignored,
            self.groups_created,
            self.groups_renamed,
            self.groups_deleted,
            self.memberships_added,
            self.memberships_removed,
            self.fields_updated,
        )
    }
}

/// Thread-safe tracker for accumulating statistics during a run.
#[derive(Debug)]
pub struct StatisticsTracker {
    entries_total: AtomicU32,
    entries_processed: AtomicU32,
    users_created: AtomicU32,
    users_updated: AtomicU32,
    users_unchanged: AtomicU32,
    users_deleted: AtomicU32,
    users_ignored: AtomicU32,
    groups_created: AtomicU32,
    groups_renamed: AtomicU32,
    groups_deleted: AtomicU32,
    memberships_added: AtomicU32,
    memberships_removed: AtomicU32,
    fields_updated: AtomicU32,
    start_time: Instant,
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries_total: AtomicU32::new(0),
            entries_processed: AtomicU32::new(0),
            users_created: AtomicU32::new(0),
            users_updated: AtomicU32::new(0),
            users_unchanged: AtomicU32::new(0),
            users_deleted: AtomicU32::new(0),
            users_ignored: AtomicU32::new(0),
            groups_created: AtomicU32::new(0),
            groups_renamed: AtomicU32::new(0),
            groups_deleted: AtomicU32::new(0),
            memberships_added: AtomicU32::new(0),
            memberships_removed: AtomicU32::new(0),
            fields_updated: AtomicU32::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn set_total(&self, total: u32) {
        self.entries_total.store(total, Ordering::SeqCst);
    }

    pub fn increment_processed(&self) {
        self.entries_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_user_created(&self) {
        self.users_created.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_user_updated(&self) {
        self.users_updated.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_user_unchanged(&self) {
        self.users_unchanged.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_user_deleted(&self) {
        self.users_deleted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_user_ignored(&self) {
        self.users_ignored.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_group_created(&self) {
        self.groups_created.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_group_renamed(&self) {
        self.groups_renamed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_group_deleted(&self) {
        self.groups_deleted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_membership_added(&self) {
        self.memberships_added.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_membership_removed(&self) {
        self.memberships_removed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_fields_updated(&self, count: u32) {
        self.fields_updated.fetch_add(count, Ordering::SeqCst);
    }

    pub fn processed_count(&self) -> u32 {
        self.entries_processed.load(Ordering::SeqCst)
    }

    /// Get elapsed duration in seconds.
    pub fn elapsed_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Snapshot current statistics.
    pub fn snapshot(&self) -> RunStatistics {
        RunStatistics {
            entries_total: self.entries_total.load(Ordering::SeqCst),
            entries_processed: self.entries_processed.load(Ordering::SeqCst),
            users_created: self.users_created.load(Ordering::SeqCst),
            users_updated: self.users_updated.load(Ordering::SeqCst),
            users_unchanged: self.users_unchanged.load(Ordering::SeqCst),
            users_deleted: self.users_deleted.load(Ordering::SeqCst),
            users_ignored: self.users_ignored.load(Ordering::SeqCst),
            groups_created: self.groups_created.load(Ordering::SeqCst),
            groups_renamed: self.groups_renamed.load(Ordering::SeqCst),
            groups_deleted: self.groups_deleted.load(Ordering::SeqCst),
            memberships_added: self.memberships_added.load(Ordering::SeqCst),
            memberships_removed: self.memberships_removed.load(Ordering::SeqCst),
            fields_updated: self.fields_updated.load(Ordering::SeqCst),
            duration_seconds: self.elapsed_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_snapshot() {
        let tracker = StatisticsTracker::new();
        tracker.set_total(3);
        tracker.record_user_created();
        tracker.record_user_updated();
        tracker.record_fields_updated(2);
        tracker.increment_processed();

        let stats = tracker.snapshot();
        assert_eq!(stats.entries_total, 3);
        assert_eq!(stats.entries_processed, 1);
        assert_eq!(stats.users_created, 1);
        assert_eq!(stats.fields_updated, 2);
        assert!(stats.has_changes());
    }

    #[test]
    fn test_ignored_alone_is_no_change() {
        let tracker = StatisticsTracker::new();
        tracker.record_user_ignored();
        assert!(!tracker.snapshot().has_changes());
    }

    #[tokio::test]
    async fn test_concurrent_updates() {
        let tracker = Arc::new(StatisticsTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = tracker.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        t.record_membership_added();
                    }
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(tracker.snapshot().memberships_added, 800);
    }

    #[test]
    fn test_display_summary() {
        let stats = RunStatistics {
            users_deleted: 2,
            ..RunStatistics::default()
        };
        assert!(stats.to_string().contains("deleted=2"));
    }
}
