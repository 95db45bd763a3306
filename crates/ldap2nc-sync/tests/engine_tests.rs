//! Sync engine tests
//!
//! Runs the engine against in-memory fakes covering:
//! - Delete/Ignore decisions and the protected-user allowlist
//! - Group provisioning order and catalog enforcement
//! - Membership reconciliation limited to catalog groups
//! - Dry-run, watermark handling and Create/Update fallbacks

mod common;

use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use ldap2nc_directory::full_resync;
use ldap2nc_nextcloud::UserField;
use ldap2nc_sync::{DecisionKind, MemoryWatermarkStore, SyncOptions, SyncSettings};

fn protected(users: &[&str]) -> SyncSettings {
    SyncSettings {
        protected_users: users.iter().map(|u| u.to_string()).collect(),
        ..settings()
    }
}

fn deleted(calls: &[Call]) -> HashSet<String> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::DeleteUser(id) => Some(id.clone()),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Delete phase
// =============================================================================

#[tokio::test]
async fn test_protected_user_is_ignored_not_deleted() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &[]), entry("bob", &[])]),
        FakePlatform::new().with_user("alice", &[]).with_user("carol", &[]),
        protected(&["carol"]),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    assert!(deleted(&h.platform.calls()).is_empty());
    assert_eq!(report.statistics.users_ignored, 1);
    assert_eq!(report.statistics.users_deleted, 0);
    assert_eq!(report.statistics.users_created, 1);
    assert_eq!(report.statistics.users_unchanged, 1);
    assert!(h.platform.user("carol").is_some());
}

#[tokio::test]
async fn test_delete_set_is_platform_minus_directory_minus_protected() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &[]), entry("dave", &[])]),
        FakePlatform::new()
            .with_user("alice", &[])
            .with_user("bob", &[])
            .with_user("carol", &[])
            .with_user("erin", &[]),
        protected(&["erin", "dave"]),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    let expected: HashSet<String> = ["bob", "carol"].iter().map(|s| s.to_string()).collect();
    assert_eq!(deleted(&h.platform.calls()), expected);
    assert_eq!(report.statistics.users_ignored, 1);
}

#[tokio::test]
async fn test_deletes_precede_creates() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("dave", &[])]),
        FakePlatform::new().with_user("bob", &[]),
        settings(),
    );

    h.engine.run(SyncOptions::default()).await.unwrap();

    let calls = h.platform.calls();
    let delete = position(&calls, &Call::DeleteUser("bob".into())).unwrap();
    let create = calls
        .iter()
        .position(|c| matches!(c, Call::CreateUser { id, .. } if id == "dave"))
        .unwrap();
    assert!(delete < create);
}

// =============================================================================
// Groups
// =============================================================================

#[tokio::test]
async fn test_missing_group_created_before_user() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("dave", &["staff"])]),
        FakePlatform::new(),
        settings(),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    let calls = h.platform.calls();
    let create_group = Call::CreateGroup {
        id: "staff".into(),
        displayname: "Staff".into(),
    };
    assert_eq!(count(&calls, |c| *c == create_group), 1);
    let create_user = Call::CreateUser {
        id: "dave".into(),
        groups: vec!["staff".into()],
    };
    assert!(position(&calls, &create_group).unwrap() < position(&calls, &create_user).unwrap());
    assert_eq!(report.statistics.groups_created, 1);
}

#[tokio::test]
async fn test_unknown_group_aborts_without_membership_calls() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("dave", &["staff", "ghosts"])]),
        FakePlatform::new(),
        settings(),
    );

    let err = h.engine.run(SyncOptions::default()).await.unwrap_err();

    assert!(err.is_configuration());
    assert!(err.to_string().contains("ghosts"));
    let calls = h.platform.calls();
    assert_eq!(
        count(&calls, |c| matches!(
            c,
            Call::AddToGroup { .. } | Call::CreateGroup { .. } | Call::CreateUser { .. }
        )),
        0
    );
    assert_eq!(h.watermark().await, None);
}

#[tokio::test]
async fn test_group_created_once_under_concurrency() {
    let entries = (0..12)
        .map(|i| entry(&format!("user{i}"), &["staff"]))
        .collect();
    let h = Harness::new(
        FakeDirectory::new(entries),
        FakePlatform::new(),
        SyncSettings {
            concurrency: 4,
            ..settings()
        },
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    let calls = h.platform.calls();
    assert_eq!(count(&calls, |c| matches!(c, Call::CreateGroup { .. })), 1);
    assert_eq!(count(&calls, |c| matches!(c, Call::CreateUser { .. })), 12);
    assert_eq!(report.statistics.entries_processed, 12);
}

#[tokio::test]
async fn test_known_group_with_stale_name_renamed_once() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &["staff"]), entry("bob", &["staff"])]),
        FakePlatform::new().with_group("staff", "Old Staff"),
        settings(),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    let calls = h.platform.calls();
    assert_eq!(
        count(&calls, |c| *c
            == Call::RenameGroup {
                id: "staff".into(),
                displayname: "Staff".into()
            }),
        1
    );
    assert_eq!(count(&calls, |c| matches!(c, Call::CreateGroup { .. })), 0);
    assert_eq!(report.statistics.groups_renamed, 1);
}

// =============================================================================
// Update phase
// =============================================================================

#[tokio::test]
async fn test_groups_outside_catalog_are_never_removed() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &["staff", "admins"])]),
        FakePlatform::new()
            .with_group("staff", "Staff")
            .with_group("vpn", "VPN")
            .with_user("alice", &["staff", "vpn"]),
        settings(),
    );

    h.engine.run(SyncOptions::default()).await.unwrap();

    let calls = h.platform.calls();
    assert_eq!(count(&calls, |c| matches!(c, Call::RemoveFromGroup { .. })), 0);
    assert_eq!(
        count(&calls, |c| *c
            == Call::AddToGroup {
                user: "alice".into(),
                group: "admins".into()
            }),
        1
    );
    let alice = h.platform.user("alice").unwrap();
    assert!(alice.groups.contains(&"vpn".to_string()));
}

#[tokio::test]
async fn test_catalog_group_removed_unless_protected() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &["staff"]), entry("bob", &["staff"])]),
        FakePlatform::new()
            .with_group("staff", "Staff")
            .with_group("admins", "Administrators")
            .with_group("students", "Students")
            .with_user("alice", &["staff", "admins"])
            .with_user("bob", &["staff", "students"]),
        SyncSettings {
            protected_groups: vec!["admins".into()],
            ..settings()
        },
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    let removals: Vec<Call> = h
        .platform
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::RemoveFromGroup { .. }))
        .collect();
    assert_eq!(
        removals,
        vec![Call::RemoveFromGroup {
            user: "bob".into(),
            group: "students".into()
        }]
    );
    assert_eq!(report.statistics.memberships_removed, 1);
}

#[tokio::test]
async fn test_entry_without_groups_leaves_memberships() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &[])]),
        FakePlatform::new()
            .with_group("staff", "Staff")
            .with_user("alice", &["staff"]),
        settings(),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    assert!(h.platform.calls().is_empty());
    assert_eq!(report.statistics.users_unchanged, 1);
}

#[tokio::test]
async fn test_only_changed_fields_are_updated() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &[])]),
        FakePlatform::new().with_user("alice", &[]),
        settings(),
    );
    // Platform display name already matches the transformer output.
    h.engine.run(SyncOptions::default()).await.unwrap();
    assert_eq!(
        count(&h.platform.calls(), |c| matches!(c, Call::UpdateField { .. })),
        0
    );
}

#[tokio::test]
async fn test_changed_display_name_is_updated() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &[])]),
        FakePlatform::new().with_user("ALICE", &[]),
        settings(),
    );

    h.engine.run(SyncOptions::default()).await.unwrap();

    assert_eq!(
        h.platform.calls(),
        vec![Call::UpdateField {
            id: "ALICE".into(),
            field: UserField::DisplayName,
            value: "alice cn".into()
        }]
    );
}

#[tokio::test]
async fn test_protected_user_is_still_updated() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &[])]),
        FakePlatform::new().with_user("ALICE", &[]),
        protected(&["alice"]),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    assert_eq!(
        h.platform.calls(),
        vec![Call::UpdateField {
            id: "ALICE".into(),
            field: UserField::DisplayName,
            value: "alice cn".into()
        }]
    );
    assert_eq!(report.statistics.users_ignored, 0);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &["staff"]), entry("dave", &["admins"])]),
        FakePlatform::new().with_user("alice", &[]).with_user("bob", &[]),
        settings(),
    );

    h.engine
        .run(SyncOptions {
            full_sync: true,
            dry_run: false,
        })
        .await
        .unwrap();
    assert!(!h.platform.calls().is_empty());
    h.platform.clear_calls();

    let report = h
        .engine
        .run(SyncOptions {
            full_sync: true,
            dry_run: false,
        })
        .await
        .unwrap();
    assert!(h.platform.calls().is_empty());
    assert!(!report.statistics.has_changes());
    assert_eq!(report.statistics.users_unchanged, 2);
}

#[tokio::test]
async fn test_plan_is_stable_and_read_only() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &[]), entry("dave", &[])]),
        FakePlatform::new()
            .with_user("alice", &[])
            .with_user("bob", &[])
            .with_user("carol", &[]),
        protected(&["carol"]),
    );

    let first = h.engine.plan(SyncOptions::default()).await.unwrap();
    let second = h.engine.plan(SyncOptions::default()).await.unwrap();

    assert_eq!(first.decisions, second.decisions);
    assert_eq!(first.ids(DecisionKind::Delete), vec!["bob"]);
    assert_eq!(first.ids(DecisionKind::Ignore), vec!["carol"]);
    assert_eq!(first.ids(DecisionKind::Update), vec!["alice"]);
    assert_eq!(first.ids(DecisionKind::Create), vec!["dave"]);
    assert!(h.platform.calls().is_empty());
}

// =============================================================================
// Fallbacks
// =============================================================================

#[tokio::test]
async fn test_create_of_existing_user_degrades_to_update() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("erin", &["staff"])]),
        FakePlatform::new().with_hidden_user("erin"),
        settings(),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    let calls = h.platform.calls();
    assert_eq!(count(&calls, |c| matches!(c, Call::CreateUser { .. })), 0);
    assert!(position(
        &calls,
        &Call::AddToGroup {
            user: "erin".into(),
            group: "staff".into()
        }
    )
    .is_some());
    assert_eq!(report.statistics.users_updated, 1);
    assert_eq!(report.statistics.users_created, 0);
}

#[tokio::test]
async fn test_update_of_vanished_user_degrades_to_create() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("frank", &[])]),
        FakePlatform::new().with_ghost_user("frank"),
        settings(),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    assert!(position(
        &h.platform.calls(),
        &Call::CreateUser {
            id: "frank".into(),
            groups: vec![]
        }
    )
    .is_some());
    assert_eq!(report.statistics.users_created, 1);
}

// =============================================================================
// Dry run and watermark
// =============================================================================

#[tokio::test]
async fn test_dry_run_issues_no_mutations() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &["admins"]), entry("dave", &["staff"])]),
        FakePlatform::new()
            .with_user("alice", &["students"])
            .with_user("bob", &[]),
        settings(),
    );

    let report = h
        .engine
        .run(SyncOptions {
            full_sync: false,
            dry_run: true,
        })
        .await
        .unwrap();

    assert!(h.platform.calls().is_empty());
    assert!(h.platform.group_ids().is_empty());
    assert!(h.platform.user("bob").is_some());
    assert_eq!(h.watermark().await, None);
    assert!(report.dry_run);
    assert_eq!(report.watermark_committed, None);
    assert_eq!(report.statistics.users_deleted, 1);
    assert_eq!(report.statistics.groups_created, 2);
}

#[tokio::test]
async fn test_watermark_committed_after_success() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &[])]),
        FakePlatform::new(),
        settings(),
    );

    let before = Utc::now();
    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    assert_eq!(report.watermark_used, full_resync());
    let committed = h.watermark().await.unwrap();
    assert_eq!(Some(committed), report.watermark_committed);
    assert_eq!(committed, report.started_at);
    assert!(committed >= before);
}

#[tokio::test]
async fn test_incremental_run_uses_stored_watermark() {
    let stored = Utc::now() + Duration::hours(1);
    let h = Harness::with_watermarks(
        FakeDirectory::new(vec![entry("alice", &[])]),
        FakePlatform::new(),
        settings(),
        MemoryWatermarkStore::with_value("nextcloud-users", stored),
    );

    let report = h.engine.run(SyncOptions::default()).await.unwrap();

    assert_eq!(h.directory.last_since(), Some(stored));
    assert_eq!(report.statistics.entries_total, 0);
    // An older run start never moves the watermark backwards.
    assert_eq!(h.watermark().await, Some(stored));
}

#[tokio::test]
async fn test_full_sync_ignores_watermark() {
    let stored = Utc::now() + Duration::hours(1);
    let h = Harness::with_watermarks(
        FakeDirectory::new(vec![entry("alice", &[])]),
        FakePlatform::new(),
        settings(),
        MemoryWatermarkStore::with_value("nextcloud-users", stored),
    );

    let report = h
        .engine
        .run(SyncOptions {
            full_sync: true,
            dry_run: false,
        })
        .await
        .unwrap();

    assert_eq!(h.directory.last_since(), Some(full_resync()));
    assert_eq!(report.statistics.users_created, 1);
}

#[tokio::test]
async fn test_failure_keeps_watermark_and_flushes_alerts() {
    let sink = Arc::new(RecordingSink::default());
    let mut h = Harness::new(
        FakeDirectory::new(vec![entry("dave", &[])]),
        FakePlatform::new().failing_on("createUser"),
        settings(),
    );
    h.engine = h.engine.with_alert_sink(sink.clone());

    let err = h.engine.run(SyncOptions::default()).await.unwrap_err();

    assert!(err.to_string().contains("createUser"));
    assert_eq!(h.watermark().await, None);
    assert!(sink.flushed.load(Ordering::SeqCst));
}

// =============================================================================
// Administrative commands
// =============================================================================

#[tokio::test]
async fn test_delete_configured_groups_skips_protected_and_foreign() {
    let h = Harness::new(
        FakeDirectory::new(vec![]),
        FakePlatform::new()
            .with_group("staff", "Staff")
            .with_group("admins", "Administrators")
            .with_group("vpn", "VPN"),
        SyncSettings {
            protected_groups: vec!["admins".into()],
            ..settings()
        },
    );

    let deleted = h.engine.delete_configured_groups(false).await.unwrap();

    assert_eq!(deleted, 1);
    assert_eq!(h.platform.calls(), vec![Call::DeleteGroup("staff".into())]);
    assert_eq!(h.platform.group_ids(), vec!["admins", "vpn"]);
}

#[tokio::test]
async fn test_delete_configured_groups_dry_run() {
    let h = Harness::new(
        FakeDirectory::new(vec![]),
        FakePlatform::new().with_group("staff", "Staff"),
        settings(),
    );

    assert_eq!(h.engine.delete_configured_groups(true).await.unwrap(), 1);
    assert!(h.platform.calls().is_empty());
}

#[tokio::test]
async fn test_preview_transform_reads_all_entries() {
    let h = Harness::new(
        FakeDirectory::new(vec![entry("alice", &["staff"]), entry("bob", &[])]),
        FakePlatform::new(),
        settings(),
    );

    let drafts = h.engine.preview_transform().await.unwrap();

    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[0].id, "alice");
    assert_eq!(drafts[0].groups, vec!["staff"]);
    assert_eq!(drafts[1].display_name.as_deref(), Some("bob cn"));
    assert_eq!(h.directory.last_since(), Some(full_resync()));
    assert!(h.platform.calls().is_empty());
}
