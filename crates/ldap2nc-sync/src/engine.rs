//! Run orchestration.
//!
//! A run walks `Init → GroupsLoaded → UsersLoaded → DeletePhase →
//! UpdateCreatePhase → WatermarkCommit → Done`; group provisioning happens
//! inside the update/create phase. Any error aborts the run before the
//! watermark is committed, so the next run replays the same window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::{stream, TryStreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use ldap2nc_directory::{full_resync, generalized_time, normalize_identifier, DirectoryEntry};
use ldap2nc_nextcloud::{NextcloudError, UserDraft};

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::mapper::AttributeMapper;
use crate::provisioner::GroupProvisioner;
use crate::reconciler::{
    diff_fields, diff_memberships, fields_after_create, plan_deletions, plan_upserts, Decision,
    DecisionKind,
};
use crate::statistics::{RunStatistics, StatisticsTracker};
use crate::traits::{DirectorySource, TargetPlatform};
use crate::transform::{EntryTransformer, TransformOperation};
use crate::watermark::WatermarkStore;
use crate::writer::PlatformWriter;

/// Flags of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOptions {
    /// Ignore the stored watermark and extract every entry.
    pub full_sync: bool,
    /// Read everything, write nothing, keep the watermark.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    GroupsLoaded,
    UsersLoaded,
    DeletePhase,
    UpdateCreatePhase,
    WatermarkCommit,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::GroupsLoaded => write!(f, "groups_loaded"),
            Self::UsersLoaded => write!(f, "users_loaded"),
            Self::DeletePhase => write!(f, "delete_phase"),
            Self::UpdateCreatePhase => write!(f, "update_create_phase"),
            Self::WatermarkCommit => write!(f, "watermark_commit"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Outbound observability that must get a chance to drain before a fatal
/// error is returned.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn flush(&self);
}

/// Slack on top of the abort grace so a sink that waits out the full grace
/// still counts as flushed.
const FLUSH_MARGIN: Duration = Duration::from_millis(500);

/// Flush every sink concurrently. Returns false if they did not all finish
/// within `grace` plus [`FLUSH_MARGIN`].
async fn flush_sinks(sinks: &[Arc<dyn AlertSink>], grace: Duration) -> bool {
    if sinks.is_empty() {
        return true;
    }
    let flushes = join_all(sinks.iter().map(|sink| sink.flush()));
    tokio::time::timeout(grace + FLUSH_MARGIN, flushes).await.is_ok()
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub profile: String,
    pub dry_run: bool,
    pub full_sync: bool,
    pub started_at: DateTime<Utc>,
    /// Lower bound of the extraction.
    pub watermark_used: DateTime<Utc>,
    /// `None` on dry runs.
    pub watermark_committed: Option<DateTime<Utc>>,
    pub statistics: RunStatistics,
    pub duration_ms: u64,
}

/// Read-only preview of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub watermark_used: DateTime<Utc>,
    /// Delete/Ignore decisions, then Create/Update in directory-read order.
    pub decisions: Vec<Decision>,
}

impl SyncPlan {
    #[must_use]
    pub fn ids(&self, kind: DecisionKind) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.id.as_str())
            .collect()
    }
}

/// Per-run state shared by the entry workers.
#[derive(Clone, Copy)]
struct RunContext<'a> {
    writer: &'a PlatformWriter,
    provisioner: &'a GroupProvisioner,
    stats: &'a StatisticsTracker,
    /// Normalized id → id as spelled on the platform.
    platform_ids: &'a HashMap<String, String>,
    protected_groups: &'a HashSet<String>,
}

pub struct SyncEngine {
    directory: Arc<dyn DirectorySource>,
    platform: Arc<dyn TargetPlatform>,
    transformer: Arc<dyn EntryTransformer>,
    mapper: Arc<AttributeMapper>,
    watermarks: Arc<dyn WatermarkStore>,
    settings: SyncSettings,
    alert_sinks: Vec<Arc<dyn AlertSink>>,
}

impl SyncEngine {
    pub fn new(
        directory: Arc<dyn DirectorySource>,
        platform: Arc<dyn TargetPlatform>,
        transformer: Arc<dyn EntryTransformer>,
        mapper: Arc<AttributeMapper>,
        watermarks: Arc<dyn WatermarkStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            directory,
            platform,
            transformer,
            mapper,
            watermarks,
            settings,
            alert_sinks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Execute one sync run.
    ///
    /// On failure the alert sinks are flushed (bounded by the abort grace
    /// period) before the error is returned.
    pub async fn run(&self, options: SyncOptions) -> SyncResult<RunReport> {
        let mut phase = RunPhase::Init;
        match self.execute(options, &mut phase).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(%phase, error = %e, "*** SYNC FAILED ***");
                self.flush_alerts().await;
                Err(e)
            }
        }
    }

    async fn flush_alerts(&self) {
        let grace = self.settings.abort_grace();
        if !flush_sinks(&self.alert_sinks, grace).await {
            warn!(grace_secs = grace.as_secs(), "Alert sinks did not flush in time");
        }
    }

    #[instrument(skip(self, phase), fields(profile = %self.settings.profile))]
    async fn execute(&self, options: SyncOptions, phase: &mut RunPhase) -> SyncResult<RunReport> {
        let started_at = Utc::now();
        let stats = Arc::new(StatisticsTracker::new());
        let writer = PlatformWriter::new(self.platform.clone(), options.dry_run);
        let protected_users = self.settings.protected_user_set();
        let protected_groups = self.settings.protected_group_set();
        info!(
            dry_run = options.dry_run,
            full_sync = options.full_sync,
            "Starting sync run"
        );

        let groups = self.platform.list_groups().await?;
        info!(count = groups.len(), "Loaded platform groups");
        let provisioner = GroupProvisioner::new(
            writer.clone(),
            self.mapper.clone(),
            protected_groups.clone(),
            groups,
            stats.clone(),
        );
        enter(phase, RunPhase::GroupsLoaded);

        let platform_users = self.platform.list_user_ids().await?;
        info!(count = platform_users.len(), "Loaded platform users");
        let mut platform_ids: HashMap<String, String> = platform_users
            .iter()
            .map(|id| (normalize_identifier(id), id.clone()))
            .collect();
        enter(phase, RunPhase::UsersLoaded);

        let directory_ids = self.directory.list_identifiers().await?;
        info!(count = directory_ids.len(), "Loaded directory identifiers");
        enter(phase, RunPhase::DeletePhase);

        for decision in plan_deletions(&platform_users, &directory_ids, &protected_users) {
            match decision.kind {
                DecisionKind::Delete => {
                    info!(user = %decision.id, reason = %decision.reason, "Deleting user");
                    writer.delete_user(&decision.id).await?;
                    platform_ids.remove(&normalize_identifier(&decision.id));
                    stats.record_user_deleted();
                }
                DecisionKind::Ignore => {
                    warn!(user = %decision.id, "IGNORE DELETE PROTECTED USER");
                    stats.record_user_ignored();
                }
                DecisionKind::Create | DecisionKind::Update => {}
            }
        }

        let since = self.extraction_start(options).await?;
        info!(since = %generalized_time(since), "Looking for users to update or create");
        let snapshot = self.directory.list_entries(since, true).await?;
        enter(phase, RunPhase::UpdateCreatePhase);

        let normalized: HashSet<String> = platform_ids.keys().cloned().collect();
        let decisions = plan_upserts(&snapshot, &normalized);
        stats.set_total(u32::try_from(decisions.len()).unwrap_or(u32::MAX));

        let ctx = RunContext {
            writer: &writer,
            provisioner: &provisioner,
            stats: &stats,
            platform_ids: &platform_ids,
            protected_groups: &protected_groups,
        };
        let total = decisions.len();
        stream::iter(decisions.iter().map(Ok::<&Decision, SyncError>))
            .try_for_each_concurrent(self.settings.concurrency, |decision| {
                let snapshot = &snapshot;
                async move {
                    let Some(entry) = snapshot.get(&decision.id) else {
                        return Ok(());
                    };
                    self.apply_entry(ctx, decision.kind, entry).await?;
                    ctx.stats.increment_processed();
                    debug!(processed = ctx.stats.processed_count(), total, "Entry applied");
                    Ok(())
                }
            })
            .await?;
        enter(phase, RunPhase::WatermarkCommit);

        let watermark_committed = if options.dry_run {
            info!("DRY RUN: watermark not committed");
            None
        } else {
            Some(
                self.watermarks
                    .commit(&self.settings.profile, started_at)
                    .await?,
            )
        };
        enter(phase, RunPhase::Done);

        let statistics = stats.snapshot();
        info!(summary = %statistics, "Sync done");
        let duration_ms = u64::try_from((Utc::now() - started_at).num_milliseconds()).unwrap_or(0);
        Ok(RunReport {
            profile: self.settings.profile.clone(),
            dry_run: options.dry_run,
            full_sync: options.full_sync,
            started_at,
            watermark_used: since,
            watermark_committed,
            statistics,
            duration_ms,
        })
    }

    async fn extraction_start(&self, options: SyncOptions) -> SyncResult<DateTime<Utc>> {
        if options.full_sync {
            return Ok(full_resync());
        }
        Ok(self
            .watermarks
            .load(&self.settings.profile)
            .await?
            .unwrap_or_else(full_resync))
    }

    /// Transform one entry and apply it. Create answered with "already exists"
    /// retries once as Update; Update of a vanished user retries once as
    /// Create.
    async fn apply_entry(
        &self,
        ctx: RunContext<'_>,
        kind: DecisionKind,
        entry: &DirectoryEntry,
    ) -> SyncResult<()> {
        let mut operation = match kind {
            DecisionKind::Create => TransformOperation::Create,
            _ => TransformOperation::Update,
        };
        let mut fell_back = false;

        loop {
            let user_id = match operation {
                TransformOperation::Create => entry.id().to_string(),
                _ => ctx
                    .platform_ids
                    .get(entry.id())
                    .cloned()
                    .unwrap_or_else(|| entry.id().to_string()),
            };
            let draft = self.prepare_draft(ctx, operation, &user_id, entry).await?;

            if operation == TransformOperation::Create {
                info!(user = %draft.id, "Creating user");
                match ctx.writer.create_user(&draft).await {
                    Ok(()) => {
                        for (field, value) in fields_after_create(&draft) {
                            ctx.writer
                                .update_user_field(&draft.id, field, &value)
                                .await?;
                            ctx.stats.record_fields_updated(1);
                        }
                        for _ in &draft.groups {
                            ctx.stats.record_membership_added();
                        }
                        ctx.stats.record_user_created();
                        return Ok(());
                    }
                    Err(NextcloudError::UserAlreadyExists(_)) if !fell_back => {
                        warn!(user = %draft.id, "User already exists, updating instead");
                        operation = TransformOperation::Update;
                        fell_back = true;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let Some(current) = self.platform.find_user_by_id(&draft.id).await? else {
                if fell_back {
                    return Err(SyncError::api(format!(
                        "user '{}' neither exists nor can be created",
                        draft.id
                    )));
                }
                warn!(user = %draft.id, "User not found on platform, creating instead");
                operation = TransformOperation::Create;
                fell_back = true;
                continue;
            };

            let changes = diff_fields(&current, &draft);
            for (field, value) in &changes {
                ctx.writer
                    .update_user_field(&current.id, *field, value)
                    .await?;
            }
            ctx.stats
                .record_fields_updated(u32::try_from(changes.len()).unwrap_or(u32::MAX));

            let mut changed = !changes.is_empty();
            if draft.groups.is_empty() {
                debug!(user = %current.id, "No groups from transformer, memberships unchanged");
            } else {
                let memberships = diff_memberships(
                    &current.groups,
                    &draft.groups,
                    &self.mapper,
                    ctx.protected_groups,
                );
                changed |= !memberships.is_empty();
                for group in &memberships.add {
                    let group_id = self.catalog_id(group);
                    info!(user = %current.id, group = %group_id, "Adding user to group");
                    ctx.writer.add_user_to_group(&current.id, &group_id).await?;
                    ctx.stats.record_membership_added();
                }
                for group in &memberships.remove {
                    info!(user = %current.id, %group, "Removing user from group");
                    ctx.writer.remove_user_from_group(&current.id, group).await?;
                    ctx.stats.record_membership_removed();
                }
            }

            if changed {
                debug!(user = %current.id, fields = changes.len(), "User updated");
                ctx.stats.record_user_updated();
            } else {
                debug!(user = %current.id, "User unchanged");
                ctx.stats.record_user_unchanged();
            }
            return Ok(());
        }
    }

    /// Run the transformer, check every group against the catalog, then make
    /// sure the groups exist. Nothing is written for the user before all
    /// groups have passed the catalog check.
    async fn prepare_draft(
        &self,
        ctx: RunContext<'_>,
        operation: TransformOperation,
        user_id: &str,
        entry: &DirectoryEntry,
    ) -> SyncResult<UserDraft> {
        let mut draft = UserDraft::new(user_id);
        self.transformer.transform(operation, &mut draft, entry)?;
        draft.groups = canonical_groups(&draft.groups);

        if let Some(unknown) = draft
            .groups
            .iter()
            .find(|g| !self.mapper.contains_group(g))
        {
            return Err(SyncError::configuration(format!(
                "transformer assigned group '{unknown}' to user '{}', \
                 but the group is not in the attribute map catalog",
                draft.id
            )));
        }

        for group in &draft.groups {
            ctx.provisioner.ensure_group(group).await?;
        }
        draft.groups = draft.groups.iter().map(|g| self.catalog_id(g)).collect();
        Ok(draft)
    }

    fn catalog_id(&self, group: &str) -> String {
        self.mapper
            .resolve(group)
            .map_or_else(|| group.to_string(), |g| g.id.clone())
    }

    /// Read-only preview: the decisions a run would take right now.
    pub async fn plan(&self, options: SyncOptions) -> SyncResult<SyncPlan> {
        let protected_users = self.settings.protected_user_set();
        let platform_users = self.platform.list_user_ids().await?;
        let directory_ids = self.directory.list_identifiers().await?;

        let mut decisions = plan_deletions(&platform_users, &directory_ids, &protected_users);
        let deleted: HashSet<String> = decisions
            .iter()
            .filter(|d| d.kind == DecisionKind::Delete)
            .map(|d| normalize_identifier(&d.id))
            .collect();
        let remaining: HashSet<String> = platform_users
            .iter()
            .map(|id| normalize_identifier(id))
            .filter(|id| !deleted.contains(id))
            .collect();

        let since = self.extraction_start(options).await?;
        let snapshot = self.directory.list_entries(since, true).await?;
        decisions.extend(plan_upserts(&snapshot, &remaining));

        Ok(SyncPlan {
            watermark_used: since,
            decisions,
        })
    }

    /// Run the transformer over every directory entry without touching the
    /// platform. Uses the script's `test` function when present, `update`
    /// otherwise.
    pub async fn preview_transform(&self) -> SyncResult<Vec<UserDraft>> {
        let operation = if self.transformer.supports(TransformOperation::Test) {
            TransformOperation::Test
        } else {
            TransformOperation::Update
        };
        let snapshot = self.directory.list_entries(full_resync(), true).await?;
        let mut drafts = Vec::with_capacity(snapshot.len());
        for entry in &snapshot {
            let mut draft = UserDraft::new(entry.id());
            self.transformer.transform(operation, &mut draft, entry)?;
            drafts.push(draft);
        }
        Ok(drafts)
    }

    /// Administrative teardown: delete every catalog group that exists on the
    /// platform, except protected groups.
    pub async fn delete_configured_groups(&self, dry_run: bool) -> SyncResult<usize> {
        let stats = Arc::new(StatisticsTracker::new());
        let writer = PlatformWriter::new(self.platform.clone(), dry_run);
        let groups = self.platform.list_groups().await?;
        let provisioner = GroupProvisioner::new(
            writer,
            self.mapper.clone(),
            self.settings.protected_group_set(),
            groups,
            stats,
        );
        let deleted = provisioner.delete_configured_groups().await?;
        info!(deleted, dry_run, "Configured groups deleted");
        Ok(deleted)
    }
}

fn enter(phase: &mut RunPhase, next: RunPhase) {
    debug!(from = %phase, to = %next, "Run phase");
    *phase = next;
}

/// Drop repeated group ids (case-insensitive), keeping the first spelling.
fn canonical_groups(groups: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    groups
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty() && seen.insert(normalize_identifier(g)))
        .map(str::to_string)
        .collect()
}
