//! On-demand group provisioning.
//!
//! Known groups are per-run state seeded from the platform listing. The lock is
//! held across the create call so that concurrent workers asking for the same
//! group issue exactly one `createGroup`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ldap2nc_directory::normalize_identifier;
use ldap2nc_nextcloud::NextcloudGroup;

use crate::error::{SyncError, SyncResult};
use crate::mapper::AttributeMapper;
use crate::statistics::StatisticsTracker;
use crate::writer::PlatformWriter;

#[derive(Debug, Clone)]
struct KnownGroup {
    /// Identifier as spelled on the platform.
    id: String,
    displayname: String,
}

#[derive(Debug, Default)]
struct KnownGroups {
    groups: HashMap<String, KnownGroup>,
    renamed: HashSet<String>,
}

pub struct GroupProvisioner {
    writer: PlatformWriter,
    mapper: Arc<AttributeMapper>,
    protected_groups: HashSet<String>,
    state: Mutex<KnownGroups>,
    stats: Arc<StatisticsTracker>,
}

impl GroupProvisioner {
    pub fn new(
        writer: PlatformWriter,
        mapper: Arc<AttributeMapper>,
        protected_groups: HashSet<String>,
        known: impl IntoIterator<Item = NextcloudGroup>,
        stats: Arc<StatisticsTracker>,
    ) -> Self {
        let groups = known
            .into_iter()
            .map(|g| {
                (
                    normalize_identifier(&g.id),
                    KnownGroup {
                        id: g.id,
                        displayname: g.displayname,
                    },
                )
            })
            .collect();
        Self {
            writer,
            mapper,
            protected_groups,
            state: Mutex::new(KnownGroups {
                groups,
                renamed: HashSet::new(),
            }),
            stats,
        }
    }

    /// Make sure a catalog group exists. Returns `true` if it was created.
    ///
    /// A group id outside the catalog means the transformer and the mapping
    /// configuration disagree; that is a [`SyncError::Configuration`].
    pub async fn ensure_group(&self, group_id: &str) -> SyncResult<bool> {
        let group = self.mapper.resolve(group_id).ok_or_else(|| {
            SyncError::configuration(format!(
                "group '{group_id}' is not in the attribute map catalog"
            ))
        })?;
        let key = normalize_identifier(&group.id);

        let mut state = self.state.lock().await;
        if let Some(known) = state.groups.get(&key).cloned() {
            if known.displayname != group.display_name && !state.renamed.contains(&key) {
                info!(
                    group = %known.id,
                    from = %known.displayname,
                    to = %group.display_name,
                    "Renaming group"
                );
                self.writer
                    .update_group_displayname(&known.id, &group.display_name)
                    .await?;
                state.groups.insert(
                    key.clone(),
                    KnownGroup {
                        id: known.id,
                        displayname: group.display_name.clone(),
                    },
                );
                state.renamed.insert(key);
                self.stats.record_group_renamed();
            }
            return Ok(false);
        }

        info!(group = %group.id, displayname = %group.display_name, "Creating group");
        self.writer
            .create_group(&group.id, &group.display_name)
            .await?;
        state.groups.insert(
            key,
            KnownGroup {
                id: group.id.clone(),
                displayname: group.display_name.clone(),
            },
        );
        self.stats.record_group_created();
        Ok(true)
    }

    /// Delete every catalog group present on the platform, except protected
    /// ones. Returns the number of groups deleted.
    pub async fn delete_configured_groups(&self) -> SyncResult<usize> {
        let mut deleted = 0;
        let mut state = self.state.lock().await;
        for group in self.mapper.catalog() {
            let key = normalize_identifier(&group.id);
            if self.protected_groups.contains(&key) {
                warn!(group = %group.id, "IGNORE DELETE PROTECTED GROUP");
                continue;
            }
            let Some(known) = state.groups.get(&key).cloned() else {
                debug!(group = %group.id, "Group not on platform");
                continue;
            };
            info!(group = %known.id, "Deleting group");
            self.writer.delete_group(&known.id).await?;
            state.groups.remove(&key);
            self.stats.record_group_deleted();
            deleted += 1;
        }
        Ok(deleted)
    }
}
