//! Mutating platform calls, with dry-run short-circuiting.
//!
//! Reads go straight to the platform; every write goes through
//! [`PlatformWriter`], which logs instead of calling out in dry-run mode.

use std::sync::Arc;
use tracing::info;

use ldap2nc_nextcloud::{NextcloudResult, UserDraft, UserField};

use crate::traits::TargetPlatform;

#[derive(Clone)]
pub struct PlatformWriter {
    platform: Arc<dyn TargetPlatform>,
    dry_run: bool,
}

impl PlatformWriter {
    pub fn new(platform: Arc<dyn TargetPlatform>, dry_run: bool) -> Self {
        Self { platform, dry_run }
    }

    pub async fn create_user(&self, draft: &UserDraft) -> NextcloudResult<()> {
        if self.dry_run {
            info!(user = %draft.id, groups = ?draft.groups, "DRY RUN: create user");
            return Ok(());
        }
        self.platform.create_user(draft).await
    }

    pub async fn update_user_field(
        &self,
        user_id: &str,
        field: UserField,
        value: &str,
    ) -> NextcloudResult<()> {
        if self.dry_run {
            info!(user = %user_id, %field, %value, "DRY RUN: update field");
            return Ok(());
        }
        self.platform.update_user_field(user_id, field, value).await
    }

    pub async fn delete_user(&self, user_id: &str) -> NextcloudResult<()> {
        if self.dry_run {
            info!(user = %user_id, "DRY RUN: delete user");
            return Ok(());
        }
        self.platform.delete_user(user_id).await
    }

    pub async fn create_group(&self, group_id: &str, displayname: &str) -> NextcloudResult<()> {
        if self.dry_run {
            info!(group = %group_id, %displayname, "DRY RUN: create group");
            return Ok(());
        }
        self.platform.create_group(group_id, displayname).await
    }

    pub async fn update_group_displayname(
        &self,
        group_id: &str,
        displayname: &str,
    ) -> NextcloudResult<()> {
        if self.dry_run {
            info!(group = %group_id, %displayname, "DRY RUN: rename group");
            return Ok(());
        }
        self.platform
            .update_group_displayname(group_id, displayname)
            .await
    }

    pub async fn delete_group(&self, group_id: &str) -> NextcloudResult<()> {
        if self.dry_run {
            info!(group = %group_id, "DRY RUN: delete group");
            return Ok(());
        }
        self.platform.delete_group(group_id).await
    }

    pub async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> NextcloudResult<()> {
        if self.dry_run {
            info!(user = %user_id, group = %group_id, "DRY RUN: add to group");
            return Ok(());
        }
        self.platform.add_user_to_group(user_id, group_id).await
    }

    pub async fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> NextcloudResult<()> {
        if self.dry_run {
            info!(user = %user_id, group = %group_id, "DRY RUN: remove from group");
            return Ok(());
        }
        self.platform.remove_user_from_group(user_id, group_id).await
    }
}
