//! Seams between the engine and the outside world.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use ldap2nc_directory::{DirectoryResult, DirectorySnapshot, LdapDirectory};
use ldap2nc_nextcloud::{
    NextcloudClient, NextcloudGroup, NextcloudResult, NextcloudUser, UserDraft, UserField,
};

/// Read side: the LDAP directory.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Normalized identifiers of every user matching the filter.
    async fn list_identifiers(&self) -> DirectoryResult<HashSet<String>>;

    /// Entries modified at or after `since`.
    async fn list_entries(
        &self,
        since: DateTime<Utc>,
        with_attributes: bool,
    ) -> DirectoryResult<DirectorySnapshot>;
}

#[async_trait]
impl DirectorySource for LdapDirectory {
    async fn list_identifiers(&self) -> DirectoryResult<HashSet<String>> {
        let snapshot = LdapDirectory::list_identifiers(self).await?;
        Ok(snapshot.ids().map(str::to_string).collect())
    }

    async fn list_entries(
        &self,
        since: DateTime<Utc>,
        with_attributes: bool,
    ) -> DirectoryResult<DirectorySnapshot> {
        LdapDirectory::list_entries(self, since, with_attributes).await
    }
}

/// Write side: the collaboration platform.
#[async_trait]
pub trait TargetPlatform: Send + Sync {
    async fn list_user_ids(&self) -> NextcloudResult<Vec<String>>;
    async fn list_groups(&self) -> NextcloudResult<Vec<NextcloudGroup>>;
    async fn find_user_by_id(&self, user_id: &str) -> NextcloudResult<Option<NextcloudUser>>;

    async fn create_user(&self, draft: &UserDraft) -> NextcloudResult<()>;
    async fn update_user_field(
        &self,
        user_id: &str,
        field: UserField,
        value: &str,
    ) -> NextcloudResult<()>;
    async fn delete_user(&self, user_id: &str) -> NextcloudResult<()>;

    async fn create_group(&self, group_id: &str, displayname: &str) -> NextcloudResult<()>;
    async fn update_group_displayname(
        &self,
        group_id: &str,
        displayname: &str,
    ) -> NextcloudResult<()>;
    async fn delete_group(&self, group_id: &str) -> NextcloudResult<()>;

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> NextcloudResult<()>;
    async fn remove_user_from_group(&self, user_id: &str, group_id: &str)
        -> NextcloudResult<()>;
}

#[async_trait]
impl TargetPlatform for NextcloudClient {
    async fn list_user_ids(&self) -> NextcloudResult<Vec<String>> {
        NextcloudClient::list_user_ids(self).await
    }

    async fn list_groups(&self) -> NextcloudResult<Vec<NextcloudGroup>> {
        NextcloudClient::list_groups(self).await
    }

    async fn find_user_by_id(&self, user_id: &str) -> NextcloudResult<Option<NextcloudUser>> {
        NextcloudClient::find_user_by_id(self, user_id).await
    }

    async fn create_user(&self, draft: &UserDraft) -> NextcloudResult<()> {
        NextcloudClient::create_user(self, draft).await
    }

    async fn update_user_field(
        &self,
        user_id: &str,
        field: UserField,
        value: &str,
    ) -> NextcloudResult<()> {
        NextcloudClient::update_user_field(self, user_id, field, value).await
    }

    async fn delete_user(&self, user_id: &str) -> NextcloudResult<()> {
        NextcloudClient::delete_user(self, user_id).await
    }

    async fn create_group(&self, group_id: &str, displayname: &str) -> NextcloudResult<()> {
        NextcloudClient::create_group(self, group_id, displayname).await
    }

    async fn update_group_displayname(
        &self,
        group_id: &str,
        displayname: &str,
    ) -> NextcloudResult<()> {
        NextcloudClient::update_group_displayname(self, group_id, displayname).await
    }

    async fn delete_group(&self, group_id: &str) -> NextcloudResult<()> {
        NextcloudClient::delete_group(self, group_id).await
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> NextcloudResult<()> {
        NextcloudClient::add_user_to_group(self, user_id, group_id).await
    }

    async fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> NextcloudResult<()> {
        NextcloudClient::remove_user_from_group(self, user_id, group_id).await
    }
}
