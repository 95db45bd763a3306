//! In-memory fakes for engine tests.
//!
//! `FakePlatform` keeps users and groups in memory, applies every mutation to
//! that state and records it, so tests can assert on call order and re-run
//! the engine against the result.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use ldap2nc_directory::{
    normalize_identifier, DirectoryEntry, DirectoryResult, DirectorySnapshot,
};
use ldap2nc_nextcloud::{
    NextcloudError, NextcloudGroup, NextcloudResult, NextcloudUser, UserDraft, UserField,
};
use ldap2nc_sync::{
    AlertSink, AttributeMapConfig, AttributeMapper, CategoryConfig, DirectorySource,
    EntryTransformer, MemoryWatermarkStore, SyncEngine, SyncSettings, TargetPlatform,
    TransformError, TransformOperation, WatermarkStore,
};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

// =============================================================================
// Directory
// =============================================================================

pub struct FakeDirectory {
    entries: Vec<(DirectoryEntry, DateTime<Utc>)>,
    /// `since` of every `list_entries` call.
    pub since_calls: Mutex<Vec<DateTime<Utc>>>,
}

impl FakeDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        let modified = Utc::now();
        Self {
            entries: entries.into_iter().map(|e| (e, modified)).collect(),
            since_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_modified(entries: Vec<(DirectoryEntry, DateTime<Utc>)>) -> Self {
        Self {
            entries,
            since_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn last_since(&self) -> Option<DateTime<Utc>> {
        self.since_calls.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl DirectorySource for FakeDirectory {
    async fn list_identifiers(&self) -> DirectoryResult<HashSet<String>> {
        Ok(self.entries.iter().map(|(e, _)| e.id().to_string()).collect())
    }

    async fn list_entries(
        &self,
        since: DateTime<Utc>,
        _with_attributes: bool,
    ) -> DirectoryResult<DirectorySnapshot> {
        self.since_calls.lock().unwrap().push(since);
        Ok(self
            .entries
            .iter()
            .filter(|(_, modified)| *modified >= since)
            .map(|(e, _)| e.clone())
            .collect())
    }
}

/// Entry with `uid`, `cn` and one `groups` value per listed group id.
pub fn entry(uid: &str, groups: &[&str]) -> DirectoryEntry {
    let mut attributes = vec![
        ("uid".to_string(), vec![uid.to_string()]),
        ("cn".to_string(), vec![format!("{uid} cn")]),
    ];
    if !groups.is_empty() {
        attributes.push((
            "groups".to_string(),
            groups.iter().map(|g| g.to_string()).collect(),
        ));
    }
    DirectoryEntry::new(format!("uid={uid},ou=people,dc=example,dc=com"), attributes, "uid")
        .unwrap()
}

// =============================================================================
// Platform
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateUser { id: String, groups: Vec<String> },
    UpdateField { id: String, field: UserField, value: String },
    DeleteUser(String),
    CreateGroup { id: String, displayname: String },
    RenameGroup { id: String, displayname: String },
    DeleteGroup(String),
    AddToGroup { user: String, group: String },
    RemoveFromGroup { user: String, group: String },
}

#[derive(Default)]
struct PlatformState {
    users: BTreeMap<String, NextcloudUser>,
    groups: BTreeMap<String, String>,
    /// Users present but left out of `list_user_ids`.
    hidden: HashSet<String>,
    /// Ids listed by `list_user_ids` that `find_user_by_id` cannot find.
    ghosts: Vec<String>,
    /// Operation name that fails with an API error.
    failing: Option<&'static str>,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
    calls: Mutex<Vec<Call>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: &str, groups: &[&str]) -> Self {
        let user = NextcloudUser {
            id: id.to_string(),
            displayname: Some(format!("{id} cn")),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            ..NextcloudUser::default()
        };
        self.state
            .lock()
            .unwrap()
            .users
            .insert(normalize_identifier(id), user);
        self
    }

    pub fn with_group(self, id: &str, displayname: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .groups
            .insert(id.to_string(), displayname.to_string());
        self
    }

    pub fn with_hidden_user(self, id: &str) -> Self {
        let this = self.with_user(id, &[]);
        this.state
            .lock()
            .unwrap()
            .hidden
            .insert(normalize_identifier(id));
        this
    }

    pub fn with_ghost_user(self, id: &str) -> Self {
        self.state.lock().unwrap().ghosts.push(id.to_string());
        self
    }

    pub fn failing_on(self, operation: &'static str) -> Self {
        self.state.lock().unwrap().failing = Some(operation);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn user(&self, id: &str) -> Option<NextcloudUser> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(&normalize_identifier(id))
            .cloned()
    }

    pub fn group_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().groups.keys().cloned().collect()
    }

    fn record(&self, operation: &'static str, call: Call) -> NextcloudResult<()> {
        if self.state.lock().unwrap().failing == Some(operation) {
            return Err(NextcloudError::Api {
                operation: operation.to_string(),
                statuscode: 996,
                message: "server error".to_string(),
            });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl TargetPlatform for FakePlatform {
    async fn list_user_ids(&self) -> NextcloudResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<String> = state
            .users
            .iter()
            .filter(|(key, _)| !state.hidden.contains(*key))
            .map(|(_, u)| u.id.clone())
            .collect();
        ids.extend(state.ghosts.iter().cloned());
        Ok(ids)
    }

    async fn list_groups(&self) -> NextcloudResult<Vec<NextcloudGroup>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .groups
            .iter()
            .map(|(id, name)| NextcloudGroup::new(id.clone(), name.clone()))
            .collect())
    }

    async fn find_user_by_id(&self, user_id: &str) -> NextcloudResult<Option<NextcloudUser>> {
        Ok(self.user(user_id))
    }

    async fn create_user(&self, draft: &UserDraft) -> NextcloudResult<()> {
        let key = normalize_identifier(&draft.id);
        if self.state.lock().unwrap().users.contains_key(&key) {
            return Err(NextcloudError::UserAlreadyExists(draft.id.clone()));
        }
        self.record(
            "createUser",
            Call::CreateUser {
                id: draft.id.clone(),
                groups: draft.groups.clone(),
            },
        )?;
        let user = NextcloudUser {
            id: draft.id.clone(),
            displayname: draft.display_name.clone(),
            email: draft.email.clone(),
            quota: draft.quota.clone(),
            language: draft.language.clone(),
            groups: draft.groups.clone(),
            ..NextcloudUser::default()
        };
        let mut state = self.state.lock().unwrap();
        state.users.insert(key, user);
        state.ghosts.retain(|g| normalize_identifier(g) != normalize_identifier(&draft.id));
        Ok(())
    }

    async fn update_user_field(
        &self,
        user_id: &str,
        field: UserField,
        value: &str,
    ) -> NextcloudResult<()> {
        self.record(
            "editUser",
            Call::UpdateField {
                id: user_id.to_string(),
                field,
                value: value.to_string(),
            },
        )?;
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.get_mut(&normalize_identifier(user_id)) {
            let slot = match field {
                UserField::DisplayName => &mut user.displayname,
                UserField::Address => &mut user.address,
                UserField::Email => &mut user.email,
                UserField::Phone => &mut user.phone,
                UserField::Website => &mut user.website,
                UserField::Organisation => &mut user.organisation,
                UserField::Locale => &mut user.locale,
                UserField::Language => &mut user.language,
                UserField::Quota => &mut user.quota,
            };
            *slot = Some(value.to_string());
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> NextcloudResult<()> {
        self.record("deleteUser", Call::DeleteUser(user_id.to_string()))?;
        self.state
            .lock()
            .unwrap()
            .users
            .remove(&normalize_identifier(user_id));
        Ok(())
    }

    async fn create_group(&self, group_id: &str, displayname: &str) -> NextcloudResult<()> {
        self.record(
            "createGroup",
            Call::CreateGroup {
                id: group_id.to_string(),
                displayname: displayname.to_string(),
            },
        )?;
        self.state
            .lock()
            .unwrap()
            .groups
            .insert(group_id.to_string(), displayname.to_string());
        Ok(())
    }

    async fn update_group_displayname(
        &self,
        group_id: &str,
        displayname: &str,
    ) -> NextcloudResult<()> {
        self.record(
            "updateGroup",
            Call::RenameGroup {
                id: group_id.to_string(),
                displayname: displayname.to_string(),
            },
        )?;
        self.state
            .lock()
            .unwrap()
            .groups
            .insert(group_id.to_string(), displayname.to_string());
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> NextcloudResult<()> {
        self.record("deleteGroup", Call::DeleteGroup(group_id.to_string()))?;
        self.state.lock().unwrap().groups.remove(group_id);
        Ok(())
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> NextcloudResult<()> {
        self.record(
            "addToGroup",
            Call::AddToGroup {
                user: user_id.to_string(),
                group: group_id.to_string(),
            },
        )?;
        if let Some(user) = self
            .state
            .lock()
            .unwrap()
            .users
            .get_mut(&normalize_identifier(user_id))
        {
            user.groups.push(group_id.to_string());
        }
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> NextcloudResult<()> {
        self.record(
            "removeFromGroup",
            Call::RemoveFromGroup {
                user: user_id.to_string(),
                group: group_id.to_string(),
            },
        )?;
        if let Some(user) = self
            .state
            .lock()
            .unwrap()
            .users
            .get_mut(&normalize_identifier(user_id))
        {
            user.groups.retain(|g| g != group_id);
        }
        Ok(())
    }
}

// =============================================================================
// Engine wiring
// =============================================================================

/// Catalog: staff, admins, students.
pub fn mapper() -> Arc<AttributeMapper> {
    Arc::new(AttributeMapper::from_config(&AttributeMapConfig {
        employee_type: CategoryConfig {
            ldap_attribute_name: Some("employeeType".into()),
            mapping_list: vec![
                "staff, Staff".into(),
                "student, students, Students".into(),
            ],
        },
        additional: CategoryConfig {
            ldap_attribute_name: None,
            mapping_list: vec!["admins, Administrators".into()],
        },
        ..AttributeMapConfig::default()
    }))
}

/// Copies `cn` into the display name and every `groups` value into the draft.
pub fn transformer() -> Arc<dyn EntryTransformer> {
    Arc::new(
        |_op: TransformOperation, draft: &mut UserDraft, entry: &DirectoryEntry| {
            draft.display_name = entry.first("cn").map(str::to_string);
            for group in entry.values("groups") {
                draft.add_group(group.clone());
            }
            Ok::<(), TransformError>(())
        },
    )
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        abort_grace_secs: 0,
        ..SyncSettings::default()
    }
}

pub struct Harness {
    pub directory: Arc<FakeDirectory>,
    pub platform: Arc<FakePlatform>,
    pub watermarks: Arc<MemoryWatermarkStore>,
    pub engine: SyncEngine,
}

impl Harness {
    pub fn new(directory: FakeDirectory, platform: FakePlatform, settings: SyncSettings) -> Self {
        Self::with_watermarks(directory, platform, settings, MemoryWatermarkStore::new())
    }

    pub fn with_watermarks(
        directory: FakeDirectory,
        platform: FakePlatform,
        settings: SyncSettings,
        watermarks: MemoryWatermarkStore,
    ) -> Self {
        init_test_logging();
        let directory = Arc::new(directory);
        let platform = Arc::new(platform);
        let watermarks = Arc::new(watermarks);
        let engine = SyncEngine::new(
            directory.clone(),
            platform.clone(),
            transformer(),
            mapper(),
            watermarks.clone(),
            settings,
        );
        Self {
            directory,
            platform,
            watermarks,
            engine,
        }
    }

    pub async fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermarks
            .load(&self.engine.settings().profile)
            .await
            .unwrap()
    }
}

/// Records whether it was flushed.
#[derive(Default)]
pub struct RecordingSink {
    pub flushed: AtomicBool,
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn flush(&self) {
        self.flushed.store(true, Ordering::SeqCst);
    }
}

pub fn position(calls: &[Call], wanted: &Call) -> Option<usize> {
    calls.iter().position(|c| c == wanted)
}

pub fn count<F: Fn(&Call) -> bool>(calls: &[Call], predicate: F) -> usize {
    calls.iter().filter(|c| predicate(c)).count()
}
