//! Set reconciliation between directory and platform.
//!
//! Pure functions: every decision is derived from identifier sets and records
//! already fetched by the engine. Identifiers are compared normalized; the
//! platform's original spelling is kept for the calls that follow.

use serde::Serialize;
use std::collections::HashSet;

use ldap2nc_directory::{normalize_identifier, DirectorySnapshot};
use ldap2nc_nextcloud::models::quota_equals;
use ldap2nc_nextcloud::{NextcloudUser, UserDraft, UserField};

use crate::mapper::AttributeMapper;

/// What happens to one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Create,
    Update,
    Delete,
    Ignore,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionKind::Create => write!(f, "create"),
            DecisionKind::Update => write!(f, "update"),
            DecisionKind::Delete => write!(f, "delete"),
            DecisionKind::Ignore => write!(f, "ignore"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Platform user without a directory entry.
    NotFoundInDirectory,
    /// Would be deleted, but is on the protected list.
    Protected,
    /// Directory entry without a platform user.
    NotFoundOnPlatform,
    /// Present on both sides.
    ExistsOnPlatform,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecisionReason::NotFoundInDirectory => "not found in directory",
            DecisionReason::Protected => "protected",
            DecisionReason::NotFoundOnPlatform => "not found on platform",
            DecisionReason::ExistsOnPlatform => "exists on platform",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Decision {
    pub id: String,
    pub kind: DecisionKind,
    pub reason: DecisionReason,
}

impl Decision {
    fn new(id: impl Into<String>, kind: DecisionKind, reason: DecisionReason) -> Self {
        Self {
            id: id.into(),
            kind,
            reason,
        }
    }
}

/// Delete/Ignore decisions for platform users missing from the directory.
///
/// Yields `P − D − Protected` as Delete and `(P ∩ Protected) − D` as Ignore,
/// sorted by normalized identifier. Platform ids keep their spelling.
#[must_use]
pub fn plan_deletions(
    platform_ids: &[String],
    directory_ids: &HashSet<String>,
    protected_users: &HashSet<String>,
) -> Vec<Decision> {
    let mut seen = HashSet::new();
    let mut decisions: Vec<Decision> = platform_ids
        .iter()
        .filter_map(|id| {
            let key = normalize_identifier(id);
            if directory_ids.contains(&key) || !seen.insert(key.clone()) {
                return None;
            }
            Some(if protected_users.contains(&key) {
                Decision::new(id.as_str(), DecisionKind::Ignore, DecisionReason::Protected)
            } else {
                Decision::new(
                    id.as_str(),
                    DecisionKind::Delete,
                    DecisionReason::NotFoundInDirectory,
                )
            })
        })
        .collect();
    decisions.sort_by_key(|d| normalize_identifier(&d.id));
    decisions
}

/// Create/Update decisions for extracted entries, in directory-read order.
///
/// `platform_ids` must be normalized.
#[must_use]
pub fn plan_upserts(snapshot: &DirectorySnapshot, platform_ids: &HashSet<String>) -> Vec<Decision> {
    snapshot
        .iter()
        .map(|entry| {
            if platform_ids.contains(entry.id()) {
                Decision::new(
                    entry.id(),
                    DecisionKind::Update,
                    DecisionReason::ExistsOnPlatform,
                )
            } else {
                Decision::new(
                    entry.id(),
                    DecisionKind::Create,
                    DecisionReason::NotFoundOnPlatform,
                )
            }
        })
        .collect()
}

/// Membership calls for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl MembershipDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// `add = draft − platform`; `remove = (platform ∩ catalog) − protected − draft`.
///
/// Groups outside the catalog are never removed, so memberships managed by
/// someone else survive.
#[must_use]
pub fn diff_memberships(
    platform_groups: &[String],
    draft_groups: &[String],
    mapper: &AttributeMapper,
    protected_groups: &HashSet<String>,
) -> MembershipDiff {
    let current: HashSet<String> = platform_groups
        .iter()
        .map(|g| normalize_identifier(g))
        .collect();
    let wanted: HashSet<String> = draft_groups
        .iter()
        .map(|g| normalize_identifier(g))
        .collect();

    let mut diff = MembershipDiff::default();
    let mut added = HashSet::new();
    for group in draft_groups {
        let key = normalize_identifier(group);
        if !current.contains(&key) && added.insert(key) {
            diff.add.push(group.clone());
        }
    }
    for group in platform_groups {
        let key = normalize_identifier(group);
        if !wanted.contains(&key)
            && mapper.contains_group(group)
            && !protected_groups.contains(&key)
        {
            diff.remove.push(group.clone());
        }
    }
    diff
}

/// Fields the transformer set that differ from the platform's record.
#[must_use]
pub fn diff_fields(current: &NextcloudUser, draft: &UserDraft) -> Vec<(UserField, String)> {
    UserField::ALL
        .iter()
        .filter_map(|&field| {
            let wanted = draft.field(field)?;
            let unchanged = match (field, current.field(field)) {
                (UserField::Quota, Some(have)) => quota_equals(have, wanted),
                (_, Some(have)) => have == wanted,
                (_, None) => false,
            };
            (!unchanged).then(|| (field, wanted.to_string()))
        })
        .collect()
}

/// Fields `createUser` cannot carry; applied as field updates right after.
#[must_use]
pub fn fields_after_create(draft: &UserDraft) -> Vec<(UserField, String)> {
    const SENT_WITH_CREATE: [UserField; 4] = [
        UserField::DisplayName,
        UserField::Email,
        UserField::Quota,
        UserField::Language,
    ];
    UserField::ALL
        .iter()
        .filter(|f| !SENT_WITH_CREATE.contains(f))
        .filter_map(|&field| draft.field(field).map(|v| (field, v.to_string())))
        .collect()
}
