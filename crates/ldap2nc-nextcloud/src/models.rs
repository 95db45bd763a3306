//! User and group records exchanged with the provisioning API.

use serde::{Deserialize, Deserializer, Serialize};

/// Scalar user properties that can be changed one at a time with
/// `PUT /cloud/users/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    DisplayName,
    Address,
    Email,
    Phone,
    Website,
    Organisation,
    Locale,
    Language,
    Quota,
}

impl UserField {
    /// Fields in the order updates are issued.
    pub const ALL: [UserField; 9] = [
        UserField::DisplayName,
        UserField::Address,
        UserField::Email,
        UserField::Phone,
        UserField::Website,
        UserField::Organisation,
        UserField::Locale,
        UserField::Language,
        UserField::Quota,
    ];

    /// Value of the OCS `key` parameter.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            UserField::DisplayName => "displayname",
            UserField::Address => "address",
            UserField::Email => "email",
            UserField::Phone => "phone",
            UserField::Website => "website",
            UserField::Organisation => "organisation",
            UserField::Locale => "locale",
            UserField::Language => "language",
            UserField::Quota => "quota",
        }
    }
}

impl std::fmt::Display for UserField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// A user as the platform reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NextcloudUser {
    pub id: String,
    #[serde(default)]
    pub displayname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default, deserialize_with = "deserialize_quota")]
    pub quota: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl NextcloudUser {
    /// Current value of a scalar field.
    #[must_use]
    pub fn field(&self, field: UserField) -> Option<&str> {
        let value = match field {
            UserField::DisplayName => &self.displayname,
            UserField::Address => &self.address,
            UserField::Email => &self.email,
            UserField::Phone => &self.phone,
            UserField::Website => &self.website,
            UserField::Organisation => &self.organisation,
            UserField::Locale => &self.locale,
            UserField::Language => &self.language,
            UserField::Quota => &self.quota,
        };
        value.as_deref()
    }
}

/// The quota arrives as `{"quota": <bytes | "none" | "default">, "used": ...}`
/// or, on older servers, as a bare value.
fn deserialize_quota<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let inner = match value {
        Some(serde_json::Value::Object(mut map)) => map.remove("quota"),
        other => other,
    };
    Ok(match inner {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => {
            // Negative values mean "unlimited".
            if n.as_i64().is_some_and(|v| v < 0) {
                Some("none".to_string())
            } else {
                Some(n.to_string())
            }
        }
        _ => None,
    })
}

/// Mutable record filled in by the entry transformer.
///
/// Unset fields are left alone by updates and omitted on create.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserDraft {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default)]
    pub quota: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserDraft {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Value the transformer set for a scalar field.
    ///
    /// Empty strings count as unset.
    #[must_use]
    pub fn field(&self, field: UserField) -> Option<&str> {
        let value = match field {
            UserField::DisplayName => &self.display_name,
            UserField::Address => &self.address,
            UserField::Email => &self.email,
            UserField::Phone => &self.phone,
            UserField::Website => &self.website,
            UserField::Organisation => &self.organisation,
            UserField::Locale => &self.locale,
            UserField::Language => &self.language,
            UserField::Quota => &self.quota,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Add a group once.
    pub fn add_group(&mut self, group_id: impl Into<String>) {
        let group_id = group_id.into();
        if !self.groups.contains(&group_id) {
            self.groups.push(group_id);
        }
    }
}

/// A group with its display name, from `/cloud/groups/details`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextcloudGroup {
    pub id: String,
    #[serde(default)]
    pub displayname: String,
}

impl NextcloudGroup {
    pub fn new(id: impl Into<String>, displayname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            displayname: displayname.into(),
        }
    }
}

/// Compare two quota strings the way the server stores them.
///
/// The server reports quotas in bytes while configuration usually says
/// `"5 GB"`; both sides are reduced to bytes (binary multiples) when they
/// parse as sizes.
#[must_use]
pub fn quota_equals(a: &str, b: &str) -> bool {
    match (parse_quota_bytes(a), parse_quota_bytes(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

fn parse_quota_bytes(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.parse().ok()?;
    let factor: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        "t" | "tb" => 1 << 40,
        _ => return None,
    };
    Some((number * factor as f64).round() as u64)
}
