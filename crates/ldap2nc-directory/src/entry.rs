//! Directory entries and the per-run snapshot.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Case-fold and trim an identifier before any comparison.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// One user entry read from the directory. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    id: String,
    dn: String,
    attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Build an entry, taking the identifier from `id_attribute`.
    ///
    /// Returns `None` when the attribute is missing or blank.
    pub fn new(
        dn: impl Into<String>,
        attributes: impl IntoIterator<Item = (String, Vec<String>)>,
        id_attribute: &str,
    ) -> Option<Self> {
        let attributes: BTreeMap<String, Vec<String>> = attributes
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .collect();
        let id = lookup(&attributes, id_attribute)
            .and_then(|values| values.first())
            .map(|v| normalize_identifier(v))
            .filter(|v| !v.is_empty())?;
        Some(Self {
            id,
            dn: dn.into(),
            attributes,
        })
    }

    /// Normalized identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// All values of an attribute, looked up case-insensitively.
    #[must_use]
    pub fn values(&self, name: &str) -> &[String] {
        lookup(&self.attributes, name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of an attribute.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }

    /// Attributes ordered by name.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

fn lookup<'a>(attributes: &'a BTreeMap<String, Vec<String>>, name: &str) -> Option<&'a Vec<String>> {
    attributes.get(name).or_else(|| {
        attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// Serialized as `{ id, dn, attributes: { name: [values] } }` for scripts.
impl Serialize for DirectoryEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Attributes<'a>(&'a BTreeMap<String, Vec<String>>);

        impl Serialize for Attributes<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (k, v) in self.0 {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }

        let mut s = serializer.serialize_struct("DirectoryEntry", 3)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("dn", &self.dn)?;
        s.serialize_field("attributes", &Attributes(&self.attributes))?;
        s.end()
    }
}

/// Entries of one extraction, in directory-read order, unique by identifier.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    entries: Vec<DirectoryEntry>,
    index: HashMap<String, usize>,
    duplicates: usize,
    skipped: usize,
}

impl DirectorySnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. A repeated identifier replaces the earlier entry in
    /// place (last write wins) and is counted as a duplicate.
    pub fn insert(&mut self, entry: DirectoryEntry) {
        match self.index.get(entry.id()) {
            Some(&pos) => {
                self.entries[pos] = entry;
                self.duplicates += 1;
            }
            None => {
                self.index.insert(entry.id().to_string(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Count an entry that lacked the identifier attribute.
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&DirectoryEntry> {
        self.index
            .get(&normalize_identifier(id))
            .map(|&pos| &self.entries[pos])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(&normalize_identifier(id))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DirectoryEntry> {
        self.entries.iter()
    }

    /// Identifiers in read order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(DirectoryEntry::id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl FromIterator<DirectoryEntry> for DirectorySnapshot {
    fn from_iter<I: IntoIterator<Item = DirectoryEntry>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for entry in iter {
            snapshot.insert(entry);
        }
        snapshot
    }
}

impl<'a> IntoIterator for &'a DirectorySnapshot {
    type Item = &'a DirectoryEntry;
    type IntoIter = std::slice::Iter<'a, DirectoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
