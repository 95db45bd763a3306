//! Static attribute-to-group lookup tables.
//!
//! Each category maps values of one LDAP attribute to a platform group. All
//! categories are flattened into a single group catalog, which is the only
//! source of group ids the engine will create, add or remove.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use ldap2nc_directory::{normalize_identifier, DirectoryEntry};

/// Mapping categories, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    EmployeeType,
    Department,
    Institute,
    Locality,
    Additional,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::EmployeeType,
        Category::Department,
        Category::Institute,
        Category::Locality,
        Category::Additional,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::EmployeeType => "employee_type",
            Category::Department => "department",
            Category::Institute => "institute",
            Category::Locality => "locality",
            Category::Additional => "additional",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "employee_type" | "employeetype" => Ok(Category::EmployeeType),
            "department" => Ok(Category::Department),
            "institute" => Ok(Category::Institute),
            "locality" => Ok(Category::Locality),
            "additional" => Ok(Category::Additional),
            _ => Err(format!("Unknown mapping category: {s}")),
        }
    }
}

/// One category in the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// LDAP attribute the category reads. `additional` usually has none.
    #[serde(default)]
    pub ldap_attribute_name: Option<String>,

    /// Lines of `"<ldap value>, <group id>, <display name>"` or
    /// `"<group id>, <display name>"`.
    #[serde(default)]
    pub mapping_list: Vec<String>,
}

/// `attributes_map` section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeMapConfig {
    #[serde(default)]
    pub employee_type: CategoryConfig,
    #[serde(default)]
    pub department: CategoryConfig,
    #[serde(default)]
    pub institute: CategoryConfig,
    #[serde(default)]
    pub locality: CategoryConfig,
    #[serde(default)]
    pub additional: CategoryConfig,
}

impl AttributeMapConfig {
    #[must_use]
    pub fn category(&self, category: Category) -> &CategoryConfig {
        match category {
            Category::EmployeeType => &self.employee_type,
            Category::Department => &self.department,
            Category::Institute => &self.institute,
            Category::Locality => &self.locality,
            Category::Additional => &self.additional,
        }
    }
}

/// A group in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogGroup {
    pub id: String,
    pub display_name: String,
}

/// One parsed mapping line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMapping {
    pub value: String,
    pub group: CatalogGroup,
}

/// Two categories (or two lines) claim the same group id with different
/// display names. The later one wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogConflict {
    pub group_id: String,
    pub kept: String,
    pub kept_from: Category,
    pub replaced: String,
    pub replaced_from: Category,
}

impl std::fmt::Display for CatalogConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "group '{}': display name '{}' ({}) overrides '{}' ({})",
            self.group_id, self.kept, self.kept_from, self.replaced, self.replaced_from
        )
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct CategoryTable {
    attribute: Option<String>,
    by_value: HashMap<String, GroupMapping>,
}

/// Lookup tables plus the flattened group catalog. Immutable after
/// construction.
#[derive(Debug, Clone, Default)]
pub struct AttributeMapper {
    tables: HashMap<Category, CategoryTable>,
    catalog: HashMap<String, (CatalogGroup, Category)>,
    conflicts: Vec<CatalogConflict>,
}

impl AttributeMapper {
    /// Build the tables from configuration. Malformed lines are skipped with a
    /// warning; display-name collisions are recorded, last loaded wins.
    #[must_use]
    pub fn from_config(config: &AttributeMapConfig) -> Self {
        let mut mapper = Self::default();

        for category in Category::ALL {
            let section = config.category(category);
            let mut table = CategoryTable {
                attribute: section
                    .ldap_attribute_name
                    .as_ref()
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty()),
                by_value: HashMap::new(),
            };

            for line in &section.mapping_list {
                let Some(mapping) = parse_mapping_line(line) else {
                    if !line.trim().is_empty() {
                        warn!(category = %category, line = %line, "Malformed mapping line skipped");
                    }
                    continue;
                };
                mapper.add_to_catalog(&mapping.group, category);
                table
                    .by_value
                    .insert(normalize_identifier(&mapping.value), mapping);
            }

            mapper.tables.insert(category, table);
        }

        for conflict in &mapper.conflicts {
            warn!(%conflict, "Group catalog conflict");
        }
        mapper
    }

    fn add_to_catalog(&mut self, group: &CatalogGroup, category: Category) {
        let key = normalize_identifier(&group.id);
        if let Some((previous, previous_category)) = self.catalog.get(&key) {
            if previous.display_name != group.display_name {
                self.conflicts.push(CatalogConflict {
                    group_id: group.id.clone(),
                    kept: group.display_name.clone(),
                    kept_from: category,
                    replaced: previous.display_name.clone(),
                    replaced_from: *previous_category,
                });
            }
        }
        self.catalog.insert(key, (group.clone(), category));
    }

    /// Catalog entry for a group id (case-insensitive).
    #[must_use]
    pub fn resolve(&self, group_id: &str) -> Option<&CatalogGroup> {
        self.catalog
            .get(&normalize_identifier(group_id))
            .map(|(g, _)| g)
    }

    #[must_use]
    pub fn contains_group(&self, group_id: &str) -> bool {
        self.resolve(group_id).is_some()
    }

    #[must_use]
    pub fn display_name(&self, group_id: &str) -> Option<&str> {
        self.resolve(group_id).map(|g| g.display_name.as_str())
    }

    /// Every catalog group, sorted by id.
    #[must_use]
    pub fn catalog(&self) -> Vec<&CatalogGroup> {
        let mut groups: Vec<&CatalogGroup> = self.catalog.values().map(|(g, _)| g).collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        groups
    }

    #[must_use]
    pub fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    /// Group mapped from `value` in `category` (case-insensitive).
    #[must_use]
    pub fn lookup(&self, category: Category, value: &str) -> Option<&CatalogGroup> {
        self.tables
            .get(&category)?
            .by_value
            .get(&normalize_identifier(value))
            .map(|m| &m.group)
    }

    /// LDAP attribute read by a category.
    #[must_use]
    pub fn attribute_name(&self, category: Category) -> Option<&str> {
        self.tables.get(&category)?.attribute.as_deref()
    }

    /// Groups the entry maps to through every category that names an
    /// attribute, in category order, without duplicates.
    #[must_use]
    pub fn groups_for_entry(&self, entry: &DirectoryEntry) -> Vec<String> {
        self.groups_for_attributes(|attribute| entry.values(attribute))
    }

    /// Same as [`groups_for_entry`](Self::groups_for_entry), reading attribute
    /// values through `values_of`.
    pub fn groups_for_attributes<F, I>(&self, mut values_of: F) -> Vec<String>
    where
        F: FnMut(&str) -> I,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut groups: Vec<String> = Vec::new();
        for category in Category::ALL {
            let Some(attribute) = self.attribute_name(category) else {
                continue;
            };
            for value in values_of(attribute) {
                if let Some(group) = self.lookup(category, value.as_ref()) {
                    if !groups.contains(&group.id) {
                        groups.push(group.id.clone());
                    }
                }
            }
        }
        groups
    }

    #[must_use]
    pub fn conflicts(&self) -> &[CatalogConflict] {
        &self.conflicts
    }
}

/// Split a mapping line. Three fields: value, group id, display name (the
/// display name keeps any further commas). Two fields: the group id doubles
/// as the LDAP value.
fn parse_mapping_line(line: &str) -> Option<GroupMapping> {
    let parts: Vec<&str> = line.splitn(3, ',').map(str::trim).collect();
    let (value, id, display) = match parts.as_slice() {
        [value, id, display] => (*value, *id, *display),
        [id, display] => (*id, *id, *display),
        _ => return None,
    };
    if value.is_empty() || id.is_empty() || display.is_empty() {
        return None;
    }
    Some(GroupMapping {
        value: value.to_string(),
        group: CatalogGroup {
            id: id.to_string(),
            display_name: display.to_string(),
        },
    })
}
