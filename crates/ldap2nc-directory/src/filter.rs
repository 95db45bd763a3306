//! Filter templating for incremental extraction.

use chrono::{DateTime, Utc};

use crate::error::{DirectoryError, DirectoryResult};

const PLACEHOLDERS: [&str; 2] = ["{0}", "{}"];

/// Watermark that selects every entry (epoch zero).
#[must_use]
pub fn full_resync() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default()
}

/// LDAP generalized time (`YYYYMMDDHHMMSSZ`, UTC).
#[must_use]
pub fn generalized_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M%SZ").to_string()
}

/// Substitute the watermark into the filter template.
///
/// Epoch zero renders as `19700101000000Z`, which matches every entry.
#[must_use]
pub fn render_filter(template: &str, since: DateTime<Utc>) -> String {
    let stamp = generalized_time(since);
    PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |acc, p| acc.replace(p, &stamp))
}

/// The template must be parenthesized, balanced and carry a placeholder.
pub fn validate_template(template: &str) -> DirectoryResult<()> {
    let trimmed = template.trim();
    if !trimmed.starts_with('(') || !trimmed.ends_with(')') {
        return Err(DirectoryError::InvalidConfig(format!(
            "filter must be enclosed in parentheses: {template}"
        )));
    }
    let mut depth: i32 = 0;
    for c in trimmed.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
    }
    if depth != 0 {
        return Err(DirectoryError::InvalidConfig(format!(
            "unbalanced parentheses in filter: {template}"
        )));
    }
    if !PLACEHOLDERS.iter().any(|p| trimmed.contains(p)) {
        return Err(DirectoryError::InvalidConfig(format!(
            "filter has no timestamp placeholder {{0}}: {template}"
        )));
    }
    Ok(())
}
