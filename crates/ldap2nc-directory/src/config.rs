//! LDAP connection and search configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DirectoryError, DirectoryResult};

/// Search scope below `base_dn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Base,
    #[serde(alias = "onelevel")]
    One,
    #[default]
    #[serde(alias = "subtree")]
    Sub,
}

impl From<SearchScope> for ldap3::Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => ldap3::Scope::Base,
            SearchScope::One => ldap3::Scope::OneLevel,
            SearchScope::Sub => ldap3::Scope::Subtree,
        }
    }
}

/// Configuration of the user directory.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Skip server certificate verification.
    #[serde(default)]
    pub trust_all_certificates: bool,

    /// Search base (e.g., "ou=people,dc=example,dc=com").
    pub base_dn: String,

    /// Bind DN for authentication.
    pub bind_dn: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    #[serde(default)]
    pub scope: SearchScope,

    /// Filter template; `{0}` is replaced by the watermark in generalized time,
    /// e.g. `(&(objectClass=inetOrgPerson)(modifyTimestamp>={0}))`.
    pub filter: String,

    /// Attribute whose value becomes the user identifier.
    #[serde(default = "default_user_id_attribute")]
    pub user_id_attribute: String,

    /// Attributes fetched in full mode. Empty means all user attributes.
    #[serde(default)]
    pub user_attributes: Vec<String>,

    /// Paged results page size.
    #[serde(default = "default_page_size")]
    pub page_size: i32,

    /// Connect and per-operation timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("trust_all_certificates", &self.trust_all_certificates)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("scope", &self.scope)
            .field("filter", &self.filter)
            .field("user_id_attribute", &self.user_id_attribute)
            .field("user_attributes", &self.user_attributes)
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_user_id_attribute() -> String {
    "uid".to_string()
}

fn default_page_size() -> i32 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

impl LdapConfig {
    /// Create a config with required fields and defaults for the rest.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
        filter: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            trust_all_certificates: false,
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            scope: SearchScope::default(),
            filter: filter.into(),
            user_id_attribute: default_user_id_attribute(),
            user_attributes: Vec::new(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Attributes to request in full mode. The identifier attribute is always
    /// included.
    #[must_use]
    pub fn requested_attributes(&self) -> Vec<String> {
        if self.user_attributes.is_empty() {
            return vec!["*".to_string()];
        }
        let mut attrs = self.user_attributes.clone();
        if !attrs
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&self.user_id_attribute))
        {
            attrs.push(self.user_id_attribute.clone());
        }
        attrs
    }

    pub fn validate(&self) -> DirectoryResult<()> {
        if self.host.is_empty() {
            return Err(DirectoryError::InvalidConfig("host is required".to_string()));
        }
        if self.base_dn.is_empty() {
            return Err(DirectoryError::InvalidConfig(
                "base_dn is required".to_string(),
            ));
        }
        if self.bind_dn.is_empty() {
            return Err(DirectoryError::InvalidConfig(
                "bind_dn is required".to_string(),
            ));
        }
        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::InvalidConfig(
                "cannot use both SSL and STARTTLS".to_string(),
            ));
        }
        if self.user_id_attribute.trim().is_empty() {
            return Err(DirectoryError::InvalidConfig(
                "user_id_attribute is required".to_string(),
            ));
        }
        if self.page_size <= 0 {
            return Err(DirectoryError::InvalidConfig(
                "page_size must be greater than 0".to_string(),
            ));
        }
        crate::filter::validate_template(&self.filter)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LdapConfig {
        LdapConfig::new(
            "ldap.example.com",
            "ou=people,dc=example,dc=com",
            "cn=admin,dc=example,dc=com",
            "(&(objectClass=inetOrgPerson)(modifyTimestamp>={0}))",
        )
    }

    #[test]
    fn test_defaults() {
        let c = config();
        assert_eq!(c.port, 389);
        assert_eq!(c.page_size, 1000);
        assert_eq!(c.scope, SearchScope::Sub);
        assert_eq!(c.url(), "ldap://ldap.example.com:389");
        assert!(c.validate().is_ok());
    }

    fn ldaps() -> LdapConfig {
        let mut c = config();
        c.use_ssl = true;
        c.port = 636;
        c
    }

    #[test]
    fn test_ssl_url() {
        assert_eq!(ldaps().url(), "ldaps://ldap.example.com:636");
    }

    #[test]
    fn test_ssl_and_starttls_rejected() {
        let mut c = ldaps();
        c.use_starttls = true;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_filter_without_placeholder_rejected() {
        let mut c = config();
        c.filter = "(objectClass=person)".into();
        assert!(matches!(
            c.validate(),
            Err(DirectoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let c = config().with_password("topsecret");
        let debug = format!("{c:?}");
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("***REDACTED***"));
    }

    #[test]
    fn test_requested_attributes_include_id() {
        let mut c = config();
        assert_eq!(c.requested_attributes(), vec!["*"]);
        c.user_attributes = vec!["cn".into(), "mail".into()];
        assert_eq!(c.requested_attributes(), vec!["cn", "mail", "uid"]);
        c.user_attributes = vec!["UID".into()];
        assert_eq!(c.requested_attributes(), vec!["UID"]);
    }

    #[test]
    fn test_scope_from_yaml_names() {
        let s: SearchScope = serde_json::from_str("\"one\"").unwrap();
        assert_eq!(s, SearchScope::One);
        let s: SearchScope = serde_json::from_str("\"subtree\"").unwrap();
        assert_eq!(s, SearchScope::Sub);
    }
}
