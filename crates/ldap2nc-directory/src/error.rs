//! Directory access errors.

use thiserror::Error;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// TCP/TLS connection could not be established.
    #[error("LDAP connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// Bind rejected (result code 49 or other non-zero code).
    #[error("LDAP bind as {bind_dn} failed: {message}")]
    Bind { bind_dn: String, message: String },

    /// The initial search request could not be sent or was not answered.
    #[error("LDAP search could not be started: {0}")]
    SearchStart(String),

    /// The server answered the search with an error while paging.
    #[error("LDAP search failed: {0}")]
    Search(String),

    #[error("invalid LDAP configuration: {0}")]
    InvalidConfig(String),
}

impl DirectoryError {
    /// Connection, bind and search-start failures mean the directory is
    /// unreachable for this run; errors while paging are reported separately.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Bind { .. } | Self::SearchStart(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        let conn = DirectoryError::Connection {
            url: "ldap://ldap:389".into(),
            message: "refused".into(),
        };
        let bind = DirectoryError::Bind {
            bind_dn: "cn=admin".into(),
            message: "invalid credentials".into(),
        };
        assert!(conn.is_connectivity());
        assert!(bind.is_connectivity());
        assert!(!DirectoryError::Search("size limit".into()).is_connectivity());
        assert!(DirectoryError::SearchStart("connection reset".into()).is_connectivity());
        assert!(conn.to_string().contains("ldap://ldap:389"));
    }
}
