//! Paged LDAP extraction.
//!
//! Every call opens its own connection, binds, runs one paged search and
//! unbinds. Paging uses the simple paged results control; the adapter keeps
//! requesting pages until the server returns an empty cookie.

use chrono::{DateTime, Utc};
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, SearchEntry};
use tracing::{debug, info, instrument, warn};

use crate::config::LdapConfig;
use crate::entry::{DirectoryEntry, DirectorySnapshot};
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::{full_resync, render_filter};

/// LDAP result code for invalid credentials.
const LDAP_INVALID_CREDENTIALS: u32 = 49;

/// Reader for the user directory.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    config: LdapConfig,
}

impl LdapDirectory {
    pub fn new(config: LdapConfig) -> DirectoryResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Identifiers of every entry matching the filter, regardless of
    /// modification time. Only the identifier attribute is requested.
    #[instrument(skip(self), fields(base_dn = %self.config.base_dn))]
    pub async fn list_identifiers(&self) -> DirectoryResult<DirectorySnapshot> {
        self.list_entries(full_resync(), false).await
    }

    /// Entries modified since `since`. `with_attributes` selects the
    /// configured attribute list instead of the identifier alone.
    #[instrument(skip(self), fields(base_dn = %self.config.base_dn))]
    pub async fn list_entries(
        &self,
        since: DateTime<Utc>,
        with_attributes: bool,
    ) -> DirectoryResult<DirectorySnapshot> {
        let filter = render_filter(&self.config.filter, since);
        let attrs = if with_attributes {
            self.config.requested_attributes()
        } else {
            vec![self.config.user_id_attribute.clone()]
        };
        debug!(filter = %filter, ?attrs, "Searching directory");

        let mut ldap = self.connect().await?;
        let result = self.paged_search(&mut ldap, &filter, attrs).await;
        if let Err(e) = ldap.unbind().await {
            debug!(error = %e, "LDAP unbind failed");
        }
        let snapshot = result?;

        if snapshot.is_empty() {
            info!("No directory entries found");
        } else {
            info!(
                entries = snapshot.len(),
                duplicates = snapshot.duplicates(),
                skipped = snapshot.skipped(),
                "Loaded directory entries"
            );
        }
        Ok(snapshot)
    }

    async fn paged_search(
        &self,
        ldap: &mut Ldap,
        filter: &str,
        attrs: Vec<String>,
    ) -> DirectoryResult<DirectorySnapshot> {
        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(self.config.page_size)),
        ];

        ldap.with_timeout(self.config.timeout());
        let mut search = ldap
            .streaming_search_with(
                adapters,
                &self.config.base_dn,
                self.config.scope.into(),
                filter,
                attrs,
            )
            .await
            .map_err(|e| DirectoryError::SearchStart(e.to_string()))?;

        let id_attribute = &self.config.user_id_attribute;
        let mut snapshot = DirectorySnapshot::new();
        while let Some(raw) = search
            .next()
            .await
            .map_err(|e| DirectoryError::Search(e.to_string()))?
        {
            let entry = SearchEntry::construct(raw);
            if !entry.bin_attrs.is_empty() {
                debug!(dn = %entry.dn, "Ignoring binary attributes");
            }
            match DirectoryEntry::new(entry.dn.clone(), entry.attrs, id_attribute) {
                Some(e) => snapshot.insert(e),
                None => {
                    warn!(dn = %entry.dn, attribute = %id_attribute, "Entry has no identifier, skipped");
                    snapshot.record_skipped();
                }
            }
        }

        search
            .finish()
            .await
            .success()
            .map_err(|e| DirectoryError::Search(e.to_string()))?;

        Ok(snapshot)
    }

    /// Connect and bind.
    async fn connect(&self) -> DirectoryResult<Ldap> {
        let url = self.config.url();
        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.timeout())
            .set_starttls(self.config.use_starttls)
            .set_no_tls_verify(self.config.trust_all_certificates);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| DirectoryError::Connection {
                url: url.clone(),
                message: e.to_string(),
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");
        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| DirectoryError::Bind {
                bind_dn: bind_dn.clone(),
                message: e.to_string(),
            })?;

        if result.rc != 0 {
            let message = if result.rc == LDAP_INVALID_CREDENTIALS {
                "invalid credentials".to_string()
            } else {
                format!("result code {}: {}", result.rc, result.text)
            };
            return Err(DirectoryError::Bind {
                bind_dn: bind_dn.clone(),
                message,
            });
        }

        debug!(host = %self.config.host, "LDAP bind successful");
        Ok(ldap)
    }
}
