//! OCS provisioning API client (reqwest-based).
//!
//! Talks to `/ocs/v1.php/cloud/...` for users, groups and memberships, and to
//! `/ocs/v2.php/cloud/groups/{id}` for the one call that only exists in v2.
//! Mutating calls go through the [`RetryPolicy`]; reads do not.

use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::NextcloudConfig;
use crate::error::{NextcloudError, NextcloudResult};
use crate::models::{NextcloudGroup, NextcloudUser, UserDraft, UserField};
use crate::ocs::{ApiVersion, OcsResponse};
use crate::retry::RetryPolicy;

/// OCS status the server answers `createUser` with when the id is taken.
const OCS_USER_EXISTS: i64 = 102;

/// OCS statuses meaning "no such user" on `GET /cloud/users/{id}`.
const OCS_NOT_FOUND: [i64; 2] = [404, 998];

/// Nextcloud provisioning API client.
#[derive(Clone)]
pub struct NextcloudClient {
    base_url: Url,
    ocs_user: String,
    ocs_password: String,
    http_client: Client,
    retry_policy: RetryPolicy,
    page_size: u32,
}

impl std::fmt::Debug for NextcloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextcloudClient")
            .field("base_url", &self.base_url.as_str())
            .field("ocs_user", &self.ocs_user)
            .field("ocs_password", &"***REDACTED***")
            .field("retry_policy", &self.retry_policy)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl NextcloudClient {
    /// Create a client from configuration.
    pub fn new(config: &NextcloudConfig) -> NextcloudResult<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.trust_all_certificates)
            .user_agent(concat!("ldap2nc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                NextcloudError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;

        if config.trust_all_certificates {
            warn!(base_url = %config.base_url, "TLS certificate verification disabled");
        }

        Self::with_http_client(config, http_client)
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    pub fn with_http_client(config: &NextcloudConfig, http_client: Client) -> NextcloudResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| NextcloudError::InvalidConfig(format!("base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(NextcloudError::InvalidConfig(format!(
                "base_url is not a hierarchical URL: {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            ocs_user: config.ocs_user.clone(),
            ocs_password: config.ocs_password.clone(),
            http_client,
            retry_policy: RetryPolicy::from(&config.retry),
            page_size: config.page_size.max(1),
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    // ── Reads ─────────────────────────────────────────────────────────

    /// All user identifiers, paging with `limit`/`offset`.
    #[instrument(skip(self))]
    pub async fn list_user_ids(&self) -> NextcloudResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut offset: u32 = 0;
        loop {
            let mut url = self.endpoint(ApiVersion::V1, &["users"])?;
            self.page(&mut url, offset);
            let page: Option<Vec<String>> = self
                .send("listUsers", ApiVersion::V1, self.request(Method::GET, url))
                .await?
                .data_field("users")?;
            let page = page.unwrap_or_default();
            let count = page.len();
            ids.extend(page);
            if self.is_last_page(count) {
                break;
            }
            offset += self.page_size;
        }
        debug!(count = ids.len(), "Listed platform users");
        Ok(ids)
    }

    /// All groups with display names.
    #[instrument(skip(self))]
    pub async fn list_groups(&self) -> NextcloudResult<Vec<NextcloudGroup>> {
        let mut groups = Vec::new();
        let mut offset: u32 = 0;
        loop {
            let mut url = self.endpoint(ApiVersion::V1, &["groups", "details"])?;
            self.page(&mut url, offset);
            let page: Option<Vec<NextcloudGroup>> = self
                .send("listGroups", ApiVersion::V1, self.request(Method::GET, url))
                .await?
                .data_field("groups")?;
            let page = page.unwrap_or_default();
            let count = page.len();
            groups.extend(page);
            if self.is_last_page(count) {
                break;
            }
            offset += self.page_size;
        }
        debug!(count = groups.len(), "Listed platform groups");
        Ok(groups)
    }

    /// Look up one user. An unknown id is `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn find_user_by_id(&self, user_id: &str) -> NextcloudResult<Option<NextcloudUser>> {
        let url = self.endpoint(ApiVersion::V1, &["users", user_id])?;
        match self
            .send("getUser", ApiVersion::V1, self.request(Method::GET, url))
            .await
        {
            Ok(response) => Ok(Some(response.data()?)),
            Err(NextcloudError::Api { statuscode, .. }) if OCS_NOT_FOUND.contains(&statuscode) => {
                Ok(None)
            }
            Err(NextcloudError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ── Users ─────────────────────────────────────────────────────────

    /// Create a user from a draft, including its initial groups.
    ///
    /// Returns [`NextcloudError::UserAlreadyExists`] when the id is taken.
    #[instrument(skip(self, draft), fields(user = %draft.id))]
    pub async fn create_user(&self, draft: &UserDraft) -> NextcloudResult<()> {
        let url = self.endpoint(ApiVersion::V1, &["users"])?;
        let mut form: Vec<(&str, &str)> = vec![("userid", draft.id.as_str())];
        let optional = [
            ("displayName", draft.field(UserField::DisplayName)),
            ("email", draft.field(UserField::Email)),
            ("quota", draft.field(UserField::Quota)),
            ("language", draft.field(UserField::Language)),
        ];
        form.extend(optional.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));
        form.extend(draft.groups.iter().map(|g| ("groups[]", g.as_str())));

        match self
            .mutate("createUser", ApiVersion::V1, || {
                self.request(Method::POST, url.clone()).form(&form)
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(NextcloudError::Api { statuscode, .. }) if statuscode == OCS_USER_EXISTS => {
                Err(NextcloudError::UserAlreadyExists(draft.id.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Set one scalar property.
    #[instrument(skip(self, value))]
    pub async fn update_user_field(
        &self,
        user_id: &str,
        field: UserField,
        value: &str,
    ) -> NextcloudResult<()> {
        let url = self.endpoint(ApiVersion::V1, &["users", user_id])?;
        let form = [("key", field.key()), ("value", value)];
        self.mutate("editUser", ApiVersion::V1, || {
            self.request(Method::PUT, url.clone()).form(&form)
        })
        .await
        .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> NextcloudResult<()> {
        let url = self.endpoint(ApiVersion::V1, &["users", user_id])?;
        self.mutate("deleteUser", ApiVersion::V1, || {
            self.request(Method::DELETE, url.clone())
        })
        .await
        .map(|_| ())
    }

    // ── Groups ────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn create_group(&self, group_id: &str, displayname: &str) -> NextcloudResult<()> {
        let url = self.endpoint(ApiVersion::V1, &["groups"])?;
        let form = [("groupid", group_id), ("displayname", displayname)];
        self.mutate("createGroup", ApiVersion::V1, || {
            self.request(Method::POST, url.clone()).form(&form)
        })
        .await
        .map(|_| ())
    }

    /// Rename a group. Only available on the v2 endpoint.
    #[instrument(skip(self))]
    pub async fn update_group_displayname(
        &self,
        group_id: &str,
        displayname: &str,
    ) -> NextcloudResult<()> {
        let url = self.endpoint(ApiVersion::V2, &["groups", group_id])?;
        let form = [("key", "displayname"), ("value", displayname)];
        self.mutate("updateGroup", ApiVersion::V2, || {
            self.request(Method::PUT, url.clone()).form(&form)
        })
        .await
        .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn delete_group(&self, group_id: &str) -> NextcloudResult<()> {
        let url = self.endpoint(ApiVersion::V1, &["groups", group_id])?;
        self.mutate("deleteGroup", ApiVersion::V1, || {
            self.request(Method::DELETE, url.clone())
        })
        .await
        .map(|_| ())
    }

    // ── Memberships ───────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> NextcloudResult<()> {
        let url = self.endpoint(ApiVersion::V1, &["users", user_id, "groups"])?;
        let form = [("groupid", group_id)];
        self.mutate("addToGroup", ApiVersion::V1, || {
            self.request(Method::POST, url.clone()).form(&form)
        })
        .await
        .map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> NextcloudResult<()> {
        let mut url = self.endpoint(ApiVersion::V1, &["users", user_id, "groups"])?;
        url.query_pairs_mut().append_pair("groupid", group_id);
        self.mutate("removeFromGroup", ApiVersion::V1, || {
            self.request(Method::DELETE, url.clone())
        })
        .await
        .map(|_| ())
    }

    // ── Plumbing ──────────────────────────────────────────────────────

    /// Build `<base>/ocs/v{n}.php/cloud/<segments...>?format=json`.
    ///
    /// Segments are percent-encoded, so identifiers with `/` or spaces are safe.
    fn endpoint(&self, version: ApiVersion, segments: &[&str]) -> NextcloudResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                NextcloudError::InvalidConfig("base_url cannot carry a path".to_string())
            })?;
            path.pop_if_empty();
            path.extend(version.prefix().split('/'));
            path.push("cloud");
            path.extend(segments);
        }
        url.query_pairs_mut().append_pair("format", "json");
        Ok(url)
    }

    fn page(&self, url: &mut Url, offset: u32) {
        url.query_pairs_mut()
            .append_pair("limit", &self.page_size.to_string())
            .append_pair("offset", &offset.to_string());
    }

    /// A short or empty page ends the listing. An oversized page means the
    /// server ignored `limit` and already returned everything.
    fn is_last_page(&self, count: usize) -> bool {
        count == 0 || count != self.page_size as usize
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .basic_auth(&self.ocs_user, Some(&self.ocs_password))
            .header("OCS-APIRequest", "true")
            .header(ACCEPT, "application/json")
    }

    async fn mutate<F>(
        &self,
        operation: &str,
        version: ApiVersion,
        build: F,
    ) -> NextcloudResult<OcsResponse>
    where
        F: Fn() -> RequestBuilder,
    {
        self.retry_policy
            .execute(operation, || {
                let request = build();
                async move { self.send(operation, version, request).await }
            })
            .await
    }

    /// Send one request and interpret the envelope.
    ///
    /// v1 endpoints answer HTTP 200 with the failure inside the envelope; v2
    /// endpoints mirror the status in HTTP. The envelope wins when present.
    async fn send(
        &self,
        operation: &str,
        version: ApiVersion,
        request: RequestBuilder,
    ) -> NextcloudResult<OcsResponse> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            warn!(operation, ?retry_after, "Nextcloud rate limited");
            return Err(NextcloudError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let body = response.text().await?;
        match OcsResponse::parse(&body) {
            Ok(envelope) => envelope.ensure_success(version, operation),
            Err(_) if !status.is_success() => Err(NextcloudError::Http {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.chars().take(200).collect()
                },
            }),
            Err(e) => Err(e),
        }
    }
}
