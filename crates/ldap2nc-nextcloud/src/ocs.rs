//! OCS response envelope.
//!
//! Every OCS endpoint answers with
//! `{ "ocs": { "meta": { status, statuscode, message }, "data": ... } }`.
//! The success sentinel depends on the endpoint version: v1 reports `100`,
//! v2 reports `200`. Callers pick the version per endpoint.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{NextcloudError, NextcloudResult};

/// OCS API generation of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    /// Application status code that signals success for this version.
    #[must_use]
    pub fn success_code(self) -> i64 {
        match self {
            ApiVersion::V1 => 100,
            ApiVersion::V2 => 200,
        }
    }

    /// Path prefix of the OCS entry point.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            ApiVersion::V1 => "ocs/v1.php",
            ApiVersion::V2 => "ocs/v2.php",
        }
    }
}

/// Top-level OCS document.
#[derive(Debug, Clone, Deserialize)]
pub struct OcsResponse {
    pub ocs: OcsBody,
}

/// Meta block plus payload.
#[derive(Debug, Clone, Deserialize)]
pub struct OcsBody {
    pub meta: OcsMeta,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Application-level status of an OCS call.
#[derive(Debug, Clone, Deserialize)]
pub struct OcsMeta {
    #[serde(default)]
    pub status: String,
    pub statuscode: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub totalitems: Option<String>,
    #[serde(default)]
    pub itemsperpage: Option<String>,
}

impl OcsResponse {
    /// Parse a raw body.
    pub fn parse(body: &str) -> NextcloudResult<Self> {
        serde_json::from_str(body).map_err(|e| {
            NextcloudError::Parse(format!("not an OCS envelope ({e}): {}", truncate(body)))
        })
    }

    #[must_use]
    pub fn statuscode(&self) -> i64 {
        self.ocs.meta.statuscode
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.ocs.meta.message.clone().unwrap_or_default()
    }

    /// Check the status against the endpoint's sentinel.
    ///
    /// OCS status 429 is reported as rate limiting so the retry loop sees it.
    pub fn ensure_success(self, version: ApiVersion, operation: &str) -> NextcloudResult<Self> {
        let code = self.statuscode();
        if code == version.success_code() {
            return Ok(self);
        }
        if code == 429 {
            return Err(NextcloudError::RateLimited {
                retry_after_secs: None,
            });
        }
        Err(NextcloudError::Api {
            operation: operation.to_string(),
            statuscode: code,
            message: self.message(),
        })
    }

    /// Decode the `data` payload.
    ///
    /// Nextcloud serializes an empty payload as `[]`, so callers that expect an
    /// object should use [`OcsResponse::data_field`] instead.
    pub fn data<T: DeserializeOwned>(self) -> NextcloudResult<T> {
        serde_json::from_value(self.ocs.data).map_err(NextcloudError::from)
    }

    /// Decode one member of the `data` object, absent members decode from `null`.
    pub fn data_field<T: DeserializeOwned>(&self, field: &str) -> NextcloudResult<T> {
        let value = self
            .ocs
            .data
            .get(field)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).map_err(NextcloudError::from)
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
