//! `PyPI` JSON API source.
//!
//! Fetches `{base_url}/{name}/json` and maps it onto [`PackageMetadata`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::RegistryError;
use crate::manifest::parse_requirement;
use crate::model::{normalize_name, PackageMetadata};
use crate::traits::RegistrySource;

const INACTIVE_CLASSIFIER: &str = "Development Status :: 7 - Inactive";

#[derive(Deserialize)]
struct PyPiResponse {
    info: PyPiInfo,
    #[serde(default)]
    releases: HashMap<String, Vec<PyPiFile>>,
}

#[derive(Deserialize)]
struct PyPiInfo {
    name: String,
    version: String,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    classifiers: Vec<String>,
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
    /// Not part of the upstream API; honoured when a mirror provides it.
    #[serde(default)]
    deprecated: Option<bool>,
    #[serde(default)]
    deprecation_message: Option<String>,
}

#[derive(Deserialize)]
struct PyPiFile {
    upload_time_iso_8601: Option<DateTime<Utc>>,
}

/// HTTP client for a `PyPI`-compatible JSON registry.
pub struct PypiSource {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PypiSource {
    /// Builds a source with the given per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dep-health/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl RegistrySource for PypiSource {
    fn registry_id(&self) -> &str {
        "pypi"
    }

    async fn fetch(&self, name: &str) -> Result<PackageMetadata, RegistryError> {
        let url = format!("{}/{}/json", self.base_url, urlencoding::encode(name));
        let resp = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout(self.timeout)
            } else {
                RegistryError::Http(e)
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(RegistryError::Unavailable {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        let data: PyPiResponse =
            serde_json::from_str(&body).map_err(|e| RegistryError::Decode(e.to_string()))?;
        Ok(into_metadata(data))
    }
}

fn into_metadata(data: PyPiResponse) -> PackageMetadata {
    // Order versions by first upload; releases without files sort last.
    let mut releases: Vec<(Option<DateTime<Utc>>, String)> = data
        .releases
        .into_iter()
        .map(|(version, files)| {
            let first_upload = files.iter().filter_map(|f| f.upload_time_iso_8601).min();
            (first_upload, version)
        })
        .collect();
    releases.sort_by(|(a_time, a_ver), (b_time, b_ver)| match (a_time, b_time) {
        (Some(a), Some(b)) => a.cmp(b).then_with(|| a_ver.cmp(b_ver)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a_ver.cmp(b_ver),
    });
    let last_release = releases.iter().filter_map(|(time, _)| *time).max();
    let all_versions = releases.into_iter().map(|(_, version)| version).collect();

    let info = data.info;
    let license = info
        .license
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && l.len() < 200 && !l.eq_ignore_ascii_case("unknown"))
        .or_else(|| license_from_classifiers(&info.classifiers));

    let requires = info
        .requires_dist
        .unwrap_or_default()
        .iter()
        .filter(|spec| !spec.split(';').nth(1).is_some_and(|marker| marker.contains("extra")))
        .filter_map(|spec| parse_requirement(spec).ok())
        .map(|req| normalize_name(&req.name))
        .fold(Vec::new(), |mut acc, name| {
            if !acc.contains(&name) {
                acc.push(name);
            }
            acc
        });

    let deprecated = info.deprecated.unwrap_or(false)
        || info.deprecation_message.is_some()
        || info.classifiers.iter().any(|c| c == INACTIVE_CLASSIFIER);

    PackageMetadata {
        name: normalize_name(&info.name),
        latest_version: info.version,
        all_versions,
        license,
        deprecated,
        deprecation_message: info.deprecation_message,
        requires,
        last_release,
    }
}

/// `License :: OSI Approved :: MIT License` -> `MIT License`
fn license_from_classifiers(classifiers: &[String]) -> Option<String> {
    classifiers
        .iter()
        .filter(|c| c.starts_with("License ::"))
        .filter_map(|c| c.rsplit(" :: ").next())
        .find(|l| *l != "OSI Approved")
        .map(str::to_string)
}
