//! PyPI JSON API adapter

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    is_pep440_prerelease, normalize_to_fixpoint, path_segments, require_external_id,
    strip_leading, ReleaseSource, SourceClient,
};
use crate::models::{CanonicalRelease, SourceKind};
use crate::utils::error::SourceError;
use crate::utils::parse_timestamp;

const HOSTS: &[&str] = &[
    "pypi.org",
    "www.pypi.org",
    "pypi.python.org",
    "pypi.io",
];

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    info: ProjectInfo,
    #[serde(default)]
    releases: HashMap<String, Vec<DistFile>>,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    #[serde(default)]
    version: String,
    release_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DistFile {
    upload_time: Option<String>,
    url: Option<String>,
    size: Option<i64>,
    packagetype: Option<String>,
}

impl DistFile {
    fn content_type(&self) -> Option<String> {
        let kind = match self.packagetype.as_deref()? {
            "sdist" => "application/gzip",
            "bdist_wheel" => "application/zip",
            _ => "application/octet-stream",
        };
        Some(kind.to_string())
    }
}

/// PyPI release source
pub struct PypiSource {
    client: Arc<SourceClient>,
    base_url: String,
}

impl PypiSource {
    /// Create an adapter against `base_url` (normally `https://pypi.org/pypi`)
    pub fn new(client: Arc<SourceClient>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn project(&self, external_id: &str) -> Result<ProjectDocument, SourceError> {
        let name = require_external_id(external_id)?;
        let url = format!("{}/{name}/json", self.base_url);
        self.client.get_json(&url, HeaderMap::new()).await
    }
}

/// Release for `version`, dated and linked from its first uploaded file
fn canonical_release(version: String, files: &[DistFile]) -> CanonicalRelease {
    let first = files.first();

    CanonicalRelease {
        release_date: first
            .and_then(|f| f.upload_time.as_deref())
            .and_then(parse_timestamp),
        is_prerelease: is_pep440_prerelease(&version),
        download_url: first.and_then(|f| f.url.clone()),
        size: first.and_then(|f| f.size),
        content_type: first.and_then(DistFile::content_type),
        version,
        ..Default::default()
    }
}

/// PEP 503 normalized project name from any PyPI URL form
fn normalize_pass(input: &str) -> String {
    let segments = path_segments(input, HOSTS);
    let mut segments = strip_leading(&segments, &["project"]);
    for prefix in ["simple", "pypi"] {
        segments = strip_leading(&segments, &[prefix]);
    }

    let Some(name) = segments.first() else {
        return String::new();
    };

    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    normalized
}

#[async_trait]
impl ReleaseSource for PypiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pypi
    }

    async fn fetch_releases(&self, external_id: &str) -> Result<Vec<CanonicalRelease>, SourceError> {
        let document = self.project(external_id).await?;

        let mut releases: Vec<CanonicalRelease> = document
            .releases
            .into_iter()
            .map(|(version, files)| canonical_release(version, &files))
            .collect();

        releases.sort_by(|a, b| {
            a.release_date
                .cmp(&b.release_date)
                .then_with(|| a.version.cmp(&b.version))
        });

        Ok(releases)
    }

    async fn fetch_latest_release(
        &self,
        external_id: &str,
    ) -> Result<Option<CanonicalRelease>, SourceError> {
        let mut document = match self.project(external_id).await {
            Ok(document) => document,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let version = document.info.version.trim().to_string();
        if version.is_empty() {
            return Ok(None);
        }

        let files = document.releases.remove(&version).unwrap_or_default();
        let mut release = canonical_release(version, &files);
        release.changelog_url = document.info.release_url.take();
        Ok(Some(release))
    }

    fn normalize_external_id(&self, input: &str) -> String {
        normalize_to_fixpoint(input, normalize_pass)
    }
}
