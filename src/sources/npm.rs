//! npm registry adapter
//!
//! One release per key of the packument's `versions` map, dated from its
//! `time` map. The registry carries no changelog text, only a repository
//! link that is turned into a release-tag URL.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    is_semver_prerelease, normalize_to_fixpoint, path_segments, require_external_id,
    strip_leading, ReleaseSource, SourceClient,
};
use crate::models::{CanonicalRelease, SourceKind};
use crate::utils::error::SourceError;
use crate::utils::parse_timestamp;
use reqwest::header::HeaderMap;

const HOSTS: &[&str] = &[
    "npmjs.com",
    "www.npmjs.com",
    "npmjs.org",
    "www.npmjs.org",
    "registry.npmjs.org",
];

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default)]
    versions: HashMap<String, VersionManifest>,
    #[serde(default)]
    time: HashMap<String, String>,
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct VersionManifest {
    repository: Option<Repository>,
    dist: Option<Dist>,
}

#[derive(Debug, Deserialize)]
struct Dist {
    tarball: Option<String>,
    #[serde(rename = "unpackedSize")]
    unpacked_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Repository {
    Url(String),
    Object { url: Option<String> },
}

impl Repository {
    /// Browsable repository URL (`git+https://…/x.git` → `https://…/x`)
    fn web_url(&self) -> Option<String> {
        let raw = match self {
            Self::Url(url) => url.as_str(),
            Self::Object { url } => url.as_deref()?,
        };

        let mut url = raw.trim().trim_start_matches("git+");
        url = url.trim_end_matches('/');
        url = url.strip_suffix(".git").unwrap_or(url);

        if url.is_empty() {
            None
        } else {
            Some(url.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestManifest {
    version: String,
}

/// npm registry release source
pub struct NpmSource {
    client: Arc<SourceClient>,
    base_url: String,
}

impl NpmSource {
    /// Create an adapter against `base_url` (normally `https://registry.npmjs.org`)
    pub fn new(client: Arc<SourceClient>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Registry path for a package; scoped names keep their `@` and encode the `/`
    fn package_path(name: &str) -> String {
        name.replacen('/', "%2F", 1)
    }
}

fn canonical_release(
    version: String,
    manifest: &VersionManifest,
    packument: &Packument,
) -> CanonicalRelease {
    let repository = manifest
        .repository
        .as_ref()
        .or(packument.repository.as_ref())
        .and_then(Repository::web_url);

    let dist = manifest.dist.as_ref();

    CanonicalRelease {
        release_date: packument.time.get(&version).and_then(|t| parse_timestamp(t)),
        changelog_url: repository.map(|repo| format!("{repo}/releases/tag/{version}")),
        is_prerelease: is_semver_prerelease(&version),
        download_url: dist.and_then(|d| d.tarball.clone()),
        size: dist.and_then(|d| d.unpacked_size),
        content_type: dist
            .and_then(|d| d.tarball.as_ref())
            .map(|_| "application/gzip".to_string()),
        version,
        ..Default::default()
    }
}

/// Package name (with `@scope/` when scoped) from any npm URL form
fn normalize_pass(input: &str) -> String {
    let decoded = input.replace("%40", "@").replace("%2F", "/").replace("%2f", "/");
    let segments = path_segments(&decoded, HOSTS);
    let segments = strip_leading(&segments, &["package"]);

    let take = match segments.first() {
        Some(first) if first.starts_with('@') => 2,
        _ => 1,
    };

    segments
        .iter()
        .take(take)
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ReleaseSource for NpmSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Npm
    }

    async fn fetch_releases(&self, external_id: &str) -> Result<Vec<CanonicalRelease>, SourceError> {
        let name = require_external_id(external_id)?;
        let url = format!("{}/{}", self.base_url, Self::package_path(name));

        let packument: Packument = self.client.get_json(&url, HeaderMap::new()).await?;

        let mut releases: Vec<CanonicalRelease> = packument
            .versions
            .iter()
            .map(|(version, manifest)| canonical_release(version.clone(), manifest, &packument))
            .collect();

        // Oldest first so new releases are stored and announced in order
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
        let name = require_external_id(external_id)?;
        let url = format!("{}/{}/latest", self.base_url, Self::package_path(name));

        match self.client.get_json::<LatestManifest>(&url, HeaderMap::new()).await {
            Ok(latest) if latest.version.trim().is_empty() => Ok(None),
            Ok(latest) => Ok(Some(CanonicalRelease {
                is_prerelease: is_semver_prerelease(&latest.version),
                ..CanonicalRelease::new(latest.version)
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn normalize_external_id(&self, input: &str) -> String {
        normalize_to_fixpoint(input, normalize_pass)
    }
}
