//! crates.io adapter

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    is_semver_prerelease, normalize_to_fixpoint, path_segments, require_external_id,
    strip_leading, ReleaseSource, SourceClient,
};
use crate::models::{CanonicalRelease, SourceKind};
use crate::utils::error::SourceError;
use crate::utils::parse_timestamp;

const HOSTS: &[&str] = &["crates.io", "www.crates.io"];

#[derive(Debug, Deserialize)]
struct CrateDocument {
    #[serde(rename = "crate")]
    krate: CrateInfo,
    #[serde(default)]
    versions: Vec<CrateVersion>,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    repository: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrateVersion {
    num: String,
    created_at: Option<String>,
    dl_path: Option<String>,
    crate_size: Option<i64>,
    #[serde(default)]
    yanked: bool,
}

/// crates.io API v1 release source
pub struct CratesSource {
    client: Arc<SourceClient>,
    base_url: String,
}

impl CratesSource {
    /// Create an adapter against `base_url` (normally `https://crates.io`)
    pub fn new(client: Arc<SourceClient>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Non-yanked versions, newest first as the API lists them
    async fn versions(&self, external_id: &str) -> Result<Vec<CanonicalRelease>, SourceError> {
        let name = require_external_id(external_id)?;
        let url = format!("{}/api/v1/crates/{name}", self.base_url);

        let document: CrateDocument = self.client.get_json(&url, HeaderMap::new()).await?;
        let repository = document
            .krate
            .repository
            .map(|r| r.trim().trim_end_matches('/').to_string())
            .filter(|r| !r.is_empty());

        Ok(document
            .versions
            .into_iter()
            .filter(|v| !v.yanked)
            .map(|v| self.canonical_release(v, repository.as_deref()))
            .collect())
    }

    fn canonical_release(&self, version: CrateVersion, repository: Option<&str>) -> CanonicalRelease {
        let download_url = version.dl_path.map(|path| {
            if path.starts_with("http://") || path.starts_with("https://") {
                path
            } else {
                format!("{}/{}", self.base_url, path.trim_start_matches('/'))
            }
        });

        CanonicalRelease {
            release_date: version.created_at.as_deref().and_then(parse_timestamp),
            changelog_url: repository.map(|repo| format!("{repo}/releases/tag/v{}", version.num)),
            is_prerelease: is_semver_prerelease(&version.num),
            content_type: download_url.as_ref().map(|_| "application/x-tar".to_string()),
            download_url,
            size: version.crate_size,
            version: version.num,
            ..Default::default()
        }
    }
}

/// Crate name from any crates.io URL form
fn normalize_pass(input: &str) -> String {
    let segments = path_segments(input, HOSTS);
    let segments = strip_leading(&segments, &["api", "v1", "crates"]);
    let segments = strip_leading(&segments, &["crates"]);

    segments.first().map(|s| s.to_string()).unwrap_or_default()
}

#[async_trait]
impl ReleaseSource for CratesSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Crates
    }

    async fn fetch_releases(&self, external_id: &str) -> Result<Vec<CanonicalRelease>, SourceError> {
        let mut releases = self.versions(external_id).await?;
        releases.reverse();
        Ok(releases)
    }

    async fn fetch_latest_release(
        &self,
        external_id: &str,
    ) -> Result<Option<CanonicalRelease>, SourceError> {
        match self.versions(external_id).await {
            Ok(versions) => Ok(versions.into_iter().next()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn normalize_external_id(&self, input: &str) -> String {
        normalize_to_fixpoint(input, normalize_pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetcherConfig;

    fn source() -> CratesSource {
        let client = Arc::new(SourceClient::new(&FetcherConfig::default()).unwrap());
        CratesSource::new(client, "https://crates.io/")
    }

    #[test]
    fn test_normalize_forms() {
        let crates = source();
        for input in [
            "serde",
            "https://crates.io/crates/serde",
            "https://crates.io/crates/serde/1.0.0",
            "crates.io/crates/serde/",
            "https://crates.io/api/v1/crates/serde",
            "https://crates.io/api/v1/crates/serde/versions",
        ] {
            assert_eq!(crates.normalize_external_id(input), "serde", "input: {input}");
        }
    }

    #[test]
    fn test_crate_named_crates() {
        assert_eq!(source().normalize_external_id("crates"), "crates");
    }

    #[test]
    fn test_version_mapping() {
        let version: CrateVersion = serde_json::from_value(serde_json::json!({
            "num": "1.0.0-rc.1",
            "created_at": "2024-01-05T10:00:00.123456+00:00",
            "dl_path": "/api/v1/crates/foo/1.0.0-rc.1/download",
            "crate_size": 4096,
            "yanked": false
        }))
        .unwrap();

        let release = source().canonical_release(version, Some("https://github.com/acme/foo"));
        assert!(release.is_prerelease);
        assert_eq!(
            release.download_url.as_deref(),
            Some("https://crates.io/api/v1/crates/foo/1.0.0-rc.1/download")
        );
        assert_eq!(
            release.changelog_url.as_deref(),
            Some("https://github.com/acme/foo/releases/tag/v1.0.0-rc.1")
        );
        assert_eq!(release.size, Some(4096));
        assert!(release.release_date.is_some());
    }
}
