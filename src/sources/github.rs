//! GitHub releases adapter
//!
//! Lists `GET /repos/{owner}/{repo}/releases`. Repositories that only push
//! tags have no releases, so the latest-release fast path falls back to the
//! newest tag and dates it from its commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{normalize_to_fixpoint, path_segments, require_external_id, ReleaseSource, SourceClient};
use crate::models::{CanonicalRelease, SourceKind};
use crate::utils::error::SourceError;
use crate::utils::parse_timestamp;

const HOSTS: &[&str] = &["github.com", "www.github.com", "api.github.com"];

/// Releases per page requested from the API
const PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    tag_name: String,
    published_at: Option<String>,
    body: Option<String>,
    html_url: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    browser_download_url: Option<String>,
    size: Option<i64>,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubTag {
    name: String,
    commit: Option<GithubTagCommit>,
}

#[derive(Debug, Deserialize)]
struct GithubTagCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    commit: GithubCommitDetail,
}

#[derive(Debug, Deserialize)]
struct GithubCommitDetail {
    committer: Option<GithubSignature>,
    author: Option<GithubSignature>,
}

#[derive(Debug, Deserialize)]
struct GithubSignature {
    date: Option<String>,
}

impl From<GithubRelease> for CanonicalRelease {
    fn from(release: GithubRelease) -> Self {
        let asset = release.assets.into_iter().next();
        let (download_url, size, content_type) = match asset {
            Some(a) => (a.browser_download_url, a.size, a.content_type),
            None => (None, None, None),
        };

        Self {
            version: release.tag_name.clone(),
            tag_name: Some(release.tag_name).filter(|t| !t.is_empty()),
            release_date: release.published_at.as_deref().and_then(parse_timestamp),
            changelog: release.body,
            changelog_url: release.html_url,
            is_draft: release.draft,
            is_prerelease: release.prerelease,
            download_url,
            size,
            content_type,
        }
    }
}

/// GitHub REST v3 release source
pub struct GithubSource {
    client: Arc<SourceClient>,
    base_url: String,
    token: Option<String>,
}

impl GithubSource {
    /// Create an adapter against `base_url` (normally `https://api.github.com`)
    pub fn new(client: Arc<SourceClient>, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        if let Some(token) = &self.token {
            match HeaderValue::from_str(&format!("token {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("GitHub token contains invalid header characters, sending anonymously"),
            }
        }

        headers
    }

    async fn latest_tag(&self, repo: &str) -> Result<Option<CanonicalRelease>, SourceError> {
        let url = format!("{}/repos/{repo}/tags?per_page=1", self.base_url);
        let tags: Vec<GithubTag> = self.client.get_json(&url, self.headers()).await?;

        let Some(tag) = tags.into_iter().next() else {
            return Ok(None);
        };

        let release_date = match &tag.commit {
            Some(commit) => self.commit_date(repo, &commit.sha).await,
            None => None,
        };

        debug!(repo = %repo, tag = %tag.name, "Using newest tag as latest release");

        Ok(Some(CanonicalRelease {
            version: tag.name.clone(),
            tag_name: Some(tag.name),
            release_date: Some(release_date.unwrap_or_else(Utc::now)),
            ..Default::default()
        }))
    }

    /// Commit date of `sha`; `None` if it cannot be fetched
    async fn commit_date(&self, repo: &str, sha: &str) -> Option<DateTime<Utc>> {
        let url = format!("{}/repos/{repo}/commits/{sha}", self.base_url);
        match self.client.get_json::<GithubCommit>(&url, self.headers()).await {
            Ok(commit) => commit
                .commit
                .committer
                .or(commit.commit.author)
                .and_then(|sig| sig.date)
                .as_deref()
                .and_then(parse_timestamp),
            Err(e) => {
                debug!(repo = %repo, sha = %sha, error = %e, "Could not fetch tag commit date");
                None
            }
        }
    }
}

/// `owner/repo` from any GitHub URL form
fn normalize_pass(input: &str) -> String {
    let segments = path_segments(input, HOSTS);
    // API form: repos/{owner}/{repo}; on github.com "repos" is an owner name
    let lower = input.to_ascii_lowercase();
    let web_host = lower.contains("github.com") && !lower.contains("api.github.com");
    let segments = match segments.as_slice() {
        [first, _, _, ..] if !web_host && first.eq_ignore_ascii_case("repos") => &segments[1..],
        _ => &segments[..],
    };

    segments
        .iter()
        .take(2)
        .map(|seg| {
            let mut seg = *seg;
            while let Some(stripped) = seg.strip_suffix(".git") {
                seg = stripped;
            }
            seg
        })
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ReleaseSource for GithubSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Github
    }

    async fn fetch_releases(&self, external_id: &str) -> Result<Vec<CanonicalRelease>, SourceError> {
        let repo = require_external_id(external_id)?;
        let url = format!("{}/repos/{repo}/releases?per_page={PER_PAGE}", self.base_url);

        let releases: Vec<GithubRelease> = self.client.get_json(&url, self.headers()).await?;

        Ok(releases
            .into_iter()
            .filter(|r| !r.tag_name.trim().is_empty())
            .map(CanonicalRelease::from)
            .collect())
    }

    async fn fetch_latest_release(
        &self,
        external_id: &str,
    ) -> Result<Option<CanonicalRelease>, SourceError> {
        let repo = require_external_id(external_id)?;
        let url = format!("{}/repos/{repo}/releases/latest", self.base_url);

        match self.client.get_json::<GithubRelease>(&url, self.headers()).await {
            Ok(release) => Ok(Some(release.into())),
            Err(e) if e.is_not_found() => match self.latest_tag(repo).await {
                Err(e) if e.is_not_found() => Ok(None),
                other => other,
            },
            Err(e) => Err(e),
        }
    }

    fn normalize_external_id(&self, input: &str) -> String {
        normalize_to_fixpoint(input, normalize_pass)
    }
}
