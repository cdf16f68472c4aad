// Core data structures for the release ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream registry type a project is tracked on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Github,
    Gitlab,
    Npm,
    Pypi,
    Docker,
    Crates,
    Maven,
}

impl SourceKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Npm => "npm",
            Self::Pypi => "pypi",
            Self::Docker => "docker",
            Self::Crates => "crates",
            Self::Maven => "maven",
        }
    }

    /// Create from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "github" => Some(Self::Github),
            "gitlab" => Some(Self::Gitlab),
            "npm" => Some(Self::Npm),
            "pypi" => Some(Self::Pypi),
            "docker" => Some(Self::Docker),
            "crates" | "crates.io" => Some(Self::Crates),
            "maven" => Some(Self::Maven),
            _ => None,
        }
    }

    /// Get all source kinds
    pub fn all() -> Vec<Self> {
        vec![
            Self::Github,
            Self::Gitlab,
            Self::Npm,
            Self::Pypi,
            Self::Docker,
            Self::Crates,
            Self::Maven,
        ]
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown release source: {s}"))
    }
}

/// Source-agnostic release as produced by an adapter
///
/// Transient: built fresh on every fetch and turned into a [`NewRelease`]
/// by the orchestrator. Never stored as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRelease {
    pub version: String,
    pub tag_name: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub changelog: Option<String>,
    pub changelog_url: Option<String>,
    pub is_draft: bool,
    pub is_prerelease: bool,
    // First asset only
    pub download_url: Option<String>,
    pub size: Option<i64>,
    pub content_type: Option<String>,
}

impl CanonicalRelease {
    /// Create a release carrying only a version
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Build the insert record for `project`
    ///
    /// An asset is attached only when the upstream reported a download URL.
    pub fn into_new_release(self, project: &Project) -> NewRelease {
        let asset = self.download_url.map(|download_url| NewAsset {
            name: format!("{}-{}", project.name, self.version),
            download_url: Some(download_url),
            size: self.size,
            content_type: self.content_type,
        });

        NewRelease {
            project_id: project.id,
            version: self.version,
            tag_name: self.tag_name,
            release_date: self.release_date,
            changelog: self.changelog,
            changelog_url: self.changelog_url,
            is_draft: self.is_draft,
            is_prerelease: self.is_prerelease,
            asset,
        }
    }
}

/// A monitored upstream entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub source: SourceKind,
    pub external_id: Option<String>,
    pub repo_url: Option<String>,
    pub description: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert record for a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub source: SourceKind,
    pub external_id: Option<String>,
    pub repo_url: Option<String>,
    pub description: Option<String>,
}

impl NewProject {
    /// Create a project record with only name and source
    pub fn new(name: impl Into<String>, source: SourceKind) -> Self {
        Self {
            name: name.into(),
            source,
            external_id: None,
            repo_url: None,
            description: None,
        }
    }

    /// Set the external ID
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Set the repository URL
    pub fn with_repo_url(mut self, repo_url: impl Into<String>) -> Self {
        self.repo_url = Some(repo_url.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Persisted release owned by a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub project_id: i64,
    pub version: String,
    pub tag_name: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub changelog: Option<String>,
    pub changelog_url: Option<String>,
    pub is_draft: bool,
    pub is_prerelease: bool,
    pub created_at: DateTime<Utc>,
    pub asset: Option<ReleaseAsset>,
}

/// Insert record for a release and its optional asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRelease {
    pub project_id: i64,
    pub version: String,
    pub tag_name: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub changelog: Option<String>,
    pub changelog_url: Option<String>,
    pub is_draft: bool,
    pub is_prerelease: bool,
    pub asset: Option<NewAsset>,
}

/// Downloadable artifact attached to a release (at most one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub id: i64,
    pub release_id: i64,
    pub name: String,
    pub download_url: Option<String>,
    pub size: Option<i64>,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert record for an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAsset {
    pub name: String,
    pub download_url: Option<String>,
    pub size: Option<i64>,
    pub content_type: Option<String>,
}

/// Someone's interest in a project's releases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub project_id: i64,
    pub subscriber: String,
    pub notify_webhook: bool,
    pub webhook_url: Option<String>,
    pub webhook_channel: Option<String>,
    /// Mail the subscriber, who must then be an email address
    pub notify_email: bool,
    pub notify_prereleases: bool,
    pub failure_count: i64,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Webhook URL, if webhook delivery is enabled and configured
    pub fn active_webhook_url(&self) -> Option<&str> {
        if !self.notify_webhook {
            return None;
        }
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Recipient address, if email delivery is enabled
    pub fn active_email_address(&self) -> Option<&str> {
        if !self.notify_email {
            return None;
        }
        Some(self.subscriber.trim()).filter(|addr| addr.contains('@'))
    }

    /// Check if this subscription wants to hear about `release`
    pub fn wants(&self, release: &Release) -> bool {
        self.notify_prereleases || !release.is_prerelease
    }
}

/// Insert record for a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub project_id: i64,
    pub subscriber: String,
    pub notify_webhook: bool,
    pub webhook_url: Option<String>,
    pub webhook_channel: Option<String>,
    pub notify_email: bool,
    pub notify_prereleases: bool,
}

impl NewSubscription {
    /// Subscription delivering to a webhook, including prereleases
    pub fn webhook(project_id: i64, subscriber: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            project_id,
            subscriber: subscriber.into(),
            notify_webhook: true,
            webhook_url: Some(url.into()),
            webhook_channel: None,
            notify_email: false,
            notify_prereleases: true,
        }
    }

    /// Subscription mailing `address`, including prereleases
    pub fn email(project_id: i64, address: impl Into<String>) -> Self {
        Self {
            project_id,
            subscriber: address.into(),
            notify_webhook: false,
            webhook_url: None,
            webhook_channel: None,
            notify_email: true,
            notify_prereleases: true,
        }
    }

    /// Also mail the subscriber
    pub fn with_email(mut self) -> Self {
        self.notify_email = true;
        self
    }

    /// Override the chat channel the webhook posts into
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.webhook_channel = Some(channel.into());
        self
    }

    /// Skip prerelease notifications
    pub fn without_prereleases(mut self) -> Self {
        self.notify_prereleases = false;
        self
    }
}
