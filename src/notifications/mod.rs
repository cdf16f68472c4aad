//! Release notifications
//!
//! When the fetcher stores a new release, the dispatcher looks up the
//! project's subscriptions and hands one [`ReleaseNotification`] per
//! interested subscriber and enabled transport to a delivery [`Channel`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      NotificationDispatcher                │
//! │  - Subscription selection                  │
//! │  - Notification building                   │
//! │  - Delivery tracking + metrics             │
//! └────────────────────────────────────────────┘
//!                     │
//!                     ▼
//!           ┌─────────┴─────────┐
//!           ▼                   ▼
//!      ┌─────────┐         ┌─────────┐
//!      │ Webhook │         │  Email  │
//!      │ Channel │         │ Channel │
//!      └─────────┘         └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use relmon::notifications::{NotificationDispatcher, WebhookChannel};
//!
//! let webhook = WebhookChannel::new(WebhookConfig::default())?;
//! let email = EmailChannel::new(smtp_config)?;
//! let dispatcher = NotificationDispatcher::new(repo, Arc::new(webhook), "https://relmon.example.com")
//!     .with_channel(Arc::new(email));
//!
//! let delivered = dispatcher.notify_new_release(&project, &release).await;
//! ```

pub mod channels;
mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Project, Release, Subscription};
use crate::utils::excerpt;

// Re-exports
pub use channels::email::EmailChannel;
pub use channels::webhook::{WebhookChannel, WebhookConfig};
pub use channels::{Channel, ChannelError, ChannelResult, DeliveryStatus};
pub use manager::NotificationDispatcher;

/// Characters of changelog carried in a notification
pub const CHANGELOG_EXCERPT_CHARS: usize = 500;

/// Transport a channel speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Webhook,
    Email,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat webhook endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookTarget {
    /// Webhook URL
    pub url: String,
    /// Optional channel override
    pub channel: Option<String>,
}

/// Where one delivery goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryTarget {
    Webhook(WebhookTarget),
    Email { to: String },
}

impl DeliveryTarget {
    /// Every target a subscription has enabled, webhook first
    pub fn for_subscription(subscription: &Subscription) -> Vec<Self> {
        let webhook = subscription.active_webhook_url().map(|url| {
            Self::Webhook(WebhookTarget {
                url: url.to_string(),
                channel: subscription
                    .webhook_channel
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
            })
        });
        let email = subscription
            .active_email_address()
            .map(|to| Self::Email { to: to.to_string() });

        webhook.into_iter().chain(email).collect()
    }

    /// Transport this target needs
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Webhook(_) => ChannelKind::Webhook,
            Self::Email { .. } => ChannelKind::Email,
        }
    }

    /// URL or mailbox, for logs
    pub fn address(&self) -> &str {
        match self {
            Self::Webhook(target) => &target.url,
            Self::Email { to } => to,
        }
    }
}

/// Channel-agnostic description of a new release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseNotification {
    pub project_id: i64,
    pub project_name: String,
    pub release_id: i64,
    pub version: String,
    /// Link to the release page in the web frontend
    pub release_url: String,
    /// First [`CHANGELOG_EXCERPT_CHARS`] characters of the changelog
    pub changelog_excerpt: Option<String>,
    /// Whether the excerpt was cut short
    pub changelog_truncated: bool,
    pub is_prerelease: bool,
    pub release_date: Option<DateTime<Utc>>,
}

impl ReleaseNotification {
    /// Build the notification for `release` of `project`
    pub fn new(project: &Project, release: &Release, release_url_base: &str) -> Self {
        let (changelog_excerpt, changelog_truncated) = match release
            .changelog
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        {
            Some(text) => {
                let (cut, truncated) = excerpt(text, CHANGELOG_EXCERPT_CHARS);
                (Some(cut), truncated)
            }
            None => (None, false),
        };

        Self {
            project_id: project.id,
            project_name: project.name.clone(),
            release_id: release.id,
            version: release.version.clone(),
            release_url: format!(
                "{}/projects/{}/releases/{}",
                release_url_base.trim_end_matches('/'),
                project.id,
                release.id
            ),
            changelog_excerpt,
            changelog_truncated,
            is_prerelease: release.is_prerelease,
            release_date: release.release_date,
        }
    }
}
