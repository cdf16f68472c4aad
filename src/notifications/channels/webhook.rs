//! Webhook notification channel
//!
//! Posts release announcements to Mattermost/Slack style incoming webhooks.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::config::NotificationsConfig;
use crate::notifications::{ChannelKind, DeliveryTarget, ReleaseNotification, WebhookTarget};
use crate::utils::retry::{with_retry_if, RetryConfig};

const RELEASE_COLOR: &str = "#36a64f";
const PRERELEASE_COLOR: &str = "#f39c12";
const FOOTER: &str = "Release Monitor";

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Display name the message is posted under
    #[serde(default = "default_username")]
    pub username: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_username() -> String {
    FOOTER.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    1
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_base_delay_ms: default_retry_delay(),
        }
    }
}

impl WebhookConfig {
    /// Build from the `[notifications]` config section
    pub fn from_notifications(config: &NotificationsConfig) -> Self {
        Self {
            username: config.webhook_username.clone(),
            timeout_secs: config.webhook_timeout_secs,
            max_retries: config.webhook_max_retries,
            ..Self::default()
        }
    }

    /// Set the posting username
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set retry budget and first backoff delay
    pub fn with_retries(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.username.trim().is_empty() {
            return Err("Webhook username cannot be empty".to_string());
        }

        Ok(())
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.max_retries,
            self.retry_base_delay_ms,
            self.retry_base_delay_ms.saturating_mul(8),
        )
    }
}

/// Check that a subscriber's webhook URL is an absolute http(s) URL
pub fn validate_url(raw: &str) -> ChannelResult<url::Url> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| ChannelError::InvalidConfig(format!("Invalid webhook URL '{raw}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ChannelError::InvalidConfig(format!(
            "Webhook URL must use http or https, got '{other}'"
        ))),
    }
}

/// Webhook notification channel
///
/// One channel serves every subscriber; the URL and optional channel
/// override come from the [`WebhookTarget`].
///
/// # Payload Format
///
/// ```json
/// {
///   "text": "📦 **serde** has published a new release: **1.0.200**",
///   "channel": "releases",
///   "username": "Release Monitor",
///   "attachments": [{
///     "color": "#36a64f",
///     "title": "serde v1.0.200",
///     "title_link": "http://localhost:5173/projects/1/releases/7",
///     "text": "First 500 characters of the changelog...",
///     "fields": [
///       { "short": true, "title": "Type", "value": "Release" },
///       { "short": true, "title": "Published", "value": "2024-05-01 12:00 UTC" }
///     ],
///     "footer": "Release Monitor"
///   }]
/// }
/// ```
///
/// Without a changelog the attachment carries only the `Type` field.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new webhook channel
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Get the configuration
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Build the webhook payload for one release
    pub fn build_payload(&self, target: &WebhookTarget, notification: &ReleaseNotification) -> Value {
        let mut text = format!(
            "📦 **{}** has published a new release: **{}**",
            notification.project_name, notification.version
        );
        if notification.is_prerelease {
            text.push_str(" 🚧 *(pre-release)*");
        }

        let kind = if notification.is_prerelease {
            "Pre-release"
        } else {
            "Release"
        };
        let mut fields = vec![json!({ "short": true, "title": "Type", "value": kind })];

        let mut attachment = json!({
            "color": if notification.is_prerelease { PRERELEASE_COLOR } else { RELEASE_COLOR },
            "title": format!("{} v{}", notification.project_name, notification.version),
            "title_link": notification.release_url,
        });

        if let Some(excerpt) = &notification.changelog_excerpt {
            let mut body = excerpt.clone();
            if notification.changelog_truncated {
                body.push_str("...");
            }
            let published = notification.release_date.unwrap_or_else(chrono::Utc::now);
            fields.push(json!({
                "short": true,
                "title": "Published",
                "value": published.format("%Y-%m-%d %H:%M UTC").to_string(),
            }));
            attachment["text"] = json!(body);
            attachment["footer"] = json!(FOOTER);
        }
        attachment["fields"] = json!(fields);

        let mut payload = json!({
            "text": text,
            "username": self.config.username,
            "attachments": [attachment],
        });
        if let Some(channel) = target.channel.as_deref().filter(|c| !c.trim().is_empty()) {
            payload["channel"] = json!(channel);
        }
        payload
    }

    /// Post a connectivity check message to `target`
    pub async fn send_test(&self, target: &WebhookTarget) -> ChannelResult<()> {
        let mut payload = json!({
            "text": format!("✅ **{FOOTER}** connected successfully!"),
            "username": self.config.username,
        });
        if let Some(channel) = &target.channel {
            payload["channel"] = json!(channel);
        }
        self.send_with_retry(&target.url, &payload).await
    }

    async fn post_once(&self, url: &url::Url, payload: &Value) -> ChannelResult<()> {
        let mut request = self.client.post(url.clone());

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        Err(ChannelError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Send the request with retry logic
    ///
    /// Network errors and 5xx are retried with exponential backoff; 4xx is not.
    async fn send_with_retry(&self, raw_url: &str, payload: &Value) -> ChannelResult<()> {
        let url = &validate_url(raw_url)?;
        with_retry_if(
            &self.config.retry_config(),
            move || self.post_once(url, payload),
            ChannelError::is_retryable,
        )
        .await
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        notification: &ReleaseNotification,
    ) -> DeliveryStatus {
        let DeliveryTarget::Webhook(target) = target else {
            let err = ChannelError::WrongTarget {
                channel: self.kind(),
                target: target.kind(),
            };
            return DeliveryStatus::failure(self.name(), err.to_string());
        };

        let payload = self.build_payload(target, notification);

        match self.send_with_retry(&target.url, &payload).await {
            Ok(()) => {
                tracing::debug!(
                    project = %notification.project_name,
                    version = %notification.version,
                    "Webhook delivered"
                );
                DeliveryStatus::success_with_message(self.name(), format!("Delivered to {}", target.url))
            }
            Err(e) => {
                tracing::error!(
                    project = %notification.project_name,
                    version = %notification.version,
                    error = %e,
                    "Failed to deliver webhook"
                );
                DeliveryStatus::failure(self.name(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notification(changelog: Option<&str>, truncated: bool, prerelease: bool) -> ReleaseNotification {
        ReleaseNotification {
            project_id: 1,
            project_name: "serde".to_string(),
            release_id: 7,
            version: "1.0.200".to_string(),
            release_url: "http://localhost:5173/projects/1/releases/7".to_string(),
            changelog_excerpt: changelog.map(str::to_string),
            changelog_truncated: truncated,
            is_prerelease: prerelease,
            release_date: Some(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        }
    }

    fn target(channel: Option<&str>) -> WebhookTarget {
        WebhookTarget {
            url: "https://chat.example.com/hooks/abc".to_string(),
            channel: channel.map(str::to_string),
        }
    }

    #[test]
    fn test_webhook_config_validation() {
        assert!(WebhookConfig::default().validate().is_ok());
        assert!(WebhookConfig::default().with_timeout(0).validate().is_err());
        assert!(WebhookConfig::default().with_username("  ").validate().is_err());
    }

    #[test]
    fn test_webhook_config_builder() {
        let config = WebhookConfig::default()
            .with_username("bot")
            .with_auth_token("secret-token")
            .with_header("X-Custom", "value")
            .with_timeout(30)
            .with_retries(5, 10);

        assert_eq!(config.username, "bot");
        assert_eq!(config.auth_token, Some("secret-token".to_string()));
        assert_eq!(config.headers.get("X-Custom"), Some(&"value".to_string()));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay_ms, 10);
    }

    #[test]
    fn test_from_notifications_config() {
        let config = WebhookConfig::from_notifications(&NotificationsConfig::default());
        assert_eq!(config.username, "Release Monitor");
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/hooks/x").is_ok());
        assert!(validate_url("http://localhost:8065/hooks/x").is_ok());
        assert!(validate_url("example.com/hook").is_err());
        assert!(validate_url("ftp://example.com/hook").is_err());
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_payload_with_changelog() {
        let channel = WebhookChannel::new(WebhookConfig::default()).unwrap();
        let payload = channel.build_payload(
            &target(Some("releases")),
            &notification(Some("Fixed things"), true, false),
        );

        assert_eq!(
            payload["text"],
            "📦 **serde** has published a new release: **1.0.200**"
        );
        assert_eq!(payload["channel"], "releases");
        assert_eq!(payload["username"], "Release Monitor");

        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["color"], RELEASE_COLOR);
        assert_eq!(attachment["title"], "serde v1.0.200");
        assert_eq!(attachment["text"], "Fixed things...");
        assert_eq!(attachment["footer"], "Release Monitor");
        assert_eq!(attachment["fields"][0]["value"], "Release");
        assert_eq!(attachment["fields"][1]["value"], "2024-05-01 12:00 UTC");
    }

    #[test]
    fn test_payload_prerelease_without_changelog() {
        let channel = WebhookChannel::new(WebhookConfig::default()).unwrap();
        let payload = channel.build_payload(&target(None), &notification(None, false, true));

        assert!(payload["text"].as_str().unwrap().ends_with("🚧 *(pre-release)*"));
        assert!(payload.get("channel").is_none());

        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["color"], PRERELEASE_COLOR);
        assert!(attachment.get("text").is_none());
        assert!(attachment.get("footer").is_none());
        assert_eq!(attachment["fields"].as_array().unwrap().len(), 1);
        assert_eq!(attachment["fields"][0]["value"], "Pre-release");
    }

    #[tokio::test]
    async fn test_deliver_invalid_url_fails_without_error() {
        let channel = WebhookChannel::new(WebhookConfig::default()).unwrap();
        let bad = DeliveryTarget::Webhook(WebhookTarget {
            url: "not a url".to_string(),
            channel: None,
        });

        let status = channel.deliver(&bad, &notification(None, false, false)).await;
        assert!(!status.success);
        assert_eq!(status.channel, "webhook");
    }

    #[tokio::test]
    async fn test_deliver_rejects_email_target() {
        let channel = WebhookChannel::new(WebhookConfig::default()).unwrap();
        let mailbox = DeliveryTarget::Email {
            to: "ops@example.com".to_string(),
        };

        let status = channel.deliver(&mailbox, &notification(None, false, false)).await;
        assert!(!status.success);
        assert!(status.message.unwrap().contains("cannot deliver to email"));
    }
}
