//! Notification channels for delivering release announcements
//!
//! A channel turns a [`ReleaseNotification`] into a request against one
//! subscriber's [`DeliveryTarget`]. Chat webhooks and SMTP email ship
//! here; anything else plugs in by implementing [`Channel`].

pub mod email;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::notifications::{ChannelKind, DeliveryTarget, ReleaseNotification};

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur while building or driving a channel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Email message could not be assembled
    #[error("Email build error: {0}")]
    EmailBuild(#[from] lettre::error::Error),

    /// SMTP conversation failed
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Target belongs to another transport
    #[error("{channel} channel cannot deliver to {target}")]
    WrongTarget { channel: ChannelKind, target: ChannelKind },
}

impl ChannelError {
    /// Check if another attempt could succeed
    ///
    /// Client errors (4xx) and bad configuration never get better by retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => !e.is_builder(),
            Self::Status { status, .. } => !(400..500).contains(status),
            Self::Smtp(e) => !e.is_permanent(),
            Self::InvalidConfig(_)
            | Self::SerializationError(_)
            | Self::EmailBuild(_)
            | Self::WrongTarget { .. } => false,
        }
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Whether the notification was successfully delivered
    pub success: bool,
    /// Channel that delivered (or failed to deliver) the notification
    pub channel: String,
    /// Optional message about the delivery
    pub message: Option<String>,
    /// Timestamp of delivery attempt
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DeliveryStatus {
    /// Create a successful delivery status
    pub fn success(channel: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create a successful delivery status with a message
    pub fn success_with_message(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: channel.into(),
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create a failed delivery status
    pub fn failure(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: channel.into(),
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        write!(f, "[{status}] {}", self.channel)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Trait for notification channels
///
/// `deliver` reports failures through [`DeliveryStatus`] and never returns
/// an error, so one broken subscriber cannot stop the others.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name (metrics label)
    fn name(&self) -> &str;

    /// Transport of the targets this channel accepts
    fn kind(&self) -> ChannelKind;

    /// Deliver `notification` to `target`
    async fn deliver(
        &self,
        target: &DeliveryTarget,
        notification: &ReleaseNotification,
    ) -> DeliveryStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_status_success() {
        let status = DeliveryStatus::success("webhook");
        assert!(status.success);
        assert_eq!(status.channel, "webhook");
        assert!(status.message.is_none());
    }

    #[test]
    fn test_delivery_status_failure() {
        let status = DeliveryStatus::failure("webhook", "Connection timeout");
        assert!(!status.success);
        assert_eq!(status.message, Some("Connection timeout".to_string()));
    }

    #[test]
    fn test_delivery_status_display() {
        let success = DeliveryStatus::success_with_message("webhook", "Delivered");
        assert!(success.to_string().contains("SUCCESS"));
        assert!(success.to_string().contains("webhook"));

        let failure = DeliveryStatus::failure("webhook", "HTTP 500");
        assert!(failure.to_string().contains("FAILED"));
        assert!(failure.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_retryable_errors() {
        let client_error = ChannelError::Status {
            status: 404,
            body: "no such hook".to_string(),
        };
        assert!(!client_error.is_retryable());

        let server_error = ChannelError::Status {
            status: 502,
            body: String::new(),
        };
        assert!(server_error.is_retryable());

        assert!(!ChannelError::InvalidConfig("empty url".to_string()).is_retryable());
        assert!(!ChannelError::WrongTarget {
            channel: ChannelKind::Email,
            target: ChannelKind::Webhook,
        }
        .is_retryable());
    }
}
