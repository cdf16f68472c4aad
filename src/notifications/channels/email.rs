//! Email notification channel
//!
//! Sends release announcements over SMTP as a plain text + HTML
//! alternative message. The recipient is the subscriber's address.

use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::config::{SmtpConfig, SmtpSecurity};
use crate::notifications::{ChannelKind, DeliveryTarget, ReleaseNotification};
use crate::utils::retry::{with_retry_if, RetryConfig};

const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Subject line for a release mail
pub fn subject(notification: &ReleaseNotification) -> String {
    format!(
        "📦 New release: {} v{}",
        notification.project_name, notification.version
    )
}

/// Link to the project's notification settings page
fn settings_url(notification: &ReleaseNotification) -> String {
    notification.release_url.replace("/releases/", "/settings/")
}

fn changelog_preview(notification: &ReleaseNotification) -> Option<String> {
    notification.changelog_excerpt.as_ref().map(|excerpt| {
        let mut text = excerpt.clone();
        if notification.changelog_truncated {
            text.push_str("...");
        }
        text
    })
}

/// Plain text part
pub fn text_body(notification: &ReleaseNotification) -> String {
    let mut body = format!(
        "{} v{} has been released!\n",
        notification.project_name, notification.version
    );
    if notification.is_prerelease {
        body.push_str("(pre-release)\n");
    }
    body.push_str(&format!("\nView release: {}\n", notification.release_url));

    if let Some(changelog) = changelog_preview(notification) {
        body.push_str(&format!("\nChangelog preview:\n{changelog}\n"));
    }

    body.push_str(&format!(
        "\n--\nYou're receiving this because you subscribed to releases from {}.\n\
         Manage notification settings: {}\n",
        notification.project_name,
        settings_url(notification)
    ));
    body
}

/// HTML part
pub fn html_body(notification: &ReleaseNotification) -> String {
    let name = encode_text(&notification.project_name);
    let version = encode_text(&notification.version);
    let release_url = encode_double_quoted_attribute(&notification.release_url);
    let settings_url = settings_url(notification);
    let settings_url = encode_double_quoted_attribute(&settings_url);

    let prerelease = if notification.is_prerelease {
        r#"<p style="background: #fef3c7; color: #92400e; padding: 8px 12px; border-radius: 6px; display: inline-block;">🚧 Pre-release</p>"#
    } else {
        ""
    };

    let changelog = changelog_preview(notification)
        .map(|text| {
            format!(
                r#"<div style="margin-top: 20px; padding: 15px; background: white; border-radius: 8px; border: 1px solid #e5e7eb;"><h3 style="margin-top: 0;">📝 Changelog Preview</h3><pre style="white-space: pre-wrap; font-size: 14px; color: #4b5563;">{}</pre></div>"#,
                encode_text(&text)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #1f2937; max-width: 600px; margin: 0 auto; padding: 20px;">
  <div style="background: #6366f1; padding: 30px; border-radius: 12px 12px 0 0; text-align: center;">
    <h1 style="color: white; margin: 0; font-size: 24px;">📦 New Release Published</h1>
  </div>
  <div style="background: #f9fafb; padding: 30px; border-radius: 0 0 12px 12px; border: 1px solid #e5e7eb; border-top: none;">
    <p style="font-size: 18px; margin-top: 0;"><strong>{name}</strong> v{version} has been released!</p>
    {prerelease}
    <p style="margin: 20px 0;"><a href="{release_url}" style="display: inline-block; background: #6366f1; color: white; text-decoration: none; padding: 12px 24px; border-radius: 8px; font-weight: 600;">View Release</a></p>
    {changelog}
    <hr style="border: none; border-top: 1px solid #e5e7eb; margin: 30px 0;">
    <p style="color: #6b7280; font-size: 14px; text-align: center;">
      You're receiving this because you subscribed to releases from {name}.<br>
      <a href="{settings_url}" style="color: #6366f1;">Manage notification settings</a>
    </p>
  </div>
</body>
</html>
"#
    )
}

/// SMTP email channel
pub struct EmailChannel {
    config: SmtpConfig,
    sender: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    /// Create a channel for the configured mail server
    ///
    /// No connection is opened until the first message is sent.
    pub fn new(config: SmtpConfig) -> ChannelResult<Self> {
        if config.host.trim().is_empty() {
            return Err(ChannelError::InvalidConfig("SMTP host cannot be empty".to_string()));
        }

        let sender: Mailbox = config.sender().parse().map_err(|e| {
            ChannelError::InvalidConfig(format!("Invalid sender '{}': {e}", config.sender()))
        })?;

        let builder = match config.security {
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout()));
        if let Some(user) = &config.username {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    fn message_to(&self, to: &str) -> ChannelResult<lettre::message::MessageBuilder> {
        let recipient: Mailbox = to
            .trim()
            .parse()
            .map_err(|e| ChannelError::InvalidConfig(format!("Invalid recipient '{to}': {e}")))?;
        Ok(Message::builder().from(self.sender.clone()).to(recipient))
    }

    /// Assemble the release mail for `to`
    pub fn build_message(&self, to: &str, notification: &ReleaseNotification) -> ChannelResult<Message> {
        let message = self
            .message_to(to)?
            .subject(subject(notification))
            .multipart(MultiPart::alternative_plain_html(
                text_body(notification),
                html_body(notification),
            ))?;
        Ok(message)
    }

    /// Mail a connectivity check to `to`
    pub async fn send_test(&self, to: &str) -> ChannelResult<()> {
        let message = self
            .message_to(to)?
            .subject("✅ Release Monitor connected successfully!")
            .body(format!(
                "This is a test message from Release Monitor.\nSMTP server: {}:{}\n",
                self.config.host, self.config.port
            ))?;
        self.send_with_retry(&message).await
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.config.max_retries,
            RETRY_BASE_DELAY_MS,
            RETRY_BASE_DELAY_MS * 8,
        )
    }

    async fn send_once(&self, message: &Message) -> ChannelResult<()> {
        self.transport.send(message.clone()).await?;
        Ok(())
    }

    /// Send with retry; permanent (5xx) SMTP replies are final
    async fn send_with_retry(&self, message: &Message) -> ChannelResult<()> {
        with_retry_if(
            &self.retry_config(),
            move || self.send_once(message),
            ChannelError::is_retryable,
        )
        .await
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        notification: &ReleaseNotification,
    ) -> DeliveryStatus {
        let DeliveryTarget::Email { to } = target else {
            let err = ChannelError::WrongTarget {
                channel: self.kind(),
                target: target.kind(),
            };
            return DeliveryStatus::failure(self.name(), err.to_string());
        };

        let sent = match self.build_message(to, notification) {
            Ok(message) => self.send_with_retry(&message).await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                tracing::debug!(
                    project = %notification.project_name,
                    version = %notification.version,
                    "Email delivered"
                );
                DeliveryStatus::success_with_message(self.name(), format!("Mailed {to}"))
            }
            Err(e) => {
                tracing::error!(
                    project = %notification.project_name,
                    version = %notification.version,
                    error = %e,
                    "Failed to deliver email"
                );
                DeliveryStatus::failure(self.name(), e.to_string())
            }
        }
    }
}
