pub mod fetch;
pub mod project;

use anyhow::{Context, Result};
use std::sync::Arc;

use relmon::config::Config;
use relmon::fetcher::ReleaseFetcher;
use relmon::notifications::{EmailChannel, NotificationDispatcher, WebhookChannel, WebhookConfig};
use relmon::sources::SourceRegistry;
use relmon::storage::{open_repository, SharedReleaseRepository};

pub use fetch::{fetch, latest, metrics, test_email, test_webhook, watch};
pub use project::{add_project, normalize, releases, subscribe};

/// Open the configured database
pub fn repository(config: &Config) -> Result<SharedReleaseRepository> {
    open_repository(&config.database).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database.sqlite_path.display()
        )
    })
}

/// Webhook channel from the `[notifications]` section
pub fn webhook_channel(config: &Config) -> Result<WebhookChannel> {
    WebhookChannel::new(WebhookConfig::from_notifications(&config.notifications))
        .context("Failed to create webhook channel")
}

/// Email channel from `[notifications.email]`, if configured
pub fn email_channel(config: &Config) -> Result<Option<EmailChannel>> {
    config
        .notifications
        .email
        .clone()
        .map(EmailChannel::new)
        .transpose()
        .context("Failed to create email channel")
}

/// Wire registry, repository and dispatcher into a fetcher
pub fn build_fetcher(config: &Config) -> Result<ReleaseFetcher> {
    let repo = repository(config)?;
    let registry =
        SourceRegistry::from_config(&config.fetcher).context("Failed to create source registry")?;
    let mut dispatcher = NotificationDispatcher::new(
        repo.clone(),
        Arc::new(webhook_channel(config)?),
        config.notifications.release_url_base.clone(),
    );
    if let Some(email) = email_channel(config)? {
        dispatcher = dispatcher.with_channel(Arc::new(email));
    }

    Ok(ReleaseFetcher::new(Arc::new(registry), repo, dispatcher))
}
