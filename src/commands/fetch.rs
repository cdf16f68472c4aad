use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch as shutdown_channel;

use relmon::config::Config;
use relmon::fetcher::run_periodic;
use relmon::notifications::WebhookTarget;

use super::{build_fetcher, email_channel, webhook_channel};

pub async fn fetch(config: &Config, project_id: Option<i64>) -> Result<()> {
    let fetcher = build_fetcher(config)?;

    let new_releases = match project_id {
        Some(id) => fetcher.fetch_single_project(id).await?,
        None => fetcher
            .fetch_all_projects()
            .await
            .context("Failed to list projects")?,
    };

    println!("Fetch complete: {new_releases} new releases");
    Ok(())
}

pub async fn watch(config: &Config, interval_secs: u64) -> Result<()> {
    let fetcher = build_fetcher(config)?;
    let (tx, rx) = shutdown_channel::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, finishing current project");
            let _ = tx.send(true);
        }
    });

    tracing::info!(interval_secs, "Watching for new releases");
    let total = run_periodic(&fetcher, Duration::from_secs(interval_secs.max(1)), rx).await;

    println!("Stopped: {total} new releases stored");
    Ok(())
}

pub async fn latest(config: &Config, project_id: i64) -> Result<()> {
    let fetcher = build_fetcher(config)?;

    match fetcher.latest_upstream(project_id).await? {
        Some(release) => {
            let date = release
                .release_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string());
            println!("{} ({date})", release.version);
            if let Some(url) = release.changelog_url.or(release.download_url) {
                println!("  {url}");
            }
        }
        None => println!("No upstream release found"),
    }
    Ok(())
}

pub async fn test_webhook(config: &Config, url: String, channel: Option<String>) -> Result<()> {
    let target = WebhookTarget { url, channel };
    webhook_channel(config)?
        .send_test(&target)
        .await
        .with_context(|| format!("Webhook test failed for {}", target.url))?;

    println!("Webhook reachable: {}", target.url);
    Ok(())
}

pub async fn test_email(config: &Config, to: &str) -> Result<()> {
    let Some(channel) = email_channel(config)? else {
        bail!("Email is not configured; add a [notifications.email] section");
    };
    channel
        .send_test(to)
        .await
        .with_context(|| format!("Test mail to {to} failed"))?;

    println!("Test mail sent to {to}");
    Ok(())
}

/// One fetch pass, then dump metrics for a textfile collector
pub async fn metrics(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let fetcher = build_fetcher(config)?;
    fetcher.fetch_all_projects().await?;

    let text = relmon::metrics::encode_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;

    match output {
        Some(path) => std::fs::write(&path, text)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?,
        None => print!("{text}"),
    }
    Ok(())
}
