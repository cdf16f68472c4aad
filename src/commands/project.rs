use anyhow::{bail, Context, Result};

use relmon::config::Config;
use relmon::models::{NewProject, NewSubscription, SourceKind};
use relmon::notifications::channels::webhook::validate_url;
use relmon::sources::SourceRegistry;

use super::repository;

pub struct AddProjectParams {
    pub name: String,
    pub source: SourceKind,
    pub repo_url: Option<String>,
    pub external_id: Option<String>,
    pub description: Option<String>,
}

pub fn add_project(config: &Config, params: AddProjectParams) -> Result<()> {
    let registry = SourceRegistry::from_config(&config.fetcher)?;
    if !registry.supports(params.source) {
        tracing::warn!(source = %params.source, "No adapter for this source; fetches will fail");
    }

    let mut project = NewProject::new(params.name, params.source);
    if let Some(url) = params.repo_url {
        project = project.with_repo_url(url);
    }
    if let Some(id) = params.external_id {
        project = project.with_external_id(id);
    }
    if let Some(description) = params.description {
        project = project.with_description(description);
    }

    let repo = repository(config)?;
    let project = repo
        .insert_project(&project)
        .with_context(|| format!("Failed to add project {}", project.name))?;

    println!(
        "Added project #{} {} ({})",
        project.id, project.name, project.source
    );
    Ok(())
}

pub struct SubscribeParams {
    pub project_id: i64,
    pub subscriber: String,
    pub webhook_url: Option<String>,
    pub email: bool,
    pub channel: Option<String>,
    pub no_prereleases: bool,
}

pub fn subscribe(config: &Config, params: SubscribeParams) -> Result<()> {
    if params.webhook_url.is_none() && !params.email {
        bail!("Nothing to deliver to: pass --webhook-url and/or --email");
    }
    if let Some(url) = &params.webhook_url {
        validate_url(url)?;
    }
    if params.email {
        if !params.subscriber.contains('@') {
            bail!("--email needs the subscriber to be an address, got {}", params.subscriber);
        }
        if config.notifications.email.is_none() {
            tracing::warn!("No [notifications.email] section; mails will not be sent");
        }
    }

    let repo = repository(config)?;
    if repo.find_project(params.project_id)?.is_none() {
        bail!("Project {} does not exist", params.project_id);
    }

    let mut subscription = match params.webhook_url {
        Some(url) => NewSubscription::webhook(params.project_id, params.subscriber, url),
        None => NewSubscription::email(params.project_id, params.subscriber),
    };
    if params.email {
        subscription = subscription.with_email();
    }
    if let Some(channel) = params.channel {
        subscription = subscription.with_channel(channel);
    }
    if params.no_prereleases {
        subscription = subscription.without_prereleases();
    }

    let subscription = repo
        .insert_subscription(&subscription)
        .context("Failed to add subscription")?;

    println!(
        "Subscribed {} to project #{} (subscription #{})",
        subscription.subscriber, subscription.project_id, subscription.id
    );
    Ok(())
}

pub fn releases(config: &Config, project_id: i64, limit: usize) -> Result<()> {
    let repo = repository(config)?;
    let Some(project) = repo.find_project(project_id)? else {
        bail!("Project {project_id} does not exist");
    };

    let releases = repo.find_releases_for_project(project_id)?;
    println!("{} ({}) - {} releases", project.name, project.source, releases.len());
    println!("========================");

    for release in releases.iter().take(limit) {
        let date = release
            .release_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let marker = if release.is_prerelease { " (pre-release)" } else { "" };
        println!("  {:<24} {date}{marker}", release.version);
    }
    Ok(())
}

pub fn normalize(config: &Config, source: SourceKind, input: &str) -> Result<()> {
    let registry = SourceRegistry::from_config(&config.fetcher)?;
    println!("{}", registry.normalize_external_id(source, input)?);
    Ok(())
}
