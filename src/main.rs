mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::project::{AddProjectParams, SubscribeParams};
use relmon::config::Config;
use relmon::models::SourceKind;

#[derive(Parser)]
#[command(
    name = "relmon",
    version,
    about = "Track releases on GitHub, npm, PyPI and crates.io and notify webhooks and email",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML); environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a project to monitor
    AddProject {
        /// Project name
        name: String,

        /// Release source (github, npm, pypi, crates, ...)
        #[arg(short, long)]
        source: SourceKind,

        /// Repository or registry URL; the external id is derived from it
        #[arg(long)]
        repo_url: Option<String>,

        /// Source-specific id (owner/repo, package name)
        #[arg(long)]
        external_id: Option<String>,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },

    /// Subscribe a webhook and/or an email address to a project's releases
    Subscribe {
        /// Project id
        #[arg(short, long)]
        project_id: i64,

        /// Subscriber label; the recipient address with --email
        #[arg(short, long)]
        subscriber: String,

        /// Incoming webhook URL
        #[arg(short, long)]
        webhook_url: Option<String>,

        /// Also mail the subscriber
        #[arg(long, default_value = "false")]
        email: bool,

        /// Channel override
        #[arg(long)]
        channel: Option<String>,

        /// Skip pre-releases
        #[arg(long, default_value = "false")]
        no_prereleases: bool,
    },

    /// Fetch new releases once
    Fetch {
        /// Only this project
        #[arg(short, long)]
        project_id: Option<i64>,
    },

    /// Fetch periodically until interrupted
    Watch {
        /// Seconds between fetch runs
        #[arg(short, long, default_value = "3600")]
        interval_secs: u64,
    },

    /// List stored releases of a project
    Releases {
        /// Project id
        #[arg(short, long)]
        project_id: i64,

        /// Maximum number of releases to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the newest upstream release without storing it
    Latest {
        /// Project id
        #[arg(short, long)]
        project_id: i64,
    },

    /// Print the external id a source derives from a name or URL
    Normalize {
        /// Release source
        #[arg(short, long)]
        source: SourceKind,

        /// Name or URL
        input: String,
    },

    /// Post a connectivity message to a webhook
    TestWebhook {
        /// Incoming webhook URL
        url: String,

        /// Channel override
        #[arg(long)]
        channel: Option<String>,
    },

    /// Send a test mail through the configured SMTP server
    TestEmail {
        /// Recipient address
        to: String,
    },

    /// Fetch all projects once and print Prometheus metrics
    Metrics {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = relmon::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed; continuing without metrics");
    }

    match cli.command {
        Commands::AddProject {
            name,
            source,
            repo_url,
            external_id,
            description,
        } => {
            tracing::info!(name = %name, source = %source, "Starting add-project command");
            commands::add_project(
                &config,
                AddProjectParams {
                    name,
                    source,
                    repo_url,
                    external_id,
                    description,
                },
            )?;
        }

        Commands::Subscribe {
            project_id,
            subscriber,
            webhook_url,
            email,
            channel,
            no_prereleases,
        } => {
            tracing::info!(project_id, subscriber = %subscriber, "Starting subscribe command");
            commands::subscribe(
                &config,
                SubscribeParams {
                    project_id,
                    subscriber,
                    webhook_url,
                    email,
                    channel,
                    no_prereleases,
                },
            )?;
        }

        Commands::Fetch { project_id } => {
            tracing::info!(project_id = ?project_id, "Starting fetch command");
            commands::fetch(&config, project_id).await?;
        }

        Commands::Watch { interval_secs } => {
            commands::watch(&config, interval_secs).await?;
        }

        Commands::Releases { project_id, limit } => {
            commands::releases(&config, project_id, limit)?;
        }

        Commands::Latest { project_id } => {
            commands::latest(&config, project_id).await?;
        }

        Commands::Normalize { source, input } => {
            commands::normalize(&config, source, &input)?;
        }

        Commands::TestWebhook { url, channel } => {
            commands::test_webhook(&config, url, channel).await?;
        }

        Commands::TestEmail { to } => {
            commands::test_email(&config, &to).await?;
        }

        Commands::Metrics { output } => {
            commands::metrics(&config, output).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("relmon=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("relmon={level},warn")))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
