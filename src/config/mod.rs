//! Configuration management for relmon
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files. Every section has defaults, so a config file only needs the keys it
//! wants to override.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream fetching configuration
    pub fetcher: FetcherConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Notification configuration
    pub notifications: NotificationsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream registry client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Rate limit shared by all upstream requests (requests per second)
    pub requests_per_second: u32,

    /// Extra attempts for transient upstream failures
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub retry_base_delay_ms: u64,

    /// User agent string
    pub user_agent: String,

    /// GitHub API token (optional, raises the rate limit)
    pub github_token: Option<String>,

    /// GitHub REST API base URL
    pub github_api_url: String,

    /// npm registry base URL
    pub npm_registry_url: String,

    /// PyPI JSON API base URL
    pub pypi_api_url: String,

    /// crates.io base URL
    pub crates_api_url: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Frontend base URL used to build release links
    pub release_url_base: String,

    /// Display name posted with webhook messages
    pub webhook_username: String,

    /// Webhook request timeout in seconds
    pub webhook_timeout_secs: u64,

    /// Extra attempts for failed webhook deliveries
    pub webhook_max_retries: u32,

    /// SMTP settings; email delivery is off without them
    pub email: Option<SmtpConfig>,
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587)
    Starttls,
    /// Implicit TLS (port 465)
    Tls,
    /// Unencrypted, for local relays only
    None,
}

/// Outgoing mail server for email notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP server host
    pub host: String,

    /// SMTP server port
    pub port: u16,

    /// Connection security
    pub security: SmtpSecurity,

    /// Login user; no authentication when unset
    pub username: Option<String>,

    /// Login password
    pub password: Option<String>,

    /// Sender address
    pub from_email: String,

    /// Sender display name
    pub from_name: String,

    /// Per-message timeout in seconds
    pub timeout_secs: u64,

    /// Extra attempts for transient SMTP failures
    pub max_retries: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            requests_per_second: 5,
            max_retries: 2,
            retry_base_delay_ms: 500,
            user_agent: format!("relmon/{}", env!("CARGO_PKG_VERSION")),
            github_token: None,
            github_api_url: String::from("https://api.github.com"),
            npm_registry_url: String::from("https://registry.npmjs.org"),
            pypi_api_url: String::from("https://pypi.org/pypi"),
            crates_api_url: String::from("https://crates.io"),
        }
    }
}

impl FetcherConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry policy for transient upstream failures
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_retries, self.retry_base_delay_ms, 10_000)
    }

    /// Point every registry at the same base URL (mock servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        self.github_api_url = base.clone();
        self.npm_registry_url = base.clone();
        self.pypi_api_url = base.clone();
        self.crates_api_url = base;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/relmon.db"),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            release_url_base: String::from("http://localhost:5173"),
            webhook_username: String::from("Release Monitor"),
            webhook_timeout_secs: 10,
            webhook_max_retries: 1,
            email: None,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            security: SmtpSecurity::Starttls,
            username: None,
            password: None,
            from_email: String::from("releases@example.com"),
            from_name: String::from("Release Monitor"),
            timeout_secs: 10,
            max_retries: 1,
        }
    }
}

impl SmtpConfig {
    /// Get SMTP timeout as Duration
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Sender as `Name <address>`
    pub fn sender(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    /// Read `RELMON_SMTP_*`; `None` unless a host is set
    fn from_env() -> Option<Self> {
        let host = std::env::var("RELMON_SMTP_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())?;
        let defaults = Self::default();

        Some(Self {
            host,
            port: env_parse("RELMON_SMTP_PORT").unwrap_or(defaults.port),
            security: match std::env::var("RELMON_SMTP_SECURITY").as_deref() {
                Ok("tls") => SmtpSecurity::Tls,
                Ok("none") => SmtpSecurity::None,
                _ => defaults.security,
            },
            username: std::env::var("RELMON_SMTP_USER").ok().filter(|u| !u.is_empty()),
            password: std::env::var("RELMON_SMTP_PASSWORD").ok(),
            from_email: std::env::var("RELMON_SMTP_FROM").unwrap_or(defaults.from_email),
            from_name: defaults.from_name,
            timeout_secs: env_parse("RELMON_SMTP_TIMEOUT").unwrap_or(defaults.timeout_secs),
            max_retries: defaults.max_retries,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("email.host must not be empty");
        }
        if self.port == 0 {
            anyhow::bail!("email.port must be greater than 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("email.timeout_secs must be greater than 0");
        }
        if !self.from_email.contains('@') {
            anyhow::bail!("email.from_email is not an address: {}", self.from_email);
        }
        Ok(())
    }
}

impl NotificationsConfig {
    /// Get webhook timeout as Duration
    #[must_use]
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let fetcher = FetcherConfig {
            request_timeout_secs: env_parse("RELMON_REQUEST_TIMEOUT")
                .unwrap_or(defaults.fetcher.request_timeout_secs),
            requests_per_second: env_parse("RELMON_REQUESTS_PER_SECOND")
                .unwrap_or(defaults.fetcher.requests_per_second),
            max_retries: env_parse("RELMON_MAX_RETRIES").unwrap_or(defaults.fetcher.max_retries),
            retry_base_delay_ms: env_parse("RELMON_RETRY_BASE_DELAY_MS")
                .unwrap_or(defaults.fetcher.retry_base_delay_ms),
            user_agent: std::env::var("RELMON_USER_AGENT")
                .unwrap_or(defaults.fetcher.user_agent),
            github_token: std::env::var("RELMON_GITHUB_TOKEN")
                .or_else(|_| std::env::var("GITHUB_TOKEN"))
                .ok()
                .filter(|t| !t.trim().is_empty()),
            github_api_url: std::env::var("RELMON_GITHUB_API_URL")
                .unwrap_or(defaults.fetcher.github_api_url),
            npm_registry_url: std::env::var("RELMON_NPM_REGISTRY_URL")
                .unwrap_or(defaults.fetcher.npm_registry_url),
            pypi_api_url: std::env::var("RELMON_PYPI_API_URL")
                .unwrap_or(defaults.fetcher.pypi_api_url),
            crates_api_url: std::env::var("RELMON_CRATES_API_URL")
                .unwrap_or(defaults.fetcher.crates_api_url),
        };

        let database = DatabaseConfig {
            sqlite_path: std::env::var("RELMON_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database.sqlite_path),
        };

        let notifications = NotificationsConfig {
            release_url_base: std::env::var("RELMON_RELEASE_URL_BASE")
                .or_else(|_| std::env::var("FRONTEND_URL"))
                .unwrap_or(defaults.notifications.release_url_base),
            webhook_username: std::env::var("RELMON_WEBHOOK_USERNAME")
                .unwrap_or(defaults.notifications.webhook_username),
            webhook_timeout_secs: env_parse("RELMON_WEBHOOK_TIMEOUT")
                .unwrap_or(defaults.notifications.webhook_timeout_secs),
            webhook_max_retries: env_parse("RELMON_WEBHOOK_MAX_RETRIES")
                .unwrap_or(defaults.notifications.webhook_max_retries),
            email: SmtpConfig::from_env(),
        };

        let logging = LoggingConfig {
            level: std::env::var("RELMON_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("RELMON_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            fetcher,
            database,
            notifications,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if self.fetcher.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.notifications.webhook_timeout_secs == 0 {
            anyhow::bail!("webhook_timeout_secs must be greater than 0");
        }

        for (name, url) in [
            ("github_api_url", &self.fetcher.github_api_url),
            ("npm_registry_url", &self.fetcher.npm_registry_url),
            ("pypi_api_url", &self.fetcher.pypi_api_url),
            ("crates_api_url", &self.fetcher.crates_api_url),
            ("release_url_base", &self.notifications.release_url_base),
        ] {
            url::Url::parse(url).with_context(|| format!("{name} is not a valid URL: {url}"))?;
        }

        if let Some(email) = &self.notifications.email {
            email.validate()?;
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.fetcher.request_timeout()
    }
}
