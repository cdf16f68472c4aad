//! relmon - Multi-registry release monitor
//!
//! Watches projects on GitHub, npm, PyPI and crates.io, stores every release
//! exactly once and announces new ones to subscribers by webhook and email.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`sources`] - Upstream registry adapters and the shared HTTP client
//! - [`fetcher`] - Fetch orchestration, dedup and the periodic loop
//! - [`notifications`] - Subscriber fan-out and the webhook and email channels
//! - [`storage`] - SQLite persistence behind the repository trait
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relmon::config::Config;
//! use relmon::fetcher::ReleaseFetcher;
//! use relmon::notifications::{NotificationDispatcher, WebhookChannel, WebhookConfig};
//! use relmon::sources::SourceRegistry;
//! use relmon::storage::open_repository;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repo = open_repository(&config.database)?;
//!     let registry = Arc::new(SourceRegistry::from_config(&config.fetcher)?);
//!     let channel = WebhookChannel::new(WebhookConfig::from_notifications(&config.notifications))?;
//!     let dispatcher = NotificationDispatcher::new(
//!         repo.clone(),
//!         Arc::new(channel),
//!         config.notifications.release_url_base.clone(),
//!     );
//!
//!     let fetcher = ReleaseFetcher::new(registry, repo, dispatcher);
//!     let new_releases = fetcher.fetch_all_projects().await?;
//!     println!("{new_releases} new releases");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod sources;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, RelmonErrorTrait, Result};
    pub use crate::fetcher::ReleaseFetcher;
    pub use crate::models::{CanonicalRelease, Project, Release, SourceKind, Subscription};
    pub use crate::notifications::{Channel, NotificationDispatcher};
    pub use crate::sources::{ReleaseSource, SourceRegistry};
    pub use crate::storage::{ReleaseRepository, SharedReleaseRepository};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use models::{CanonicalRelease, SourceKind};
