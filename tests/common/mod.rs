//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use relmon::config::FetcherConfig;
use relmon::fetcher::ReleaseFetcher;
use relmon::notifications::{
    Channel, ChannelKind, DeliveryStatus, DeliveryTarget, NotificationDispatcher,
    ReleaseNotification,
};
use relmon::sources::SourceRegistry;
use relmon::storage::{create_mock_repository, create_sqlite_repository, SharedReleaseRepository};

/// Channel that records every delivery and always succeeds
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(DeliveryTarget, ReleaseNotification)>>,
}

impl RecordingChannel {
    pub fn attempts(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn versions(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, n)| n.version.clone())
            .collect()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        notification: &ReleaseNotification,
    ) -> DeliveryStatus {
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), notification.clone()));
        DeliveryStatus::success(self.name())
    }
}

/// Fetcher config pointing every registry at `base_url`, with fast retries
pub fn fetcher_config(base_url: &str) -> FetcherConfig {
    FetcherConfig {
        requests_per_second: 1000,
        max_retries: 1,
        retry_base_delay_ms: 1,
        request_timeout_secs: 5,
        ..FetcherConfig::default()
    }
    .with_base_url(base_url)
}

/// Fetcher wired to a recording channel
pub struct Harness {
    pub fetcher: ReleaseFetcher,
    pub repo: SharedReleaseRepository,
    pub channel: Arc<RecordingChannel>,
    _dir: Option<TempDir>,
}

impl Harness {
    fn build(base_url: &str, repo: SharedReleaseRepository, dir: Option<TempDir>) -> Self {
        let registry = SourceRegistry::from_config(&fetcher_config(base_url)).unwrap();
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher =
            NotificationDispatcher::new(repo.clone(), channel.clone(), "http://relmon.test");
        Self {
            fetcher: ReleaseFetcher::new(Arc::new(registry), repo.clone(), dispatcher),
            repo,
            channel,
            _dir: dir,
        }
    }

    /// Harness backed by the in-memory repository
    pub fn mock(base_url: &str) -> Self {
        Self::build(base_url, create_mock_repository(), None)
    }

    /// Harness backed by a SQLite file in a temp dir
    pub fn sqlite(base_url: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let repo = create_sqlite_repository(dir.path().join("relmon.db")).unwrap();
        Self::build(base_url, repo, Some(dir))
    }

    /// Harness over a caller-supplied repository
    pub fn with_repo(base_url: &str, repo: SharedReleaseRepository) -> Self {
        Self::build(base_url, repo, None)
    }

    /// One harness per repository implementation
    pub fn all(base_url: &str) -> Vec<(&'static str, Self)> {
        vec![("mock", Self::mock(base_url)), ("sqlite", Self::sqlite(base_url))]
    }
}

/// npm packument with one entry per `(version, published)` pair
pub fn npm_packument(name: &str, versions: &[(&str, &str)]) -> Value {
    let mut manifests = serde_json::Map::new();
    let mut time = serde_json::Map::new();
    for (version, published) in versions {
        manifests.insert(
            version.to_string(),
            json!({
                "name": name,
                "version": version,
                "dist": {
                    "tarball": format!("https://registry.npmjs.org/{name}/-/{name}-{version}.tgz"),
                    "unpackedSize": 1024
                }
            }),
        );
        time.insert(version.to_string(), json!(published));
    }

    json!({
        "name": name,
        "versions": manifests,
        "time": time,
        "repository": { "type": "git", "url": format!("git+https://github.com/acme/{name}.git") }
    })
}
