//! Notification dispatcher for new releases

use chrono::Utc;
use std::sync::Arc;

use super::channels::Channel;
use super::{ChannelKind, DeliveryTarget, ReleaseNotification};
use crate::metrics;
use crate::models::{Project, Release};
use crate::storage::SharedReleaseRepository;

/// Fans a stored release out to the project's subscribers
///
/// Each subscription gets one delivery per enabled transport that has a
/// channel registered. Delivery failures are recorded on the subscription
/// and in metrics, and never propagate: a broken webhook or mail server
/// cannot undo or block ingestion.
#[derive(Clone)]
pub struct NotificationDispatcher {
    repository: SharedReleaseRepository,
    channels: Vec<Arc<dyn Channel>>,
    release_url_base: String,
}

impl NotificationDispatcher {
    /// Create a dispatcher delivering through `channel`
    pub fn new(
        repository: SharedReleaseRepository,
        channel: Arc<dyn Channel>,
        release_url_base: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            channels: vec![channel],
            release_url_base: release_url_base.into(),
        }
    }

    /// Register another channel; a later channel of the same kind wins
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.retain(|c| c.kind() != channel.kind());
        self.channels.push(channel);
        self
    }

    fn channel_for(&self, kind: ChannelKind) -> Option<&Arc<dyn Channel>> {
        self.channels.iter().find(|c| c.kind() == kind)
    }

    /// Notify every interested subscriber of `release`
    ///
    /// Returns the number of successful deliveries.
    pub async fn notify_new_release(&self, project: &Project, release: &Release) -> usize {
        let subscriptions = match self.repository.find_subscriptions_for_project(project.id) {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    project = %project.name,
                    version = %release.version,
                    error = %e,
                    "Failed to load subscriptions"
                );
                return 0;
            }
        };

        let notification = ReleaseNotification::new(project, release, &self.release_url_base);
        let mut delivered = 0;

        for subscription in subscriptions.iter().filter(|s| s.wants(release)) {
            for target in DeliveryTarget::for_subscription(subscription) {
                let Some(channel) = self.channel_for(target.kind()) else {
                    tracing::debug!(
                        subscriber = %subscription.subscriber,
                        kind = %target.kind(),
                        "No channel configured, skipping delivery"
                    );
                    continue;
                };

                let status = channel.deliver(&target, &notification).await;
                metrics::record_delivery(channel.name(), status.success);

                if status.success {
                    delivered += 1;
                } else {
                    tracing::warn!(
                        project = %project.name,
                        version = %release.version,
                        subscriber = %subscription.subscriber,
                        target = %target.address(),
                        status = %status,
                        "Release notification failed"
                    );
                }

                if let Err(e) = self
                    .repository
                    .record_delivery(subscription.id, status.success, Utc::now())
                {
                    tracing::error!(
                        subscriber = %subscription.subscriber,
                        error = %e,
                        "Failed to record delivery outcome"
                    );
                }
            }
        }

        delivered
    }

    /// Notify subscribers of several releases of one project
    pub async fn notify_release_batch(&self, project: &Project, releases: &[Release]) -> usize {
        let mut delivered = 0;
        for release in releases {
            delivered += self.notify_new_release(project, release).await;
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewProject, NewRelease, NewSubscription, SourceKind};
    use crate::notifications::DeliveryStatus;
    use crate::storage::create_mock_repository;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records targets; fails deliveries to addresses containing "broken"
    struct RecordingChannel {
        kind: ChannelKind,
        sent: Mutex<Vec<(DeliveryTarget, ReleaseNotification)>>,
    }

    impl Default for RecordingChannel {
        fn default() -> Self {
            Self::of(ChannelKind::Webhook)
        }
    }

    impl RecordingChannel {
        fn of(kind: ChannelKind) -> Self {
            Self {
                kind,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            self.kind.as_str()
        }

        fn kind(&self) -> ChannelKind {
            self.kind
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
            if target.address().contains("broken") {
                DeliveryStatus::failure(self.name(), "HTTP 500")
            } else {
                DeliveryStatus::success(self.name())
            }
        }
    }

    fn setup(prerelease: bool) -> (SharedReleaseRepository, Project, Release) {
        let repo = create_mock_repository();
        let project = repo
            .insert_project(&NewProject::new("tokio", SourceKind::Crates))
            .unwrap();
        let release = repo
            .insert_release(&NewRelease {
                project_id: project.id,
                version: "1.0.0-rc.1".to_string(),
                is_prerelease: prerelease,
                ..Default::default()
            })
            .unwrap();
        (repo, project, release)
    }

    #[tokio::test]
    async fn test_no_subscriptions() {
        let (repo, project, release) = setup(false);
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = NotificationDispatcher::new(repo, channel.clone(), "http://ui");

        assert_eq!(dispatcher.notify_new_release(&project, &release).await, 0);
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_selection_and_tracking() {
        let (repo, project, release) = setup(true);
        let ok = repo
            .insert_subscription(&NewSubscription::webhook(project.id, "a", "https://ok/hook").with_channel("dev"))
            .unwrap();
        let broken = repo
            .insert_subscription(&NewSubscription::webhook(project.id, "b", "https://broken/hook"))
            .unwrap();
        repo.insert_subscription(
            &NewSubscription::webhook(project.id, "c", "https://ok/stable").without_prereleases(),
        )
        .unwrap();
        let mut no_url = NewSubscription::webhook(project.id, "d", "");
        no_url.webhook_url = None;
        repo.insert_subscription(&no_url).unwrap();

        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = NotificationDispatcher::new(repo.clone(), channel.clone(), "http://ui");

        assert_eq!(dispatcher.notify_new_release(&project, &release).await, 1);

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            &sent[0].0,
            DeliveryTarget::Webhook(t) if t.channel.as_deref() == Some("dev")
        ));
        assert_eq!(
            sent[0].1.release_url,
            format!("http://ui/projects/{}/releases/{}", project.id, release.id)
        );
        drop(sent);

        let subs = repo.find_subscriptions_for_project(project.id).unwrap();
        let ok_after = subs.iter().find(|s| s.id == ok.id).unwrap();
        assert!(ok_after.last_delivery_at.is_some());
        assert_eq!(ok_after.failure_count, 0);
        let broken_after = subs.iter().find(|s| s.id == broken.id).unwrap();
        assert_eq!(broken_after.failure_count, 1);
    }

    #[tokio::test]
    async fn test_every_enabled_transport_is_used() {
        let (repo, project, release) = setup(false);
        let both = repo
            .insert_subscription(
                &NewSubscription::webhook(project.id, "dev@example.com", "https://ok/hook").with_email(),
            )
            .unwrap();
        repo.insert_subscription(&NewSubscription::email(project.id, "broken@example.com"))
            .unwrap();

        let webhook = Arc::new(RecordingChannel::of(ChannelKind::Webhook));
        let email = Arc::new(RecordingChannel::of(ChannelKind::Email));
        let dispatcher = NotificationDispatcher::new(repo.clone(), webhook.clone(), "http://ui")
            .with_channel(email.clone());

        assert_eq!(dispatcher.notify_new_release(&project, &release).await, 2);

        assert_eq!(webhook.sent.lock().unwrap().len(), 1);
        let mailed: Vec<String> = email
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(target, _)| target.address().to_string())
            .collect();
        assert_eq!(mailed, vec!["dev@example.com", "broken@example.com"]);

        let subs = repo.find_subscriptions_for_project(project.id).unwrap();
        let both_after = subs.iter().find(|s| s.id == both.id).unwrap();
        assert_eq!(both_after.failure_count, 0);
        assert!(both_after.last_delivery_at.is_some());
        let broken_after = subs.iter().find(|s| s.id != both.id).unwrap();
        assert_eq!(broken_after.failure_count, 1);
    }

    #[tokio::test]
    async fn test_transport_without_channel_is_skipped() {
        let (repo, project, release) = setup(false);
        repo.insert_subscription(&NewSubscription::email(project.id, "dev@example.com"))
            .unwrap();

        let webhook = Arc::new(RecordingChannel::default());
        let dispatcher = NotificationDispatcher::new(repo.clone(), webhook.clone(), "http://ui");

        assert_eq!(dispatcher.notify_new_release(&project, &release).await, 0);
        assert!(webhook.sent.lock().unwrap().is_empty());
        let subs = repo.find_subscriptions_for_project(project.id).unwrap();
        assert_eq!(subs[0].failure_count, 0);
        assert!(subs[0].last_delivery_at.is_none());
    }

    #[tokio::test]
    async fn test_batch_sums_deliveries() {
        let (repo, project, release) = setup(false);
        let second = repo
            .insert_release(&NewRelease {
                project_id: project.id,
                version: "1.0.1".to_string(),
                ..Default::default()
            })
            .unwrap();
        repo.insert_subscription(&NewSubscription::webhook(project.id, "a", "https://ok/hook"))
            .unwrap();

        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = NotificationDispatcher::new(repo, channel, "http://ui");

        assert_eq!(
            dispatcher
                .notify_release_batch(&project, &[release, second])
                .await,
            2
        );
    }
}
