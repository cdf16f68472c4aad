//! Periodic fetch loop
//!
//! Runs [`ReleaseFetcher::fetch_all_projects_until`] on a fixed interval
//! until the shutdown flag flips. The first run starts immediately.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::ReleaseFetcher;

/// Run fetch cycles every `period` until `shutdown` reads `true`
///
/// A cycle in progress finishes its current project before stopping.
/// Dropping the sender also stops the loop. Returns the number of new
/// releases stored across all cycles.
pub async fn run_periodic(
    fetcher: &ReleaseFetcher,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut total = 0;
    let mut cycles = 0u64;

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                cycles += 1;
                match fetcher.fetch_all_projects_until(&shutdown).await {
                    Ok(count) => total += count,
                    Err(e) => tracing::error!(cycle = cycles, error = %e, "Fetch cycle failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(cycles, new_releases = total, "Fetch loop stopped");
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{Channel, ChannelKind, DeliveryStatus, DeliveryTarget, NotificationDispatcher, ReleaseNotification};
    use crate::sources::SourceRegistry;
    use crate::storage::create_mock_repository;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NullChannel;

    #[async_trait]
    impl Channel for NullChannel {
        fn name(&self) -> &str {
            "null"
        }

        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }

        async fn deliver(&self, _: &DeliveryTarget, _: &ReleaseNotification) -> DeliveryStatus {
            DeliveryStatus::success(self.name())
        }
    }

    fn fetcher() -> ReleaseFetcher {
        let repo = create_mock_repository();
        let dispatcher = NotificationDispatcher::new(repo.clone(), Arc::new(NullChannel), "http://ui");
        ReleaseFetcher::new(Arc::new(SourceRegistry::empty()), repo, dispatcher)
    }

    #[tokio::test]
    async fn test_stops_when_already_shut_down() {
        let (_tx, rx) = watch::channel(true);
        assert_eq!(run_periodic(&fetcher(), Duration::from_secs(3600), rx).await, 0);
    }

    #[tokio::test]
    async fn test_stops_on_signal() {
        let fetcher = fetcher();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { run_periodic(&fetcher, Duration::from_secs(3600), rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let total = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let total = tokio::time::timeout(
            Duration::from_secs(5),
            run_periodic(&fetcher(), Duration::from_secs(3600), rx),
        )
        .await
        .expect("loop did not stop");
        assert_eq!(total, 0);
    }
}
