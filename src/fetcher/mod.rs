//! Fetch orchestrator
//!
//! Pulls releases for stored projects from their upstream registry, stores
//! the ones not seen before and hands those to the notification dispatcher.
//!
//! ```text
//! project ──▶ SourceRegistry ──▶ adapter.fetch_releases
//!                                        │
//!                     (project_id, version) dedup + insert
//!                                        │
//!                        last_checked_at checkpoint
//!                                        │
//!                          NotificationDispatcher
//! ```
//!
//! Everything runs sequentially on the calling task. Each release insert is
//! its own transaction, so an interrupted run keeps what it committed.

pub mod scheduler;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{Error, RelmonErrorTrait, Result};
use crate::metrics::{self, FetchOutcome};
use crate::models::{CanonicalRelease, Project, Release};
use crate::notifications::NotificationDispatcher;
use crate::sources::{ReleaseSource, SourceRegistry};
use crate::storage::SharedReleaseRepository;

pub use scheduler::run_periodic;

/// Release fetch orchestrator
#[derive(Clone)]
pub struct ReleaseFetcher {
    registry: Arc<SourceRegistry>,
    repository: SharedReleaseRepository,
    dispatcher: NotificationDispatcher,
}

impl ReleaseFetcher {
    /// Create a fetcher from its collaborators
    pub fn new(
        registry: Arc<SourceRegistry>,
        repository: SharedReleaseRepository,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            registry,
            repository,
            dispatcher,
        }
    }

    /// Get the repository
    pub fn repository(&self) -> &SharedReleaseRepository {
        &self.repository
    }

    /// External ID for `project`, derived from `repo_url` when unset
    ///
    /// The flag is true for a derived id that still needs to be cached.
    fn resolve_external_id(project: &Project, adapter: &impl ReleaseSource) -> (String, bool) {
        if let Some(id) = project.external_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return (id.to_string(), false);
        }

        let derived = adapter.normalize_external_id(project.repo_url.as_deref().unwrap_or(""));
        let derived_now = !derived.is_empty();
        (derived, derived_now)
    }

    /// Persist a derived external id once upstream has answered for it
    fn cache_external_id(&self, project: &Project, external_id: &str) -> Result<()> {
        self.repository
            .update_project_external_id(project.id, external_id)?;
        tracing::debug!(project = %project.name, external_id = %external_id, "Cached external id");
        Ok(())
    }

    /// Store `canonical` unless the version is already known
    ///
    /// Returns `None` for an existing version, including one inserted
    /// concurrently by another run.
    fn store_if_new(&self, project: &Project, canonical: CanonicalRelease) -> Result<Option<Release>> {
        if self
            .repository
            .find_release_by_project_and_version(project.id, &canonical.version)?
            .is_some()
        {
            return Ok(None);
        }

        let version = canonical.version.clone();
        match self.repository.insert_release(&canonical.into_new_release(project)) {
            Ok(release) => Ok(Some(release)),
            Err(e) if e.is_conflict() => {
                tracing::debug!(project = %project.name, version = %version, "Release stored concurrently");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch, store and announce new releases of one project
    ///
    /// Returns the number of newly stored releases. An upstream that does not
    /// know the project counts as zero releases and still advances
    /// `last_checked_at`; any other upstream error aborts the project before
    /// anything is written.
    ///
    /// # Errors
    ///
    /// - `Error::UnsupportedSource` if no adapter handles `project.source`
    /// - `Error::Source` for transient or malformed upstream responses
    /// - `Error::Store` if persistence fails
    pub async fn fetch_project(&self, project: &Project) -> Result<usize> {
        let source = project.source.as_str();
        let adapter = self.registry.get(project.source)?;
        let (external_id, derived) = Self::resolve_external_id(project, adapter);

        let _timer = metrics::start_fetch_timer(source);
        tracing::debug!(project = %project.name, source, external_id = %external_id, "Fetching releases");

        let (canonical, outcome) = match adapter.fetch_releases(&external_id).await {
            Ok(releases) => (releases, FetchOutcome::Success),
            Err(e) if e.is_not_found() => {
                tracing::info!(project = %project.name, source, "Upstream does not know project");
                (Vec::new(), FetchOutcome::NotFound)
            }
            Err(e) => {
                metrics::record_project_checked(source, FetchOutcome::Failed);
                return Err(e.into());
            }
        };

        if derived {
            if let Err(e) = self.cache_external_id(project, &external_id) {
                metrics::record_project_checked(source, FetchOutcome::Failed);
                return Err(e);
            }
        }

        let mut stored = Vec::new();
        let mut store_error = None;
        for release in canonical {
            match self.store_if_new(project, release) {
                Ok(Some(release)) => stored.push(release),
                Ok(None) => {}
                Err(e) => {
                    store_error = Some(e);
                    break;
                }
            }
        }

        // Committed releases are announced even if a later insert failed;
        // the next run will see them as existing and stay quiet.
        let checkpoint = match store_error {
            Some(e) => Err(e),
            None => self
                .repository
                .update_project_last_checked(project.id, Utc::now())
                .map_err(Error::from),
        };

        self.dispatcher.notify_release_batch(project, &stored).await;
        metrics::record_new_releases(source, stored.len());

        match checkpoint {
            Ok(()) => {
                metrics::record_project_checked(source, outcome);
                if !stored.is_empty() {
                    tracing::info!(
                        project = %project.name,
                        source,
                        new_releases = stored.len(),
                        "Stored new releases"
                    );
                }
                Ok(stored.len())
            }
            Err(e) => {
                metrics::record_project_checked(source, FetchOutcome::Failed);
                Err(e)
            }
        }
    }

    /// One batch iteration: failures are logged and count as zero
    async fn fetch_logged(&self, project: &Project) -> usize {
        match self.fetch_project(project).await {
            Ok(count) => count,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(
                    project = %project.name,
                    source = %project.source,
                    category = %e.category(),
                    error = %e,
                    "Project fetch failed, retrying next run"
                );
                0
            }
            Err(e) => {
                tracing::error!(
                    project = %project.name,
                    source = %project.source,
                    category = %e.category(),
                    error = %e,
                    "Project fetch failed"
                );
                0
            }
        }
    }

    /// Fetch every stored project
    ///
    /// Returns the total number of new releases.
    ///
    /// # Errors
    ///
    /// Only fails if the project list cannot be read; per-project failures
    /// are logged and skipped.
    pub async fn fetch_all_projects(&self) -> Result<usize> {
        let (_tx, rx) = watch::channel(false);
        self.fetch_all_projects_until(&rx).await
    }

    /// Like [`fetch_all_projects`](Self::fetch_all_projects), but stops
    /// before the next project once `shutdown` reads `true`
    pub async fn fetch_all_projects_until(&self, shutdown: &watch::Receiver<bool>) -> Result<usize> {
        let projects = self.repository.find_projects_all()?;
        tracing::info!(projects = projects.len(), "Starting fetch run");

        let mut total = 0;
        let mut checked = 0;
        for project in &projects {
            if *shutdown.borrow() {
                tracing::info!(checked, remaining = projects.len() - checked, "Fetch run interrupted");
                break;
            }
            total += self.fetch_logged(project).await;
            checked += 1;
        }

        tracing::info!(checked, new_releases = total, "Fetch run finished");
        Ok(total)
    }

    /// Fetch one project by id
    ///
    /// # Errors
    ///
    /// Returns `Error::ProjectNotFound` if `project_id` does not exist. Fetch
    /// failures are logged and yield 0, as in a batch run.
    pub async fn fetch_single_project(&self, project_id: i64) -> Result<usize> {
        let project = self
            .repository
            .find_project(project_id)?
            .ok_or(Error::ProjectNotFound(project_id))?;

        Ok(self.fetch_logged(&project).await)
    }

    /// Newest upstream release of a stored project, without storing it
    pub async fn latest_upstream(&self, project_id: i64) -> Result<Option<CanonicalRelease>> {
        let project = self
            .repository
            .find_project(project_id)?
            .ok_or(Error::ProjectNotFound(project_id))?;
        let adapter = self.registry.get(project.source)?;
        let (external_id, derived) = Self::resolve_external_id(&project, adapter);

        let latest = adapter.fetch_latest_release(&external_id).await?;
        if derived {
            self.cache_external_id(&project, &external_id)?;
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewProject, SourceKind};
    use crate::notifications::{Channel, ChannelKind, DeliveryStatus, DeliveryTarget, ReleaseNotification};
    use crate::storage::create_mock_repository;
    use async_trait::async_trait;

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

    fn fetcher(registry: SourceRegistry) -> ReleaseFetcher {
        let repo = create_mock_repository();
        let dispatcher = NotificationDispatcher::new(repo.clone(), Arc::new(NullChannel), "http://ui");
        ReleaseFetcher::new(Arc::new(registry), repo, dispatcher)
    }

    #[tokio::test]
    async fn test_unsupported_source_fails_fast() {
        let fetcher = fetcher(SourceRegistry::empty());
        let project = fetcher
            .repository()
            .insert_project(&NewProject::new("image", SourceKind::Docker))
            .unwrap();

        let err = fetcher.fetch_project(&project).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedSource(SourceKind::Docker)));

        // Batch runs swallow it
        assert_eq!(fetcher.fetch_all_projects().await.unwrap(), 0);
        let reloaded = fetcher.repository().find_project(project.id).unwrap().unwrap();
        assert!(reloaded.last_checked_at.is_none());
    }

    #[tokio::test]
    async fn test_single_project_not_found() {
        let fetcher = fetcher(SourceRegistry::empty());
        let err = fetcher.fetch_single_project(404).await.unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound(404)));
    }

    #[tokio::test]
    async fn test_shutdown_before_first_project() {
        let fetcher = fetcher(SourceRegistry::empty());
        fetcher
            .repository()
            .insert_project(&NewProject::new("image", SourceKind::Docker))
            .unwrap();

        let (_tx, rx) = watch::channel(true);
        assert_eq!(fetcher.fetch_all_projects_until(&rx).await.unwrap(), 0);
    }
}
