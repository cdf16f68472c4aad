//! Integration tests for the fetch orchestrator using wiremock
//!
//! Every scenario runs against both the in-memory and the SQLite repository.

mod common;

use chrono::{DateTime, Utc};
use common::{npm_packument, Harness};
use relmon::models::{
    NewProject, NewRelease, NewSubscription, Project, Release, SourceKind, Subscription,
};
use relmon::storage::{create_sqlite_repository, ReleaseRepository, SharedReleaseRepository, StoreResult};
use relmon::Error;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_npm(server: &MockServer, name: &str, versions: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path(format!("/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(npm_packument(name, versions)))
        .mount(server)
        .await;
}

/// Two versions stored oldest first, the beta flagged; a third shows up alone
#[tokio::test]
async fn test_npm_new_versions() {
    let server = MockServer::start().await;

    for (label, h) in Harness::all(&server.uri()) {
        server.reset().await;
        mount_npm(
            &server,
            "left-pad",
            &[
                ("1.0.0", "2024-01-01T00:00:00.000Z"),
                ("1.1.0-beta", "2024-02-01T00:00:00.000Z"),
            ],
        )
        .await;

        let project = h
            .repo
            .insert_project(&NewProject::new("left-pad", SourceKind::Npm).with_external_id("left-pad"))
            .unwrap();

        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 2, "{label}");

        let releases = h.repo.find_releases_for_project(project.id).unwrap();
        assert_eq!(releases.len(), 2, "{label}");
        // newest first
        assert_eq!(releases[0].version, "1.1.0-beta");
        assert!(releases[0].is_prerelease);
        assert_eq!(releases[1].version, "1.0.0");
        assert!(!releases[1].is_prerelease);
        assert_eq!(
            releases[1].changelog_url.as_deref(),
            Some("https://github.com/acme/left-pad/releases/tag/1.0.0")
        );
        let asset = releases[1].asset.as_ref().expect("asset stored with release");
        assert_eq!(asset.name, "left-pad-1.0.0");
        assert_eq!(asset.size, Some(1024));

        server.reset().await;
        mount_npm(
            &server,
            "left-pad",
            &[
                ("1.0.0", "2024-01-01T00:00:00.000Z"),
                ("1.1.0-beta", "2024-02-01T00:00:00.000Z"),
                ("1.2.0", "2024-03-01T00:00:00.000Z"),
            ],
        )
        .await;

        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 1, "{label}");
        assert_eq!(h.repo.find_releases_for_project(project.id).unwrap().len(), 3);
    }
}

#[tokio::test]
async fn test_fetch_is_idempotent() {
    let server = MockServer::start().await;
    mount_npm(&server, "chalk", &[("5.0.0", "2024-01-01T00:00:00Z"), ("5.1.0", "2024-02-01T00:00:00Z")]).await;

    for (label, h) in Harness::all(&server.uri()) {
        let project = h
            .repo
            .insert_project(&NewProject::new("chalk", SourceKind::Npm).with_external_id("chalk"))
            .unwrap();

        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 2, "{label}");
        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 0, "{label}");
        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 0, "{label}");

        let releases = h.repo.find_releases_for_project(project.id).unwrap();
        assert_eq!(releases.len(), 2, "{label}");
    }
}

#[tokio::test]
async fn test_not_found_advances_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/crates/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": [{"detail": "Not Found"}]})))
        .mount(&server)
        .await;

    for (label, h) in Harness::all(&server.uri()) {
        let project = h
            .repo
            .insert_project(&NewProject::new("ghost", SourceKind::Crates).with_external_id("ghost"))
            .unwrap();

        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 0, "{label}");

        let reloaded = h.repo.find_project(project.id).unwrap().unwrap();
        assert!(reloaded.last_checked_at.is_some(), "{label}");
        assert!(h.repo.find_releases_for_project(project.id).unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_transient_failure_is_isolated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/crates/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_npm(&server, "ok-pkg", &[("0.1.0", "2024-01-01T00:00:00Z")]).await;

    for (label, h) in Harness::all(&server.uri()) {
        let flaky = h
            .repo
            .insert_project(&NewProject::new("flaky", SourceKind::Crates).with_external_id("flaky"))
            .unwrap();
        let ok = h
            .repo
            .insert_project(&NewProject::new("ok-pkg", SourceKind::Npm).with_external_id("ok-pkg"))
            .unwrap();

        let err = h.fetcher.fetch_project(&flaky).await.unwrap_err();
        assert!(matches!(err, Error::Source(ref e) if e.is_transient()), "{label}: {err}");

        assert_eq!(h.fetcher.fetch_all_projects().await.unwrap(), 1, "{label}");

        let flaky_after = h.repo.find_project(flaky.id).unwrap().unwrap();
        assert!(flaky_after.last_checked_at.is_none(), "{label}");
        let ok_after = h.repo.find_project(ok.id).unwrap().unwrap();
        assert!(ok_after.last_checked_at.is_some(), "{label}");
    }
}

#[tokio::test]
async fn test_external_id_derived_and_cached() {
    let server = MockServer::start().await;
    mount_npm(&server, "express", &[("4.19.0", "2024-03-25T00:00:00Z")]).await;

    for (label, h) in Harness::all(&server.uri()) {
        let project = h
            .repo
            .insert_project(
                &NewProject::new("express", SourceKind::Npm)
                    .with_repo_url("https://www.npmjs.com/package/express/v/4.19.0"),
            )
            .unwrap();
        assert!(project.external_id.is_none());

        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 1, "{label}");

        let reloaded = h.repo.find_project(project.id).unwrap().unwrap();
        assert_eq!(reloaded.external_id.as_deref(), Some("express"), "{label}");
    }
}

/// A failed upstream call must not leave the derived id behind
#[tokio::test]
async fn test_external_id_cached_only_after_upstream_answers() {
    let server = MockServer::start().await;

    for (label, h) in Harness::all(&server.uri()) {
        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/crates/serde"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let project = h
            .repo
            .insert_project(
                &NewProject::new("serde", SourceKind::Crates)
                    .with_repo_url("https://crates.io/crates/serde"),
            )
            .unwrap();

        assert!(h.fetcher.fetch_project(&project).await.is_err(), "{label}");
        let reloaded = h.repo.find_project(project.id).unwrap().unwrap();
        assert!(reloaded.external_id.is_none(), "{label}");

        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/crates/serde"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": [{"detail": "Not Found"}]})))
            .mount(&server)
            .await;

        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 0, "{label}");
        let reloaded = h.repo.find_project(project.id).unwrap().unwrap();
        assert_eq!(reloaded.external_id.as_deref(), Some("serde"), "{label}");
    }
}

/// SQLite repository whose dedup lookup never sees an existing release,
/// as when another run inserts between lookup and insert
struct BlindLookupRepository(SharedReleaseRepository);

impl ReleaseRepository for BlindLookupRepository {
    fn insert_project(&self, project: &NewProject) -> StoreResult<Project> {
        self.0.insert_project(project)
    }

    fn find_project(&self, id: i64) -> StoreResult<Option<Project>> {
        self.0.find_project(id)
    }

    fn find_projects_all(&self) -> StoreResult<Vec<Project>> {
        self.0.find_projects_all()
    }

    fn update_project_external_id(&self, id: i64, external_id: &str) -> StoreResult<()> {
        self.0.update_project_external_id(id, external_id)
    }

    fn update_project_last_checked(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.0.update_project_last_checked(id, at)
    }

    fn find_release_by_project_and_version(&self, _: i64, _: &str) -> StoreResult<Option<Release>> {
        Ok(None)
    }

    fn insert_release(&self, release: &NewRelease) -> StoreResult<Release> {
        self.0.insert_release(release)
    }

    fn find_releases_for_project(&self, project_id: i64) -> StoreResult<Vec<Release>> {
        self.0.find_releases_for_project(project_id)
    }

    fn insert_subscription(&self, subscription: &NewSubscription) -> StoreResult<Subscription> {
        self.0.insert_subscription(subscription)
    }

    fn find_subscriptions_for_project(&self, project_id: i64) -> StoreResult<Vec<Subscription>> {
        self.0.find_subscriptions_for_project(project_id)
    }

    fn record_delivery(&self, subscription_id: i64, success: bool, at: DateTime<Utc>) -> StoreResult<()> {
        self.0.record_delivery(subscription_id, success, at)
    }
}

#[tokio::test]
async fn test_racing_insert_counts_as_existing() {
    let server = MockServer::start().await;
    mount_npm(&server, "ms", &[("2.1.3", "2021-01-01T00:00:00Z")]).await;

    let dir = TempDir::new().unwrap();
    let sqlite = create_sqlite_repository(dir.path().join("relmon.db")).unwrap();
    let h = Harness::with_repo(&server.uri(), Arc::new(BlindLookupRepository(sqlite)));

    let project = h
        .repo
        .insert_project(&NewProject::new("ms", SourceKind::Npm).with_external_id("ms"))
        .unwrap();
    h.repo
        .insert_subscription(&NewSubscription::webhook(project.id, "dev@example.com", "https://chat.example.com/hooks/1"))
        .unwrap();

    assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 1);
    // the unique index rejects the second insert; that is not an error
    assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 0);

    assert_eq!(h.repo.find_releases_for_project(project.id).unwrap().len(), 1);
    assert_eq!(h.channel.attempts(), 1);
    let reloaded = h.repo.find_project(project.id).unwrap().unwrap();
    assert!(reloaded.last_checked_at.is_some());
}

#[tokio::test]
async fn test_one_subscription_one_attempt_per_release() {
    let server = MockServer::start().await;
    mount_npm(&server, "vite", &[("5.0.0", "2024-01-01T00:00:00Z"), ("5.1.0", "2024-02-01T00:00:00Z")]).await;

    for (label, h) in Harness::all(&server.uri()) {
        let project = h
            .repo
            .insert_project(&NewProject::new("vite", SourceKind::Npm).with_external_id("vite"))
            .unwrap();
        h.repo
            .insert_subscription(&NewSubscription::webhook(project.id, "dev@example.com", "https://chat.example.com/hooks/1"))
            .unwrap();

        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 2, "{label}");
        assert_eq!(h.channel.attempts(), 2, "{label}");
        assert_eq!(h.channel.versions(), vec!["5.0.0", "5.1.0"], "{label}");

        // nothing new, nothing sent
        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 0);
        assert_eq!(h.channel.attempts(), 2, "{label}");

        let subs = h.repo.find_subscriptions_for_project(project.id).unwrap();
        assert!(subs[0].last_delivery_at.is_some(), "{label}");
    }
}

#[tokio::test]
async fn test_zero_subscriptions_zero_attempts() {
    let server = MockServer::start().await;
    mount_npm(&server, "lodash", &[("4.17.21", "2021-02-20T00:00:00Z")]).await;

    for (label, h) in Harness::all(&server.uri()) {
        let project = h
            .repo
            .insert_project(&NewProject::new("lodash", SourceKind::Npm).with_external_id("lodash"))
            .unwrap();

        assert_eq!(h.fetcher.fetch_project(&project).await.unwrap(), 1, "{label}");
        assert_eq!(h.channel.attempts(), 0, "{label}");
    }
}

#[tokio::test]
async fn test_fetch_single_project() {
    let server = MockServer::start().await;
    mount_npm(&server, "react", &[("18.3.1", "2024-04-26T00:00:00Z")]).await;

    let h = Harness::mock(&server.uri());
    let project = h
        .repo
        .insert_project(&NewProject::new("react", SourceKind::Npm).with_external_id("react"))
        .unwrap();

    assert_eq!(h.fetcher.fetch_single_project(project.id).await.unwrap(), 1);
    assert!(matches!(
        h.fetcher.fetch_single_project(project.id + 100).await,
        Err(Error::ProjectNotFound(_))
    ));
}

#[tokio::test]
async fn test_latest_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/react/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "react", "version": "19.0.0-rc.1"})))
        .mount(&server)
        .await;

    let h = Harness::mock(&server.uri());
    let project = h
        .repo
        .insert_project(&NewProject::new("react", SourceKind::Npm).with_external_id("react"))
        .unwrap();

    let latest = h.fetcher.latest_upstream(project.id).await.unwrap().unwrap();
    assert_eq!(latest.version, "19.0.0-rc.1");
    assert!(latest.is_prerelease);
    // nothing stored
    assert!(h.repo.find_releases_for_project(project.id).unwrap().is_empty());
}
