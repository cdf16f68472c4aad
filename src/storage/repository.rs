//! Repository Pattern for Release Storage
//!
//! This module provides a trait-based repository abstraction to decouple the
//! ingestion pipeline from its storage implementation, enabling:
//! - Easy testing with the in-memory mock
//! - A single SQLite backend for the CLI and the scheduler
//! - Uniqueness rules enforced identically by both implementations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Business Logic                          │
//! │           (ReleaseFetcher, NotificationDispatcher)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ReleaseRepository                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    ┌─────────┴─────────┐
//!                    ▼                   ▼
//!          ┌─────────────────┐ ┌─────────────────┐
//!          │     SQLite      │ │      Mock       │
//!          │  Implementation │ │ Implementation  │
//!          └─────────────────┘ └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use relmon::storage::repository::{ReleaseRepository, SqliteReleaseRepository};
//!
//! // Production: use SQLite
//! let repo = SqliteReleaseRepository::new("relmon.db")?;
//!
//! // Testing: use Mock
//! let mock_repo = MockReleaseRepository::new();
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    NewProject, NewRelease, NewSubscription, Project, Release, ReleaseAsset, SourceKind,
    Subscription,
};
use crate::utils::error::StoreError;

/// Result type for repository operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Repository Trait
// ============================================================================

/// Persistence gateway for projects, releases and subscriptions
///
/// `(name, source)` is unique per project and `(project_id, version)` is
/// unique per release; violating either yields [`StoreError::Conflict`].
pub trait ReleaseRepository: Send + Sync {
    /// Insert a project
    fn insert_project(&self, project: &NewProject) -> StoreResult<Project>;

    /// Get project by ID
    fn find_project(&self, id: i64) -> StoreResult<Option<Project>>;

    /// All projects, oldest first
    fn find_projects_all(&self) -> StoreResult<Vec<Project>>;

    /// Cache a derived external ID on the project
    fn update_project_external_id(&self, id: i64, external_id: &str) -> StoreResult<()>;

    /// Advance the project's checkpoint
    fn update_project_last_checked(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;

    /// Dedup lookup
    fn find_release_by_project_and_version(
        &self,
        project_id: i64,
        version: &str,
    ) -> StoreResult<Option<Release>>;

    /// Insert a release and its asset atomically
    fn insert_release(&self, release: &NewRelease) -> StoreResult<Release>;

    /// Releases of a project, newest first
    fn find_releases_for_project(&self, project_id: i64) -> StoreResult<Vec<Release>>;

    /// Insert a subscription
    fn insert_subscription(&self, subscription: &NewSubscription) -> StoreResult<Subscription>;

    /// Subscriptions of a project, oldest first
    fn find_subscriptions_for_project(&self, project_id: i64) -> StoreResult<Vec<Subscription>>;

    /// Record a delivery outcome
    ///
    /// Success stamps `last_delivery_at`; failure increments `failure_count`.
    fn record_delivery(
        &self,
        subscription_id: i64,
        success: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        source TEXT NOT NULL,
        external_id TEXT,
        repo_url TEXT,
        description TEXT,
        last_checked_at TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (name, source)
    );

    CREATE TABLE IF NOT EXISTS releases (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        version TEXT NOT NULL,
        tag_name TEXT,
        release_date TEXT,
        changelog TEXT,
        changelog_url TEXT,
        is_draft INTEGER NOT NULL DEFAULT 0,
        is_prerelease INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (project_id, version)
    );

    CREATE TABLE IF NOT EXISTS release_assets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        release_id INTEGER NOT NULL UNIQUE REFERENCES releases(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        download_url TEXT,
        size INTEGER,
        content_type TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS subscriptions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        subscriber TEXT NOT NULL,
        notify_webhook INTEGER NOT NULL DEFAULT 0,
        webhook_url TEXT,
        webhook_channel TEXT,
        notify_email INTEGER NOT NULL DEFAULT 0,
        notify_prereleases INTEGER NOT NULL DEFAULT 1,
        failure_count INTEGER NOT NULL DEFAULT 0,
        last_delivery_at TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (project_id, subscriber)
    );

    CREATE INDEX IF NOT EXISTS idx_releases_project
        ON releases(project_id);

    CREATE INDEX IF NOT EXISTS idx_subscriptions_project
        ON subscriptions(project_id);
"#;

const PROJECT_COLUMNS: &str =
    "id, name, source, external_id, repo_url, description, last_checked_at, created_at";

const RELEASE_SELECT: &str = r#"
    SELECT r.id, r.project_id, r.version, r.tag_name, r.release_date, r.changelog,
           r.changelog_url, r.is_draft, r.is_prerelease, r.created_at,
           a.id, a.name, a.download_url, a.size, a.content_type, a.created_at
    FROM releases r
    LEFT JOIN release_assets a ON a.release_id = r.id
"#;

const SUBSCRIPTION_COLUMNS: &str = "id, project_id, subscriber, notify_webhook, webhook_url, \
     webhook_channel, notify_email, notify_prereleases, failure_count, last_delivery_at, created_at";

fn parse_column_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_column_timestamp(idx, &row.get::<_, String>(idx)?)
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_column_timestamp(idx, &raw))
        .transpose()
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let source: String = row.get(2)?;
    let source = SourceKind::parse(&source).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown source kind: {source}").into(),
        )
    })?;

    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        source,
        external_id: row.get(3)?,
        repo_url: row.get(4)?,
        description: row.get(5)?,
        last_checked_at: optional_timestamp_at(row, 6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

fn release_from_row(row: &Row<'_>) -> rusqlite::Result<Release> {
    let release_id: i64 = row.get(0)?;
    let asset = match row.get::<_, Option<i64>>(10)? {
        Some(asset_id) => Some(ReleaseAsset {
            id: asset_id,
            release_id,
            name: row.get(11)?,
            download_url: row.get(12)?,
            size: row.get(13)?,
            content_type: row.get(14)?,
            created_at: timestamp_at(row, 15)?,
        }),
        None => None,
    };

    Ok(Release {
        id: release_id,
        project_id: row.get(1)?,
        version: row.get(2)?,
        tag_name: row.get(3)?,
        release_date: optional_timestamp_at(row, 4)?,
        changelog: row.get(5)?,
        changelog_url: row.get(6)?,
        is_draft: row.get(7)?,
        is_prerelease: row.get(8)?,
        created_at: timestamp_at(row, 9)?,
        asset,
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        project_id: row.get(1)?,
        subscriber: row.get(2)?,
        notify_webhook: row.get(3)?,
        webhook_url: row.get(4)?,
        webhook_channel: row.get(5)?,
        notify_email: row.get(6)?,
        notify_prereleases: row.get(7)?,
        failure_count: row.get(8)?,
        last_delivery_at: optional_timestamp_at(row, 9)?,
        created_at: timestamp_at(row, 10)?,
    })
}

/// Map a row conversion failure to `Corrupt`, keep other errors as-is
fn read_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(idx, _, source) => {
            StoreError::Corrupt(format!("column {idx}: {source}"))
        }
        other => StoreError::Database(other),
    }
}

/// SQLite implementation of ReleaseRepository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteReleaseRepository {
    conn: Mutex<Connection>,
}

impl SqliteReleaseRepository {
    /// Create a new SQLite repository
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Create database schema
    fn create_schema(&self) -> StoreResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn release_by_id(conn: &Connection, id: i64) -> StoreResult<Option<Release>> {
        conn.query_row(
            &format!("{RELEASE_SELECT} WHERE r.id = ?1"),
            params![id],
            release_from_row,
        )
        .optional()
        .map_err(read_error)
    }

    fn subscription_by_id(conn: &Connection, id: i64) -> StoreResult<Option<Subscription>> {
        conn.query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
            params![id],
            subscription_from_row,
        )
        .optional()
        .map_err(read_error)
    }

    fn expect_updated(changed: usize, what: impl FnOnce() -> String) -> StoreResult<()> {
        if changed == 0 {
            return Err(StoreError::NotFound(what()));
        }
        Ok(())
    }
}

impl ReleaseRepository for SqliteReleaseRepository {
    fn insert_project(&self, project: &NewProject) -> StoreResult<Project> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            r#"
                INSERT INTO projects (name, source, external_id, repo_url, description, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            params![
                project.name,
                project.source.as_str(),
                project.external_id,
                project.repo_url,
                project.description,
                now.to_rfc3339()
            ],
        )
        .map_err(|e| {
            StoreError::from_insert(e, format!("project {} ({})", project.name, project.source))
        })?;

        Ok(Project {
            id: conn.last_insert_rowid(),
            name: project.name.clone(),
            source: project.source,
            external_id: project.external_id.clone(),
            repo_url: project.repo_url.clone(),
            description: project.description.clone(),
            last_checked_at: None,
            created_at: now,
        })
    }

    fn find_project(&self, id: i64) -> StoreResult<Option<Project>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            project_from_row,
        )
        .optional()
        .map_err(read_error)
    }

    fn find_projects_all(&self) -> StoreResult<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id"))?;
        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(read_error)?;
        Ok(projects)
    }

    fn update_project_external_id(&self, id: i64, external_id: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE projects SET external_id = ?1 WHERE id = ?2",
            params![external_id, id],
        )?;
        Self::expect_updated(changed, || format!("project {id}"))
    }

    fn update_project_last_checked(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE projects SET last_checked_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id],
        )?;
        Self::expect_updated(changed, || format!("project {id}"))
    }

    fn find_release_by_project_and_version(
        &self,
        project_id: i64,
        version: &str,
    ) -> StoreResult<Option<Release>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{RELEASE_SELECT} WHERE r.project_id = ?1 AND r.version = ?2"),
            params![project_id, version],
            release_from_row,
        )
        .optional()
        .map_err(read_error)
    }

    fn insert_release(&self, release: &NewRelease) -> StoreResult<Release> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let what = || format!("release {} of project {}", release.version, release.project_id);

        let tx = conn.transaction()?;

        tx.execute(
            r#"
                INSERT INTO releases (project_id, version, tag_name, release_date, changelog,
                                      changelog_url, is_draft, is_prerelease, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            params![
                release.project_id,
                release.version,
                release.tag_name,
                release.release_date.map(|d| d.to_rfc3339()),
                release.changelog,
                release.changelog_url,
                release.is_draft,
                release.is_prerelease,
                now
            ],
        )
        .map_err(|e| StoreError::from_insert(e, what()))?;

        let release_id = tx.last_insert_rowid();

        if let Some(asset) = &release.asset {
            tx.execute(
                r#"
                    INSERT INTO release_assets (release_id, name, download_url, size, content_type, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                params![
                    release_id,
                    asset.name,
                    asset.download_url,
                    asset.size,
                    asset.content_type,
                    now
                ],
            )
            .map_err(|e| StoreError::from_insert(e, format!("asset of {}", what())))?;
        }

        tx.commit()?;

        Self::release_by_id(&conn, release_id)?
            .ok_or_else(|| StoreError::Corrupt(format!("{} vanished after insert", what())))
    }

    fn find_releases_for_project(&self, project_id: i64) -> StoreResult<Vec<Release>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("{RELEASE_SELECT} WHERE r.project_id = ?1 ORDER BY r.id DESC"))?;
        let releases = stmt
            .query_map(params![project_id], release_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(read_error)?;
        Ok(releases)
    }

    fn insert_subscription(&self, subscription: &NewSubscription) -> StoreResult<Subscription> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO subscriptions (project_id, subscriber, notify_webhook, webhook_url,
                                           webhook_channel, notify_email, notify_prereleases,
                                           created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            params![
                subscription.project_id,
                subscription.subscriber,
                subscription.notify_webhook,
                subscription.webhook_url,
                subscription.webhook_channel,
                subscription.notify_email,
                subscription.notify_prereleases,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| {
            StoreError::from_insert(
                e,
                format!(
                    "subscription of {} to project {}",
                    subscription.subscriber, subscription.project_id
                ),
            )
        })?;

        let id = conn.last_insert_rowid();
        Self::subscription_by_id(&conn, id)?
            .ok_or_else(|| StoreError::Corrupt(format!("subscription {id} vanished after insert")))
    }

    fn find_subscriptions_for_project(&self, project_id: i64) -> StoreResult<Vec<Subscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE project_id = ?1 ORDER BY id"
        ))?;
        let subscriptions = stmt
            .query_map(params![project_id], subscription_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(read_error)?;
        Ok(subscriptions)
    }

    fn record_delivery(
        &self,
        subscription_id: i64,
        success: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = if success {
            conn.execute(
                "UPDATE subscriptions SET last_delivery_at = ?1 WHERE id = ?2",
                params![at.to_rfc3339(), subscription_id],
            )?
        } else {
            conn.execute(
                "UPDATE subscriptions SET failure_count = failure_count + 1 WHERE id = ?1",
                params![subscription_id],
            )?
        };
        Self::expect_updated(changed, || format!("subscription {subscription_id}"))
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

#[derive(Default)]
struct MockState {
    projects: HashMap<i64, Project>,
    releases: HashMap<i64, Release>,
    subscriptions: HashMap<i64, Subscription>,
    next_id: i64,
}

impl MockState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory mock implementation of ReleaseRepository
///
/// Useful for testing without database dependencies. Enforces the same
/// uniqueness and parent-row rules as the SQLite schema.
pub struct MockReleaseRepository {
    state: RwLock<MockState>,
}

impl MockReleaseRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MockState::default()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MockState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MockState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Get the number of stored releases
    pub fn release_count(&self) -> usize {
        self.read().map(|s| s.releases.len()).unwrap_or_default()
    }

    /// Clear all records
    pub fn clear(&self) {
        if let Ok(mut state) = self.write() {
            *state = MockState::default();
        }
    }
}

impl Default for MockReleaseRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseRepository for MockReleaseRepository {
    fn insert_project(&self, project: &NewProject) -> StoreResult<Project> {
        let mut state = self.write()?;
        if state
            .projects
            .values()
            .any(|p| p.name == project.name && p.source == project.source)
        {
            return Err(StoreError::Conflict(format!(
                "project {} ({})",
                project.name, project.source
            )));
        }

        let id = state.next_id();
        let stored = Project {
            id,
            name: project.name.clone(),
            source: project.source,
            external_id: project.external_id.clone(),
            repo_url: project.repo_url.clone(),
            description: project.description.clone(),
            last_checked_at: None,
            created_at: Utc::now(),
        };
        state.projects.insert(id, stored.clone());
        Ok(stored)
    }

    fn find_project(&self, id: i64) -> StoreResult<Option<Project>> {
        Ok(self.read()?.projects.get(&id).cloned())
    }

    fn find_projects_all(&self) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<Project> = self.read()?.projects.values().cloned().collect();
        projects.sort_by_key(|p| p.id);
        Ok(projects)
    }

    fn update_project_external_id(&self, id: i64, external_id: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        let project = state
            .projects
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))?;
        project.external_id = Some(external_id.to_string());
        Ok(())
    }

    fn update_project_last_checked(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.write()?;
        let project = state
            .projects
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))?;
        project.last_checked_at = Some(at);
        Ok(())
    }

    fn find_release_by_project_and_version(
        &self,
        project_id: i64,
        version: &str,
    ) -> StoreResult<Option<Release>> {
        Ok(self
            .read()?
            .releases
            .values()
            .find(|r| r.project_id == project_id && r.version == version)
            .cloned())
    }

    fn insert_release(&self, release: &NewRelease) -> StoreResult<Release> {
        let mut state = self.write()?;
        let what = format!("release {} of project {}", release.version, release.project_id);

        if !state.projects.contains_key(&release.project_id) {
            return Err(StoreError::NotFound(format!("parent row for {what}")));
        }
        if state
            .releases
            .values()
            .any(|r| r.project_id == release.project_id && r.version == release.version)
        {
            return Err(StoreError::Conflict(what));
        }

        let now = Utc::now();
        let id = state.next_id();
        let asset = match &release.asset {
            Some(asset) => Some(ReleaseAsset {
                id: state.next_id(),
                release_id: id,
                name: asset.name.clone(),
                download_url: asset.download_url.clone(),
                size: asset.size,
                content_type: asset.content_type.clone(),
                created_at: now,
            }),
            None => None,
        };

        let stored = Release {
            id,
            project_id: release.project_id,
            version: release.version.clone(),
            tag_name: release.tag_name.clone(),
            release_date: release.release_date,
            changelog: release.changelog.clone(),
            changelog_url: release.changelog_url.clone(),
            is_draft: release.is_draft,
            is_prerelease: release.is_prerelease,
            created_at: now,
            asset,
        };
        state.releases.insert(id, stored.clone());
        Ok(stored)
    }

    fn find_releases_for_project(&self, project_id: i64) -> StoreResult<Vec<Release>> {
        let mut releases: Vec<Release> = self
            .read()?
            .releases
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        releases.sort_by_key(|r| std::cmp::Reverse(r.id));
        Ok(releases)
    }

    fn insert_subscription(&self, subscription: &NewSubscription) -> StoreResult<Subscription> {
        let mut state = self.write()?;
        let what = format!(
            "subscription of {} to project {}",
            subscription.subscriber, subscription.project_id
        );

        if !state.projects.contains_key(&subscription.project_id) {
            return Err(StoreError::NotFound(format!("parent row for {what}")));
        }
        if state.subscriptions.values().any(|s| {
            s.project_id == subscription.project_id && s.subscriber == subscription.subscriber
        }) {
            return Err(StoreError::Conflict(what));
        }

        let id = state.next_id();
        let stored = Subscription {
            id,
            project_id: subscription.project_id,
            subscriber: subscription.subscriber.clone(),
            notify_webhook: subscription.notify_webhook,
            webhook_url: subscription.webhook_url.clone(),
            webhook_channel: subscription.webhook_channel.clone(),
            notify_email: subscription.notify_email,
            notify_prereleases: subscription.notify_prereleases,
            failure_count: 0,
            last_delivery_at: None,
            created_at: Utc::now(),
        };
        state.subscriptions.insert(id, stored.clone());
        Ok(stored)
    }

    fn find_subscriptions_for_project(&self, project_id: i64) -> StoreResult<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = self
            .read()?
            .subscriptions
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| s.id);
        Ok(subscriptions)
    }

    fn record_delivery(
        &self,
        subscription_id: i64,
        success: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        let subscription = state
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| StoreError::NotFound(format!("subscription {subscription_id}")))?;

        if success {
            subscription.last_delivery_at = Some(at);
        } else {
            subscription.failure_count += 1;
        }
        Ok(())
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared repository wrapper
pub type SharedReleaseRepository = Arc<dyn ReleaseRepository>;

/// Create a shared SQLite repository
pub fn create_sqlite_repository(path: impl AsRef<Path>) -> StoreResult<SharedReleaseRepository> {
    let repo = SqliteReleaseRepository::new(path)?;
    Ok(Arc::new(repo))
}

/// Create a shared mock repository
pub fn create_mock_repository() -> SharedReleaseRepository {
    Arc::new(MockReleaseRepository::new())
}

// ============================================================================
// Tests
// ============================================================================
