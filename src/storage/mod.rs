//! Release storage
//!
//! Projects, releases, assets and subscriptions live in SQLite behind the
//! [`ReleaseRepository`] trait. See [`repository`] for the schema and the
//! in-memory mock used by tests.

pub mod repository;

pub use repository::{
    create_mock_repository, create_sqlite_repository, MockReleaseRepository, ReleaseRepository,
    SharedReleaseRepository, SqliteReleaseRepository, StoreResult,
};

use crate::config::DatabaseConfig;

/// Open the configured SQLite database
pub fn open_repository(config: &DatabaseConfig) -> StoreResult<SharedReleaseRepository> {
    create_sqlite_repository(&config.sqlite_path)
}
