//! Error types for upstream sources and release storage
//!
//! These are the domain errors the ingestion pipeline branches on. The
//! orchestrator treats [`SourceError::NotFound`] as "zero releases" and
//! [`StoreError::Conflict`] as "already stored"; everything else aborts the
//! current project.

use thiserror::Error;

/// Errors that can occur while talking to an upstream registry
#[derive(Error, Debug)]
pub enum SourceError {
    /// The upstream entity does not exist (HTTP 404/410)
    #[error("Not found upstream: {0}")]
    NotFound(String),

    /// Network failure, timeout, rate limit or upstream 5xx after retries
    #[error("Transient upstream failure: {0}")]
    Transient(String),

    /// Upstream refused the request with a non-retryable status
    #[error("Upstream rejected request with status {status}: {url}")]
    Rejected { status: u16, url: String },

    /// Response body could not be decoded into the expected shape
    #[error("Decoding error: {0}")]
    Decode(String),

    /// External ID is empty or malformed for this source
    #[error("Invalid external ID: {0:?}")]
    InvalidExternalId(String),

    /// HTTP client construction or request building failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SourceError {
    /// Check if the upstream reported the entity as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if the failure is worth retrying later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors that can occur in the persistence gateway
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored data could not be mapped back into a model
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Filesystem failure preparing the database location
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A previous holder of the connection lock panicked
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Map a rusqlite error from a write
    ///
    /// UNIQUE violations become `Conflict`, FOREIGN KEY violations become
    /// `NotFound`.
    pub fn from_insert(err: rusqlite::Error, what: impl Into<String>) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Self::Conflict(what.into())
            }
            rusqlite::Error::SqliteFailure(code, _)
                if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                Self::NotFound(format!("parent row for {}", what.into()))
            }
            _ => Self::Database(err),
        }
    }

    /// Check if this is a uniqueness conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
