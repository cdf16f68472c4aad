//! Unified error handling for the relmon crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain errors available where callers need to branch on them.
//!
//! # Architecture
//!
//! - [`RelmonErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use relmon::error::{Error, RelmonErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(error = %err, category = %err.category(), "Will retry on next run");
//!     } else {
//!         tracing::error!(error = %err, category = %err.category(), "Needs attention");
//!     }
//! }
//! ```

use thiserror::Error;

use crate::models::SourceKind;

// Re-export domain-specific errors for convenience
pub use crate::utils::error::{SourceError, StoreError};

/// Common trait for all relmon error types
pub trait RelmonErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later run may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Upstream registry and HTTP errors
    Network,
    /// Decoding and data extraction errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and programming/data errors
    Config,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RelmonErrorTrait for SourceError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Http(_))
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode(_) => ErrorCategory::Parsing,
            Self::InvalidExternalId(_) => ErrorCategory::Config,
            _ => ErrorCategory::Network,
        }
    }
}

impl RelmonErrorTrait for StoreError {
    fn is_recoverable(&self) -> bool {
        // SQLITE_BUSY and friends go away on their own
        matches!(self, Self::Database(rusqlite::Error::SqliteFailure(code, _))
            if matches!(code.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

/// Unified error type for the relmon crate
#[derive(Error, Debug)]
pub enum Error {
    /// Upstream registry errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Persistence gateway errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// No adapter is registered for the requested source kind
    #[error("Unsupported release source: {0}")]
    UnsupportedSource(SourceKind),

    /// Project id does not exist
    #[error("Project not found: {0}")]
    ProjectNotFound(i64),
}

impl RelmonErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Source(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::UnsupportedSource(_) | Self::ProjectNotFound(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::UnsupportedSource(_) => ErrorCategory::Config,
            Self::ProjectNotFound(_) => ErrorCategory::Storage,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
