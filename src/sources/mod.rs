//! Upstream release sources
//!
//! One adapter per registry turns that registry's release listing into
//! [`CanonicalRelease`] values:
//!
//! - [`github::GithubSource`] - GitHub releases, falling back to tags
//! - [`npm::NpmSource`] - npm registry packuments
//! - [`pypi::PypiSource`] - PyPI JSON API
//! - [`crates::CratesSource`] - crates.io API v1
//!
//! Adapters are held in a [`SourceRegistry`] keyed by [`SourceKind`]. The
//! set of adapters is closed, so dispatch goes through the [`SourceAdapter`]
//! enum rather than trait objects.
//!
//! # Example
//!
//! ```no_run
//! use relmon::config::FetcherConfig;
//! use relmon::models::SourceKind;
//! use relmon::sources::SourceRegistry;
//!
//! let registry = SourceRegistry::from_config(&FetcherConfig::default())?;
//! assert_eq!(
//!     registry.normalize_external_id(SourceKind::Github, "https://github.com/rust-lang/rust.git")?,
//!     "rust-lang/rust"
//! );
//! # Ok::<(), relmon::Error>(())
//! ```

pub mod client;
pub mod crates;
pub mod github;
pub mod npm;
pub mod pypi;

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::config::FetcherConfig;
use crate::error::Error;
use crate::models::{CanonicalRelease, SourceKind};
use crate::utils::error::SourceError;

pub use client::SourceClient;
pub use crates::CratesSource;
pub use github::GithubSource;
pub use npm::NpmSource;
pub use pypi::PypiSource;

/// Capability set every upstream adapter provides
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Registry this adapter talks to
    fn kind(&self) -> SourceKind;

    /// Fetch every release the upstream knows about
    ///
    /// An upstream with no releases yields an empty vector. An upstream that
    /// does not know `external_id` yields [`SourceError::NotFound`].
    async fn fetch_releases(&self, external_id: &str) -> Result<Vec<CanonicalRelease>, SourceError>;

    /// Fetch only the newest release, or `None` if there is none
    async fn fetch_latest_release(
        &self,
        external_id: &str,
    ) -> Result<Option<CanonicalRelease>, SourceError>;

    /// Reduce a bare name or registry URL to this source's external ID
    ///
    /// Pure and idempotent: `normalize(normalize(x)) == normalize(x)`.
    fn normalize_external_id(&self, input: &str) -> String;
}

/// Closed set of supported adapters
pub enum SourceAdapter {
    Github(GithubSource),
    Npm(NpmSource),
    Pypi(PypiSource),
    Crates(CratesSource),
}

#[async_trait]
impl ReleaseSource for SourceAdapter {
    fn kind(&self) -> SourceKind {
        match self {
            Self::Github(s) => s.kind(),
            Self::Npm(s) => s.kind(),
            Self::Pypi(s) => s.kind(),
            Self::Crates(s) => s.kind(),
        }
    }

    async fn fetch_releases(&self, external_id: &str) -> Result<Vec<CanonicalRelease>, SourceError> {
        match self {
            Self::Github(s) => s.fetch_releases(external_id).await,
            Self::Npm(s) => s.fetch_releases(external_id).await,
            Self::Pypi(s) => s.fetch_releases(external_id).await,
            Self::Crates(s) => s.fetch_releases(external_id).await,
        }
    }

    async fn fetch_latest_release(
        &self,
        external_id: &str,
    ) -> Result<Option<CanonicalRelease>, SourceError> {
        match self {
            Self::Github(s) => s.fetch_latest_release(external_id).await,
            Self::Npm(s) => s.fetch_latest_release(external_id).await,
            Self::Pypi(s) => s.fetch_latest_release(external_id).await,
            Self::Crates(s) => s.fetch_latest_release(external_id).await,
        }
    }

    fn normalize_external_id(&self, input: &str) -> String {
        match self {
            Self::Github(s) => s.normalize_external_id(input),
            Self::Npm(s) => s.normalize_external_id(input),
            Self::Pypi(s) => s.normalize_external_id(input),
            Self::Crates(s) => s.normalize_external_id(input),
        }
    }
}

impl From<GithubSource> for SourceAdapter {
    fn from(source: GithubSource) -> Self {
        Self::Github(source)
    }
}

impl From<NpmSource> for SourceAdapter {
    fn from(source: NpmSource) -> Self {
        Self::Npm(source)
    }
}

impl From<PypiSource> for SourceAdapter {
    fn from(source: PypiSource) -> Self {
        Self::Pypi(source)
    }
}

impl From<CratesSource> for SourceAdapter {
    fn from(source: CratesSource) -> Self {
        Self::Crates(source)
    }
}

/// Lookup table from source kind to adapter
#[derive(Default)]
pub struct SourceRegistry {
    adapters: HashMap<SourceKind, SourceAdapter>,
}

impl SourceRegistry {
    /// Registry with no adapters
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter sharing one HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn from_config(config: &FetcherConfig) -> Result<Self, Error> {
        let client = Arc::new(SourceClient::new(config)?);

        let mut registry = Self::empty();
        registry.register(GithubSource::new(
            Arc::clone(&client),
            &config.github_api_url,
            config.github_token.clone(),
        ));
        registry.register(NpmSource::new(Arc::clone(&client), &config.npm_registry_url));
        registry.register(PypiSource::new(Arc::clone(&client), &config.pypi_api_url));
        registry.register(CratesSource::new(client, &config.crates_api_url));
        Ok(registry)
    }

    /// Add or replace the adapter for its kind
    pub fn register(&mut self, adapter: impl Into<SourceAdapter>) {
        let adapter = adapter.into();
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Adapter for `kind`
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedSource` if no adapter is registered
    pub fn get(&self, kind: SourceKind) -> Result<&SourceAdapter, Error> {
        self.adapters
            .get(&kind)
            .ok_or(Error::UnsupportedSource(kind))
    }

    /// Check if an adapter is registered for `kind`
    pub fn supports(&self, kind: SourceKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Registered kinds
    pub fn kinds(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Normalize `input` with the adapter for `kind`
    pub fn normalize_external_id(&self, kind: SourceKind, input: &str) -> Result<String, Error> {
        Ok(self.get(kind)?.normalize_external_id(input))
    }
}

/// Reject an empty external ID before building a request URL
pub(crate) fn require_external_id(external_id: &str) -> Result<&str, SourceError> {
    let trimmed = external_id.trim();
    if trimmed.is_empty() {
        return Err(SourceError::InvalidExternalId(external_id.to_string()));
    }
    Ok(trimmed)
}

/// Apply `pass` until it stops changing its input
///
/// Each pass only ever shortens or canonicalizes the string, so this
/// terminates well within the bound.
pub(crate) fn normalize_to_fixpoint(input: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = pass(input);
    for _ in 0..=current.len() * 2 {
        let next = pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Path segments of a registry URL or bare name
///
/// Strips the scheme, SSH `git@host:` prefix, query and fragment. The first
/// segment is dropped when a scheme was present or when it is one of `hosts`.
/// Empty segments are removed and the rest are trimmed.
pub(crate) fn path_segments<'a>(input: &'a str, hosts: &[&str]) -> Vec<&'a str> {
    let mut rest = input.trim();
    let mut had_scheme = false;

    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
        had_scheme = true;
    } else if let Some(after) = rest.strip_prefix("git@") {
        match after.split_once(':') {
            Some((_, path)) => rest = path,
            None => rest = after,
        }
    }

    let rest = rest.split(['?', '#']).next().unwrap_or_default();

    let mut segments: Vec<&str> = rest
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let drop_host = match segments.first() {
        Some(first) => {
            had_scheme
                || hosts
                    .iter()
                    .any(|host| first.eq_ignore_ascii_case(host))
        }
        None => false,
    };
    if drop_host {
        segments.remove(0);
    }

    segments
}

/// Drop `prefix` from the front of `segments` when something follows it
pub(crate) fn strip_leading<'a>(segments: &[&'a str], prefix: &[&str]) -> Vec<&'a str> {
    let matches = segments.len() > prefix.len()
        && segments
            .iter()
            .zip(prefix)
            .all(|(seg, want)| seg.eq_ignore_ascii_case(want));

    if matches {
        segments[prefix.len()..].to_vec()
    } else {
        segments.to_vec()
    }
}

/// Prerelease heuristic for semver-style versions (npm, crates.io)
///
/// Lexical, not a semver parse: a leading `alpha`/`beta`/`rc`/`-`, or any
/// `-` pre-release separator.
pub fn is_semver_prerelease(version: &str) -> bool {
    let version = version.trim().to_ascii_lowercase();
    ["alpha", "beta", "rc", "-"]
        .iter()
        .any(|prefix| version.starts_with(prefix))
        || version.contains('-')
}

static PEP440_PRERELEASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d(a|b|rc|\.?dev)\d*").unwrap());

/// Prerelease heuristic for PEP 440 versions (PyPI)
pub fn is_pep440_prerelease(version: &str) -> bool {
    let version = version.trim().to_ascii_lowercase();
    ["a", "b", "rc", "dev", "alpha", "beta"]
        .iter()
        .any(|prefix| version.starts_with(prefix))
        || PEP440_PRERELEASE.is_match(&version)
}
