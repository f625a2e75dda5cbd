//! Boundary with the external trusted-fetch client.
//!
//! The router never verifies anything itself. It drives a
//! [`TrustedFetchClient`] built per origin by a [`ClientFactory`], passing
//! the origin's [`TrustContext`] into every call so that sessions never
//! share trust state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Configuration;
use crate::error::FetchError;

/// Local trust material for one origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrustContext {
    repository_directory: PathBuf,
    ssl_certificates: Option<PathBuf>,
}

impl TrustContext {
    /// Creates a trust context.
    #[must_use]
    pub fn new(repository_directory: PathBuf, ssl_certificates: Option<PathBuf>) -> Self {
        Self {
            repository_directory,
            ssl_certificates,
        }
    }

    /// Returns the directory holding the client's trusted metadata.
    #[must_use]
    pub fn repository_directory(&self) -> &Path {
        &self.repository_directory
    }

    /// Returns the TLS certificate bundle, if any.
    #[must_use]
    pub fn ssl_certificates(&self) -> Option<&Path> {
        self.ssl_certificates.as_deref()
    }
}

/// Trusted file information for one target, as resolved from the current
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    path: String,
    length: u64,
    hashes: BTreeMap<String, String>,
}

impl TargetInfo {
    /// Creates target information.
    #[must_use]
    pub fn new(path: impl Into<String>, length: u64) -> Self {
        Self {
            path: path.into(),
            length,
            hashes: BTreeMap::new(),
        }
    }

    /// Adds a digest (`algorithm` → lowercase hex).
    #[must_use]
    pub fn with_hash(mut self, algorithm: impl Into<String>, digest: impl Into<String>) -> Self {
        self.hashes.insert(algorithm.into(), digest.into());
        self
    }

    /// Returns the target path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the trusted length in bytes.
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Returns the trusted digests.
    #[must_use]
    pub const fn hashes(&self) -> &BTreeMap<String, String> {
        &self.hashes
    }

    /// Returns the digest for an algorithm.
    #[must_use]
    pub fn hash(&self, algorithm: &str) -> Option<&str> {
        self.hashes.get(algorithm).map(String::as_str)
    }

    /// Returns where the target lands under `destination`.
    #[must_use]
    pub fn local_path(&self, destination: &Path) -> PathBuf {
        destination.join(self.path.trim_start_matches('/'))
    }
}

/// Verified metadata refresh and target download for one origin.
///
/// `refresh` is the only operation that replaces the trusted snapshot and
/// therefore takes `&mut self`; lookups and downloads read the snapshot
/// through `&self`. A session holds its client behind a read/write lock, so
/// a download never observes two snapshots.
pub trait TrustedFetchClient: Send + Sync {
    /// Refreshes top-level trusted metadata.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if no mirror yields metadata that verifies.
    fn refresh(&mut self, context: &TrustContext) -> Result<(), FetchError>;

    /// Resolves trusted information for `target_path` against the current
    /// snapshot. Never refreshes implicitly.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if there is no snapshot or the target is unknown.
    fn target(&self, context: &TrustContext, target_path: &str) -> Result<TargetInfo, FetchError>;

    /// Returns the subset of `targets` that is missing or stale under
    /// `destination`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if local files cannot be inspected.
    fn updated_targets(
        &self,
        context: &TrustContext,
        targets: &[TargetInfo],
        destination: &Path,
    ) -> Result<Vec<TargetInfo>, FetchError>;

    /// Downloads and verifies `target` into `destination`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if no mirror serves content matching the
    /// trusted information.
    fn download_target(
        &self,
        context: &TrustContext,
        target: &TargetInfo,
        destination: &Path,
    ) -> Result<(), FetchError>;
}

/// Builds the trusted-fetch client bound to one configuration's mirrors.
pub trait ClientFactory: Send + Sync {
    /// Creates a client for `configuration`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the client cannot be initialised from the
    /// local trust state.
    fn connect(
        &self,
        configuration: &Configuration,
        context: &TrustContext,
    ) -> Result<Box<dyn TrustedFetchClient>, FetchError>;
}

impl<F> ClientFactory for F
where
    F: Fn(&Configuration, &TrustContext) -> Result<Box<dyn TrustedFetchClient>, FetchError>
        + Send
        + Sync,
{
    fn connect(
        &self,
        configuration: &Configuration,
        context: &TrustContext,
    ) -> Result<Box<dyn TrustedFetchClient>, FetchError> {
        self(configuration, context)
    }
}
