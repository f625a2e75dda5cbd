//! One trusted-fetch session per interposed origin.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::client::{ClientFactory, TrustContext, TrustedFetchClient};
use crate::config::Configuration;
use crate::error::{InterpositionError, MappingError};
use crate::network_location::NetworkLocation;
use crate::response::{CONTENT_LENGTH, Headers, Response, Retrieved};

enum SessionState {
    Active {
        staging: TempDir,
        client: Box<dyn TrustedFetchClient>,
    },
    Disposed,
}

/// A trusted-fetch session bound to one [`Configuration`].
///
/// A session owns a private staging directory and a trusted-fetch client.
/// It is created active (its first metadata refresh has already
/// succeeded) and stays active until [`cleanup`](Self::cleanup), after
/// which every operation fails with
/// [`InterpositionError::SessionDisposed`].
///
/// # Thread Safety
///
/// Downloads hold a read lock on the client for their whole duration and
/// refreshes take the write lock, so a download resolves and fetches every
/// target against one trusted snapshot. URL mapping takes no lock.
pub struct TrustSession {
    configuration: Configuration,
    context: TrustContext,
    disposed: AtomicBool,
    state: RwLock<SessionState>,
}

impl TrustSession {
    /// Creates a session and bootstraps its trust state.
    ///
    /// Allocates the staging directory, connects a client through
    /// `factory` and performs the initial metadata refresh.
    ///
    /// # Errors
    ///
    /// Returns `InterpositionError::Io` if the staging directory cannot be
    /// created and `InterpositionError::Fetch` if the client cannot be
    /// built or the initial refresh fails. Nothing is left on disk.
    pub fn new(
        configuration: Configuration,
        factory: &dyn ClientFactory,
    ) -> Result<Self, InterpositionError> {
        let staging = tempfile::Builder::new()
            .prefix("interposition-")
            .tempdir()
            .map_err(|e| {
                InterpositionError::io("create staging directory", &std::env::temp_dir(), &e)
            })?;
        debug!(staging = %staging.path().display(), "created staging directory");

        let context = configuration.trust_context();
        let mut client = factory.connect(&configuration, &context)?;

        info!("refreshing top-level metadata for interposed {configuration}");
        client.refresh(&context)?;

        Ok(Self {
            configuration,
            context,
            disposed: AtomicBool::new(false),
            state: RwLock::new(SessionState::Active { staging, client }),
        })
    }

    /// Returns the bound configuration.
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Returns the origin network location.
    #[must_use]
    pub const fn network_location(&self) -> &NetworkLocation {
        self.configuration.network_location()
    }

    /// Returns the origin hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        self.configuration.hostname()
    }

    /// Returns the trust context passed to the client.
    #[must_use]
    pub const fn trust_context(&self) -> &TrustContext {
        &self.context
    }

    /// Returns true until [`cleanup`](Self::cleanup) has run.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.disposed.load(Ordering::Acquire)
    }

    /// Returns the staging directory.
    ///
    /// # Errors
    ///
    /// Returns `SessionDisposed` after cleanup.
    ///
    /// # Panics
    ///
    /// Panics if the session lock is poisoned.
    pub fn staging_dir(&self) -> Result<PathBuf, InterpositionError> {
        let state = self.state.read().expect("lock poisoned");
        match &*state {
            SessionState::Active { staging, .. } => Ok(staging.path().to_path_buf()),
            SessionState::Disposed => Err(self.disposed_error()),
        }
    }

    /// Re-fetches top-level trusted metadata.
    ///
    /// Waits for in-flight downloads of this session to finish.
    ///
    /// # Errors
    ///
    /// Returns `SessionDisposed` after cleanup; client errors propagate
    /// unmodified as `InterpositionError::Fetch`.
    ///
    /// # Panics
    ///
    /// Panics if the session lock is poisoned.
    pub fn refresh(&self) -> Result<(), InterpositionError> {
        let mut state = self.state.write().expect("lock poisoned");
        match &mut *state {
            SessionState::Active { client, .. } => {
                client.refresh(&self.context)?;
                Ok(())
            }
            SessionState::Disposed => Err(self.disposed_error()),
        }
    }

    /// Deletes the staging directory and disposes the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionDisposed` if the session was already cleaned up and
    /// `Io` if the directory cannot be removed (the session is disposed
    /// either way).
    ///
    /// # Panics
    ///
    /// Panics if the session lock is poisoned.
    pub fn cleanup(&self) -> Result<(), InterpositionError> {
        let mut state = self.state.write().expect("lock poisoned");
        match std::mem::replace(&mut *state, SessionState::Disposed) {
            SessionState::Active { staging, .. } => {
                self.disposed.store(true, Ordering::Release);
                let path = staging.path().to_path_buf();
                staging
                    .close()
                    .map_err(|e| InterpositionError::io("remove staging directory", &path, &e))?;
                debug!(staging = %path.display(), "deleted staging directory");
                Ok(())
            }
            SessionState::Disposed => Err(self.disposed_error()),
        }
    }

    /// Maps a request URL to a target path using the configured rules.
    ///
    /// # Errors
    ///
    /// - `Mapping(NoPatternMatch)` when the URL is outside this session's scope
    /// - `Mapping(TemplateSubstitution)` when the matching rule is broken
    /// - `Mapping(InvalidUrl)` when the URL does not parse
    /// - `SessionDisposed` after cleanup
    pub fn map_url_to_target(&self, url: &str) -> Result<String, InterpositionError> {
        if !self.is_active() {
            return Err(self.disposed_error());
        }

        self.configuration
            .target_map()
            .map_url(url)
            .inspect_err(|e| self.log_mapping_failure(url, e))
            .map_err(Into::into)
    }

    pub(crate) fn map_parsed(&self, url: &url::Url, original: &str) -> Result<String, MappingError> {
        self.configuration
            .target_map()
            .map_parsed(url, original)
            .inspect_err(|e| self.log_mapping_failure(original, e))
    }

    /// Downloads `target_path` into the staging directory.
    ///
    /// Resolves the target against the current trusted snapshot without
    /// refreshing, downloads it only if the staged copy is missing or
    /// stale, and returns `(staging directory, full local path)`.
    ///
    /// # Errors
    ///
    /// Returns `UnsafeTargetPath` for targets containing `..`,
    /// `SessionDisposed` after cleanup, and client errors unmodified as
    /// `InterpositionError::Fetch`.
    ///
    /// # Panics
    ///
    /// Panics if the session lock is poisoned.
    pub fn download_target(&self, target_path: &str) -> Result<(PathBuf, PathBuf), InterpositionError> {
        let state = self.state.read().expect("lock poisoned");
        match &*state {
            SessionState::Active { staging, client } => {
                let filename = self.fetch(staging.path(), client.as_ref(), target_path)?;
                Ok((staging.path().to_path_buf(), filename))
            }
            SessionState::Disposed => Err(self.disposed_error()),
        }
    }

    /// Fetches the verified content behind `url`.
    ///
    /// The content type is guessed from the mapped target path. With a
    /// `destination`, the verified file is copied there and the staged copy
    /// is left in place; otherwise the staged file itself is returned.
    ///
    /// # Errors
    ///
    /// Mapping, disposal and client errors as for
    /// [`map_url_to_target`](Self::map_url_to_target) and
    /// [`download_target`](Self::download_target); `Io` if the copy fails.
    ///
    /// # Panics
    ///
    /// Panics if the session lock is poisoned.
    pub fn retrieve(
        &self,
        url: &str,
        destination: Option<&Path>,
    ) -> Result<Retrieved, InterpositionError> {
        info!(url, "interposing");

        let target_path = self.map_url_to_target(url)?;
        let mut headers = Headers::for_target(&target_path);

        let state = self.state.read().expect("lock poisoned");
        let SessionState::Active { staging, client } = &*state else {
            return Err(self.disposed_error());
        };

        let staged = self.fetch(staging.path(), client.as_ref(), &target_path)?;
        let filename = match destination {
            Some(destination) => {
                fs::copy(&staged, destination).map_err(|e| {
                    InterpositionError::io("copy verified file to", destination, &e)
                })?;
                destination.to_path_buf()
            }
            None => staged,
        };

        if let Ok(metadata) = fs::metadata(&filename) {
            headers.insert(CONTENT_LENGTH, metadata.len().to_string());
        }

        Ok(Retrieved { filename, headers })
    }

    /// Fetches the verified content behind `url` and opens it for reading.
    ///
    /// # Errors
    ///
    /// As for [`retrieve`](Self::retrieve), plus `Io` if the file cannot be
    /// opened.
    pub fn open(&self, url: &str) -> Result<Response, InterpositionError> {
        let retrieved = self.retrieve(url, None)?;
        let body = File::open(&retrieved.filename)
            .map_err(|e| InterpositionError::io("open verified file", &retrieved.filename, &e))?;
        Ok(Response::new(url, retrieved, body))
    }

    fn fetch(
        &self,
        staging: &Path,
        client: &dyn TrustedFetchClient,
        target_path: &str,
    ) -> Result<PathBuf, InterpositionError> {
        if Path::new(target_path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(InterpositionError::UnsafeTargetPath {
                target: target_path.to_string(),
            });
        }

        let filename = staging.join(target_path.trim_start_matches('/'));

        let targets = [client.target(&self.context, target_path)?];
        let updated = client.updated_targets(&self.context, &targets, staging)?;
        for target in &updated {
            debug!(target = target.path(), "downloading target");
            client.download_target(&self.context, target, staging)?;
        }

        Ok(filename)
    }

    fn log_mapping_failure(&self, url: &str, err: &MappingError) {
        match err {
            MappingError::TemplateSubstitution { .. } => error!(
                network_location = %self.network_location(),
                url,
                "broken target path rule: {err}"
            ),
            _ => warn!(
                network_location = %self.network_location(),
                url,
                "possibly invalid target_paths; no interposition: {err}"
            ),
        }
    }

    fn disposed_error(&self) -> InterpositionError {
        InterpositionError::SessionDisposed {
            hostname: self.hostname().to_string(),
        }
    }
}

impl std::fmt::Debug for TrustSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustSession")
            .field("network_location", self.network_location())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
