//! The session registry: origin hostname → trust session.
//!
//! The registry keeps origins and mirrors apart. After every successful
//! [`SessionRegistry::add`] no registered origin hostname is also a mirror
//! hostname, and no mirror hostname is contributed by two configurations,
//! so a session can never end up fetching through another interposed
//! origin.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};
use url::Url;

use crate::client::ClientFactory;
use crate::config::{Configuration, load_configurations};
use crate::error::InterpositionError;
use crate::response::{Response, Retrieved};
use crate::session::TrustSession;

/// Outcome of [`SessionRegistry::get`].
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// The URL is interposed by this session.
    Found(Arc<TrustSession>),
    /// The URL is not interposed; fetch it the ordinary way.
    NotApplicable,
}

impl Dispatch {
    /// Returns true for [`Dispatch::Found`].
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns the session, if found.
    #[must_use]
    pub const fn session(&self) -> Option<&Arc<TrustSession>> {
        match self {
            Self::Found(session) => Some(session),
            Self::NotApplicable => None,
        }
    }

    /// Consumes the outcome and returns the session, if found.
    #[must_use]
    pub fn into_session(self) -> Option<Arc<TrustSession>> {
        match self {
            Self::Found(session) => Some(session),
            Self::NotApplicable => None,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, Arc<TrustSession>>,
    mirror_hostnames: BTreeSet<String>,
}

impl RegistryState {
    fn is_taken(&self, hostname: &str) -> bool {
        self.sessions.contains_key(hostname) || self.mirror_hostnames.contains(hostname)
    }

    fn check(&self, configuration: &Configuration) -> Result<(), InterpositionError> {
        let hostname = configuration.hostname();
        if self.is_taken(hostname) {
            return Err(InterpositionError::invalid_configuration(
                hostname,
                "hostname is already a registered origin or mirror",
            ));
        }

        for mirror in configuration.mirror_hostnames() {
            if mirror == hostname {
                return Err(InterpositionError::invalid_configuration(
                    mirror,
                    "mirror hostname equals its own origin",
                ));
            }
            if self.is_taken(&mirror) {
                return Err(InterpositionError::invalid_configuration(
                    mirror,
                    "mirror hostname is already a registered origin or mirror",
                ));
            }
        }
        Ok(())
    }
}

/// Registry of trust sessions, one per interposed origin hostname.
///
/// Shared across threads; every operation takes `&self`. Sessions are
/// handed out as `Arc`s so per-session work runs outside the registry lock.
///
/// # Examples
///
/// ```no_run
/// use interposition::{Dispatch, SessionRegistry};
/// # fn factory() -> impl interposition::ClientFactory + 'static {
/// #     |_: &interposition::Configuration, _: &interposition::TrustContext|
/// #         -> Result<Box<dyn interposition::TrustedFetchClient>, interposition::FetchError> {
/// #         Err(interposition::FetchError::other("unused"))
/// #     }
/// # }
///
/// let registry = SessionRegistry::new(factory());
/// registry.configure("tuf.interposition.json").unwrap();
///
/// if let Dispatch::Found(session) = registry.get("http://ex.com/pkg/") {
///     let response = session.open("http://ex.com/pkg/").unwrap();
///     assert_eq!(response.status(), 200);
/// }
/// ```
pub struct SessionRegistry {
    factory: Arc<dyn ClientFactory>,
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    /// Creates an empty registry whose sessions connect through `factory`.
    #[must_use]
    pub fn new(factory: impl ClientFactory + 'static) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    /// Creates an empty registry sharing an existing factory.
    #[must_use]
    pub fn with_factory(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Validates `configuration` against the registry and starts its session.
    ///
    /// The configuration is checked before the session bootstraps and
    /// checked again when it is committed, so a concurrent `add` claiming
    /// the same hostnames cannot slip in between. The registry lock is not
    /// held while the session bootstraps; nothing is recorded unless it
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the offending hostname if the
    /// origin or one of its mirrors collides with a registered origin or
    /// mirror, or if a mirror is the origin itself. Session construction
    /// errors propagate.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn add(&self, configuration: Configuration) -> Result<Arc<TrustSession>, InterpositionError> {
        self.state
            .read()
            .expect("lock poisoned")
            .check(&configuration)
            .inspect_err(|e| warn!("{e}"))?;

        info!("adding session for interposed {configuration}");
        let hostname = configuration.hostname().to_string();
        let mirrors = configuration.mirror_hostnames();
        let session = Arc::new(TrustSession::new(configuration, self.factory.as_ref())?);

        let mut state = self.state.write().expect("lock poisoned");
        if let Err(e) = state.check(session.configuration()) {
            drop(state);
            warn!("{e}");
            if let Err(cleanup) = session.cleanup() {
                warn!("could not clean up rejected session: {cleanup}");
            }
            return Err(e);
        }

        state.mirror_hostnames.extend(mirrors);
        state.sessions.insert(hostname, Arc::clone(&session));
        Ok(session)
    }

    /// Forces a metadata refresh of the session serving `configuration`.
    ///
    /// # Errors
    ///
    /// Returns `NotRegistered` if no session serves the origin and
    /// `InvalidConfiguration` if the configuration names mirrors the
    /// registry does not know. Session errors propagate.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn refresh(&self, configuration: &Configuration) -> Result<(), InterpositionError> {
        let session = {
            let state = self.state.read().expect("lock poisoned");
            let session = state
                .sessions
                .get(configuration.hostname())
                .cloned()
                .ok_or_else(|| InterpositionError::not_registered(configuration.hostname()))?;
            if !configuration.mirror_hostnames().is_subset(&state.mirror_hostnames) {
                return Err(InterpositionError::invalid_configuration(
                    configuration.hostname(),
                    "configuration names unregistered mirrors",
                ));
            }
            session
        };

        info!("refreshing top-level metadata for {configuration}");
        session.refresh()
    }

    /// Finds the session interposing `url`.
    ///
    /// Never fails: anything that stops the URL from being interposed,
    /// including unparseable input, yields [`Dispatch::NotApplicable`].
    /// Mapping runs before the session is returned, so a `Found` URL is
    /// known to map to a target.
    pub fn get(&self, url: &str) -> Dispatch {
        let Ok(parsed) = Url::parse(url) else {
            debug!(url, "not a URL; no interposition");
            return Dispatch::NotApplicable;
        };
        let Some(hostname) = parsed.host_str() else {
            return Dispatch::NotApplicable;
        };

        // Dispatch must not panic, so a poisoned lock is read through.
        let session = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .get(hostname)
            .cloned();
        let Some(session) = session else {
            warn!(hostname, "no session for hostname");
            return Dispatch::NotApplicable;
        };

        if !session.network_location().accepts_parsed(&parsed, url) {
            warn!(
                url,
                network_location = %session.network_location(),
                "hostname is interposed on a different port"
            );
            return Dispatch::NotApplicable;
        }
        if !session.is_active() {
            return Dispatch::NotApplicable;
        }

        match session.map_parsed(&parsed, url) {
            Ok(_) => {
                info!(network_location = %session.network_location(), url, "found session");
                Dispatch::Found(session)
            }
            // The session has already logged why.
            Err(_) => Dispatch::NotApplicable,
        }
    }

    /// Deregisters the session serving `configuration` and cleans it up.
    ///
    /// The session's mirror hostnames are released immediately.
    ///
    /// # Errors
    ///
    /// Returns `NotRegistered` if no session serves the origin, or the
    /// session's cleanup error.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn remove(&self, configuration: &Configuration) -> Result<(), InterpositionError> {
        let session = {
            let mut state = self.state.write().expect("lock poisoned");
            let session = state
                .sessions
                .remove(configuration.hostname())
                .ok_or_else(|| InterpositionError::not_registered(configuration.hostname()))?;
            for mirror in session.configuration().mirror_hostnames() {
                state.mirror_hostnames.remove(&mirror);
            }
            session
        };

        info!("removing session for interposed {configuration}");
        session.cleanup()
    }

    /// Loads an interposition document and adds every configuration in it.
    ///
    /// The whole document is checked against the registry, and against
    /// itself, before any session starts. If a session then fails to
    /// bootstrap, those added by this call are removed again.
    ///
    /// # Errors
    ///
    /// Returns the load error, an `InvalidConfiguration` from the batch
    /// check, or the first `add` error. In the last case, sessions added
    /// earlier in the batch were briefly visible to concurrent
    /// [`get`](Self::get) calls before being removed.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn configure(&self, path: impl AsRef<Path>) -> Result<Vec<Configuration>, InterpositionError> {
        let configurations = load_configurations(path)?;
        self.check_batch(&configurations)
            .inspect_err(|e| warn!("{e}"))?;

        for (index, configuration) in configurations.iter().enumerate() {
            if let Err(err) = self.add(configuration.clone()) {
                for added in configurations[..index].iter().rev() {
                    if let Err(undo) = self.remove(added) {
                        warn!("could not roll back {added}: {undo}");
                    }
                }
                return Err(err);
            }
        }
        Ok(configurations)
    }

    fn check_batch(&self, configurations: &[Configuration]) -> Result<(), InterpositionError> {
        let state = self.state.read().expect("lock poisoned");
        let mut claimed = BTreeSet::new();
        for configuration in configurations {
            state.check(configuration)?;
            let hostnames = std::iter::once(configuration.hostname().to_string())
                .chain(configuration.mirror_hostnames());
            for hostname in hostnames {
                if claimed.contains(&hostname) {
                    return Err(InterpositionError::invalid_configuration(
                        hostname,
                        "hostname is claimed twice in one document",
                    ));
                }
                claimed.insert(hostname);
            }
        }
        Ok(())
    }

    /// Removes the sessions of every configuration.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first `remove` error.
    pub fn deconfigure(&self, configurations: &[Configuration]) -> Result<(), InterpositionError> {
        configurations.iter().try_for_each(|c| self.remove(c))
    }

    /// Refreshes the sessions of every configuration.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first `refresh` error.
    pub fn refresh_all(&self, configurations: &[Configuration]) -> Result<(), InterpositionError> {
        configurations.iter().try_for_each(|c| self.refresh(c))
    }

    /// Opens `url` through its session, or returns `None` if it is not
    /// interposed.
    ///
    /// # Errors
    ///
    /// Session errors from [`TrustSession::open`].
    pub fn open(&self, url: &str) -> Result<Option<Response>, InterpositionError> {
        match self.get(url) {
            Dispatch::Found(session) => session.open(url).map(Some),
            Dispatch::NotApplicable => Ok(None),
        }
    }

    /// Retrieves `url` through its session, or returns `None` if it is not
    /// interposed.
    ///
    /// # Errors
    ///
    /// Session errors from [`TrustSession::retrieve`].
    pub fn retrieve(
        &self,
        url: &str,
        destination: Option<&Path>,
    ) -> Result<Option<Retrieved>, InterpositionError> {
        match self.get(url) {
            Dispatch::Found(session) => session.retrieve(url, destination).map(Some),
            Dispatch::NotApplicable => Ok(None),
        }
    }

    /// Removes and cleans up every session.
    ///
    /// Every session is cleaned up even if one fails; sessions already
    /// cleaned up elsewhere are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first cleanup error.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn shutdown(&self) -> Result<(), InterpositionError> {
        let sessions: Vec<_> = {
            let mut state = self.state.write().expect("lock poisoned");
            state.mirror_hostnames.clear();
            state.sessions.drain().map(|(_, s)| s).collect()
        };

        let mut first_error = None;
        for session in sessions {
            info!("removing session for interposed {}", session.configuration());
            match session.cleanup() {
                Ok(()) => {}
                Err(e) if e.is_disposed() => {}
                Err(e) => {
                    warn!("{e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Returns the session registered for `hostname`.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn session(&self, hostname: &str) -> Option<Arc<TrustSession>> {
        self.state
            .read()
            .expect("lock poisoned")
            .sessions
            .get(hostname)
            .cloned()
    }

    /// Returns true if `hostname` is a registered origin.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn contains(&self, hostname: &str) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .sessions
            .contains_key(hostname)
    }

    /// Returns true if `hostname` is a mirror of a registered origin.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn is_mirror(&self, hostname: &str) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .mirror_hostnames
            .contains(hostname)
    }

    /// Returns the registered origin hostnames, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn hostnames(&self) -> Vec<String> {
        let mut hostnames: Vec<_> = self
            .state
            .read()
            .expect("lock poisoned")
            .sessions
            .keys()
            .cloned()
            .collect();
        hostnames.sort();
        hostnames
    }

    /// Returns the number of registered sessions.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").sessions.len()
    }

    /// Returns true if no session is registered.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SessionRegistry")
            .field("origins", &state.sessions.len())
            .field("mirrors", &state.mirror_hostnames)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target_map::PathRule;
    use crate::testing::{
        MemoryClient, configuration, configuration_with_mirrors, configuration_with_rules,
    };

    fn registry(client: &MemoryClient) -> SessionRegistry {
        SessionRegistry::new(client.factory())
    }

    fn pkg_client() -> MemoryClient {
        MemoryClient::new().with_target("/pkg/index.html", b"<html/>")
    }

    #[test]
    fn add_then_get() {
        let registry = registry(&pkg_client());
        registry.add(configuration("ex.com", "mirror.ex.com")).unwrap();

        assert!(registry.get("http://ex.com/pkg/").is_found());
        assert!(registry.contains("ex.com"));
        assert!(registry.is_mirror("mirror.ex.com"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_origin_rejected() {
        let registry = registry(&pkg_client());
        registry.add(configuration("ex.com", "m1.ex.com")).unwrap();
        let err = registry.add(configuration("ex.com", "m2.ex.com")).unwrap_err();
        assert_eq!(
            err,
            InterpositionError::invalid_configuration(
                "ex.com",
                "hostname is already a registered origin or mirror"
            )
        );
        assert!(!registry.is_mirror("m2.ex.com"));
    }

    #[test]
    fn origin_that_is_a_mirror_rejected() {
        let registry = registry(&pkg_client());
        registry.add(configuration("ex.com", "mirror.ex.com")).unwrap();
        let err = registry
            .add(configuration("mirror.ex.com", "other.ex.com"))
            .unwrap_err();
        assert!(matches!(
            err,
            InterpositionError::InvalidConfiguration { ref hostname, .. } if hostname == "mirror.ex.com"
        ));
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_mirror("other.ex.com"));
    }

    #[test]
    fn mirror_that_is_an_origin_rejected() {
        let registry = registry(&pkg_client());
        registry.add(configuration("ex.com", "mirror.ex.com")).unwrap();
        assert!(matches!(
            registry.add(configuration("b.com", "ex.com")),
            Err(InterpositionError::InvalidConfiguration { ref hostname, .. }) if hostname == "ex.com"
        ));
        assert!(!registry.contains("b.com"));
    }

    #[test]
    fn shared_mirror_rejected() {
        let registry = registry(&pkg_client());
        registry.add(configuration("a.com", "mirror.ex.com")).unwrap();
        assert!(registry.add(configuration("b.com", "mirror.ex.com")).is_err());
    }

    #[test]
    fn self_mirror_rejected() {
        let registry = registry(&pkg_client());
        let err = registry
            .add(configuration_with_mirrors("ex.com", &["m.ex.com", "ex.com"]))
            .unwrap_err();
        assert!(matches!(err, InterpositionError::InvalidConfiguration { .. }));
        assert!(registry.is_empty());
        assert!(!registry.is_mirror("m.ex.com"));
    }

    #[test]
    fn failed_bootstrap_registers_nothing() {
        let registry = registry(&MemoryClient::new().failing_refresh());
        assert!(registry.add(configuration("ex.com", "mirror.ex.com")).is_err());
        assert!(registry.is_empty());
        assert!(!registry.is_mirror("mirror.ex.com"));
    }

    #[test]
    fn get_declines_unknown_and_unmapped() {
        let registry = registry(&pkg_client());
        registry.add(configuration("ex.com", "mirror.ex.com")).unwrap();

        assert!(!registry.get("http://other.com/pkg/").is_found());
        assert!(!registry.get("http://ex.com/elsewhere").is_found());
        assert!(!registry.get("not a url").is_found());
        assert!(!registry.get("").is_found());
        assert!(!registry.get("mailto:someone@ex.com").is_found());
    }

    #[test]
    fn get_declines_broken_rule() {
        let registry = registry(&pkg_client());
        let rules = vec![PathRule::new("/pkg/.*", "{0}").unwrap()];
        let session = registry
            .add(configuration_with_rules("ex.com", "mirror.ex.com", rules))
            .unwrap();

        assert!(!registry.get("http://ex.com/pkg/index.html").is_found());
        assert!(registry.open("http://ex.com/pkg/index.html").unwrap().is_none());
        assert!(matches!(
            session.retrieve("http://ex.com/pkg/index.html", None),
            Err(InterpositionError::Mapping(
                crate::error::MappingError::TemplateSubstitution { .. }
            ))
        ));
    }

    #[test]
    fn scheme_default_port_is_not_interposed() {
        let registry = registry(&pkg_client());
        registry.add(configuration("ex.com", "mirror.ex.com")).unwrap();
        assert!(registry.get("https://ex.com/pkg/").is_found());
        assert!(!registry.get("https://ex.com:443/pkg/").is_found());

        let https = registry_with("ex.com:443");
        assert!(https.get("https://ex.com:443/pkg/").is_found());
        assert!(!https.get("https://ex.com/pkg/").is_found());

        let ftp = registry_with("ex.com:21");
        assert!(!ftp.get("ftp://ex.com/pkg/").is_found());
    }

    #[test]
    fn default_port_equivalence() {
        let registry = registry(&pkg_client());
        registry.add(configuration("ex.com", "mirror.ex.com")).unwrap();
        assert!(registry.get("http://ex.com/pkg/").is_found());
        assert!(registry.get("http://ex.com:80/pkg/").is_found());
        assert!(!registry.get("http://ex.com:8080/pkg/").is_found());

        let explicit = registry_with("ex.com:80");
        assert!(explicit.get("http://ex.com/pkg/").is_found());
        assert!(explicit.get("http://ex.com:80/pkg/").is_found());
        assert!(!explicit.get("http://ex.com:81/pkg/").is_found());
    }

    fn registry_with(location: &str) -> SessionRegistry {
        let registry = registry(&pkg_client());
        registry.add(configuration(location, "mirror.ex.com")).unwrap();
        registry
    }

    #[test]
    fn non_default_port_must_match() {
        let registry = registry_with("ex.com:8080");
        assert!(registry.get("http://ex.com:8080/pkg/").is_found());
        assert!(!registry.get("http://ex.com/pkg/").is_found());
    }

    #[test]
    fn refresh_requires_registration() {
        let client = pkg_client();
        let registry = registry(&client);
        let config = configuration("ex.com", "mirror.ex.com");

        assert!(matches!(
            registry.refresh(&config),
            Err(InterpositionError::NotRegistered { .. })
        ));

        registry.add(config.clone()).unwrap();
        registry.refresh(&config).unwrap();
        assert_eq!(client.refreshes(), 2);

        let moved = configuration("ex.com", "elsewhere.ex.com");
        assert!(matches!(
            registry.refresh(&moved),
            Err(InterpositionError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn remove_releases_hostnames_and_disposes() {
        let registry = registry(&pkg_client());
        let config = configuration("ex.com", "mirror.ex.com");
        let session = registry.add(config.clone()).unwrap();

        registry.remove(&config).unwrap();
        assert!(!session.is_active());
        assert!(registry.is_empty());
        assert!(!registry.get("http://ex.com/pkg/").is_found());

        registry.add(configuration("mirror.ex.com", "ex.com")).unwrap();
        assert!(matches!(
            registry.remove(&config),
            Err(InterpositionError::NotRegistered { .. })
        ));
    }

    #[test]
    fn open_and_retrieve_through_registry() {
        let registry = registry(&pkg_client());
        registry.add(configuration("ex.com", "mirror.ex.com")).unwrap();

        let response = registry.open("http://ex.com/pkg/").unwrap().unwrap();
        assert_eq!(response.headers().content_type(), Some("text/html"));
        assert!(registry.open("http://other.com/").unwrap().is_none());

        let retrieved = registry.retrieve("http://ex.com/pkg/", None).unwrap().unwrap();
        assert!(retrieved.filename.ends_with("pkg/index.html"));
        assert!(registry.retrieve("http://ex.com/nope", None).unwrap().is_none());
    }

    #[test]
    fn shutdown_disposes_everything() {
        let registry = registry(&pkg_client());
        let a = registry.add(configuration("a.com", "ma.ex.com")).unwrap();
        let b = registry.add(configuration("b.com", "mb.ex.com")).unwrap();
        b.cleanup().unwrap();

        registry.shutdown().unwrap();
        assert!(registry.is_empty());
        assert!(!a.is_active());
        assert!(!registry.is_mirror("ma.ex.com"));
    }

    #[test]
    fn hostnames_sorted() {
        let registry = registry(&pkg_client());
        registry.add(configuration("b.com", "mb.ex.com")).unwrap();
        registry.add(configuration("a.com", "ma.ex.com")).unwrap();
        assert_eq!(registry.hostnames(), ["a.com", "b.com"]);
    }
}
