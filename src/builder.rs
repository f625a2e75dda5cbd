//! Typestate builder for [`Configuration`].
//!
//! The network location, repository directory and at least one mirror are
//! required and must be supplied in that order; the compiler rejects
//! `build()` until they are.

use std::marker::PhantomData;
use std::path::PathBuf;

use crate::config::{Configuration, Mirror};
use crate::error::ConfigurationError;
use crate::network_location::NetworkLocation;
use crate::target_map::{PathRule, TargetMap};

/// Marker: nothing set yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

/// Marker: network location set.
#[derive(Debug, Clone, Copy, Default)]
pub struct HasNetworkLocation;

/// Marker: network location and repository directory set.
#[derive(Debug, Clone, Copy, Default)]
pub struct HasRepository;

/// Marker: at least one mirror set; `build()` is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ready;

/// A typestate builder for [`Configuration`].
///
/// Target path rules and the certificate bundle are optional and may be
/// set in any state. Without rules, every path maps to itself.
///
/// # Examples
///
/// ```
/// use interposition::{ConfigurationBuilder, Mirror};
///
/// let configuration = ConfigurationBuilder::new()
///     .try_network_location("ex.com")?
///     .repository_directory("/var/lib/trust")
///     .mirror(Mirror::new("primary", "http://mirror.ex.com")?)
///     .try_target_path(r".*(/pkg)/$", "{0}/index.html")?
///     .build()?;
///
/// assert_eq!(configuration.hostname(), "ex.com");
/// assert_eq!(
///     configuration.target_map().map_url("http://ex.com/pkg/")?,
///     "/pkg/index.html"
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// ```compile_fail
/// use interposition::ConfigurationBuilder;
///
/// // A mirror is required before building.
/// let configuration = ConfigurationBuilder::new()
///     .try_network_location("ex.com")
///     .unwrap()
///     .repository_directory("/var/lib/trust")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder<State = Empty> {
    network_location: Option<NetworkLocation>,
    repository_directory: Option<PathBuf>,
    ssl_certificates: Option<PathBuf>,
    mirrors: Vec<Mirror>,
    rules: Vec<PathRule>,
    _state: PhantomData<State>,
}

impl<State> ConfigurationBuilder<State> {
    fn advance<Next>(self) -> ConfigurationBuilder<Next> {
        ConfigurationBuilder {
            network_location: self.network_location,
            repository_directory: self.repository_directory,
            ssl_certificates: self.ssl_certificates,
            mirrors: self.mirrors,
            rules: self.rules,
            _state: PhantomData,
        }
    }

    /// Sets the TLS certificate bundle used for `https` mirrors.
    #[must_use]
    pub fn ssl_certificates(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_certificates = Some(path.into());
        self
    }

    /// Appends a path rule; rules are evaluated in the order added.
    #[must_use]
    pub fn target_path(mut self, rule: PathRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Compiles and appends a path rule.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the pattern or template is invalid.
    pub fn try_target_path(self, pattern: &str, template: &str) -> Result<Self, ConfigurationError> {
        Ok(self.target_path(PathRule::new(pattern, template)?))
    }
}

impl ConfigurationBuilder<Empty> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            network_location: None,
            repository_directory: None,
            ssl_certificates: None,
            mirrors: Vec::new(),
            rules: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Sets the origin network location.
    #[must_use]
    pub fn network_location(
        mut self,
        network_location: NetworkLocation,
    ) -> ConfigurationBuilder<HasNetworkLocation> {
        self.network_location = Some(network_location);
        self.advance()
    }

    /// Parses and sets the origin network location.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidNetworkLocation` if `s` is not a
    /// valid `host[:port]`.
    pub fn try_network_location(
        self,
        s: &str,
    ) -> Result<ConfigurationBuilder<HasNetworkLocation>, ConfigurationError> {
        Ok(self.network_location(NetworkLocation::parse(s)?))
    }
}

impl Default for ConfigurationBuilder<Empty> {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder<HasNetworkLocation> {
    /// Sets the local trust-state directory.
    #[must_use]
    pub fn repository_directory(
        mut self,
        path: impl Into<PathBuf>,
    ) -> ConfigurationBuilder<HasRepository> {
        self.repository_directory = Some(path.into());
        self.advance()
    }
}

impl ConfigurationBuilder<HasRepository> {
    /// Adds the first mirror.
    #[must_use]
    pub fn mirror(mut self, mirror: Mirror) -> ConfigurationBuilder<Ready> {
        self.mirrors.push(mirror);
        self.advance()
    }
}

impl ConfigurationBuilder<Ready> {
    /// Adds another mirror; mirrors are tried in the order added.
    #[must_use]
    pub fn mirror(mut self, mirror: Mirror) -> Self {
        self.mirrors.push(mirror);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MissingCertificates` if an `https`
    /// mirror is configured without a certificate bundle.
    ///
    /// # Panics
    ///
    /// Never in practice: reaching [`Ready`] requires the network location
    /// and repository directory.
    pub fn build(self) -> Result<Configuration, ConfigurationError> {
        let network_location = self
            .network_location
            .expect("network_location set in HasNetworkLocation state");
        let repository_directory = self
            .repository_directory
            .expect("repository_directory set in HasRepository state");
        let target_map = if self.rules.is_empty() {
            TargetMap::identity()
        } else {
            TargetMap::new(self.rules)
        };

        Configuration::validate(
            network_location,
            repository_directory,
            self.ssl_certificates,
            self.mirrors,
            target_map,
        )
    }
}
