//! Error types for configuration, URL mapping, trusted fetching and routing.

use std::fmt;
use std::io;
use std::path::Path;

/// Errors raised while loading or validating a [`Configuration`](crate::Configuration).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The configuration file could not be read.
    Io {
        /// Path of the file
        path: String,
        /// Underlying I/O error message
        message: String,
    },
    /// The configuration file is not valid JSON or does not have the expected shape.
    Json {
        /// Path of the file, or `<memory>` for in-memory documents
        path: String,
        /// Parser error message
        message: String,
    },
    /// The document has no configurations at all.
    Empty,
    /// A required field is absent.
    MissingField {
        /// Network location of the offending configuration
        network_location: String,
        /// Name of the missing field
        field: &'static str,
    },
    /// The network location is not `host` or `host:port`.
    InvalidNetworkLocation {
        /// The invalid value
        value: String,
        /// Reason for invalidity
        reason: &'static str,
    },
    /// A repository mirror entry is unusable.
    InvalidMirror {
        /// Network location of the offending configuration
        network_location: String,
        /// Name of the mirror
        mirror: String,
        /// Reason for invalidity
        reason: String,
    },
    /// A target path entry is not a single `{pattern: template}` pair.
    InvalidTargetPath {
        /// Network location of the offending configuration
        network_location: String,
        /// Index of the entry in `target_paths`
        index: usize,
    },
    /// A source path pattern does not compile.
    InvalidPattern {
        /// The pattern
        pattern: String,
        /// Compiler message
        reason: String,
    },
    /// A target template is syntactically invalid.
    InvalidTemplate {
        /// The template
        template: String,
        /// Reason for invalidity
        reason: &'static str,
    },
    /// An `https` mirror is configured without a certificate bundle.
    MissingCertificates {
        /// Network location of the offending configuration
        network_location: String,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "cannot read configuration file '{path}': {message}")
            }
            Self::Json { path, message } => {
                write!(f, "malformed configuration document '{path}': {message}")
            }
            Self::Empty => write!(f, "configuration document declares no configurations"),
            Self::MissingField {
                network_location,
                field,
            } => {
                write!(f, "configuration for '{network_location}' is missing '{field}'")
            }
            Self::InvalidNetworkLocation { value, reason } => {
                write!(f, "invalid network location '{value}': {reason}")
            }
            Self::InvalidMirror {
                network_location,
                mirror,
                reason,
            } => {
                write!(
                    f,
                    "invalid repository mirror '{mirror}' for '{network_location}': {reason}"
                )
            }
            Self::InvalidTargetPath {
                network_location,
                index,
            } => {
                write!(
                    f,
                    "target_paths[{index}] for '{network_location}' must map exactly one pattern to one template"
                )
            }
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "invalid source path pattern '{pattern}': {reason}")
            }
            Self::InvalidTemplate { template, reason } => {
                write!(f, "invalid target path template '{template}': {reason}")
            }
            Self::MissingCertificates { network_location } => {
                write!(
                    f,
                    "configuration for '{network_location}' uses an https mirror but declares no ssl_certificates"
                )
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl ConfigurationError {
    pub(crate) fn io(path: &Path, err: &io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_mirror(
        network_location: impl Into<String>,
        mirror: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidMirror {
            network_location: network_location.into(),
            mirror: mirror.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while translating a request URL into a target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The request URL could not be parsed.
    InvalidUrl {
        /// The URL
        url: String,
        /// Parser message
        reason: String,
    },
    /// No rule matches the URL path; the URL is outside the interposed scope.
    NoPatternMatch {
        /// The URL
        url: String,
    },
    /// A rule matched but its template could not be rendered.
    ///
    /// This is a configuration defect, never an expected runtime outcome.
    TemplateSubstitution {
        /// Source pattern of the matching rule
        pattern: String,
        /// Template of the matching rule
        template: String,
        /// Reason rendering failed
        reason: String,
    },
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url, reason } => write!(f, "invalid URL '{url}': {reason}"),
            Self::NoPatternMatch { url } => {
                write!(f, "URL '{url}' matches no configured source path pattern")
            }
            Self::TemplateSubstitution {
                pattern,
                template,
                reason,
            } => {
                write!(
                    f,
                    "pattern '{pattern}' matched but template '{template}' cannot be rendered: {reason}"
                )
            }
        }
    }
}

impl std::error::Error for MappingError {}

impl MappingError {
    /// Returns true if the URL simply falls outside every rule.
    #[must_use]
    pub const fn is_no_pattern_match(&self) -> bool {
        matches!(self, Self::NoPatternMatch { .. })
    }
}

/// Errors reported by a [`TrustedFetchClient`](crate::TrustedFetchClient).
///
/// The router never inspects or recovers from these; they reach the caller
/// exactly as the client produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No trusted snapshot has been established yet.
    NoSnapshot,
    /// The target is not listed in the trusted snapshot.
    UnknownTarget {
        /// The target path
        target: String,
    },
    /// A mirror could not be reached or did not serve the file.
    Unreachable {
        /// The mirror URL or name
        mirror: String,
        /// Reason
        reason: String,
    },
    /// Metadata failed to parse or has an unsupported shape.
    InvalidMetadata {
        /// Reason
        reason: String,
    },
    /// Metadata signatures do not reach the trusted threshold.
    SignatureThreshold {
        /// Valid signatures found
        valid: usize,
        /// Signatures required
        threshold: usize,
    },
    /// Metadata is past its expiry time.
    Expired {
        /// Expiry timestamp as written in the metadata
        expires: String,
    },
    /// Metadata version is older than the trusted one.
    Rollback {
        /// Currently trusted version
        trusted: u64,
        /// Offered version
        offered: u64,
    },
    /// Downloaded target length differs from the trusted length.
    LengthMismatch {
        /// The target path
        target: String,
        /// Trusted length
        expected: u64,
        /// Observed length
        actual: u64,
    },
    /// Downloaded target hash differs from the trusted hash.
    HashMismatch {
        /// The target path
        target: String,
        /// Trusted digest
        expected: String,
        /// Observed digest
        actual: String,
    },
    /// Local trust state or staging could not be read or written.
    Io {
        /// Path involved
        path: String,
        /// Underlying message
        message: String,
    },
    /// Any other client-specific failure.
    Other {
        /// Description
        message: String,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSnapshot => write!(f, "no trusted metadata snapshot; refresh first"),
            Self::UnknownTarget { target } => {
                write!(f, "target '{target}' is not listed in trusted metadata")
            }
            Self::Unreachable { mirror, reason } => {
                write!(f, "mirror '{mirror}' unavailable: {reason}")
            }
            Self::InvalidMetadata { reason } => write!(f, "invalid metadata: {reason}"),
            Self::SignatureThreshold { valid, threshold } => {
                write!(
                    f,
                    "metadata carries {valid} valid signature(s), {threshold} required"
                )
            }
            Self::Expired { expires } => write!(f, "metadata expired at {expires}"),
            Self::Rollback { trusted, offered } => {
                write!(
                    f,
                    "metadata version {offered} is older than trusted version {trusted}"
                )
            }
            Self::LengthMismatch {
                target,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "target '{target}' is {actual} bytes, trusted metadata says {expected}"
                )
            }
            Self::HashMismatch {
                target,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "target '{target}' has sha256 {actual}, trusted metadata says {expected}"
                )
            }
            Self::Io { path, message } => write!(f, "I/O error on '{path}': {message}"),
            Self::Other { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Creates an `UnknownTarget` error.
    #[must_use]
    pub fn unknown_target(target: impl Into<String>) -> Self {
        Self::UnknownTarget {
            target: target.into(),
        }
    }

    /// Creates an `Unreachable` error.
    #[must_use]
    pub fn unreachable(mirror: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            mirror: mirror.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidMetadata` error.
    #[must_use]
    pub fn invalid_metadata(reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error from a path and an I/O error.
    #[must_use]
    pub fn io(path: &Path, err: &io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Creates an `Other` error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Errors surfaced by sessions and the session registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpositionError {
    /// Registering the configuration would break hostname uniqueness or
    /// introduce an interposition cycle.
    InvalidConfiguration {
        /// The offending hostname
        hostname: String,
        /// Which rule it breaks
        reason: &'static str,
    },
    /// No session is registered for the hostname.
    NotRegistered {
        /// The hostname
        hostname: String,
    },
    /// Local configuration validation failed.
    Configuration(ConfigurationError),
    /// URL to target mapping failed.
    Mapping(MappingError),
    /// The trusted-fetch client failed.
    Fetch(FetchError),
    /// The session was cleaned up and cannot be used again.
    SessionDisposed {
        /// Origin hostname of the session
        hostname: String,
    },
    /// The mapped target path would escape the staging directory.
    UnsafeTargetPath {
        /// The target path
        target: String,
    },
    /// A local file operation failed.
    Io {
        /// What was being done
        operation: &'static str,
        /// Path involved
        path: String,
        /// Underlying message
        message: String,
    },
}

impl fmt::Display for InterpositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration { hostname, reason } => {
                write!(f, "invalid configuration for hostname '{hostname}': {reason}")
            }
            Self::NotRegistered { hostname } => {
                write!(f, "no session registered for hostname '{hostname}'")
            }
            Self::Configuration(e) => write!(f, "{e}"),
            Self::Mapping(e) => write!(f, "{e}"),
            Self::Fetch(e) => write!(f, "trusted fetch failed: {e}"),
            Self::SessionDisposed { hostname } => {
                write!(f, "session for '{hostname}' has been cleaned up")
            }
            Self::UnsafeTargetPath { target } => {
                write!(f, "target path '{target}' escapes the staging directory")
            }
            Self::Io {
                operation,
                path,
                message,
            } => write!(f, "failed to {operation} '{path}': {message}"),
        }
    }
}

impl std::error::Error for InterpositionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(e) => Some(e),
            Self::Mapping(e) => Some(e),
            Self::Fetch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for InterpositionError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

impl From<MappingError> for InterpositionError {
    fn from(err: MappingError) -> Self {
        Self::Mapping(err)
    }
}

impl From<FetchError> for InterpositionError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err)
    }
}

impl InterpositionError {
    /// Creates an `InvalidConfiguration` error.
    #[must_use]
    pub fn invalid_configuration(hostname: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidConfiguration {
            hostname: hostname.into(),
            reason,
        }
    }

    /// Creates a `NotRegistered` error.
    #[must_use]
    pub fn not_registered(hostname: impl Into<String>) -> Self {
        Self::NotRegistered {
            hostname: hostname.into(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: &Path, err: &io::Error) -> Self {
        Self::Io {
            operation,
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Returns true if this error only says the URL is not interposed.
    #[must_use]
    pub const fn is_no_pattern_match(&self) -> bool {
        matches!(self, Self::Mapping(MappingError::NoPatternMatch { .. }))
    }

    /// Returns true if the session was already cleaned up.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self, Self::SessionDisposed { .. })
    }
}
