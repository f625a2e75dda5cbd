//! Error types for signed metadata and key handling.

use std::fmt;

use interposition::FetchError;

/// Errors raised while decoding keys or checking signed metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// Key material is not a valid Ed25519 key.
    InvalidKeyFormat {
        /// Description of the key error
        reason: String,
    },
    /// A key is listed under an id that is not its own.
    KeyIdMismatch {
        /// The id the key was listed under
        listed: String,
        /// The id computed from the key
        computed: String,
    },
    /// The document does not parse.
    Malformed {
        /// Description of the parse error
        reason: String,
    },
    /// Fewer distinct trusted keys signed than the threshold requires.
    BelowThreshold {
        /// Valid signatures from distinct trusted keys
        valid: usize,
        /// Signatures required
        threshold: usize,
    },
    /// The document is past its expiry time.
    Expired {
        /// Expiry as RFC 3339
        expires: String,
    },
    /// The document is older than the trusted one.
    Rollback {
        /// Trusted version
        trusted: u64,
        /// Offered version
        offered: u64,
    },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKeyFormat { reason } => write!(f, "invalid key format: {reason}"),
            Self::KeyIdMismatch { listed, computed } => {
                write!(f, "key listed as '{listed}' has id '{computed}'")
            }
            Self::Malformed { reason } => write!(f, "malformed metadata: {reason}"),
            Self::BelowThreshold { valid, threshold } => {
                write!(f, "{valid} valid signatures, {threshold} required")
            }
            Self::Expired { expires } => write!(f, "metadata expired at {expires}"),
            Self::Rollback { trusted, offered } => {
                write!(f, "metadata version {offered} is older than trusted version {trusted}")
            }
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<MetadataError> for FetchError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::BelowThreshold { valid, threshold } => {
                Self::SignatureThreshold { valid, threshold }
            }
            MetadataError::Expired { expires } => Self::Expired { expires },
            MetadataError::Rollback { trusted, offered } => Self::Rollback { trusted, offered },
            other => Self::invalid_metadata(other.to_string()),
        }
    }
}
