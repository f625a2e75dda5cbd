//! Locally trusted keys (`root.json`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use interposition::FetchError;
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;
use crate::keys::VerifyingKey;

/// File name of the trust anchor inside a repository directory.
pub const ROOT_FILENAME: &str = "root.json";

#[derive(Debug, Serialize, Deserialize)]
struct RootDocument {
    keys: BTreeMap<String, String>,
    threshold: usize,
}

/// Keys trusted to sign targets metadata and how many must agree.
///
/// Stored as `{"keys": {"<key id>": "<hex public key>"}, "threshold": N}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootOfTrust {
    keys: BTreeMap<String, VerifyingKey>,
    threshold: usize,
}

impl RootOfTrust {
    /// Creates a root trusting `keys` with the given threshold.
    ///
    /// A threshold of zero is raised to one.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = VerifyingKey>, threshold: usize) -> Self {
        Self {
            keys: keys.into_iter().map(|k| (k.key_id(), k)).collect(),
            threshold: threshold.max(1),
        }
    }

    /// Returns the trusted key with id `key_id`.
    #[must_use]
    pub fn key(&self, key_id: &str) -> Option<&VerifyingKey> {
        self.keys.get(key_id)
    }

    /// Returns the number of trusted keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Returns the signature threshold.
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Parses a root document.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError` if the JSON is malformed, a key is invalid,
    /// a key is listed under the wrong id, or the threshold is zero.
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        let document: RootDocument =
            serde_json::from_str(json).map_err(|e| MetadataError::Malformed {
                reason: e.to_string(),
            })?;
        if document.threshold == 0 {
            return Err(MetadataError::Malformed {
                reason: "threshold must be at least 1".to_string(),
            });
        }

        let mut keys = BTreeMap::new();
        for (listed, hex_key) in document.keys {
            let key = VerifyingKey::from_hex(&hex_key)?;
            let computed = key.key_id();
            if computed != listed {
                return Err(MetadataError::KeyIdMismatch { listed, computed });
            }
            keys.insert(listed, key);
        }

        Ok(Self {
            keys,
            threshold: document.threshold,
        })
    }

    /// Serializes the root document.
    #[must_use]
    pub fn to_json(&self) -> String {
        let document = RootDocument {
            keys: self
                .keys
                .iter()
                .map(|(id, key)| (id.clone(), key.to_hex()))
                .collect(),
            threshold: self.threshold,
        };
        serde_json::to_string_pretty(&document).unwrap_or_default()
    }

    /// Loads `root.json` from a repository directory.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Io` if the file cannot be read and
    /// `FetchError::InvalidMetadata` if it does not parse.
    pub fn load(repository_directory: &Path) -> Result<Self, FetchError> {
        let path = repository_directory.join(ROOT_FILENAME);
        let json = fs::read_to_string(&path).map_err(|e| FetchError::io(&path, &e))?;
        Ok(Self::from_json(&json)?)
    }

    /// Writes `root.json` into a repository directory.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Io` if the file cannot be written.
    pub fn store(&self, repository_directory: &Path) -> Result<(), FetchError> {
        let path = repository_directory.join(ROOT_FILENAME);
        fs::write(&path, self.to_json()).map_err(|e| FetchError::io(&path, &e))
    }
}
