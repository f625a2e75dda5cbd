//! Signed targets metadata published by mirrors.
//!
//! ```json
//! {
//!   "signed": {
//!     "version": 3,
//!     "expires": "2030-01-01T00:00:00Z",
//!     "targets": {
//!       "pkg/index.html": { "length": 16, "hashes": { "sha256": "…" } }
//!     }
//!   },
//!   "signatures": [{ "keyid": "…", "sig": "…" }]
//! }
//! ```
//!
//! Signatures cover the compact JSON serialization of `signed`. Target
//! names are stored without a leading `/`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use interposition::TargetInfo;
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;
use crate::keys::SigningKey;
use crate::root::RootOfTrust;

/// File name of targets metadata on a mirror and in the repository directory.
pub const TARGETS_FILENAME: &str = "targets.json";

/// Hash algorithm every target must list.
pub const HASH_ALGORITHM: &str = "sha256";

/// Trusted length and digests of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    /// Length in bytes
    pub length: u64,
    /// Digests by algorithm, lowercase hex
    pub hashes: BTreeMap<String, String>,
}

impl TargetEntry {
    /// Describes `content` with its length and SHA-256 digest.
    #[must_use]
    pub fn for_content(content: &[u8]) -> Self {
        use sha2::{Digest, Sha256};

        Self {
            length: content.len() as u64,
            hashes: BTreeMap::from([(
                HASH_ALGORITHM.to_string(),
                hex::encode(Sha256::digest(content)),
            )]),
        }
    }
}

/// The signed portion of targets metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTargets {
    /// Monotonically increasing version
    pub version: u64,
    /// Expiry time
    pub expires: DateTime<Utc>,
    /// Targets by name
    pub targets: BTreeMap<String, TargetEntry>,
}

impl SignedTargets {
    /// Creates an empty document.
    #[must_use]
    pub fn new(version: u64, expires: DateTime<Utc>) -> Self {
        Self {
            version,
            expires,
            targets: BTreeMap::new(),
        }
    }

    /// Adds a target describing `content`.
    #[must_use]
    pub fn with_target(mut self, name: &str, content: &[u8]) -> Self {
        self.targets.insert(
            name.trim_start_matches('/').to_string(),
            TargetEntry::for_content(content),
        );
        self
    }

    /// Returns the bytes covered by signatures.
    #[must_use]
    pub fn signing_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Looks up `target_path` and returns it as router target information.
    #[must_use]
    pub fn target_info(&self, target_path: &str) -> Option<TargetInfo> {
        let entry = self.targets.get(target_path.trim_start_matches('/'))?;
        let info = entry
            .hashes
            .iter()
            .fold(TargetInfo::new(target_path, entry.length), |info, (alg, digest)| {
                info.with_hash(alg, digest)
            });
        Some(info)
    }
}

/// One signature over [`SignedTargets::signing_bytes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSignature {
    /// Id of the signing key
    pub keyid: String,
    /// Ed25519 signature, lowercase hex
    pub sig: String,
}

/// Targets metadata with its signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsDocument {
    /// Signed content
    pub signed: SignedTargets,
    /// Signatures over `signed`
    pub signatures: Vec<MetadataSignature>,
}

impl TargetsDocument {
    /// Signs `signed` with every key in `keys`.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use interposition_local::{RootOfTrust, SignedTargets, SigningKey, TargetsDocument};
    ///
    /// let key = SigningKey::generate();
    /// let signed = SignedTargets::new(1, Utc::now() + Duration::days(1))
    ///     .with_target("pkg/index.html", b"<html/>");
    /// let document = TargetsDocument::sign(signed, &[&key]);
    ///
    /// let root = RootOfTrust::new([key.verifying_key()], 1);
    /// assert!(document.verify(&root, Utc::now()).is_ok());
    /// ```
    #[must_use]
    pub fn sign(signed: SignedTargets, keys: &[&SigningKey]) -> Self {
        let message = signed.signing_bytes();
        let signatures = keys
            .iter()
            .map(|key| MetadataSignature {
                keyid: key.verifying_key().key_id(),
                sig: key.sign_hex(&message),
            })
            .collect();
        Self { signed, signatures }
    }

    /// Parses a document.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Malformed` if the JSON does not match.
    pub fn from_json(json: &[u8]) -> Result<Self, MetadataError> {
        serde_json::from_slice(json).map_err(|e| MetadataError::Malformed {
            reason: e.to_string(),
        })
    }

    /// Serializes the document.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Checks signatures against `root` and expiry against `now`.
    ///
    /// Each trusted key counts at most once, however many signatures it
    /// contributed.
    ///
    /// # Errors
    ///
    /// Returns `BelowThreshold` if too few distinct trusted keys signed and
    /// `Expired` if `now` is at or past the expiry time.
    pub fn verify(&self, root: &RootOfTrust, now: DateTime<Utc>) -> Result<(), MetadataError> {
        let message = self.signed.signing_bytes();
        let valid: BTreeSet<&str> = self
            .signatures
            .iter()
            .filter(|s| {
                root.key(&s.keyid)
                    .is_some_and(|key| key.verifies(&message, &s.sig))
            })
            .map(|s| s.keyid.as_str())
            .collect();

        if valid.len() < root.threshold() {
            return Err(MetadataError::BelowThreshold {
                valid: valid.len(),
                threshold: root.threshold(),
            });
        }
        if self.signed.expires <= now {
            return Err(MetadataError::Expired {
                expires: self.signed.expires.to_rfc3339_opts(SecondsFormat::Secs, true),
            });
        }
        Ok(())
    }
}
