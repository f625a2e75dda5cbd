//! File-backed trusted-fetch client for the interposition router.
//!
//! Mirrors are directories reachable through `file://` URLs. Each mirror
//! publishes Ed25519-signed targets metadata; the repository directory of a
//! configuration holds the locally trusted keys in `root.json` and the last
//! accepted metadata in `targets.json`.
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use interposition::{ConfigurationBuilder, Mirror, SessionRegistry};
//! use interposition_local::{
//!     LocalClientFactory, RootOfTrust, SignedTargets, SigningKey, TargetsDocument,
//! };
//!
//! let mirror_dir = tempfile::tempdir().unwrap();
//! let trust_dir = tempfile::tempdir().unwrap();
//! let key = SigningKey::generate();
//!
//! // Publisher side: sign and lay out the mirror.
//! let page = b"<html>pkg</html>";
//! let signed = SignedTargets::new(1, Utc::now() + Duration::days(7))
//!     .with_target("pkg/index.html", page);
//! std::fs::create_dir_all(mirror_dir.path().join("metadata")).unwrap();
//! std::fs::create_dir_all(mirror_dir.path().join("targets/pkg")).unwrap();
//! std::fs::write(
//!     mirror_dir.path().join("metadata/targets.json"),
//!     TargetsDocument::sign(signed, &[&key]).to_json(),
//! ).unwrap();
//! std::fs::write(mirror_dir.path().join("targets/pkg/index.html"), page).unwrap();
//!
//! // Client side: trust the key and interpose.
//! RootOfTrust::new([key.verifying_key()], 1).store(trust_dir.path()).unwrap();
//! let configuration = ConfigurationBuilder::new()
//!     .try_network_location("ex.com").unwrap()
//!     .repository_directory(trust_dir.path())
//!     .mirror(Mirror::new("local", &format!("file://{}", mirror_dir.path().display())).unwrap())
//!     .try_target_path("(/pkg/.*)", "{0}").unwrap()
//!     .build()
//!     .unwrap();
//!
//! let registry = SessionRegistry::new(LocalClientFactory::new());
//! registry.add(configuration).unwrap();
//!
//! let response = registry.open("http://ex.com/pkg/index.html").unwrap().unwrap();
//! assert_eq!(response.bytes().unwrap(), page);
//! ```
//!
//! # Trust Checks
//!
//! | Check | Failure |
//! |-------|---------|
//! | Distinct trusted signers reach the threshold | `SignatureThreshold` |
//! | Metadata is unexpired | `Expired` |
//! | Version never decreases | `Rollback` |
//! | Target length matches | `LengthMismatch` |
//! | Target SHA-256 matches | `HashMismatch` |

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod error;
mod keys;
mod metadata;
mod root;

pub use client::{LocalClientFactory, LocalMirrorClient};
pub use error::MetadataError;
pub use keys::{SigningKey, VerifyingKey};
pub use metadata::{
    HASH_ALGORITHM, MetadataSignature, SignedTargets, TARGETS_FILENAME, TargetEntry,
    TargetsDocument,
};
pub use root::{ROOT_FILENAME, RootOfTrust};
