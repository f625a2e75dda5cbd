//! Interposition router for trusted fetching.
//!
//! This crate redirects ordinary URL fetches into a trusted-fetch pipeline so
//! that a legacy client receives content whose integrity and provenance were
//! verified, without changing its call sites. It does not verify anything
//! itself: verification belongs to a [`TrustedFetchClient`] built per origin
//! by a [`ClientFactory`].
//!
//! # Overview
//!
//! - A [`Configuration`] names an origin (`host[:port]`), the mirrors that
//!   serve it, the local trust state and an ordered list of [`PathRule`]s
//!   mapping request paths to target paths.
//! - A [`TrustSession`] binds one configuration to a private staging
//!   directory and a trusted-fetch client.
//! - A [`SessionRegistry`] owns the sessions, refuses configurations that
//!   would make one origin fetch through another, and dispatches request
//!   URLs to the session that interposes them.
//!
//! # Quick Start
//!
//! ```rust
//! use std::path::Path;
//! use interposition::{
//!     Configuration, ConfigurationBuilder, Dispatch, FetchError, Mirror,
//!     SessionRegistry, TargetInfo, TrustContext, TrustedFetchClient,
//! };
//!
//! // A client that knows one target and writes it on demand.
//! struct Static;
//!
//! impl TrustedFetchClient for Static {
//!     fn refresh(&mut self, _: &TrustContext) -> Result<(), FetchError> {
//!         Ok(())
//!     }
//!     fn target(&self, _: &TrustContext, path: &str) -> Result<TargetInfo, FetchError> {
//!         Ok(TargetInfo::new(path, 7))
//!     }
//!     fn updated_targets(
//!         &self,
//!         _: &TrustContext,
//!         targets: &[TargetInfo],
//!         _: &Path,
//!     ) -> Result<Vec<TargetInfo>, FetchError> {
//!         Ok(targets.to_vec())
//!     }
//!     fn download_target(
//!         &self,
//!         _: &TrustContext,
//!         target: &TargetInfo,
//!         dir: &Path,
//!     ) -> Result<(), FetchError> {
//!         let path = target.local_path(dir);
//!         std::fs::create_dir_all(path.parent().unwrap()).unwrap();
//!         std::fs::write(path, b"<html/>").map_err(|e| FetchError::other(e.to_string()))
//!     }
//! }
//!
//! let factory = |_: &Configuration, _: &TrustContext| -> Result<Box<dyn TrustedFetchClient>, FetchError> {
//!     Ok(Box::new(Static))
//! };
//!
//! let registry = SessionRegistry::new(factory);
//! registry.add(
//!     ConfigurationBuilder::new()
//!         .try_network_location("ex.com")?
//!         .repository_directory("/var/lib/trust")
//!         .mirror(Mirror::new("primary", "http://mirror.ex.com")?)
//!         .try_target_path(r".*(/pkg)/$", "{0}/index.html")?
//!         .build()?,
//! )?;
//!
//! let Dispatch::Found(session) = registry.get("http://ex.com/pkg/") else {
//!     panic!("ex.com/pkg/ is interposed");
//! };
//! let response = session.open("http://ex.com/pkg/")?;
//! assert_eq!(response.headers().content_type(), Some("text/html"));
//!
//! // Not interposed: fetch it the ordinary way.
//! assert!(!registry.get("http://elsewhere.org/").is_found());
//! # registry.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Dispatch Rules
//!
//! | Request | Origin `ex.com` | Origin `ex.com:8080` |
//! |---------|-----------------|----------------------|
//! | `http://ex.com/pkg/` | interposed | declined |
//! | `http://ex.com:80/pkg/` | interposed | declined |
//! | `http://ex.com:8080/pkg/` | declined | interposed |
//!
//! A request is only interposed when one of the origin's rules maps its
//! path; anything else is declined and left to the caller.
//!
//! # Configuration File
//!
//! [`SessionRegistry::configure`] loads the JSON document read by
//! [`load_configurations`] and adds every origin in it, all or nothing.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod builder;
mod client;
mod config;
mod constants;
mod content_type;
mod error;
mod network_location;
pub mod prelude;
mod registry;
mod response;
mod session;
mod target_map;
#[cfg(test)]
mod testing;

pub use builder::{ConfigurationBuilder, Empty, HasNetworkLocation, HasRepository, Ready};
pub use client::{ClientFactory, TargetInfo, TrustContext, TrustedFetchClient};
pub use config::{Configuration, Mirror, load_configurations, parse_configurations};
pub use constants::{
    CONFIGURATION_FILENAME, DEFAULT_METADATA_PATH, DEFAULT_PORT, DEFAULT_SOURCE_PATTERN,
    DEFAULT_TARGETS_PATH, DEFAULT_TARGET_TEMPLATE, LOCAL_MIRROR_HOSTNAME, STATUS_OK,
};
pub use content_type::guess_content_type;
pub use error::{ConfigurationError, FetchError, InterpositionError, MappingError};
pub use network_location::NetworkLocation;
pub use registry::{Dispatch, SessionRegistry};
pub use response::{
    CONTENT_LENGTH, CONTENT_TYPE, CONTENT_TYPE_CANONICAL, Headers, Response, Retrieved,
};
pub use session::TrustSession;
pub use target_map::{PathRule, TargetMap, TargetTemplate};
