//! Convenient re-exports for glob imports.
//!
//! ```rust
//! use interposition::prelude::*;
//!
//! let rule = PathRule::new(r".*(/pkg)/$", "{0}/index.html").unwrap();
//! let map = TargetMap::new(vec![rule]);
//! assert_eq!(map.map_url("http://ex.com/pkg/").unwrap(), "/pkg/index.html");
//! ```
//!
//! Builder state markers are left out.

pub use crate::{
    // Routing
    Dispatch, SessionRegistry, TrustSession,
    // Configuration
    Configuration, ConfigurationBuilder, Mirror, NetworkLocation, PathRule, TargetMap,
    TargetTemplate, load_configurations, parse_configurations,
    // Client boundary
    ClientFactory, TargetInfo, TrustContext, TrustedFetchClient,
    // Responses
    Headers, Response, Retrieved,
    // Errors
    ConfigurationError, FetchError, InterpositionError, MappingError,
};
