//! Constants shared by the router.

/// Port assumed for a request URL that does not carry one.
pub const DEFAULT_PORT: u16 = 80;

/// Source pattern of the rule used when a configuration declares none.
pub const DEFAULT_SOURCE_PATTERN: &str = "(.*)";

/// Target template of the rule used when a configuration declares none.
pub const DEFAULT_TARGET_TEMPLATE: &str = "{0}";

/// Default metadata sub-path of a mirror.
pub const DEFAULT_METADATA_PATH: &str = "metadata";

/// Default targets sub-path of a mirror.
pub const DEFAULT_TARGETS_PATH: &str = "targets";

/// Hostname recorded for mirrors whose URL prefix has no host (`file:///...`).
pub const LOCAL_MIRROR_HOSTNAME: &str = "localhost";

/// Status code reported by responses produced through a session.
pub const STATUS_OK: u16 = 200;

/// Conventional name of the interposition configuration file.
pub const CONFIGURATION_FILENAME: &str = "tuf.interposition.json";
