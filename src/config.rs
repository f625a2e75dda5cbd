//! Interposition configurations and the JSON document they are loaded from.
//!
//! # Document format
//!
//! ```json
//! {
//!   "configurations": {
//!     "seattle.poly.edu": {
//!       "repository_directory": "client/",
//!       "repository_mirrors": {
//!         "mirror1": {
//!           "url_prefix": "http://localhost:8001",
//!           "metadata_path": "metadata",
//!           "targets_path": "targets",
//!           "confined_target_dirs": [""]
//!         }
//!       },
//!       "target_paths": [{ ".*(/some/directory)/$": "{0}/index.html" }],
//!       "ssl_certificates": "cacert.pem"
//!     }
//!   }
//! }
//! ```
//!
//! Relative paths resolve against the directory holding the document.
//! Mirrors are kept in name order.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::client::TrustContext;
use crate::constants::{DEFAULT_METADATA_PATH, DEFAULT_TARGETS_PATH, LOCAL_MIRROR_HOSTNAME};
use crate::error::ConfigurationError;
use crate::network_location::NetworkLocation;
use crate::target_map::{PathRule, TargetMap};

/// A repository mirror a session may fetch verified content from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    name: String,
    url_prefix: Url,
    hostname: String,
    metadata_path: String,
    targets_path: String,
    confined_target_dirs: Vec<String>,
}

impl Mirror {
    /// Creates a mirror with default metadata and targets sub-paths.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidMirror` if `url_prefix` is not an
    /// absolute, hierarchical URL.
    pub fn new(name: impl Into<String>, url_prefix: &str) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let url = Url::parse(url_prefix).map_err(|e| {
            ConfigurationError::invalid_mirror("", &name, format!("url_prefix: {e}"))
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigurationError::invalid_mirror(
                "",
                &name,
                "url_prefix must be a hierarchical URL",
            ));
        }
        let hostname = url
            .host_str()
            .map_or_else(|| LOCAL_MIRROR_HOSTNAME.to_string(), str::to_string);

        Ok(Self {
            name,
            url_prefix: url,
            hostname,
            metadata_path: DEFAULT_METADATA_PATH.to_string(),
            targets_path: DEFAULT_TARGETS_PATH.to_string(),
            confined_target_dirs: vec![String::new()],
        })
    }

    /// Sets the metadata sub-path.
    #[must_use]
    pub fn with_metadata_path(mut self, path: impl Into<String>) -> Self {
        self.metadata_path = path.into();
        self
    }

    /// Sets the targets sub-path.
    #[must_use]
    pub fn with_targets_path(mut self, path: impl Into<String>) -> Self {
        self.targets_path = path.into();
        self
    }

    /// Restricts the mirror to targets under the given directories.
    ///
    /// An empty string confines nothing.
    #[must_use]
    pub fn with_confined_target_dirs(mut self, dirs: Vec<String>) -> Self {
        self.confined_target_dirs = dirs;
        self
    }

    /// Returns the mirror name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the URL prefix.
    #[must_use]
    pub const fn url_prefix(&self) -> &Url {
        &self.url_prefix
    }

    /// Returns the mirror hostname (`localhost` for host-less URLs).
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the metadata sub-path.
    #[must_use]
    pub fn metadata_path(&self) -> &str {
        &self.metadata_path
    }

    /// Returns the targets sub-path.
    #[must_use]
    pub fn targets_path(&self) -> &str {
        &self.targets_path
    }

    /// Returns the confined target directories.
    #[must_use]
    pub fn confined_target_dirs(&self) -> &[String] {
        &self.confined_target_dirs
    }

    /// Returns true if this mirror may serve `target`.
    ///
    /// # Examples
    ///
    /// ```
    /// use interposition::Mirror;
    ///
    /// let mirror = Mirror::new("m", "http://mirror.ex.com")
    ///     .unwrap()
    ///     .with_confined_target_dirs(vec!["pkg".into()]);
    /// assert!(mirror.serves_target("/pkg/index.html"));
    /// assert!(!mirror.serves_target("/other/file"));
    /// ```
    #[must_use]
    pub fn serves_target(&self, target: &str) -> bool {
        let target = target.trim_start_matches('/');
        self.confined_target_dirs.iter().any(|dir| {
            let dir = dir.trim_matches('/');
            dir.is_empty()
                || target == dir
                || target
                    .strip_prefix(dir)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Returns the URL of a metadata file on this mirror.
    #[must_use]
    pub fn metadata_url(&self, file: &str) -> String {
        self.join(&self.metadata_path, file)
    }

    /// Returns the URL of a target on this mirror.
    #[must_use]
    pub fn target_url(&self, target: &str) -> String {
        self.join(&self.targets_path, target)
    }

    fn join(&self, sub_path: &str, file: &str) -> String {
        let prefix = self.url_prefix.as_str().trim_end_matches('/');
        let sub_path = sub_path.trim_matches('/');
        let file = file.trim_start_matches('/');
        if sub_path.is_empty() {
            format!("{prefix}/{file}")
        } else {
            format!("{prefix}/{sub_path}/{file}")
        }
    }

    fn requires_certificates(&self) -> bool {
        self.url_prefix.scheme() == "https"
    }
}

/// A validated interposition configuration for one origin.
///
/// Immutable once built; see [`ConfigurationBuilder`] and
/// [`load_configurations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    network_location: NetworkLocation,
    repository_directory: PathBuf,
    ssl_certificates: Option<PathBuf>,
    mirrors: Vec<Mirror>,
    target_map: TargetMap,
}

impl Configuration {
    pub(crate) fn validate(
        network_location: NetworkLocation,
        repository_directory: PathBuf,
        ssl_certificates: Option<PathBuf>,
        mirrors: Vec<Mirror>,
        target_map: TargetMap,
    ) -> Result<Self, ConfigurationError> {
        if mirrors.is_empty() {
            return Err(ConfigurationError::MissingField {
                network_location: network_location.to_string(),
                field: "repository_mirrors",
            });
        }
        if ssl_certificates.is_none() && mirrors.iter().any(Mirror::requires_certificates) {
            return Err(ConfigurationError::MissingCertificates {
                network_location: network_location.to_string(),
            });
        }

        for rule in target_map.rules() {
            if let Some(max) = rule.template().max_group()
                && max >= rule.capture_count()
            {
                warn!(
                    network_location = %network_location,
                    pattern = rule.pattern(),
                    template = rule.template().as_str(),
                    "template refers to group {max} but the pattern captures {}",
                    rule.capture_count()
                );
            }
        }

        Ok(Self {
            network_location,
            repository_directory,
            ssl_certificates,
            mirrors,
            target_map,
        })
    }

    /// Returns the origin network location.
    #[must_use]
    pub const fn network_location(&self) -> &NetworkLocation {
        &self.network_location
    }

    /// Returns the origin hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        self.network_location.hostname()
    }

    /// Returns the declared origin port, if any.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.network_location.port()
    }

    /// Returns the local trust-state directory.
    #[must_use]
    pub fn repository_directory(&self) -> &Path {
        &self.repository_directory
    }

    /// Returns the TLS certificate bundle, if any.
    #[must_use]
    pub fn ssl_certificates(&self) -> Option<&Path> {
        self.ssl_certificates.as_deref()
    }

    /// Returns the mirrors in configured order.
    #[must_use]
    pub fn mirrors(&self) -> &[Mirror] {
        &self.mirrors
    }

    /// Returns the path-mapping rules.
    #[must_use]
    pub const fn target_map(&self) -> &TargetMap {
        &self.target_map
    }

    /// Returns the set of mirror hostnames.
    #[must_use]
    pub fn mirror_hostnames(&self) -> BTreeSet<String> {
        self.mirrors.iter().map(|m| m.hostname.clone()).collect()
    }

    /// Returns the trust context passed to every trusted-fetch call.
    #[must_use]
    pub fn trust_context(&self) -> TrustContext {
        TrustContext::new(
            self.repository_directory.clone(),
            self.ssl_certificates.clone(),
        )
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration for {}", self.network_location)
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    configurations: Option<BTreeMap<String, RawConfiguration>>,
}

#[derive(Debug, Deserialize)]
struct RawConfiguration {
    repository_directory: Option<String>,
    repository_mirrors: Option<BTreeMap<String, RawMirror>>,
    target_paths: Option<Vec<BTreeMap<String, String>>>,
    ssl_certificates: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMirror {
    url_prefix: Option<String>,
    metadata_path: Option<String>,
    targets_path: Option<String>,
    confined_target_dirs: Option<Vec<String>>,
}

/// Loads every configuration declared in an interposition document.
///
/// Relative `repository_directory` and `ssl_certificates` paths resolve
/// against the document's directory.
///
/// # Errors
///
/// Returns `ConfigurationError` if the file cannot be read, is malformed,
/// or any configuration fails validation.
pub fn load_configurations(path: impl AsRef<Path>) -> Result<Vec<Configuration>, ConfigurationError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ConfigurationError::io(path, &e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    debug!(path = %path.display(), "loading interposition configurations");
    parse_document(&text, &path.display().to_string(), base_dir)
}

/// Parses an interposition document held in memory.
///
/// # Errors
///
/// Returns `ConfigurationError` if the document is malformed or any
/// configuration fails validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use interposition::parse_configurations;
///
/// let json = r#"{
///     "configurations": {
///         "ex.com": {
///             "repository_directory": "/var/lib/trust",
///             "repository_mirrors": { "m1": { "url_prefix": "http://mirror.ex.com" } },
///             "target_paths": [{ ".*(/pkg)/$": "{0}/index.html" }]
///         }
///     }
/// }"#;
///
/// let configurations = parse_configurations(json, Path::new("/etc")).unwrap();
/// assert_eq!(configurations[0].hostname(), "ex.com");
/// assert!(configurations[0].mirror_hostnames().contains("mirror.ex.com"));
/// ```
pub fn parse_configurations(
    json: &str,
    base_dir: &Path,
) -> Result<Vec<Configuration>, ConfigurationError> {
    parse_document(json, "<memory>", base_dir)
}

fn parse_document(
    json: &str,
    origin: &str,
    base_dir: &Path,
) -> Result<Vec<Configuration>, ConfigurationError> {
    let document: Document = serde_json::from_str(json).map_err(|e| ConfigurationError::Json {
        path: origin.to_string(),
        message: e.to_string(),
    })?;

    let configurations = document.configurations.unwrap_or_default();
    if configurations.is_empty() {
        return Err(ConfigurationError::Empty);
    }

    configurations
        .into_iter()
        .map(|(location, raw)| convert(&location, raw, base_dir))
        .collect()
}

fn convert(
    location: &str,
    raw: RawConfiguration,
    base_dir: &Path,
) -> Result<Configuration, ConfigurationError> {
    let network_location = NetworkLocation::parse(location)?;

    let repository_directory =
        raw.repository_directory
            .ok_or_else(|| ConfigurationError::MissingField {
                network_location: location.to_string(),
                field: "repository_directory",
            })?;

    let raw_mirrors = raw
        .repository_mirrors
        .ok_or_else(|| ConfigurationError::MissingField {
            network_location: location.to_string(),
            field: "repository_mirrors",
        })?;

    let mut mirrors = Vec::with_capacity(raw_mirrors.len());
    for (name, raw_mirror) in raw_mirrors {
        let url_prefix = raw_mirror.url_prefix.ok_or_else(|| {
            ConfigurationError::invalid_mirror(location, &name, "missing url_prefix")
        })?;
        let mut mirror = Mirror::new(&name, &url_prefix).map_err(|e| match e {
            ConfigurationError::InvalidMirror { mirror, reason, .. } => {
                ConfigurationError::invalid_mirror(location, mirror, reason)
            }
            other => other,
        })?;
        if let Some(path) = raw_mirror.metadata_path {
            mirror = mirror.with_metadata_path(path);
        }
        if let Some(path) = raw_mirror.targets_path {
            mirror = mirror.with_targets_path(path);
        }
        if let Some(dirs) = raw_mirror.confined_target_dirs {
            mirror = mirror.with_confined_target_dirs(dirs);
        }
        mirrors.push(mirror);
    }

    let target_map = match raw.target_paths {
        None => TargetMap::identity(),
        Some(entries) => {
            let mut rules = Vec::with_capacity(entries.len());
            for (index, entry) in entries.into_iter().enumerate() {
                let mut pairs = entry.into_iter();
                let (Some((pattern, template)), None) = (pairs.next(), pairs.next()) else {
                    return Err(ConfigurationError::InvalidTargetPath {
                        network_location: location.to_string(),
                        index,
                    });
                };
                rules.push(PathRule::new(&pattern, &template)?);
            }
            TargetMap::new(rules)
        }
    };

    Configuration::validate(
        network_location,
        resolve(base_dir, &repository_directory),
        raw.ssl_certificates.map(|p| resolve(base_dir, &p)),
        mirrors,
        target_map,
    )
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "configurations": {
            "seattle.poly.edu": {
                "repository_directory": "client/",
                "repository_mirrors": {
                    "mirror1": {
                        "url_prefix": "http://localhost:8001",
                        "metadata_path": "meta",
                        "targets_path": "files",
                        "confined_target_dirs": ["pkg"]
                    }
                },
                "target_paths": [
                    { ".*(/some/directory)/$": "{0}/index.html" },
                    { "(.*)": "{0}" }
                ]
            },
            "ex.com:8080": {
                "repository_directory": "/abs/trust",
                "repository_mirrors": {
                    "a": { "url_prefix": "https://mirror-a.ex.com" },
                    "b": { "url_prefix": "https://mirror-b.ex.com/repo/" }
                },
                "ssl_certificates": "certs/ca.pem"
            }
        }
    }"#;

    fn parse(json: &str) -> Result<Vec<Configuration>, ConfigurationError> {
        parse_configurations(json, Path::new("/etc/interposition"))
    }

    #[test]
    fn parses_full_document() {
        let configurations = parse(DOCUMENT).unwrap();
        assert_eq!(configurations.len(), 2);

        let ex = &configurations[0];
        assert_eq!(ex.hostname(), "ex.com");
        assert_eq!(ex.port(), Some(8080));
        assert_eq!(ex.repository_directory(), Path::new("/abs/trust"));
        assert_eq!(
            ex.ssl_certificates(),
            Some(Path::new("/etc/interposition/certs/ca.pem"))
        );
        assert_eq!(
            ex.mirror_hostnames(),
            BTreeSet::from(["mirror-a.ex.com".to_string(), "mirror-b.ex.com".to_string()])
        );
        assert_eq!(ex.target_map(), &TargetMap::identity());

        let seattle = &configurations[1];
        assert_eq!(seattle.network_location().as_str(), "seattle.poly.edu");
        assert_eq!(
            seattle.repository_directory(),
            Path::new("/etc/interposition/client/")
        );
        let mirror = &seattle.mirrors()[0];
        assert_eq!(mirror.metadata_path(), "meta");
        assert_eq!(mirror.targets_path(), "files");
        assert_eq!(mirror.confined_target_dirs(), ["pkg".to_string()]);
        assert_eq!(seattle.target_map().rules().len(), 2);
    }

    #[test]
    fn missing_repository_directory() {
        let json = r#"{"configurations": {"ex.com": {
            "repository_mirrors": {"m": {"url_prefix": "http://m.ex.com"}}
        }}}"#;
        assert!(matches!(
            parse(json),
            Err(ConfigurationError::MissingField {
                field: "repository_directory",
                ..
            })
        ));
    }

    #[test]
    fn empty_mirrors_rejected() {
        let json = r#"{"configurations": {"ex.com": {
            "repository_directory": "x", "repository_mirrors": {}
        }}}"#;
        assert!(matches!(
            parse(json),
            Err(ConfigurationError::MissingField {
                field: "repository_mirrors",
                ..
            })
        ));
    }

    #[test]
    fn https_mirror_requires_certificates() {
        let json = r#"{"configurations": {"ex.com": {
            "repository_directory": "x",
            "repository_mirrors": {"m": {"url_prefix": "https://m.ex.com"}}
        }}}"#;
        assert!(matches!(
            parse(json),
            Err(ConfigurationError::MissingCertificates { .. })
        ));
    }

    #[test]
    fn target_path_must_be_single_pair() {
        let json = r#"{"configurations": {"ex.com": {
            "repository_directory": "x",
            "repository_mirrors": {"m": {"url_prefix": "http://m.ex.com"}},
            "target_paths": [{"a": "{0}", "b": "{0}"}]
        }}}"#;
        assert!(matches!(
            parse(json),
            Err(ConfigurationError::InvalidTargetPath { index: 0, .. })
        ));
    }

    #[test]
    fn bad_mirror_url_names_location() {
        let json = r#"{"configurations": {"ex.com": {
            "repository_directory": "x",
            "repository_mirrors": {"m": {"url_prefix": "not a url"}}
        }}}"#;
        match parse(json) {
            Err(ConfigurationError::InvalidMirror {
                network_location,
                mirror,
                ..
            }) => {
                assert_eq!(network_location, "ex.com");
                assert_eq!(mirror, "m");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_document_rejected() {
        assert!(matches!(
            parse(r#"{"configurations": {}}"#),
            Err(ConfigurationError::Empty)
        ));
        assert!(matches!(parse("{}"), Err(ConfigurationError::Empty)));
        assert!(matches!(parse("["), Err(ConfigurationError::Json { .. })));
    }

    #[test]
    fn file_mirror_hostname_is_localhost() {
        let mirror = Mirror::new("local", "file:///srv/mirror").unwrap();
        assert_eq!(mirror.hostname(), LOCAL_MIRROR_HOSTNAME);
    }

    #[test]
    fn mirror_urls() {
        let mirror = Mirror::new("m", "http://m.ex.com/repo/").unwrap();
        assert_eq!(
            mirror.metadata_url("targets.json"),
            "http://m.ex.com/repo/metadata/targets.json"
        );
        assert_eq!(
            mirror.target_url("/pkg/index.html"),
            "http://m.ex.com/repo/targets/pkg/index.html"
        );
        let flat = mirror.with_targets_path("");
        assert_eq!(flat.target_url("/a"), "http://m.ex.com/repo/a");
    }

    #[test]
    fn confined_dirs_match_whole_components() {
        let mirror = Mirror::new("m", "http://m.ex.com")
            .unwrap()
            .with_confined_target_dirs(vec!["/pkg/".into()]);
        assert!(mirror.serves_target("pkg"));
        assert!(mirror.serves_target("/pkg/a"));
        assert!(!mirror.serves_target("/pkgs/a"));
    }

    #[test]
    fn load_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuf.interposition.json");
        fs::write(
            &path,
            r#"{"configurations": {"ex.com": {
                "repository_directory": "trust",
                "repository_mirrors": {"m": {"url_prefix": "http://m.ex.com"}}
            }}}"#,
        )
        .unwrap();

        let configurations = load_configurations(&path).unwrap();
        assert_eq!(
            configurations[0].repository_directory(),
            dir.path().join("trust")
        );
    }

    #[test]
    fn load_missing_file() {
        assert!(matches!(
            load_configurations("/nonexistent/tuf.interposition.json"),
            Err(ConfigurationError::Io { .. })
        ));
    }
}
