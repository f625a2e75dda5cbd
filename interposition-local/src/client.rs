//! Trusted-fetch client over `file://` mirrors.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use interposition::{
    ClientFactory, Configuration, FetchError, Mirror, TargetInfo, TrustContext, TrustedFetchClient,
};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::MetadataError;
use crate::metadata::{HASH_ALGORITHM, SignedTargets, TARGETS_FILENAME, TargetsDocument};
use crate::root::RootOfTrust;

/// Verifies and fetches targets from mirrors on the local filesystem.
///
/// Trust starts from `root.json` in the repository directory. Each refresh
/// accepts the first mirror whose `targets.json` is signed by enough
/// trusted keys, unexpired and not older than the current snapshot, and
/// persists it next to `root.json`.
#[derive(Debug)]
pub struct LocalMirrorClient {
    mirrors: Vec<Mirror>,
    root: RootOfTrust,
    snapshot: Option<SignedTargets>,
}

impl LocalMirrorClient {
    /// Creates a client for `mirrors` from the trust state in `context`.
    ///
    /// Previously accepted metadata is loaded as the starting snapshot when
    /// it still carries enough valid signatures; it then bounds the
    /// version a refresh may accept.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if `root.json` is missing or invalid.
    pub fn new(mirrors: Vec<Mirror>, context: &TrustContext) -> Result<Self, FetchError> {
        let root = RootOfTrust::load(context.repository_directory())?;
        let snapshot = load_persisted(context.repository_directory(), &root);
        Ok(Self {
            mirrors,
            root,
            snapshot,
        })
    }

    /// Returns the trusted snapshot, if any.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&SignedTargets> {
        self.snapshot.as_ref()
    }

    fn fetch_metadata(&self, mirror: &Mirror) -> Result<TargetsDocument, FetchError> {
        let path = mirror_root(mirror)?
            .join(mirror.metadata_path().trim_matches('/'))
            .join(TARGETS_FILENAME);
        let bytes =
            fs::read(&path).map_err(|e| FetchError::unreachable(mirror.name(), e.to_string()))?;

        let document = TargetsDocument::from_json(&bytes)?;
        document.verify(&self.root, Utc::now())?;
        if let Some(trusted) = &self.snapshot
            && document.signed.version < trusted.version
        {
            return Err(MetadataError::Rollback {
                trusted: trusted.version,
                offered: document.signed.version,
            }
            .into());
        }
        Ok(document)
    }

    fn fetch_target(&self, mirror: &Mirror, target: &TargetInfo) -> Result<Vec<u8>, FetchError> {
        let path = mirror_root(mirror)?
            .join(mirror.targets_path().trim_matches('/'))
            .join(target.path().trim_start_matches('/'));
        let content =
            fs::read(&path).map_err(|e| FetchError::unreachable(mirror.name(), e.to_string()))?;

        let actual = content.len() as u64;
        if actual != target.length() {
            return Err(FetchError::LengthMismatch {
                target: target.path().to_string(),
                expected: target.length(),
                actual,
            });
        }

        let expected = target.hash(HASH_ALGORITHM).ok_or_else(|| {
            FetchError::invalid_metadata(format!("no {HASH_ALGORITHM} for '{}'", target.path()))
        })?;
        let digest = hex::encode(Sha256::digest(&content));
        if digest != expected {
            return Err(FetchError::HashMismatch {
                target: target.path().to_string(),
                expected: expected.to_string(),
                actual: digest,
            });
        }
        Ok(content)
    }
}

impl TrustedFetchClient for LocalMirrorClient {
    fn refresh(&mut self, context: &TrustContext) -> Result<(), FetchError> {
        let mut last_error = FetchError::other("no mirrors configured");

        for mirror in &self.mirrors {
            match self.fetch_metadata(mirror) {
                Ok(document) => {
                    info!(
                        mirror = mirror.name(),
                        version = document.signed.version,
                        "accepted targets metadata"
                    );
                    persist(
                        &context.repository_directory().join(TARGETS_FILENAME),
                        document.to_json().as_bytes(),
                    )?;
                    self.snapshot = Some(document.signed);
                    return Ok(());
                }
                Err(e) => {
                    warn!(mirror = mirror.name(), "rejected targets metadata: {e}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn target(&self, _context: &TrustContext, target_path: &str) -> Result<TargetInfo, FetchError> {
        self.snapshot
            .as_ref()
            .ok_or(FetchError::NoSnapshot)?
            .target_info(target_path)
            .ok_or_else(|| FetchError::unknown_target(target_path))
    }

    fn updated_targets(
        &self,
        _context: &TrustContext,
        targets: &[TargetInfo],
        destination: &Path,
    ) -> Result<Vec<TargetInfo>, FetchError> {
        let mut updated = Vec::new();
        for target in targets {
            let path = target.local_path(destination);
            let current = match fs::read(&path) {
                Ok(content) => Some(hex::encode(Sha256::digest(content))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(FetchError::io(&path, &e)),
            };
            if current.as_deref() != target.hash(HASH_ALGORITHM) {
                updated.push(target.clone());
            }
        }
        Ok(updated)
    }

    fn download_target(
        &self,
        _context: &TrustContext,
        target: &TargetInfo,
        destination: &Path,
    ) -> Result<(), FetchError> {
        let mut last_error = FetchError::unknown_target(target.path());

        for mirror in self.mirrors.iter().filter(|m| m.serves_target(target.path())) {
            match self.fetch_target(mirror, target) {
                Ok(content) => {
                    let path = target.local_path(destination);
                    debug!(mirror = mirror.name(), path = %path.display(), "verified target");
                    return persist(&path, &content);
                }
                Err(e) => {
                    warn!(mirror = mirror.name(), target = target.path(), "{e}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// Builds a [`LocalMirrorClient`] for each configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClientFactory;

impl LocalClientFactory {
    /// Creates the factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ClientFactory for LocalClientFactory {
    fn connect(
        &self,
        configuration: &Configuration,
        context: &TrustContext,
    ) -> Result<Box<dyn TrustedFetchClient>, FetchError> {
        Ok(Box::new(LocalMirrorClient::new(
            configuration.mirrors().to_vec(),
            context,
        )?))
    }
}

fn mirror_root(mirror: &Mirror) -> Result<PathBuf, FetchError> {
    if mirror.url_prefix().scheme() != "file" {
        return Err(FetchError::unreachable(
            mirror.name(),
            "only file:// mirrors are supported",
        ));
    }
    mirror
        .url_prefix()
        .to_file_path()
        .map_err(|()| FetchError::unreachable(mirror.name(), "url_prefix is not a local path"))
}

fn load_persisted(repository_directory: &Path, root: &RootOfTrust) -> Option<SignedTargets> {
    let bytes = fs::read(repository_directory.join(TARGETS_FILENAME)).ok()?;
    let document = TargetsDocument::from_json(&bytes).ok()?;
    match document.verify(root, Utc::now()) {
        Ok(()) | Err(MetadataError::Expired { .. }) => Some(document.signed),
        Err(e) => {
            warn!("ignoring persisted targets metadata: {e}");
            None
        }
    }
}

/// Writes through a temporary file in the target directory, then renames.
fn persist(path: &Path, content: &[u8]) -> Result<(), FetchError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, &e))?;

    let mut file = NamedTempFile::new_in(parent).map_err(|e| FetchError::io(parent, &e))?;
    file.write_all(content).map_err(|e| FetchError::io(path, &e))?;
    file.persist(path).map_err(|e| FetchError::io(path, &e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;
    use crate::keys::SigningKey;

    const PAGE: &[u8] = b"<html>pkg</html>";

    struct Fixture {
        mirror_dir: TempDir,
        trust_dir: TempDir,
        key: SigningKey,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                mirror_dir: tempfile::tempdir().unwrap(),
                trust_dir: tempfile::tempdir().unwrap(),
                key: SigningKey::from_bytes(&[9; 32]),
            };
            RootOfTrust::new([fixture.key.verifying_key()], 1)
                .store(fixture.trust_dir.path())
                .unwrap();
            fixture.publish(1, PAGE);
            fixture
        }

        fn publish(&self, version: u64, content: &[u8]) {
            let signed = SignedTargets::new(version, Utc::now() + Duration::days(1))
                .with_target("pkg/index.html", content);
            let document = TargetsDocument::sign(signed, &[&self.key]);
            let metadata = self.mirror_dir.path().join("metadata");
            fs::create_dir_all(&metadata).unwrap();
            fs::write(metadata.join(TARGETS_FILENAME), document.to_json()).unwrap();

            let targets = self.mirror_dir.path().join("targets/pkg");
            fs::create_dir_all(&targets).unwrap();
            fs::write(targets.join("index.html"), content).unwrap();
        }

        fn mirror(&self) -> Mirror {
            Mirror::new("local", &format!("file://{}", self.mirror_dir.path().display())).unwrap()
        }

        fn context(&self) -> TrustContext {
            TrustContext::new(self.trust_dir.path().to_path_buf(), None)
        }

        fn client(&self) -> LocalMirrorClient {
            LocalMirrorClient::new(vec![self.mirror()], &self.context()).unwrap()
        }
    }

    #[test]
    fn refresh_then_download() {
        let fixture = Fixture::new();
        let context = fixture.context();
        let mut client = fixture.client();
        assert_eq!(
            client.target(&context, "/pkg/index.html"),
            Err(FetchError::NoSnapshot)
        );

        client.refresh(&context).unwrap();
        let info = client.target(&context, "/pkg/index.html").unwrap();
        let destination = tempfile::tempdir().unwrap();
        let stale = client
            .updated_targets(&context, std::slice::from_ref(&info), destination.path())
            .unwrap();
        assert_eq!(stale, vec![info.clone()]);

        client
            .download_target(&context, &info, destination.path())
            .unwrap();
        assert_eq!(fs::read(info.local_path(destination.path())).unwrap(), PAGE);
        assert!(
            client
                .updated_targets(&context, &[info], destination.path())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn refresh_persists_metadata() {
        let fixture = Fixture::new();
        fixture.client().refresh(&fixture.context()).unwrap();
        assert!(fixture.trust_dir.path().join(TARGETS_FILENAME).exists());

        let reopened = fixture.client();
        assert_eq!(reopened.snapshot().map(|s| s.version), Some(1));
    }

    #[test]
    fn older_metadata_is_a_rollback() {
        let fixture = Fixture::new();
        fixture.publish(5, PAGE);
        let mut client = fixture.client();
        client.refresh(&fixture.context()).unwrap();

        fixture.publish(4, PAGE);
        assert_eq!(
            client.refresh(&fixture.context()),
            Err(FetchError::Rollback {
                trusted: 5,
                offered: 4
            })
        );
        assert_eq!(client.snapshot().map(|s| s.version), Some(5));
    }

    #[test]
    fn tampered_target_rejected() {
        let fixture = Fixture::new();
        let context = fixture.context();
        let mut client = fixture.client();
        client.refresh(&context).unwrap();
        let info = client.target(&context, "/pkg/index.html").unwrap();

        let tampered: Vec<u8> = PAGE.iter().map(|b| b ^ 1).collect();
        fs::write(fixture.mirror_dir.path().join("targets/pkg/index.html"), &tampered).unwrap();

        let destination = tempfile::tempdir().unwrap();
        assert!(matches!(
            client.download_target(&context, &info, destination.path()),
            Err(FetchError::HashMismatch { .. })
        ));
        assert!(!info.local_path(destination.path()).exists());
    }

    #[test]
    fn non_file_mirror_is_unreachable() {
        let fixture = Fixture::new();
        let mirror = Mirror::new("remote", "http://mirror.ex.com").unwrap();
        let mut client = LocalMirrorClient::new(vec![mirror], &fixture.context()).unwrap();
        assert!(matches!(
            client.refresh(&fixture.context()),
            Err(FetchError::Unreachable { .. })
        ));
    }

    #[test]
    fn missing_root_fails_connect() {
        let fixture = Fixture::new();
        let empty = tempfile::tempdir().unwrap();
        let context = TrustContext::new(empty.path().to_path_buf(), None);
        assert!(LocalMirrorClient::new(vec![fixture.mirror()], &context).is_err());
    }
}
