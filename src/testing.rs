//! In-memory trusted-fetch client for unit tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{ClientFactory, TargetInfo, TrustContext, TrustedFetchClient};
use crate::config::{Configuration, Mirror};
use crate::error::FetchError;
use crate::network_location::NetworkLocation;
use crate::target_map::{PathRule, TargetMap};

#[derive(Default)]
struct Shared {
    targets: Mutex<BTreeMap<String, Vec<u8>>>,
    refreshes: AtomicUsize,
    downloads: AtomicUsize,
    fail_refresh: AtomicBool,
}

/// Serves targets from memory; clones share counters.
#[derive(Clone, Default)]
pub(crate) struct MemoryClient {
    shared: Arc<Shared>,
}

impl MemoryClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_target(self, path: &str, content: &[u8]) -> Self {
        self.shared
            .targets
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        self
    }

    pub(crate) fn failing_refresh(self) -> Self {
        self.shared.fail_refresh.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn refreshes(&self) -> usize {
        self.shared.refreshes.load(Ordering::SeqCst)
    }

    pub(crate) fn downloads(&self) -> usize {
        self.shared.downloads.load(Ordering::SeqCst)
    }

    pub(crate) fn factory(&self) -> MemoryFactory {
        MemoryFactory(self.clone())
    }

    fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.targets.lock().unwrap().get(path).cloned()
    }
}

impl TrustedFetchClient for MemoryClient {
    fn refresh(&mut self, _context: &TrustContext) -> Result<(), FetchError> {
        self.shared.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_refresh.load(Ordering::SeqCst) {
            return Err(FetchError::unreachable("memory", "refresh disabled"));
        }
        Ok(())
    }

    fn target(&self, _context: &TrustContext, target_path: &str) -> Result<TargetInfo, FetchError> {
        let content = self
            .content(target_path)
            .ok_or_else(|| FetchError::unknown_target(target_path))?;
        Ok(TargetInfo::new(target_path, content.len() as u64))
    }

    fn updated_targets(
        &self,
        _context: &TrustContext,
        targets: &[TargetInfo],
        destination: &Path,
    ) -> Result<Vec<TargetInfo>, FetchError> {
        Ok(targets
            .iter()
            .filter(|t| fs::read(t.local_path(destination)).ok() != self.content(t.path()))
            .cloned()
            .collect())
    }

    fn download_target(
        &self,
        _context: &TrustContext,
        target: &TargetInfo,
        destination: &Path,
    ) -> Result<(), FetchError> {
        let content = self
            .content(target.path())
            .ok_or_else(|| FetchError::unknown_target(target.path()))?;
        let path = target.local_path(destination);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, &e))?;
        }
        fs::write(&path, content).map_err(|e| FetchError::io(&path, &e))?;
        self.shared.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MemoryFactory(MemoryClient);

impl ClientFactory for MemoryFactory {
    fn connect(
        &self,
        _configuration: &Configuration,
        _context: &TrustContext,
    ) -> Result<Box<dyn TrustedFetchClient>, FetchError> {
        Ok(Box::new(self.0.clone()))
    }
}

/// `location` served by `mirror_host`, with the `/pkg/` rules used across tests.
pub(crate) fn configuration(location: &str, mirror_host: &str) -> Configuration {
    configuration_with_mirrors(location, &[mirror_host])
}

pub(crate) fn configuration_with_mirrors(location: &str, mirror_hosts: &[&str]) -> Configuration {
    build(
        location,
        mirror_hosts,
        vec![
            PathRule::new(r".*(/pkg)/$", "{0}/index.html").unwrap(),
            PathRule::new(r"(/pkg/.*)", "{0}").unwrap(),
        ],
    )
}

/// `location` served by `mirror_host` with the given rules only.
pub(crate) fn configuration_with_rules(
    location: &str,
    mirror_host: &str,
    rules: Vec<PathRule>,
) -> Configuration {
    build(location, &[mirror_host], rules)
}

fn build(location: &str, mirror_hosts: &[&str], rules: Vec<PathRule>) -> Configuration {
    let mirrors = mirror_hosts
        .iter()
        .enumerate()
        .map(|(i, host)| Mirror::new(format!("mirror{i}"), &format!("http://{host}")).unwrap())
        .collect();
    Configuration::validate(
        NetworkLocation::parse(location).unwrap(),
        PathBuf::from("/nonexistent/trust"),
        None,
        mirrors,
        TargetMap::new(rules),
    )
    .unwrap()
}
