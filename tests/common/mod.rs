//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use interposition::{
    ClientFactory, Configuration, ConfigurationBuilder, FetchError, Mirror, TargetInfo,
    TrustContext, TrustedFetchClient,
};

#[derive(Default)]
struct Script {
    targets: Mutex<BTreeMap<String, Vec<u8>>>,
    snapshot: AtomicU64,
    refreshes: AtomicUsize,
    downloads: AtomicUsize,
    connects: AtomicUsize,
    active_downloads: AtomicUsize,
    mixed_snapshots: AtomicUsize,
    download_delay_ms: AtomicU64,
    refresh_delay_ms: AtomicU64,
    contexts: Mutex<Vec<TrustContext>>,
}

/// Scripted trusted-fetch client.
///
/// Every refresh publishes a new snapshot number. Target information carries
/// the snapshot it was resolved against, and a download that sees a
/// different current snapshot, or a refresh that starts while a download is
/// running, is counted as a mixed snapshot.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Script>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(self, path: &str, content: &[u8]) -> Self {
        self.script
            .targets
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        self
    }

    pub fn with_download_delay(self, delay: Duration) -> Self {
        self.script
            .download_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
        self
    }

    /// Slows every later refresh, including session bootstrap.
    pub fn set_refresh_delay(&self, delay: Duration) {
        self.script
            .refresh_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    pub fn refreshes(&self) -> usize {
        self.script.refreshes.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.script.downloads.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub fn mixed_snapshots(&self) -> usize {
        self.script.mixed_snapshots.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<TrustContext> {
        self.script.contexts.lock().unwrap().clone()
    }

    pub fn factory(&self) -> ScriptedFactory {
        ScriptedFactory(self.clone())
    }

    fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.script.targets.lock().unwrap().get(path).cloned()
    }

    fn record(&self, context: &TrustContext) {
        self.script.contexts.lock().unwrap().push(context.clone());
    }
}

impl TrustedFetchClient for ScriptedClient {
    fn refresh(&mut self, context: &TrustContext) -> Result<(), FetchError> {
        self.record(context);
        let delay = self.script.refresh_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.script.active_downloads.load(Ordering::SeqCst) > 0 {
            self.script.mixed_snapshots.fetch_add(1, Ordering::SeqCst);
        }
        self.script.snapshot.fetch_add(1, Ordering::SeqCst);
        self.script.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn target(&self, context: &TrustContext, target_path: &str) -> Result<TargetInfo, FetchError> {
        self.record(context);
        let content = self
            .content(target_path)
            .ok_or_else(|| FetchError::unknown_target(target_path))?;
        let snapshot = self.script.snapshot.load(Ordering::SeqCst);
        Ok(TargetInfo::new(target_path, content.len() as u64)
            .with_hash("snapshot", snapshot.to_string()))
    }

    fn updated_targets(
        &self,
        _context: &TrustContext,
        targets: &[TargetInfo],
        _destination: &Path,
    ) -> Result<Vec<TargetInfo>, FetchError> {
        Ok(targets.to_vec())
    }

    fn download_target(
        &self,
        context: &TrustContext,
        target: &TargetInfo,
        destination: &Path,
    ) -> Result<(), FetchError> {
        self.record(context);
        self.script.active_downloads.fetch_add(1, Ordering::SeqCst);

        let delay = self.script.download_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        let current = self.script.snapshot.load(Ordering::SeqCst).to_string();
        if target.hash("snapshot") != Some(current.as_str()) {
            self.script.mixed_snapshots.fetch_add(1, Ordering::SeqCst);
        }

        let result = self
            .content(target.path())
            .ok_or_else(|| FetchError::unknown_target(target.path()))
            .and_then(|content| {
                let path = target.local_path(destination);
                let parent = path.parent().unwrap_or(destination);
                fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, &e))?;
                fs::write(&path, content).map_err(|e| FetchError::io(&path, &e))
            });

        self.script.downloads.fetch_add(1, Ordering::SeqCst);
        self.script.active_downloads.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct ScriptedFactory(ScriptedClient);

impl ClientFactory for ScriptedFactory {
    fn connect(
        &self,
        _configuration: &Configuration,
        _context: &TrustContext,
    ) -> Result<Box<dyn TrustedFetchClient>, FetchError> {
        self.0.script.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.0.clone()))
    }
}

/// Routes `tracing` output to the test harness; set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `location` mirrored by `mirror_host`, mapping `/pkg/` to its index page.
pub fn configuration(location: &str, mirror_host: &str) -> Configuration {
    ConfigurationBuilder::new()
        .try_network_location(location)
        .unwrap()
        .repository_directory(format!("/trust/{location}"))
        .mirror(Mirror::new("primary", &format!("http://{mirror_host}")).unwrap())
        .try_target_path(r".*(/pkg)/$", "{0}/index.html")
        .unwrap()
        .try_target_path(r"(/pkg/.+)", "{0}")
        .unwrap()
        .build()
        .unwrap()
}

/// Writes an interposition document into `dir` and returns its path.
pub fn write_document(dir: &Path, json: &str) -> std::path::PathBuf {
    let path = dir.join(interposition::CONFIGURATION_FILENAME);
    fs::write(&path, json).unwrap();
    path
}
