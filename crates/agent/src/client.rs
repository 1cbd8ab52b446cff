//! Catalog client
//!
//! Owns one node's run cycle: splay, lock, acquire a catalog (compiled,
//! cached or already in memory), apply it, unlock, clean up.
//!
//! ```text
//! Idle → Locking → Fetching → {Remote, Cache, InMemory} → Applying → Idle
//! ```

use crate::backend::{self, CompilerBackend};
use crate::cache::CatalogCache;
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::facts::{self, FactSource, Facts};
use crate::lock::Pidlock;
use crate::plugins::DirectorySync;
use crate::splay::{self, Sleeper, ThreadSleeper};
use crate::storage::Storage;
use declarative::{
    ApplyOptions, Catalog, CatalogDocument, ProgressCallback, TransactionReport, TypeRegistry,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

static PROCESS_FETCH_GATE: LazyLock<FetchGate> = LazyLock::new(FetchGate::default);

/// Allows one catalog fetch at a time.
///
/// Clones share the flag. It stays set until the compile worker returns,
/// even after the caller stopped waiting on a timeout.
#[derive(Debug, Clone, Default)]
pub struct FetchGate(Arc<AtomicBool>);

impl FetchGate {
    /// The gate shared by every client in this process.
    pub fn process() -> Self {
        PROCESS_FETCH_GATE.clone()
    }

    /// Whether a fetch is in flight.
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn try_enter(&self) -> Option<FetchPermit> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FetchPermit(Arc::clone(&self.0)))
    }
}

/// Held by the compile worker; frees the gate on drop.
struct FetchPermit(Arc<AtomicBool>);

impl Drop for FetchPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Deferred restart request.
///
/// Clones share the flag, so a signal handler or another thread can request
/// a restart while the client is busy. The request is reported once the run
/// has finished.
#[derive(Debug, Clone, Default)]
pub struct RestartHandle(Arc<AtomicBool>);

impl RestartHandle {
    pub fn request(&self) {
        log::info!("Received restart request; waiting until run is complete");
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// What one call to [`CatalogClient::run`] did.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// The lock was held elsewhere; nothing was attempted.
    pub skipped: bool,
    /// The applied catalog came from the cache.
    pub from_cache: bool,
    /// Report of the applied catalog, if one was applied.
    pub report: Option<TransactionReport>,
    /// A restart was requested during the run.
    pub restart_requested: bool,
}

impl RunOutcome {
    pub fn applied(&self) -> bool {
        self.report.is_some()
    }
}

/// Acquires and applies catalogs for one node.
pub struct CatalogClient {
    config: AgentConfig,
    backend: Arc<dyn CompilerBackend>,
    facts: Box<dyn FactSource>,
    registry: TypeRegistry,
    storage: Storage,
    cache: CatalogCache,
    lock: Pidlock,
    sleeper: Box<dyn Sleeper>,
    catalog: Option<Catalog>,
    restart: RestartHandle,
    fetch_gate: FetchGate,
}

impl CatalogClient {
    /// Create a client and load its run state.
    ///
    /// Fails only when a corrupt state file cannot be removed.
    pub fn new(
        config: AgentConfig,
        backend: Arc<dyn CompilerBackend>,
        facts: Box<dyn FactSource>,
        registry: TypeRegistry,
    ) -> Result<Self> {
        let storage = Storage::load(&config.statefile)?;
        Ok(Self {
            cache: CatalogCache::new(&config.cachefile),
            lock: Pidlock::new(&config.lockfile),
            config,
            backend,
            facts,
            registry,
            storage,
            sleeper: Box::new(ThreadSleeper),
            catalog: None,
            restart: RestartHandle::default(),
            fetch_gate: FetchGate::process(),
        })
    }

    /// Replace the sleeper used for splay.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Serialize fetches through `gate` instead of the process-wide one.
    #[must_use]
    pub fn with_fetch_gate(mut self, gate: FetchGate) -> Self {
        self.fetch_gate = gate;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The catalog currently held in memory.
    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    /// Handle for requesting a restart from elsewhere.
    pub fn restart_handle(&self) -> RestartHandle {
        self.restart.clone()
    }

    pub fn request_restart(&self) {
        self.restart.request();
    }

    /// Run one full cycle.
    ///
    /// Catalog acquisition and apply failures are logged, not returned. Only
    /// failures to persist run state reach the caller.
    pub fn run(
        &mut self,
        options: &ApplyOptions,
        progress: &mut dyn ProgressCallback,
    ) -> Result<RunOutcome> {
        self.splay()?;

        match self.lock.lock() {
            Ok(true) => {}
            Ok(false) => {
                log::info!("Lock file {} exists; skipping run", self.lock.path().display());
                return Ok(RunOutcome {
                    skipped: true,
                    restart_requested: self.restart.take(),
                    ..RunOutcome::default()
                });
            }
            Err(err) => {
                log::error!("Could not acquire run lock: {err}");
                return Ok(RunOutcome {
                    skipped: true,
                    restart_requested: self.restart.take(),
                    ..RunOutcome::default()
                });
            }
        }

        let result = self.locked_run(options, progress);

        if let Err(err) = self.lock.unlock() {
            log::error!("Could not release run lock: {err}");
        }
        self.clear();
        self.storage.state_mut().last_run = Some(chrono::Utc::now());
        let saved = self.storage.save();

        let mut outcome = result?;
        saved?;
        outcome.restart_requested = self.restart.take();
        if outcome.restart_requested {
            log::info!("Restarting as requested");
        }
        Ok(outcome)
    }

    fn locked_run(
        &mut self,
        options: &ApplyOptions,
        progress: &mut dyn ProgressCallback,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        if let Err(err) = self.getconfig() {
            if err.is_fatal() {
                return Err(err);
            }
            log::error!("Could not retrieve catalog: {err}");
        }

        let mut outcome = RunOutcome::default();
        let Some(catalog) = self.catalog.as_mut() else {
            log::warn!("No catalog available; nothing to apply");
            return Ok(outcome);
        };
        catalog.retrieval_duration = Some(started.elapsed());
        outcome.from_cache = catalog.from_cache;

        log::info!(
            "Applying catalog for {} ({} resources)",
            catalog.name(),
            catalog.len()
        );
        match catalog.apply(options, progress) {
            Ok(report) => {
                log::info!(
                    "Finished catalog run in {:.2}s",
                    started.elapsed().as_secs_f64()
                );
                outcome.report = Some(report);
            }
            Err(err) => log::error!("Could not apply catalog: {err}"),
        }
        Ok(outcome)
    }

    /// Sleep this node's splay delay, choosing and persisting it first if
    /// needed.
    pub fn splay(&mut self) -> Result<()> {
        if !self.config.splay {
            return Ok(());
        }
        let chosen = self.storage.state().splay_time.is_none();
        let time = splay::splay_time(self.storage.state_mut(), self.config.splay_limit);
        if chosen {
            self.storage.save()?;
        }
        log::info!("Sleeping for {time} seconds (splay is enabled)");
        self.sleeper.sleep(Duration::from_secs(time));
        Ok(())
    }

    /// Acquire a catalog into memory.
    ///
    /// On success `catalog()` holds a compiled, cached or in-memory catalog,
    /// or nothing when every source failed and no fallback was allowed.
    pub fn getconfig(&mut self) -> Result<()> {
        if self.config.fact_sync {
            self.sync_facts();
        }
        let facts = facts::gather(
            self.facts.as_mut(),
            &self.config.environment,
            self.config.downcase_facts,
        )?;

        if self.config.plugin_sync {
            self.sync_plugins();
        }

        if (self.catalog.is_some() || self.cache.exists()) && self.is_fresh(&facts) {
            log::info!("Configuration is up to date");
            if self.use_cached_config(false) {
                return Ok(());
            }
        }

        log::debug!("Retrieving catalog");
        let text = match self.fetch(&facts) {
            Ok(text) => text,
            Err(err) => return self.fall_back("Could not retrieve catalog", err),
        };

        let document: CatalogDocument = match serde_json::from_str(&text) {
            Ok(document) => document,
            Err(err) => {
                return self.fall_back("Catalog could not be decoded", Error::from(err));
            }
        };

        if !self.backend.is_local() {
            self.set_classes(&document.classes);
        }

        self.clear();
        let mut catalog = match Catalog::from_document(document, &self.registry) {
            Ok(catalog) => catalog,
            Err(err) => {
                self.clear();
                return self.fall_back("Catalog could not be instantiated", Error::from(err));
            }
        };

        if !catalog.from_cache {
            if let Err(err) = self.cache.write(&text) {
                log::error!("Could not cache catalog: {err}");
            }
        }

        // A local compile says nothing about the compiler's catalog
        if !self.backend.is_local() {
            let state = self.storage.state_mut();
            state.compile_time = Some(chrono::Utc::now().timestamp());
            state.facts = Some(facts);
        }

        catalog.host_config = true;
        self.catalog = Some(catalog);
        Ok(())
    }

    fn fall_back(&mut self, what: &str, err: Error) -> Result<()> {
        if !err.allows_cache_fallback() {
            return Err(err);
        }
        if self.use_cached_config(true) {
            log::warn!("{what}: {err}; using cached catalog");
        } else {
            log::error!("{what}: {err}");
        }
        Ok(())
    }

    /// Compile remotely, bounded by the configured timeout.
    ///
    /// Fails at once when an earlier fetch is still compiling.
    fn fetch(&self, facts: &Facts) -> Result<String> {
        let encoded = backend::encode_facts(facts)?;
        let Some(permit) = self.fetch_gate.try_enter() else {
            return Err(Error::Protocol(
                "an earlier catalog fetch is still in progress".into(),
            ));
        };

        let backend = Arc::clone(&self.backend);
        let node = self.config.node_name.clone();
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("catalog-fetch".into())
            .spawn(move || {
                let result = backend.compile(&node, &encoded);
                drop(permit);
                // The receiver is gone if the fetch already timed out
                let _ = tx.send(result);
            })
            .map_err(|e| Error::Protocol(format!("could not start catalog fetch: {e}")))?;

        let raw = match rx.recv_timeout(self.config.timeout()) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::timeout("catalog fetch", self.config.config_timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Protocol("catalog fetch ended without a response".into()));
            }
        };
        backend::unescape(&raw)
    }

    /// Whether the cached catalog can be used instead of recompiling.
    ///
    /// False when the cache is ignored, nothing was ever compiled, or the
    /// non-dynamic facts changed. Otherwise fresh when the compiler's last
    /// change is less than `freshness_tolerance` seconds newer than the
    /// local compile time.
    pub fn is_fresh(&self, facts: &Facts) -> bool {
        if self.config.ignore_cache {
            return false;
        }
        let Some(compile_time) = self.storage.state().compile_time else {
            return false;
        };
        if self.facts_changed(facts) {
            log::info!("Facts have changed; recompiling");
            return false;
        }
        match self.backend.freshness(&self.config.node_name) {
            Ok(remote) => remote - compile_time < self.config.freshness_tolerance,
            Err(err) => {
                log::warn!("Could not check catalog freshness: {err}");
                false
            }
        }
    }

    /// Compare against the last snapshot, ignoring dynamic facts.
    pub fn facts_changed(&self, facts: &Facts) -> bool {
        let Some(old) = self.storage.state().facts.as_ref() else {
            return true;
        };
        let dynamic = self.config.dynamic_fact_names();
        facts::strip_dynamic(old, &dynamic) != facts::strip_dynamic(facts, &dynamic)
    }

    /// Load the cached catalog unless one is already in memory.
    ///
    /// With `failure` set (a fetch just failed) the cache is only consulted
    /// when `use_cache_on_failure` is on.
    pub fn use_cached_config(&mut self, failure: bool) -> bool {
        if self.catalog.is_some() {
            return true;
        }
        if failure && !self.config.use_cache_on_failure {
            self.catalog = None;
            log::warn!("Not using cache on failed catalog");
            return false;
        }

        let text = match self.cache.read() {
            Ok(Some(text)) => text,
            Ok(None) => return false,
            Err(err) => {
                log::warn!("Could not read cached catalog: {err}");
                return false;
            }
        };

        let loaded = serde_json::from_str::<CatalogDocument>(&text)
            .map_err(Error::from)
            .and_then(|document| {
                Catalog::from_document(document, &self.registry).map_err(Error::from)
            });
        match loaded {
            Ok(mut catalog) => {
                catalog.from_cache = true;
                catalog.host_config = true;
                log::info!("Using cached catalog from {}", self.cache.path().display());
                self.catalog = Some(catalog);
                true
            }
            Err(err) => {
                log::warn!("Could not load cached catalog: {err}");
                self.clear();
                false
            }
        }
    }

    /// Record the applied classes. Failures are logged.
    pub fn set_classes(&self, classes: &[String]) {
        if classes.is_empty() {
            return;
        }
        if let Err(err) = write_lines(&self.config.classfile, classes) {
            log::error!("Could not create class file: {err}");
        }
    }

    /// Allow runs again after [`disable`](Self::disable).
    pub fn enable(&self) -> Result<bool> {
        let released = self.lock.unlock_anonymous()?;
        if released {
            log::info!("Runs enabled");
        }
        Ok(released)
    }

    /// Prevent runs until [`enable`](Self::enable) is called.
    pub fn disable(&self) -> Result<bool> {
        let taken = self.lock.lock_anonymous()?;
        if taken {
            log::info!("Runs disabled");
        } else {
            log::warn!("Could not disable runs: lock {} is held", self.lock.path().display());
        }
        Ok(taken)
    }

    /// Whether any run holds the lock, or runs are disabled.
    pub fn running(&self) -> bool {
        self.lock.is_locked()
    }

    /// Drop the in-memory catalog.
    pub fn clear(&mut self) {
        if let Some(mut catalog) = self.catalog.take() {
            catalog.clear();
        }
    }

    fn sync_facts(&mut self) {
        let Some(source) = self.config.fact_source.clone() else {
            log::warn!("Fact sync is enabled but no fact source is configured");
            return;
        };
        let dest = self.config.fact_dest.clone();
        match self.directory_sync("fact", source, dest).and_then(|sync| sync.run()) {
            Ok(report) if !report.is_empty() => {
                log::info!(
                    "Synced facts: {} copied, {} removed",
                    report.copied.len(),
                    report.removed.len()
                );
                self.facts.reload();
            }
            Ok(_) => {}
            Err(err) => log::error!("Could not retrieve facts: {err}"),
        }
    }

    fn sync_plugins(&mut self) {
        let Some(source) = self.config.plugin_source.clone() else {
            log::warn!("Plugin sync is enabled but no plugin source is configured");
            return;
        };
        let dest = self.config.plugin_dest.clone();
        match self.directory_sync("plugin", source, dest).and_then(|sync| sync.run()) {
            Ok(report) => log::debug!(
                "Synced plugins: {} copied, {} removed",
                report.copied.len(),
                report.removed.len()
            ),
            Err(err) => log::error!("Could not retrieve plugins: {err}"),
        }
    }

    fn directory_sync(&self, name: &str, source: PathBuf, dest: PathBuf) -> Result<DirectorySync> {
        DirectorySync::new(
            name,
            source,
            dest,
            &self.config.plugin_ignore,
            self.config.timeout(),
        )
    }
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content).map_err(|e| Error::io(path, e))
}
