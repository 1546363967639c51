/*!
 * Synchronization driver
 *
 * Owns the registry, store, loader and reconciler and runs the two modes:
 *
 * - full scan: discover every command file, load changed ones, retire what
 *   disappeared, prune stale alias records, reconcile
 * - incremental: the watcher hands over one settled path at a time; each
 *   successful change asks the coalescer for a reconciliation
 *
 * When the store cannot be reached the scan still parses every file but
 * commits nothing ("scan but do not commit") and reports itself degraded.
 */

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::coalescer::ReconcileCoalescer;
use super::events::SyncEvent;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::file_watcher::{CommandFileFilter, CommandWatcher, ReloadHandler};
use crate::hashing::ContentHash;
use crate::registry::{CommandDescriptor, CommandRegistry, LoadOutcome, ModuleLoader};
use crate::remote::{
    CommandCatalog, HttpCommandCatalog, NoopCatalog, Partition, PartitionOutcome,
    ReconcileReport, Reconciler,
};
use crate::storage::{open_sqlite_store, DatabaseOptions, StorageError, SyncStore};
use crate::utils::error::AppResult;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Summary of one full scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub loaded: usize,
    pub unchanged: usize,
    /// Files that could not be loaded, with the reason
    pub failed: Vec<(PathBuf, String)>,
    pub retired: usize,
    pub pruned_aliases: usize,
    /// Store unreachable: files were validated but nothing was committed
    pub degraded: bool,
    /// Absent when the scan was degraded
    pub reconcile: Option<ReconcileReport>,
}

pub struct SyncEngine {
    config: SyncConfig,
    roots: Vec<PathBuf>,
    filter: CommandFileFilter,
    registry: Arc<CommandRegistry>,
    store: Arc<dyn SyncStore>,
    loader: ModuleLoader,
    reconciler: Reconciler,
    events: broadcast::Sender<SyncEvent>,
    coalescer: ReconcileCoalescer,
    degraded: AtomicBool,
    scan_lock: Mutex<()>,
    reconcile_lock: Mutex<()>,
}

impl SyncEngine {
    /// Wire an engine from explicit collaborators. Must be called inside a tokio runtime.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn SyncStore>,
        catalog: Arc<dyn CommandCatalog>,
    ) -> Arc<Self> {
        let roots: Vec<PathBuf> = config
            .command_roots
            .iter()
            .map(|root| std::fs::canonicalize(root).unwrap_or_else(|_| root.clone()))
            .collect();
        let filter = CommandFileFilter::new(&config.file_extension, &config.ignore_patterns);
        let registry = Arc::new(CommandRegistry::new());
        let loader = ModuleLoader::new(Arc::clone(&registry), Arc::clone(&store));
        // list, deletes and replace run back to back inside one partition
        let reconciler = Reconciler::new(catalog, config.remote.request_timeout() * 3);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let window = config.hot_reload.reconcile_window();

        Arc::new_cyclic(|weak: &Weak<SyncEngine>| {
            let weak = weak.clone();
            let coalescer = ReconcileCoalescer::spawn(window, move || {
                let weak = weak.clone();
                async move {
                    if let Some(engine) = weak.upgrade() {
                        engine.reconcile().await;
                    }
                }
            });

            Self {
                config,
                roots,
                filter,
                registry,
                store,
                loader,
                reconciler,
                events,
                coalescer,
                degraded: AtomicBool::new(false),
                scan_lock: Mutex::new(()),
                reconcile_lock: Mutex::new(()),
            }
        })
    }

    /// Open the SQLite store and the remote catalog described by `config`
    pub async fn open(config: SyncConfig) -> AppResult<Arc<Self>> {
        let store = open_sqlite_store(&config.database_path, DatabaseOptions::default()).await?;
        let catalog: Arc<dyn CommandCatalog> = if config.remote.enabled {
            Arc::new(HttpCommandCatalog::new(&config.remote)?)
        } else {
            info!("Remote sync disabled, using offline catalog");
            Arc::new(NoopCatalog)
        };
        Ok(Self::new(config, Arc::new(store), catalog))
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Every command file under the configured roots, sorted
    pub fn discover_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in &self.roots {
            if !root.is_dir() {
                warn!("Command root {} does not exist", root.display());
                continue;
            }
            let walker = WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|entry| {
                    entry.depth() == 0
                        || !entry.file_type().is_dir()
                        || !self.filter.skips_directory(entry.path())
                });
            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() && self.filter.matches(entry.path()) => {
                        files.push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to walk {}: {}", root.display(), e),
                }
            }
        }
        files.sort();
        files.dedup();
        files
    }

    /// Full resynchronization: load, retire, prune, reconcile
    pub async fn full_scan(&self) -> ScanReport {
        let _guard = self.scan_lock.lock().await;
        let files = self.discover_files();
        info!("Full scan started: {} command files", files.len());

        let stored_hashes = match self.store_snapshot().await {
            Ok(hashes) => hashes,
            Err(e) => return self.degraded_scan(&files, e).await,
        };

        let mut report = ScanReport::default();
        for path in &files {
            let contents = match tokio::fs::read(path).await {
                Ok(contents) => contents,
                Err(e) => {
                    self.record_failure(&mut report, path, &SyncError::io(path, e));
                    continue;
                }
            };
            let stored = stored_hashes.get(path).copied();
            match self.loader.load_contents(path, &contents, stored).await {
                Ok(outcome) => {
                    self.emit_outcome(path, &outcome);
                    if outcome.is_unchanged() {
                        report.unchanged += 1;
                    } else {
                        report.loaded += 1;
                    }
                }
                Err(e) => self.record_failure(&mut report, path, &e),
            }
        }

        // tracked by the registry or remembered by the store, but gone from disk
        let present: HashSet<&PathBuf> = files.iter().collect();
        let mut vanished: Vec<PathBuf> = self
            .registry
            .tracked_paths()
            .into_iter()
            .chain(stored_hashes.into_keys())
            .filter(|path| !present.contains(path))
            .collect();
        vanished.sort();
        vanished.dedup();
        for path in vanished {
            match self.loader.retire(&path).await {
                Ok(name) => {
                    self.emit(SyncEvent::file_retired(&path, name));
                    report.retired += 1;
                }
                Err(e) => {
                    if let SyncError::Store(cause) = &e {
                        self.mark_degraded(cause);
                    }
                    warn!("Failed to retire {}: {}", path.display(), e);
                }
            }
        }
        report.loaded += self.settle_unblocked().await;

        match self.prune_alias_records().await {
            Ok(pruned) => report.pruned_aliases = pruned,
            Err(e) => warn!("Failed to prune alias records: {}", e),
        }

        info!(
            "Full scan finished: {} loaded, {} unchanged, {} failed, {} retired",
            report.loaded,
            report.unchanged,
            report.failed.len(),
            report.retired
        );

        report.reconcile = Some(self.reconcile().await);
        report
    }

    async fn store_snapshot(&self) -> Result<HashMap<PathBuf, ContentHash>, StorageError> {
        self.store.health_check().await?;
        let hashes = self.store.list_all_hashes().await?;
        if self.degraded.swap(false, Ordering::SeqCst) {
            info!("Persistent store reachable again");
        }
        Ok(hashes)
    }

    /// Validate every file without committing anything
    async fn degraded_scan(&self, files: &[PathBuf], cause: StorageError) -> ScanReport {
        self.mark_degraded(&cause);

        let mut report = ScanReport {
            degraded: true,
            ..Default::default()
        };
        for path in files {
            let result = match tokio::fs::read(path).await {
                Ok(contents) => std::str::from_utf8(&contents)
                    .map_err(|_| SyncError::validation(path, "file is not valid UTF-8"))
                    .and_then(|source| CommandDescriptor::parse(source, path))
                    .map(|_| ()),
                Err(e) => Err(SyncError::io(path, e)),
            };
            if let Err(e) = result {
                self.record_failure(&mut report, path, &e);
            }
        }
        warn!(
            "Degraded scan validated {} files ({} invalid); nothing committed",
            files.len(),
            report.failed.len()
        );
        report
    }

    fn mark_degraded(&self, cause: &StorageError) {
        self.degraded.store(true, Ordering::SeqCst);
        error!(
            "Persistent store unavailable, scanning without committing changes: {}",
            cause
        );
        self.emit(SyncEvent::store_degraded(cause.to_string()));
    }

    fn record_failure(&self, report: &mut ScanReport, path: &Path, error: &SyncError) {
        warn!("Failed to load {}: {}", path.display(), error);
        self.emit(SyncEvent::file_rejected(path, error.kind(), error.to_string()));
        report.failed.push((path.to_path_buf(), error.to_string()));
    }

    fn emit_outcome(&self, path: &Path, outcome: &LoadOutcome) {
        let event = match outcome {
            LoadOutcome::Loaded(loaded) => SyncEvent::file_loaded(path, &loaded.descriptor.name),
            LoadOutcome::Unchanged { name } => SyncEvent::file_unchanged(path, name),
        };
        self.emit(event);
    }

    /// Delete alias records whose command or alias is no longer live
    async fn prune_alias_records(&self) -> SyncResult<usize> {
        let mut pruned = 0;
        for (command, aliases) in self.store.list_all_aliases().await? {
            let live_primary = self
                .registry
                .get(&command)
                .map(|entry| !entry.is_alias())
                .unwrap_or(false);
            if !live_primary {
                debug!("Pruning alias records of retired command {}", command);
                self.store.delete_all_aliases(&command).await?;
                pruned += aliases.len();
                continue;
            }
            for alias in aliases {
                if self.registry.owner_of(&alias).as_deref() != Some(command.as_str()) {
                    self.store.delete_alias(&command, &alias).await?;
                    pruned += 1;
                }
            }
        }
        if pruned > 0 {
            info!("Pruned {} stale alias records", pruned);
        }
        Ok(pruned)
    }

    /// Load one file and emit the outcome
    pub async fn load_path(&self, path: &Path) -> SyncResult<LoadOutcome> {
        if self.is_degraded() {
            if let Err(e) = self.store.health_check().await {
                let error = SyncError::Store(e);
                self.emit(SyncEvent::file_rejected(path, error.kind(), error.to_string()));
                return Err(error);
            }
            // the registry missed everything while degraded
            info!("Persistent store reachable again, resynchronizing");
            self.full_scan().await;
        }

        match self.loader.load(path).await {
            Ok(outcome) => {
                self.emit_outcome(path, &outcome);
                self.settle_unblocked().await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Failed to load {}: {}", path.display(), e);
                if let SyncError::Store(cause) = &e {
                    self.mark_degraded(cause);
                }
                self.emit(SyncEvent::file_rejected(path, e.kind(), e.to_string()));
                Err(e)
            }
        }
    }

    /// Reload files that lost a collision for a name that has since been
    /// freed; returns how many of them loaded
    async fn settle_unblocked(&self) -> usize {
        let mut loaded = 0;
        loop {
            let pending = self.loader.take_unblocked();
            if pending.is_empty() {
                return loaded;
            }
            for path in pending {
                match self.loader.load_forced(&path).await {
                    Ok(outcome) => {
                        info!("Reloaded {} after the name it wanted was freed", path.display());
                        self.emit_outcome(&path, &outcome);
                        loaded += 1;
                    }
                    Err(e) => {
                        warn!("Failed to reload {}: {}", path.display(), e);
                        if let SyncError::Store(cause) = &e {
                            self.mark_degraded(cause);
                        }
                        self.emit(SyncEvent::file_rejected(&path, e.kind(), e.to_string()));
                    }
                }
            }
        }
    }

    /// Retire whatever was loaded from `path`
    pub async fn retire_path(&self, path: &Path) -> SyncResult<Option<String>> {
        match self.loader.retire(path).await {
            Ok(name) => {
                self.emit(SyncEvent::file_retired(path, name.clone()));
                self.settle_unblocked().await;
                Ok(name)
            }
            Err(e) => {
                if let SyncError::Store(cause) = &e {
                    self.mark_degraded(cause);
                }
                Err(e)
            }
        }
    }

    /// Reconcile the remote catalog against the registry right now
    pub async fn reconcile(&self) -> ReconcileReport {
        let _guard = self.reconcile_lock.lock().await;
        if self.is_degraded() {
            // the registry may be missing commands the store never confirmed
            warn!("Reconciliation skipped while the persistent store is unavailable");
            return ReconcileReport {
                global: PartitionOutcome::Skipped,
                restricted: PartitionOutcome::Skipped,
            };
        }
        self.emit(SyncEvent::reconcile_started());

        let report = self.reconciler.reconcile(&self.registry).await;
        for partition in Partition::ALL {
            if let PartitionOutcome::Failed(reason) = report.outcome(partition) {
                self.emit(SyncEvent::partition_failed(partition, reason.clone()));
            }
        }

        self.emit(SyncEvent::reconcile_completed(report.clone()));
        report
    }

    /// Ask for a reconciliation once the current burst of changes settles
    pub fn request_reconcile(&self) {
        self.coalescer.request();
    }

    /// Start hot reload; `None` when it is disabled in the configuration
    pub fn start_watching(self: &Arc<Self>) -> AppResult<Option<CommandWatcher>> {
        if !self.config.hot_reload.enabled {
            warn!("Hot reload is disabled, command files will not be watched");
            return Ok(None);
        }

        let handler: Arc<dyn ReloadHandler> = Arc::clone(self) as Arc<dyn ReloadHandler>;
        let watcher = CommandWatcher::start(
            &self.roots,
            self.filter.clone(),
            handler,
            self.config.hot_reload.scheduler_options(),
        )?;
        // whatever the last scan loaded needs no reload until it is touched again
        for path in self.registry.tracked_paths() {
            watcher.scheduler().mark_processed(&path);
        }
        info!("Hot reload enabled for {} roots", watcher.status().watching);
        Ok(Some(watcher))
    }
}

#[async_trait]
impl ReloadHandler for SyncEngine {
    async fn reload(&self, path: &Path) -> SyncResult<()> {
        let outcome = self.load_path(path).await?;
        if !outcome.is_unchanged() {
            self.request_reconcile();
        }
        Ok(())
    }

    async fn retire(&self, path: &Path) -> SyncResult<()> {
        if self.retire_path(path).await?.is_some() {
            self.request_reconcile();
        }
        Ok(())
    }

    fn tracked_paths(&self) -> Vec<PathBuf> {
        self.registry.tracked_paths()
    }
}
