use anyhow::Context;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::events::{classify, FsEventType};
use super::filter::CommandFileFilter;
use super::scheduler::{ReloadHandler, ReloadScheduler, SchedulerOptions};
use crate::utils::error::AppResult;

const CHANNEL_CAPACITY: usize = 1024;

/// Snapshot of the hot-reload machinery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatus {
    pub enabled: bool,
    /// Roots with an active recursive watch
    pub watching: usize,
    pub pending_reloads: usize,
    pub locked_paths: usize,
}

/// Recursive watch over the command roots feeding a `ReloadScheduler`
pub struct CommandWatcher {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    watched: Arc<Mutex<Vec<PathBuf>>>,
    scheduler: ReloadScheduler,
    task: JoinHandle<()>,
}

impl CommandWatcher {
    /// Watch every root that can be watched; a root that fails is logged and skipped
    pub fn start(
        roots: &[PathBuf],
        filter: CommandFileFilter,
        handler: Arc<dyn ReloadHandler>,
        options: SchedulerOptions,
    ) -> AppResult<Self> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>(CHANNEL_CAPACITY);

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.blocking_send(res) {
                    debug!("Watcher channel closed: {}", e);
                }
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;
        let watcher = Arc::new(Mutex::new(watcher));

        let mut watched = Vec::new();
        for root in roots {
            if !root.is_dir() {
                warn!("Command root {} is not a directory, not watching", root.display());
                continue;
            }
            match watcher.lock().watch(root, RecursiveMode::Recursive) {
                Ok(()) => {
                    info!("Watching {}", root.display());
                    watched.push(root.clone());
                }
                Err(e) => warn!("Failed to watch {}: {}", root.display(), e),
            }
        }
        let watched = Arc::new(Mutex::new(watched));

        let scheduler = ReloadScheduler::new(handler, options);
        let processor = EventProcessor {
            watcher: Arc::clone(&watcher),
            watched: Arc::clone(&watched),
            scheduler: scheduler.clone(),
            filter,
        };
        let task = tokio::spawn(processor.run(rx));

        Ok(Self {
            watcher,
            watched,
            scheduler,
            task,
        })
    }

    pub fn scheduler(&self) -> &ReloadScheduler {
        &self.scheduler
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.watched.lock().clone()
    }

    pub fn status(&self) -> WatcherStatus {
        WatcherStatus {
            enabled: true,
            watching: self.watched.lock().len(),
            pending_reloads: self.scheduler.pending_count(),
            locked_paths: self.scheduler.locked_count(),
        }
    }

    /// Stop watching and cancel pending reloads
    pub fn stop(&self) {
        let mut watcher = self.watcher.lock();
        let mut watched = self.watched.lock();
        for root in watched.drain(..) {
            if let Err(e) = watcher.unwatch(&root) {
                debug!("Unwatch {} failed: {}", root.display(), e);
            }
        }
        self.scheduler.shutdown();
        self.task.abort();
        info!("Command watcher stopped");
    }
}

impl Drop for CommandWatcher {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        self.task.abort();
    }
}

struct EventProcessor {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    watched: Arc<Mutex<Vec<PathBuf>>>,
    scheduler: ReloadScheduler,
    filter: CommandFileFilter,
}

impl EventProcessor {
    async fn run(self, mut rx: mpsc::Receiver<notify::Result<Event>>) {
        while let Some(result) = rx.recv().await {
            match result {
                Ok(event) => self.handle_event(event),
                Err(error) => self.handle_error(error),
            }
        }
        debug!("Watcher event channel closed");
    }

    fn handle_event(&self, event: Event) {
        let Some(kind) = classify(&event.kind) else {
            return;
        };

        for path in &event.paths {
            if path.is_dir() {
                if kind.may_add_directory() {
                    self.schedule_directory(path);
                }
                continue;
            }

            if self.filter.matches(path) {
                self.scheduler.notify(path);
            } else if kind.may_remove_directory() && !path.exists() {
                self.schedule_removed_directory(path, kind);
            }
        }
    }

    /// Files that arrive with a new directory produce no events of their own
    fn schedule_directory(&self, dir: &Path) {
        let mut found = 0usize;
        let entries = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.filter.skips_directory(entry.path())
            });
        for entry in entries {
            match entry {
                Ok(entry) if entry.file_type().is_file() && self.filter.matches(entry.path()) => {
                    self.scheduler.notify(entry.path());
                    found += 1;
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to walk {}: {}", dir.display(), e),
            }
        }
        debug!("New directory {} holds {} command files", dir.display(), found);
    }

    fn schedule_removed_directory(&self, dir: &Path, kind: FsEventType) {
        let tracked: Vec<PathBuf> = self
            .scheduler
            .handler()
            .tracked_paths()
            .into_iter()
            .filter(|path| path.starts_with(dir))
            .collect();
        if !tracked.is_empty() {
            debug!(
                "{:?} of {} affects {} command files",
                kind,
                dir.display(),
                tracked.len()
            );
        }
        for path in tracked {
            self.scheduler.notify(&path);
        }
    }

    /// Drop the failing subtree; other roots keep their watches
    fn handle_error(&self, error: notify::Error) {
        if error.paths.is_empty() {
            error!("File watcher error: {}", error);
            return;
        }

        let mut watcher = self.watcher.lock();
        let mut watched = self.watched.lock();
        for path in &error.paths {
            warn!("Watch error on {}: {}; unwatching it", path.display(), error);
            if let Err(e) = watcher.unwatch(path) {
                debug!("Unwatch {} failed: {}", path.display(), e);
            }
            watched.retain(|root| root != path);
        }
    }
}
