/*!
 * Per-path reload scheduling
 *
 * `PathStateMachine` holds the debounce/lock bookkeeping as plain data with
 * the clock passed in:
 *
 * ```text
 *   Idle ──event──▶ Pending{generation} ──timer(generation)──▶ Running{started_at, rerun}
 *                     ▲    │ event: new generation, timer restarts       │
 *                     │    └─────────────────────────────────────────────┤
 *                     └──────────── complete, rerun requested ◀──────────┤
 *   Idle ◀──────────────────────────── complete ◀────────────────────────┘
 * ```
 *
 * While a reload runs, events inside the cooldown window are dropped and
 * later ones request a single rerun once the current reload finishes.
 *
 * `ReloadScheduler` drives the machine with tokio timers and hands each
 * settled path to a `ReloadHandler`. Before a run it skips files whose mtime
 * is not newer than the last one it processed successfully, unless that
 * mtime was recorded within `MTIME_SETTLE` of the write, where a second
 * write could share the same timestamp. After a run the mtime is compared
 * again to notice a write that landed while the reload was running.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SyncResult;

/// Coarsest mtime granularity we expect (FAT stores two-second timestamps)
const MTIME_SETTLE: Duration = Duration::from_secs(2);

/// Receiver of settled, deduplicated file changes
#[async_trait]
pub trait ReloadHandler: Send + Sync + 'static {
    /// The file at `path` exists and may have changed
    async fn reload(&self, path: &Path) -> SyncResult<()>;

    /// The file at `path` is gone
    async fn retire(&self, path: &Path) -> SyncResult<()>;

    /// Files currently backing live commands, used to resolve directory removals
    fn tracked_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Pending { generation: u64 },
    Running { started_at: Instant, rerun: bool },
}

/// What the caller must do after feeding an event to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Start a debounce timer for this generation
    Schedule(u64),
    /// Cancel the pending timer and start one for this generation
    Reschedule(u64),
    /// A reload is running; one more will follow it
    Deferred,
    /// Dropped inside the cooldown window
    Rejected,
}

#[derive(Debug)]
pub struct PathStateMachine {
    states: HashMap<PathBuf, PathState>,
    next_generation: u64,
    cooldown: Duration,
}

impl PathStateMachine {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            states: HashMap::new(),
            next_generation: 0,
            cooldown,
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub fn state(&self, path: &Path) -> Option<PathState> {
        self.states.get(path).copied()
    }

    /// Raw change notification for `path`
    pub fn on_event(&mut self, path: &Path, now: Instant) -> EventAction {
        match self.states.get(path).copied() {
            None => {
                let generation = self.bump();
                self.states
                    .insert(path.to_path_buf(), PathState::Pending { generation });
                EventAction::Schedule(generation)
            }
            Some(PathState::Pending { .. }) => {
                let generation = self.bump();
                self.states
                    .insert(path.to_path_buf(), PathState::Pending { generation });
                EventAction::Reschedule(generation)
            }
            Some(PathState::Running { started_at, .. }) => {
                if now.saturating_duration_since(started_at) < self.cooldown {
                    EventAction::Rejected
                } else {
                    self.states.insert(
                        path.to_path_buf(),
                        PathState::Running {
                            started_at,
                            rerun: true,
                        },
                    );
                    EventAction::Deferred
                }
            }
        }
    }

    /// Debounce timer fired; returns whether the reload may start now
    pub fn on_timer(&mut self, path: &Path, generation: u64, now: Instant) -> bool {
        match self.states.get(path) {
            Some(PathState::Pending { generation: current }) if *current == generation => {
                self.states.insert(
                    path.to_path_buf(),
                    PathState::Running {
                        started_at: now,
                        rerun: false,
                    },
                );
                true
            }
            _ => false,
        }
    }

    /// Reload finished; `changed_meanwhile` forces a rerun. Returns the
    /// generation to schedule when another pass is needed.
    pub fn on_complete(&mut self, path: &Path, changed_meanwhile: bool) -> Option<u64> {
        match self.states.remove(path) {
            Some(PathState::Running { rerun, .. }) if rerun || changed_meanwhile => {
                let generation = self.bump();
                self.states
                    .insert(path.to_path_buf(), PathState::Pending { generation });
                Some(generation)
            }
            Some(other @ PathState::Pending { .. }) => {
                // not running; leave the pending timer alone
                self.states.insert(path.to_path_buf(), other);
                None
            }
            _ => None,
        }
    }

    /// Paths waiting on a debounce timer
    pub fn pending_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, PathState::Pending { .. }))
            .count()
    }

    /// Paths with a reload in flight
    pub fn locked_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, PathState::Running { .. }))
            .count()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub debounce: Duration,
    pub cooldown: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            cooldown: Duration::from_millis(100),
        }
    }
}

/// Last successfully processed mtime of a path
#[derive(Debug, Clone, Copy)]
struct Processed {
    mtime: SystemTime,
    recorded_at: SystemTime,
}

impl Processed {
    /// Whether a file now reporting `mtime` holds nothing newer
    fn covers(&self, mtime: SystemTime) -> bool {
        if mtime < self.mtime {
            return true;
        }
        mtime == self.mtime
            && self
                .recorded_at
                .duration_since(self.mtime)
                .map(|age| age >= MTIME_SETTLE)
                .unwrap_or(false)
    }
}

struct SchedulerInner {
    machine: Mutex<PathStateMachine>,
    timers: Mutex<HashMap<PathBuf, AbortHandle>>,
    processed: Mutex<HashMap<PathBuf, Processed>>,
    handler: Arc<dyn ReloadHandler>,
    debounce: Duration,
}

/// Debounces change notifications and runs at most one reload per path
#[derive(Clone)]
pub struct ReloadScheduler {
    inner: Arc<SchedulerInner>,
}

impl ReloadScheduler {
    pub fn new(handler: Arc<dyn ReloadHandler>, options: SchedulerOptions) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                machine: Mutex::new(PathStateMachine::new(options.cooldown)),
                timers: Mutex::new(HashMap::new()),
                processed: Mutex::new(HashMap::new()),
                handler,
                debounce: options.debounce,
            }),
        }
    }

    pub fn handler(&self) -> &Arc<dyn ReloadHandler> {
        &self.inner.handler
    }

    /// Feed one raw change notification. Must be called inside a tokio runtime.
    pub fn notify(&self, path: &Path) {
        let action = self.inner.machine.lock().on_event(path, Instant::now());
        match action {
            EventAction::Schedule(generation) | EventAction::Reschedule(generation) => {
                self.start_timer(path.to_path_buf(), generation);
            }
            EventAction::Deferred => debug!("Reload of {} queued behind running one", path.display()),
            EventAction::Rejected => debug!("Change to {} dropped during cooldown", path.display()),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.machine.lock().pending_count()
    }

    /// Record `path` as already processed at its current mtime, e.g. after a full scan
    pub fn mark_processed(&self, path: &Path) {
        if let Some(mtime) = std::fs::metadata(path).ok().and_then(|m| m.modified().ok()) {
            self.record(path, mtime);
        }
    }

    fn record(&self, path: &Path, mtime: SystemTime) {
        self.inner.processed.lock().insert(
            path.to_path_buf(),
            Processed {
                mtime,
                recorded_at: SystemTime::now(),
            },
        );
    }

    fn is_stale(&self, path: &Path, mtime: SystemTime) -> bool {
        self.inner
            .processed
            .lock()
            .get(path)
            .map(|last| last.covers(mtime))
            .unwrap_or(false)
    }

    pub fn locked_count(&self) -> usize {
        self.inner.machine.lock().locked_count()
    }

    /// Cancel every pending timer; running reloads finish on their own
    pub fn shutdown(&self) {
        for (_, timer) in self.inner.timers.lock().drain() {
            timer.abort();
        }
        self.inner.machine.lock().clear();
    }

    fn start_timer(&self, path: PathBuf, generation: u64) {
        let scheduler = self.clone();
        let timer_path = path.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(scheduler.inner.debounce).await;
            // no await past this point, so an abort can only land during the sleep
            let start = scheduler
                .inner
                .machine
                .lock()
                .on_timer(&timer_path, generation, Instant::now());
            if start {
                scheduler.inner.timers.lock().remove(&timer_path);
                tokio::spawn(async move { scheduler.run(timer_path).await });
            }
        });

        if let Some(previous) = self.inner.timers.lock().insert(path, task.abort_handle()) {
            previous.abort();
        }
    }

    async fn run(&self, path: PathBuf) {
        let started_mtime = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.modified().ok(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.inner.processed.lock().remove(&path);
                if let Err(e) = self.inner.handler.retire(&path).await {
                    warn!("Failed to retire {}: {}", path.display(), e);
                }
                self.finish(&path, false);
                return;
            }
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                self.finish(&path, false);
                return;
            }
        };

        if let Some(mtime) = started_mtime {
            if self.is_stale(&path, mtime) {
                debug!("Skipping {}: not modified since last reload", path.display());
                self.finish(&path, false);
                return;
            }
        }

        match self.inner.handler.reload(&path).await {
            Ok(()) => {
                if let Some(mtime) = started_mtime {
                    self.record(&path, mtime);
                }
            }
            // same bytes would fail the same way; wait for the next edit
            Err(e) if !e.is_retryable() => debug!("Reload of {} rejected: {}", path.display(), e),
            Err(e) => warn!("Reload of {} failed, next change retries: {}", path.display(), e),
        }

        let current_mtime = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        let changed_meanwhile = current_mtime != started_mtime;
        self.finish(&path, changed_meanwhile);
    }

    fn finish(&self, path: &Path, changed_meanwhile: bool) {
        let next = self.inner.machine.lock().on_complete(path, changed_meanwhile);
        if let Some(generation) = next {
            debug!("Rescheduling reload of {}", path.display());
            self.start_timer(path.to_path_buf(), generation);
        }
    }
}
