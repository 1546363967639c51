/*!
 * Hot-reload file watching
 *
 * Raw notify events are filtered down to command files, debounced per path
 * and handed to a `ReloadHandler` one settled change at a time.
 */

pub mod events;
pub mod filter;
pub mod scheduler;
pub mod watcher;

pub use events::{now_timestamp_ms, FsEventType};
pub use filter::CommandFileFilter;
pub use scheduler::{
    EventAction, PathState, PathStateMachine, ReloadHandler, ReloadScheduler, SchedulerOptions,
};
pub use watcher::{CommandWatcher, WatcherStatus};
