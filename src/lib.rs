//! Command registry synchronization and hot-reload engine
//!
//! Keeps an in-memory command registry in step with command definition files
//! on disk and reconciles it against a remote, partitioned command catalog.
//! Main pieces:
//! - content hashing and a SQLite hash/alias store for change detection
//! - a debounced recursive file watcher with per-path mutual exclusion
//! - a loader that validates, diffs aliases and swaps descriptors atomically
//! - a reconciler that converges the global and restricted partitions

pub mod config;
pub mod error;
pub mod file_watcher;
pub mod hashing;
pub mod registry;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod utils;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use registry::{CommandDescriptor, CommandRegistry, RegistryEntry, Scope};
pub use sync::{ScanReport, SyncEngine, SyncEvent};
