/*!
 * Synchronization driver: full scans, incremental reloads and coalesced
 * reconciliation
 */

pub mod coalescer;
pub mod engine;
pub mod events;

pub use coalescer::ReconcileCoalescer;
pub use engine::{ScanReport, SyncEngine};
pub use events::SyncEvent;
