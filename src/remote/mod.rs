pub mod catalog;
pub mod error;
pub mod http;
pub mod reconciler;
pub mod types;

pub use catalog::{CommandCatalog, NoopCatalog};
pub use error::{RemoteError, RemoteResult};
pub use http::HttpCommandCatalog;
pub use reconciler::{DesiredState, PartitionOutcome, ReconcileReport, Reconciler};
pub use types::{Partition, RemoteCommand};
