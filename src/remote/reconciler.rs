/*!
 * Remote reconciler
 *
 * Converges each remote partition to the desired state computed from the
 * registry. The remote catalog is treated as fully owned: anything listed
 * remotely that is not desired gets deleted, and the desired set is pushed
 * with one bulk replace. Partitions are independent failure domains.
 */

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::catalog::CommandCatalog;
use super::error::{RemoteError, RemoteResult};
use super::types::{Partition, RemoteCommand};
use crate::registry::CommandRegistry;

/// Name → payload map for each partition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    pub global: BTreeMap<String, Value>,
    pub restricted: BTreeMap<String, Value>,
}

impl DesiredState {
    /// Snapshot the registry, routing primaries and aliases by their owner's scope
    pub fn from_registry(registry: &CommandRegistry) -> Self {
        let mut state = Self::default();
        for entry in registry.values() {
            let payload = entry.descriptor.remote_payload(&entry.name);
            state
                .partition_mut(Partition::from(entry.scope()))
                .insert(entry.name, payload);
        }
        state
    }

    pub fn partition(&self, partition: Partition) -> &BTreeMap<String, Value> {
        match partition {
            Partition::Global => &self.global,
            Partition::Restricted => &self.restricted,
        }
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut BTreeMap<String, Value> {
        match partition {
            Partition::Global => &mut self.global,
            Partition::Restricted => &mut self.restricted,
        }
    }
}

/// How one partition's pass ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PartitionOutcome {
    Synced {
        deleted: usize,
        delete_failures: usize,
        replaced: usize,
    },
    /// Partition not configured remotely and nothing was desired there
    Skipped,
    Failed(String),
}

impl PartitionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PartitionOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub global: PartitionOutcome,
    pub restricted: PartitionOutcome,
}

impl ReconcileReport {
    pub fn outcome(&self, partition: Partition) -> &PartitionOutcome {
        match partition {
            Partition::Global => &self.global,
            Partition::Restricted => &self.restricted,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.global.is_failed() && !self.restricted.is_failed()
    }
}

pub struct Reconciler {
    catalog: Arc<dyn CommandCatalog>,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn CommandCatalog>, timeout: Duration) -> Self {
        Self { catalog, timeout }
    }

    pub fn desired_state(registry: &CommandRegistry) -> DesiredState {
        DesiredState::from_registry(registry)
    }

    /// Reconcile both partitions against the registry as it is right now
    pub async fn reconcile(&self, registry: &CommandRegistry) -> ReconcileReport {
        let desired = Self::desired_state(registry);
        self.reconcile_desired(&desired).await
    }

    pub async fn reconcile_desired(&self, desired: &DesiredState) -> ReconcileReport {
        info!(
            "Reconciling remote catalog: {} global, {} restricted",
            desired.global.len(),
            desired.restricted.len()
        );

        let (global, restricted) = futures::join!(
            self.reconcile_partition(Partition::Global, desired.partition(Partition::Global)),
            self.reconcile_partition(
                Partition::Restricted,
                desired.partition(Partition::Restricted)
            ),
        );

        ReconcileReport { global, restricted }
    }

    async fn reconcile_partition(
        &self,
        partition: Partition,
        desired: &BTreeMap<String, Value>,
    ) -> PartitionOutcome {
        let result = tokio::time::timeout(self.timeout, self.sync_partition(partition, desired))
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.timeout)));

        match result {
            Ok(outcome) => {
                info!("Partition {} reconciled: {:?}", partition, outcome);
                outcome
            }
            Err(RemoteError::PartitionUnavailable(_)) if desired.is_empty() => {
                debug!("Partition {} not configured, nothing to publish", partition);
                PartitionOutcome::Skipped
            }
            Err(e) => {
                error!("Partition {} reconciliation failed: {}", partition, e);
                PartitionOutcome::Failed(e.to_string())
            }
        }
    }

    async fn sync_partition(
        &self,
        partition: Partition,
        desired: &BTreeMap<String, Value>,
    ) -> RemoteResult<PartitionOutcome> {
        let registered = self.catalog.list_commands(partition).await?;

        let to_delete: Vec<&RemoteCommand> = registered
            .iter()
            .filter(|command| !desired.contains_key(&command.name))
            .collect();

        let results = join_all(
            to_delete
                .iter()
                .map(|command| self.catalog.delete_command(partition, command)),
        )
        .await;

        let mut deleted = 0;
        let mut delete_failures = 0;
        for (command, result) in to_delete.iter().zip(results) {
            match result {
                Ok(()) => {
                    deleted += 1;
                    info!("Deleted remote command {} from {}", command.name, partition);
                }
                Err(e) => {
                    delete_failures += 1;
                    warn!(
                        "Failed to delete remote command {} from {}: {}",
                        command.name, partition, e
                    );
                }
            }
        }

        let replaced = if desired.is_empty() {
            0
        } else {
            let commands: Vec<RemoteCommand> = desired
                .iter()
                .map(|(name, schema)| RemoteCommand::new(name.clone(), schema.clone()))
                .collect();
            self.catalog.replace_commands(partition, &commands).await?;
            commands.len()
        };

        Ok(PartitionOutcome::Synced {
            deleted,
            delete_failures,
            replaced,
        })
    }
}
