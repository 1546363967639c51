/*!
 * In-memory command catalog
 *
 * Keeps one command list per partition, records every call and can be told
 * to fail a partition.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use command_sync::remote::{CommandCatalog, Partition, RemoteCommand, RemoteError, RemoteResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    List(Partition),
    Replace(Partition, Vec<String>),
    Delete(Partition, String),
}

#[derive(Default)]
pub struct RecordingCatalog {
    remote: Mutex<HashMap<Partition, Vec<RemoteCommand>>>,
    failing: Mutex<HashSet<Partition>>,
    calls: Mutex<Vec<CatalogCall>>,
    next_id: AtomicU64,
}

impl RecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::SeqCst) + 1000).to_string()
    }

    /// Pretend `names` were registered out of band
    pub fn seed(&self, partition: Partition, names: &[&str]) {
        let commands: Vec<RemoteCommand> = names
            .iter()
            .map(|name| RemoteCommand {
                id: Some(self.assign_id()),
                name: name.to_string(),
                schema: json!({ "name": name }),
            })
            .collect();
        self.remote.lock().insert(partition, commands);
    }

    pub fn fail_partition(&self, partition: Partition) {
        self.failing.lock().insert(partition);
    }

    pub fn heal_partition(&self, partition: Partition) {
        self.failing.lock().remove(&partition);
    }

    /// Sorted names currently registered in `partition`
    pub fn names(&self, partition: Partition) -> Vec<String> {
        let mut names: Vec<String> = self
            .remote
            .lock()
            .get(&partition)
            .map(|commands| commands.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn schema(&self, partition: Partition, name: &str) -> Option<serde_json::Value> {
        self.remote
            .lock()
            .get(&partition)
            .and_then(|commands| commands.iter().find(|c| c.name == name))
            .map(|c| c.schema.clone())
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn replace_count(&self, partition: Partition) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, CatalogCall::Replace(p, _) if *p == partition))
            .count()
    }

    fn check(&self, partition: Partition) -> RemoteResult<()> {
        if self.failing.lock().contains(&partition) {
            return Err(RemoteError::Unauthorized(format!(
                "simulated outage of {}",
                partition
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandCatalog for RecordingCatalog {
    async fn list_commands(&self, partition: Partition) -> RemoteResult<Vec<RemoteCommand>> {
        self.calls.lock().push(CatalogCall::List(partition));
        self.check(partition)?;
        Ok(self
            .remote
            .lock()
            .get(&partition)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_commands(
        &self,
        partition: Partition,
        commands: &[RemoteCommand],
    ) -> RemoteResult<()> {
        let mut names: Vec<String> = commands.iter().map(|c| c.name.clone()).collect();
        names.sort();
        self.calls.lock().push(CatalogCall::Replace(partition, names));
        self.check(partition)?;

        let registered = commands
            .iter()
            .map(|c| RemoteCommand {
                id: Some(self.assign_id()),
                name: c.name.clone(),
                schema: c.schema.clone(),
            })
            .collect();
        self.remote.lock().insert(partition, registered);
        Ok(())
    }

    async fn delete_command(
        &self,
        partition: Partition,
        command: &RemoteCommand,
    ) -> RemoteResult<()> {
        self.calls
            .lock()
            .push(CatalogCall::Delete(partition, command.name.clone()));
        self.check(partition)?;

        let id = command.id.clone();
        if let Some(commands) = self.remote.lock().get_mut(&partition) {
            commands.retain(|c| c.id != id);
        }
        Ok(())
    }
}
