use async_trait::async_trait;

use super::error::RemoteResult;
use super::types::{Partition, RemoteCommand};

/// Remote declarative command catalog, split into two partitions
#[async_trait]
pub trait CommandCatalog: Send + Sync {
    /// Commands currently registered in `partition`
    async fn list_commands(&self, partition: Partition) -> RemoteResult<Vec<RemoteCommand>>;

    /// Replace the partition's whole command set in one bulk call
    async fn replace_commands(
        &self,
        partition: Partition,
        commands: &[RemoteCommand],
    ) -> RemoteResult<()>;

    /// Delete one listed command
    async fn delete_command(&self, partition: Partition, command: &RemoteCommand)
        -> RemoteResult<()>;
}

/// Catalog that owns nothing remotely; used when running offline
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCatalog;

#[async_trait]
impl CommandCatalog for NoopCatalog {
    async fn list_commands(&self, _partition: Partition) -> RemoteResult<Vec<RemoteCommand>> {
        Ok(Vec::new())
    }

    async fn replace_commands(
        &self,
        _partition: Partition,
        _commands: &[RemoteCommand],
    ) -> RemoteResult<()> {
        Ok(())
    }

    async fn delete_command(
        &self,
        _partition: Partition,
        _command: &RemoteCommand,
    ) -> RemoteResult<()> {
        Ok(())
    }
}
