//! Persistence collaborator receiving flushed snapshots.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::ExportResult;
use crate::stores::Snapshot;

/// What a sink wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Files written (empty for database sinks)
    pub files: Vec<PathBuf>,

    /// Records written across all outputs
    pub records: usize,
}

/// Durable destination for a [`Snapshot`].
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn persist(&self, snapshot: &Snapshot) -> ExportResult<PersistReport>;

    /// Name of this sink (for logging).
    fn name(&self) -> &str {
        "sink"
    }
}
