//! Snapshot store: the single owner of each table's current-metadata pointer.
//!
//! Writers never lock a table while they plan. They read an
//! `Arc<TableMetadata>`, build the next snapshot on their own, and publish it
//! with [`SnapshotStore::try_commit`], which swaps the pointer only when the
//! expected parent is still current.

mod memory;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

pub use self::memory::MemorySnapshotStore;
use crate::manifest::{ManifestError, Snapshot, SnapshotId, TableMetadata};

/// Errors raised by snapshot store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A table with this name already exists.
    #[error("table `{0}` already exists")]
    TableExists(String),
    /// No table with this name exists.
    #[error("table `{0}` does not exist")]
    NoSuchTable(String),
    /// The proposed metadata is inconsistent with the current state.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Result of a compare-and-swap on the current pointer.
#[derive(Clone, Debug)]
pub enum CommitOutcome {
    /// The pointer now refers to this metadata.
    Committed(Arc<TableMetadata>),
    /// Another writer moved the pointer first; `current` is what it points to now.
    Conflict {
        /// Metadata observed at swap time.
        current: Arc<TableMetadata>,
    },
}

/// Future returned by [`SnapshotStore`] operations.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

/// Versioned metadata storage with an atomically swapped current pointer.
pub trait SnapshotStore: Send + Sync {
    /// Registers a new table.
    fn create_table(&self, metadata: TableMetadata) -> StoreFuture<'_, Arc<TableMetadata>>;

    /// Current metadata of `table`.
    fn load<'a>(&'a self, table: &'a str) -> StoreFuture<'a, Arc<TableMetadata>>;

    /// Current snapshot of `table`, `None` before the first commit.
    fn current_snapshot<'a>(&'a self, table: &'a str) -> StoreFuture<'a, Option<Arc<Snapshot>>> {
        Box::pin(async move {
            let metadata = self.load(table).await?;
            Ok(metadata.current_snapshot().cloned())
        })
    }

    /// Publishes `snapshot` if the current snapshot is still `expected_parent`.
    fn try_commit<'a>(
        &'a self,
        table: &'a str,
        expected_parent: Option<SnapshotId>,
        snapshot: Snapshot,
    ) -> StoreFuture<'a, CommitOutcome>;

    /// Replaces table metadata if its version is still `expected_version`.
    ///
    /// Used for changes that do not add a snapshot, such as properties and
    /// partition specs.
    fn update<'a>(
        &'a self,
        table: &'a str,
        expected_version: u64,
        metadata: TableMetadata,
    ) -> StoreFuture<'a, CommitOutcome>;
}
