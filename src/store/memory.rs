use std::{collections::HashMap, sync::Arc};

use async_lock::RwLock;

use super::{CommitOutcome, SnapshotStore, StoreError, StoreFuture};
use crate::manifest::{Snapshot, SnapshotId, TableMetadata};

/// In-process snapshot store.
///
/// Each table's metadata sits behind an `Arc` that is replaced wholesale
/// under a short write lock; readers clone the `Arc` and never block writers
/// for longer than the swap.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    tables: RwLock<HashMap<String, Arc<TableMetadata>>>,
}

impl MemorySnapshotStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn create_table(&self, metadata: TableMetadata) -> StoreFuture<'_, Arc<TableMetadata>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let name = metadata.name().to_string();
            if tables.contains_key(&name) {
                return Err(StoreError::TableExists(name));
            }
            let metadata = Arc::new(metadata);
            tables.insert(name, Arc::clone(&metadata));
            Ok(metadata)
        })
    }

    fn load<'a>(&'a self, table: &'a str) -> StoreFuture<'a, Arc<TableMetadata>> {
        Box::pin(async move {
            self.tables
                .read()
                .await
                .get(table)
                .cloned()
                .ok_or_else(|| StoreError::NoSuchTable(table.to_owned()))
        })
    }

    fn try_commit<'a>(
        &'a self,
        table: &'a str,
        expected_parent: Option<SnapshotId>,
        snapshot: Snapshot,
    ) -> StoreFuture<'a, CommitOutcome> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let current = tables
                .get_mut(table)
                .ok_or_else(|| StoreError::NoSuchTable(table.to_owned()))?;
            if current.current_snapshot_id() != expected_parent {
                return Ok(CommitOutcome::Conflict {
                    current: Arc::clone(current),
                });
            }
            let next = Arc::new(current.with_snapshot(snapshot)?);
            *current = Arc::clone(&next);
            Ok(CommitOutcome::Committed(next))
        })
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        expected_version: u64,
        metadata: TableMetadata,
    ) -> StoreFuture<'a, CommitOutcome> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let current = tables
                .get_mut(table)
                .ok_or_else(|| StoreError::NoSuchTable(table.to_owned()))?;
            if current.version() != expected_version
                || current.current_snapshot_id() != metadata.current_snapshot_id()
            {
                return Ok(CommitOutcome::Conflict {
                    current: Arc::clone(current),
                });
            }
            let next = Arc::new(metadata);
            *current = Arc::clone(&next);
            Ok(CommitOutcome::Committed(next))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        manifest::{Operation, SnapshotProducer},
        partition::PartitionSpec,
        schema::{Column, DataType, TableSchema},
    };

    fn metadata(name: &str) -> TableMetadata {
        let schema = TableSchema::new(vec![Column::new("id", DataType::Int64)]).unwrap();
        TableMetadata::new(name, schema, PartitionSpec::unpartitioned(0), BTreeMap::new())
    }

    #[tokio::test]
    async fn create_and_load() {
        let store = MemorySnapshotStore::new();
        store.create_table(metadata("t")).await.unwrap();
        assert!(matches!(
            store.create_table(metadata("t")).await,
            Err(StoreError::TableExists(name)) if name == "t"
        ));
        assert!(store.current_snapshot("t").await.unwrap().is_none());
        assert!(matches!(
            store.load("missing").await,
            Err(StoreError::NoSuchTable(_))
        ));
    }

    #[tokio::test]
    async fn stale_parent_is_a_conflict() {
        let store = MemorySnapshotStore::new();
        let base = store.create_table(metadata("t")).await.unwrap();
        let producer = SnapshotProducer::new(Operation::Append);

        let first = producer.produce(&base, 1).unwrap();
        let outcome = store.try_commit("t", None, first).await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(ref m) if m.current_snapshot_id() == Some(1)));

        // A second writer that planned against the same base loses the race.
        let second = producer.produce(&base, 2).unwrap();
        match store.try_commit("t", None, second).await.unwrap() {
            CommitOutcome::Conflict { current } => {
                assert_eq!(current.current_snapshot_id(), Some(1))
            }
            CommitOutcome::Committed(_) => panic!("stale commit must not win"),
        }
    }

    #[tokio::test]
    async fn update_checks_version() {
        let store = MemorySnapshotStore::new();
        let base = store.create_table(metadata("t")).await.unwrap();
        let changed = base.with_property("k", "v");
        assert!(matches!(
            store.update("t", base.version(), changed.clone()).await.unwrap(),
            CommitOutcome::Committed(_)
        ));
        assert!(matches!(
            store.update("t", base.version(), changed).await.unwrap(),
            CommitOutcome::Conflict { .. }
        ));
        assert_eq!(store.load("t").await.unwrap().property("k"), Some("v"));
    }
}
