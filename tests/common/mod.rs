//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::{
    cmp::Ordering,
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use futures_util::future::BoxFuture;
use strata::{
    manifest::{Snapshot, SnapshotId, TableMetadata},
    predicate::{ColumnRef, PredicateBuilder, ScalarValue},
    store::{CommitOutcome, StoreFuture},
    Column, DataType, MemoryFileIo, MemorySnapshotStore, PartitionField, Row, SnapshotStore,
    Table, TableSchema, Transform,
};

pub fn id_dep_schema() -> TableSchema {
    TableSchema::new(vec![
        Column::new("id", DataType::Int64),
        Column::new("dep", DataType::Utf8),
    ])
    .expect("schema should be valid")
}

pub fn row(id: Option<i64>, dep: Option<&str>) -> Row {
    vec![
        id.map_or(ScalarValue::Null, ScalarValue::Int64),
        dep.map_or(ScalarValue::Null, ScalarValue::from),
    ]
}

pub fn rows(pairs: &[(i64, &str)]) -> Vec<Row> {
    pairs
        .iter()
        .map(|(id, dep)| row(Some(*id), Some(dep)))
        .collect()
}

pub fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by(|lhs, rhs| {
        lhs.iter()
            .zip(rhs)
            .map(|(l, r)| l.total_cmp(r))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    rows
}

pub fn dep_equals(dep: &str) -> strata::predicate::Predicate {
    PredicateBuilder::leaf()
        .equals(ColumnRef::new("dep"), ScalarValue::from(dep))
        .build()
}

pub fn id_equals(id: i64) -> strata::predicate::Predicate {
    PredicateBuilder::leaf()
        .equals(ColumnRef::new("id"), ScalarValue::Int64(id))
        .build()
}

/// A table in a fresh in-memory store, optionally partitioned by identity(dep).
pub struct Fixture {
    pub store: Arc<MemorySnapshotStore>,
    pub io: Arc<MemoryFileIo>,
    pub table: Table,
}

impl Fixture {
    pub async fn new(partitioned: bool) -> Self {
        Self::with_properties(partitioned, &[]).await
    }

    pub async fn with_properties(partitioned: bool, properties: &[(&str, &str)]) -> Self {
        let store = Arc::new(MemorySnapshotStore::new());
        let io = Arc::new(MemoryFileIo::new());
        let mut builder = Table::builder("t", id_dep_schema());
        if partitioned {
            builder = builder.partition_by(vec![PartitionField::new("dep", Transform::Identity)]);
        }
        for (key, value) in properties {
            builder = builder.property(*key, *value);
        }
        let table = builder
            .create(store.clone(), io.clone())
            .await
            .expect("table should be created");
        Self { store, io, table }
    }

    pub async fn scan(&self) -> Vec<Row> {
        sorted(self.table.scan().await.expect("scan should succeed"))
    }

    /// Handle on the same table whose commits first run the queued hooks.
    pub async fn racing(&self) -> (Table, Arc<RacingStore>) {
        let racing = Arc::new(RacingStore::new(self.store.clone()));
        let table = Table::load("t", racing.clone(), self.io.clone())
            .await
            .expect("table should load");
        (table, racing)
    }
}

/// Store wrapper running a concurrent commit right before each pointer swap.
pub struct RacingStore {
    inner: Arc<MemorySnapshotStore>,
    hooks: Mutex<VecDeque<BoxFuture<'static, ()>>>,
}

impl RacingStore {
    pub fn new(inner: Arc<MemorySnapshotStore>) -> Self {
        Self {
            inner,
            hooks: Mutex::new(VecDeque::new()),
        }
    }

    pub fn before_commit(&self, hook: BoxFuture<'static, ()>) {
        self.hooks.lock().unwrap().push_back(hook);
    }

    pub fn pending(&self) -> usize {
        self.hooks.lock().unwrap().len()
    }
}

impl SnapshotStore for RacingStore {
    fn create_table(&self, metadata: TableMetadata) -> StoreFuture<'_, Arc<TableMetadata>> {
        self.inner.create_table(metadata)
    }

    fn load<'a>(&'a self, table: &'a str) -> StoreFuture<'a, Arc<TableMetadata>> {
        self.inner.load(table)
    }

    fn try_commit<'a>(
        &'a self,
        table: &'a str,
        expected_parent: Option<SnapshotId>,
        snapshot: Snapshot,
    ) -> StoreFuture<'a, CommitOutcome> {
        Box::pin(async move {
            let hook = self.hooks.lock().unwrap().pop_front();
            if let Some(hook) = hook {
                hook.await;
            }
            self.inner
                .try_commit(table, expected_parent, snapshot)
                .await
        })
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        expected_version: u64,
        metadata: TableMetadata,
    ) -> StoreFuture<'a, CommitOutcome> {
        self.inner.update(table, expected_version, metadata)
    }
}
