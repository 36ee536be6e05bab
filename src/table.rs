//! User-facing table handle.

use std::{
    collections::BTreeMap,
    sync::Arc,
};

use futures_util::future::try_join_all;
use strata_predicate::Predicate;
use thiserror::Error;

use crate::{
    config::{ConfigError, DeleteConfig, DeleteOptions},
    delete::{execute_delete, DeleteError, DeleteOutcome},
    io::{FileIo, IoError, WriteRequest},
    logging::{strata_log, LogContext},
    manifest::{
        now_ms, ManifestError, Operation, Snapshot, SnapshotId, SnapshotProducer, TableMetadata,
    },
    partition::{PartitionError, PartitionField, PartitionKey, PartitionSpec, SpecId},
    scan::scan_snapshot,
    schema::{Row, SchemaError, TableSchema},
    store::{CommitOutcome, SnapshotStore, StoreError},
};

/// Errors raised by table operations other than deletes.
#[derive(Debug, Error)]
pub enum TableError {
    /// Snapshot store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reading or writing files failed.
    #[error(transparent)]
    Io(#[from] IoError),
    /// Rows or columns do not fit the schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Partition spec or partition values are invalid.
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Table metadata is inconsistent.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Table properties are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No snapshot with this id exists in the table history.
    #[error("snapshot {0} does not exist")]
    UnknownSnapshot(SnapshotId),
    /// Every commit attempt lost the race.
    #[error("commit failed after {attempts} attempts")]
    CommitFailed {
        /// Attempts made.
        attempts: u32,
    },
}

/// Settings of a table that does not exist yet.
#[derive(Clone, Debug)]
pub struct TableBuilder {
    name: Arc<str>,
    schema: TableSchema,
    partition_fields: Vec<PartitionField>,
    properties: BTreeMap<String, String>,
}

impl TableBuilder {
    /// Partitions new files by `fields`. Unpartitioned by default.
    pub fn partition_by(self, fields: Vec<PartitionField>) -> Self {
        TableBuilder {
            partition_fields: fields,
            ..self
        }
    }

    /// Sets a table property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Registers the table in `store`.
    pub async fn create(
        self,
        store: Arc<dyn SnapshotStore>,
        io: Arc<dyn FileIo>,
    ) -> Result<Table, TableError> {
        let spec = PartitionSpec::new(0, self.partition_fields, &self.schema)?;
        // Fail on bad properties now rather than on the first delete.
        DeleteConfig::resolve(&self.schema, &self.properties, &DeleteOptions::default())?;
        let metadata =
            TableMetadata::new(Arc::clone(&self.name), self.schema, spec, self.properties);
        store.create_table(metadata).await?;
        strata_log!(log::Level::Info, "table_created", "table={}", self.name);
        Ok(Table::open(self.name, store, io))
    }
}

/// Handle on a table held by a [`SnapshotStore`].
///
/// The handle keeps no table state: every operation reads the store's current
/// metadata, so handles are cheap to clone and share between writers.
#[derive(Clone)]
pub struct Table {
    name: Arc<str>,
    ctx: LogContext,
    store: Arc<dyn SnapshotStore>,
    io: Arc<dyn FileIo>,
}

impl Table {
    /// Starts describing a new table.
    pub fn builder(name: impl Into<Arc<str>>, schema: TableSchema) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            schema,
            partition_fields: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Opens an existing table.
    pub async fn load(
        name: impl Into<Arc<str>>,
        store: Arc<dyn SnapshotStore>,
        io: Arc<dyn FileIo>,
    ) -> Result<Table, TableError> {
        let name = name.into();
        store.load(&name).await?;
        Ok(Table::open(name, store, io))
    }

    fn open(name: Arc<str>, store: Arc<dyn SnapshotStore>, io: Arc<dyn FileIo>) -> Self {
        Self {
            ctx: LogContext::for_table(&name),
            name,
            store,
            io,
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current table metadata.
    pub async fn metadata(&self) -> Result<Arc<TableMetadata>, TableError> {
        Ok(self.store.load(&self.name).await?)
    }

    /// Current snapshot, `None` before the first commit.
    pub async fn current_snapshot(&self) -> Result<Option<Arc<Snapshot>>, TableError> {
        Ok(self.store.current_snapshot(&self.name).await?)
    }

    /// Snapshot history in commit order.
    pub async fn snapshots(&self) -> Result<Vec<Arc<Snapshot>>, TableError> {
        Ok(self.metadata().await?.snapshots().to_vec())
    }

    /// Appends `rows`, one group of files per partition of the default spec.
    ///
    /// Returns `None` when there is nothing to append.
    pub async fn append(&self, rows: Vec<Row>) -> Result<Option<Arc<Snapshot>>, TableError> {
        if rows.is_empty() {
            return Ok(None);
        }
        let metadata = self.metadata().await?;
        let schema = metadata.schema();
        let spec = metadata.default_spec()?;
        let config =
            DeleteConfig::resolve(schema, metadata.properties(), &DeleteOptions::default())?;

        let mut partitions: BTreeMap<PartitionKey, Vec<Row>> = BTreeMap::new();
        for row in rows {
            schema.validate(&row)?;
            partitions
                .entry(spec.partition_key(schema, &row)?)
                .or_default()
                .push(row);
        }
        let written = try_join_all(partitions.into_iter().map(|(partition, rows)| {
            self.io.write_rows(
                WriteRequest {
                    schema,
                    spec,
                    partition,
                    rows,
                },
                &config.sizing,
            )
        }))
        .await?;
        let mut producer = SnapshotProducer::new(Operation::Append);
        for file in written.into_iter().flatten() {
            producer.add_data_file(Arc::new(file));
        }
        self.commit(producer, metadata, config.max_attempts()).await
    }

    /// Publishes `producer`, re-basing it on the winner after every lost swap.
    async fn commit(
        &self,
        producer: SnapshotProducer,
        mut current: Arc<TableMetadata>,
        max_attempts: u32,
    ) -> Result<Option<Arc<Snapshot>>, TableError> {
        for attempt in 1..=max_attempts {
            let snapshot = producer.produce(&current, now_ms())?;
            let expected = current.current_snapshot_id();
            match self.store.try_commit(&self.name, expected, snapshot).await? {
                CommitOutcome::Committed(committed) => {
                    let snapshot = committed.current_snapshot().cloned();
                    strata_log!(
                        log::Level::Info,
                        ctx: &self.ctx,
                        "append_committed",
                        "snapshot_id={:?} attempts={}",
                        committed.current_snapshot_id(),
                        attempt
                    );
                    return Ok(snapshot);
                }
                CommitOutcome::Conflict { current: winner } => {
                    strata_log!(
                        log::Level::Debug,
                        ctx: &self.ctx,
                        "append_commit_race",
                        "attempt={} expected={:?} found={:?}",
                        attempt,
                        expected,
                        winner.current_snapshot_id()
                    );
                    current = winner;
                }
            }
        }
        Err(TableError::CommitFailed {
            attempts: max_attempts,
        })
    }

    /// Deletes every row matching `predicate` under the table's settings.
    pub async fn delete(&self, predicate: &Predicate) -> Result<DeleteOutcome, DeleteError> {
        self.delete_with(predicate, &DeleteOptions::default()).await
    }

    /// Deletes every row matching `predicate`, overriding table settings with `options`.
    pub async fn delete_with(
        &self,
        predicate: &Predicate,
        options: &DeleteOptions,
    ) -> Result<DeleteOutcome, DeleteError> {
        execute_delete(
            self.store.as_ref(),
            self.io.as_ref(),
            &self.name,
            predicate,
            options,
        )
        .await
    }

    /// Visible rows of the current snapshot.
    pub async fn scan(&self) -> Result<Vec<Row>, TableError> {
        let metadata = self.metadata().await?;
        match metadata.current_snapshot() {
            Some(snapshot) => Ok(scan_snapshot(self.io.as_ref(), &metadata, snapshot).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Visible rows as of `snapshot_id`.
    pub async fn scan_at(&self, snapshot_id: SnapshotId) -> Result<Vec<Row>, TableError> {
        let metadata = self.metadata().await?;
        let snapshot = metadata
            .snapshot(snapshot_id)
            .ok_or(TableError::UnknownSnapshot(snapshot_id))?;
        Ok(scan_snapshot(self.io.as_ref(), &metadata, snapshot).await?)
    }

    /// Makes new writes use a spec of `fields`; existing files keep their spec.
    pub async fn evolve_partition_spec(
        &self,
        fields: Vec<PartitionField>,
    ) -> Result<SpecId, TableError> {
        let committed = self
            .update(|metadata| {
                let spec = PartitionSpec::new(
                    metadata.next_spec_id(),
                    fields.clone(),
                    metadata.schema(),
                )?;
                Ok(metadata.with_default_spec(spec))
            })
            .await?;
        let spec_id = committed.default_spec()?.spec_id();
        strata_log!(
            log::Level::Info,
            ctx: &self.ctx,
            "partition_spec_evolved",
            "spec_id={}",
            spec_id
        );
        Ok(spec_id)
    }

    /// Sets a table property, rejecting values the delete path cannot parse.
    pub async fn set_property(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TableError> {
        let (key, value) = (key.into(), value.into());
        self.update(|metadata| {
            let next = metadata.with_property(key.clone(), value.clone());
            DeleteConfig::resolve(next.schema(), next.properties(), &DeleteOptions::default())?;
            Ok(next)
        })
        .await?;
        Ok(())
    }

    /// Applies `change` to the current metadata until the versioned swap wins.
    async fn update<F>(&self, change: F) -> Result<Arc<TableMetadata>, TableError>
    where
        F: Fn(&TableMetadata) -> Result<TableMetadata, TableError>,
    {
        let mut current = self.metadata().await?;
        let max_attempts = DeleteConfig::resolve(
            current.schema(),
            current.properties(),
            &DeleteOptions::default(),
        )?
        .max_attempts();
        for _ in 0..max_attempts {
            let next = change(&current)?;
            match self.store.update(&self.name, current.version(), next).await? {
                CommitOutcome::Committed(committed) => return Ok(committed),
                CommitOutcome::Conflict { current: winner } => current = winner,
            }
        }
        Err(TableError::CommitFailed {
            attempts: max_attempts,
        })
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}
