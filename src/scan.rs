//! Scan planning and merge-on-read reconciliation.
//!
//! Delete files are joined to data files at read time rather than linked by
//! pointer: positional deletes by referenced path, equality deletes by spec and
//! partition, both gated by data sequence numbers.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures_util::future::try_join_all;
use strata_predicate::{BitmapRowSet, RowId, RowSet};

use crate::{
    io::{DeletePayload, FileIo, IoError},
    manifest::{
        DataFile, DeleteKind, LiveDataFile, LiveDeleteFile, SequenceNumber, Snapshot,
        TableMetadata,
    },
    schema::{Row, TableSchema},
};

/// A live data file together with the delete files that apply to it.
#[derive(Clone, Debug)]
pub struct FileScanTask {
    /// The data file.
    pub data_file: Arc<DataFile>,
    /// Sequence number the file was added at.
    pub sequence_number: SequenceNumber,
    /// Delete files masking rows of the file.
    pub deletes: Vec<LiveDeleteFile>,
}

impl FileScanTask {
    /// Paths of the data file and every applicable delete file.
    pub fn paths(&self) -> impl Iterator<Item = &Arc<str>> + '_ {
        std::iter::once(&self.data_file.path).chain(self.deletes.iter().map(|d| &d.file.path))
    }
}

/// Live delete files of a snapshot, indexed for association with data files.
#[derive(Debug, Default)]
pub(crate) struct DeleteIndex {
    positional: HashMap<Arc<str>, Vec<LiveDeleteFile>>,
    equality: Vec<(LiveDeleteFile, bool)>,
}

impl DeleteIndex {
    pub(crate) fn new(metadata: &TableMetadata, snapshot: &Snapshot) -> Self {
        let mut index = Self::default();
        for delete in snapshot.delete_files() {
            match &delete.file.kind {
                DeleteKind::Position {
                    referenced_data_file,
                } => index
                    .positional
                    .entry(Arc::clone(referenced_data_file))
                    .or_default()
                    .push(delete),
                DeleteKind::Equality { .. } => {
                    let global = metadata.is_global_delete(&delete.file);
                    index.equality.push((delete, global));
                }
            }
        }
        index
    }

    /// Delete files that apply to `data`.
    pub(crate) fn deletes_for(&self, data: &LiveDataFile) -> Vec<LiveDeleteFile> {
        let positional = self
            .positional
            .get(&data.file.path)
            .into_iter()
            .flatten()
            .filter(|delete| delete.sequence_number >= data.sequence_number);
        let equality = self
            .equality
            .iter()
            .filter(|(delete, global)| {
                delete.sequence_number > data.sequence_number
                    && (*global
                        || (delete.file.spec_id == data.file.spec_id
                            && delete.file.partition == data.file.partition))
            })
            .map(|(delete, _)| delete);
        positional.chain(equality).cloned().collect()
    }
}

/// One task per live data file of `snapshot`.
pub fn plan_files(metadata: &TableMetadata, snapshot: &Snapshot) -> Vec<FileScanTask> {
    let index = DeleteIndex::new(metadata, snapshot);
    snapshot
        .data_files()
        .into_iter()
        .map(|data| FileScanTask {
            deletes: index.deletes_for(&data),
            data_file: data.file,
            sequence_number: data.sequence_number,
        })
        .collect()
}

/// Rows of one data file and the positions masked by its delete files.
#[derive(Debug)]
pub(crate) struct TaskRows {
    pub(crate) rows: Vec<Row>,
    pub(crate) deleted: BitmapRowSet,
}

impl TaskRows {
    /// Unmasked rows with their positions.
    pub(crate) fn live(&self) -> impl Iterator<Item = (RowId, &Row)> + '_ {
        (0..)
            .zip(&self.rows)
            .filter(|(position, _)| !self.deleted.contains(*position))
    }
}

/// Reads a task's data file and applies its delete files.
pub(crate) async fn read_task(
    io: &dyn FileIo,
    schema: &TableSchema,
    task: &FileScanTask,
) -> Result<TaskRows, IoError> {
    let rows = io.read_rows(schema, &task.data_file).await?;
    let mut deleted = BitmapRowSet::new();
    for delete in &task.deletes {
        match io.read_deletes(&delete.file).await? {
            DeletePayload::Positions(positions) => deleted = deleted.union(&positions),
            DeletePayload::Equality { columns, keys } => {
                let keys: HashSet<Row> = keys.into_iter().collect();
                for (position, row) in (0..).zip(&rows) {
                    if keys.contains(&schema.project(row, &columns)?) {
                        deleted.insert(position);
                    }
                }
            }
        }
    }
    Ok(TaskRows { rows, deleted })
}

/// Every visible row of `snapshot`, in manifest order.
pub(crate) async fn scan_snapshot(
    io: &dyn FileIo,
    metadata: &TableMetadata,
    snapshot: &Snapshot,
) -> Result<Vec<Row>, IoError> {
    let schema = metadata.schema();
    let tasks = plan_files(metadata, snapshot);
    let files = try_join_all(tasks.iter().map(|task| read_task(io, schema, task))).await?;
    Ok(files
        .into_iter()
        .flat_map(|task_rows| {
            let TaskRows { rows, deleted } = task_rows;
            (0..)
                .zip(rows)
                .filter(move |(position, _)| !deleted.contains(*position))
                .map(|(_, row)| row)
        })
        .collect())
}
