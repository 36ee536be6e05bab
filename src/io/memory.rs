use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use arrow::record_batch::RecordBatch;
use async_lock::RwLock;
use strata_predicate::{BitmapRowSet, RowSet};

use super::{
    batch::{batch_to_rows, column_stats, rows_to_batch},
    DeletePayload, FileIo, FileSizingPolicy, IoError, IoFuture, WriteRequest,
};
use crate::{
    id::FileIdGenerator,
    manifest::{DataFile, DeleteFile, DeleteKind, FileFormat},
    partition::{PartitionKey, PartitionSpec},
    schema::{Column, Row, TableSchema},
};

#[derive(Debug)]
enum StoredFile {
    Data(RecordBatch),
    Positions(BitmapRowSet),
    Equality {
        columns: Vec<Column>,
        keys: RecordBatch,
    },
}

/// File store keeping Arrow batches in memory.
///
/// Counts data file reads and can be told to fail, so callers can observe
/// which files a delete touched and how failures propagate.
#[derive(Debug, Default)]
pub struct MemoryFileIo {
    files: RwLock<HashMap<Arc<str>, StoredFile>>,
    ids: FileIdGenerator,
    data_reads: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryFileIo {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of data file reads served so far.
    pub fn data_reads(&self) -> usize {
        self.data_reads.load(Ordering::Acquire)
    }

    /// Makes every subsequent write fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Makes every subsequent data read fail until reset.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    /// Number of stored files, referenced or not.
    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }

    fn check_writable(&self) -> Result<(), IoError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(IoError::Storage("writes are disabled".into()));
        }
        Ok(())
    }

    fn data_path(&self, spec: &PartitionSpec, partition: &PartitionKey) -> Arc<str> {
        let id = self.ids.generate();
        if spec.fields().is_empty() {
            format!("data/{id}.arrow").into()
        } else {
            format!("data/{}/{id}.arrow", partition.to_path(spec)).into()
        }
    }

    fn delete_path(&self, suffix: &str) -> Arc<str> {
        format!("deletes/{}-{suffix}.arrow", self.ids.generate()).into()
    }
}

impl FileIo for MemoryFileIo {
    fn read_rows<'a>(
        &'a self,
        schema: &'a TableSchema,
        file: &'a DataFile,
    ) -> IoFuture<'a, Vec<Row>> {
        Box::pin(async move {
            if self.fail_reads.load(Ordering::Acquire) {
                return Err(IoError::Storage(format!("cannot read `{}`", file.path)));
            }
            self.data_reads.fetch_add(1, Ordering::AcqRel);
            let files = self.files.read().await;
            match files.get(&file.path) {
                Some(StoredFile::Data(batch)) => Ok(batch_to_rows(schema.columns(), batch)?),
                Some(_) => Err(IoError::WrongContent {
                    path: file.path.to_string(),
                    expected: "data",
                }),
                None => Err(IoError::NotFound(file.path.to_string())),
            }
        })
    }

    fn write_rows<'a>(
        &'a self,
        request: WriteRequest<'a>,
        sizing: &'a dyn FileSizingPolicy,
    ) -> IoFuture<'a, Vec<DataFile>> {
        Box::pin(async move {
            self.check_writable()?;
            let WriteRequest {
                schema,
                spec,
                partition,
                rows,
            } = request;
            if rows.is_empty() {
                return Ok(Vec::new());
            }
            for row in &rows {
                schema.validate(row)?;
            }

            let whole = rows_to_batch(schema.columns(), &rows)?;
            let row_bytes = (whole.get_array_memory_size() / rows.len()) as u64;
            let rows_per_file = sizing.rows_per_file(row_bytes).max(1);

            let mut written = Vec::new();
            let mut files = self.files.write().await;
            for chunk in rows.chunks(rows_per_file) {
                let batch = rows_to_batch(schema.columns(), chunk)?;
                let file = DataFile {
                    path: self.data_path(spec, &partition),
                    spec_id: spec.spec_id(),
                    partition: partition.clone(),
                    record_count: chunk.len() as u64,
                    size_bytes: batch.get_array_memory_size() as u64,
                    format: FileFormat::Arrow,
                    column_stats: column_stats(schema.columns(), chunk),
                };
                files.insert(Arc::clone(&file.path), StoredFile::Data(batch));
                written.push(file);
            }
            Ok(written)
        })
    }

    fn write_position_deletes<'a>(
        &'a self,
        data_file: &'a DataFile,
        positions: BitmapRowSet,
    ) -> IoFuture<'a, DeleteFile> {
        Box::pin(async move {
            self.check_writable()?;
            let path = self.delete_path("pos");
            let record_count = positions.len() as u64;
            let file = DeleteFile {
                path: Arc::clone(&path),
                spec_id: data_file.spec_id,
                partition: data_file.partition.clone(),
                record_count,
                size_bytes: record_count * 4,
                format: FileFormat::Arrow,
                kind: DeleteKind::Position {
                    referenced_data_file: Arc::clone(&data_file.path),
                },
            };
            self.files
                .write()
                .await
                .insert(path, StoredFile::Positions(positions));
            Ok(file)
        })
    }

    fn write_equality_deletes<'a>(
        &'a self,
        schema: &'a TableSchema,
        spec: &'a PartitionSpec,
        partition: PartitionKey,
        columns: Vec<Arc<str>>,
        keys: Vec<Row>,
    ) -> IoFuture<'a, DeleteFile> {
        Box::pin(async move {
            self.check_writable()?;
            let key_columns = columns
                .iter()
                .map(|name| -> Result<Column, IoError> {
                    let (_, column) = schema.column(name)?;
                    // Key tuples may carry NULL even for required columns of the table.
                    Ok(Column::new(Arc::clone(&column.name), column.data_type))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let batch = rows_to_batch(&key_columns, &keys)?;
            let path = self.delete_path("eq");
            let file = DeleteFile {
                path: Arc::clone(&path),
                spec_id: spec.spec_id(),
                partition,
                record_count: keys.len() as u64,
                size_bytes: batch.get_array_memory_size() as u64,
                format: FileFormat::Arrow,
                kind: DeleteKind::Equality { columns },
            };
            self.files.write().await.insert(
                path,
                StoredFile::Equality {
                    columns: key_columns,
                    keys: batch,
                },
            );
            Ok(file)
        })
    }

    fn read_deletes<'a>(&'a self, file: &'a DeleteFile) -> IoFuture<'a, DeletePayload> {
        Box::pin(async move {
            let files = self.files.read().await;
            match files.get(&file.path) {
                Some(StoredFile::Positions(positions)) => {
                    Ok(DeletePayload::Positions(positions.clone()))
                }
                Some(StoredFile::Equality { columns, keys }) => Ok(DeletePayload::Equality {
                    columns: columns.iter().map(|column| Arc::clone(&column.name)).collect(),
                    keys: batch_to_rows(columns, keys)?,
                }),
                Some(StoredFile::Data(_)) => Err(IoError::WrongContent {
                    path: file.path.to_string(),
                    expected: "delete",
                }),
                None => Err(IoError::NotFound(file.path.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use strata_predicate::ScalarValue;

    use super::*;
    use crate::{
        io::TargetFileSize,
        partition::{PartitionField, Transform},
        schema::DataType,
    };

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Column::required("id", DataType::Int64),
            Column::new("dep", DataType::Utf8),
        ])
        .unwrap()
    }

    fn rows(ids: &[i64]) -> Vec<Row> {
        ids.iter()
            .map(|id| vec![ScalarValue::Int64(*id), ScalarValue::from("hr")])
            .collect()
    }

    #[tokio::test]
    async fn splits_rows_by_policy() {
        let io = MemoryFileIo::new();
        let schema = schema();
        let spec = PartitionSpec::new(
            1,
            vec![PartitionField::new("dep", Transform::Identity)],
            &schema,
        )
        .unwrap();
        let sizing = TargetFileSize {
            target_bytes: u64::MAX,
            split_rows: 2,
        };
        let files = io
            .write_rows(
                WriteRequest {
                    schema: &schema,
                    spec: &spec,
                    partition: PartitionKey::new(vec!["hr".into()]),
                    rows: rows(&[1, 2, 3, 4, 5]),
                },
                &sizing,
            )
            .await
            .unwrap();
        assert_eq!(
            files.iter().map(|f| f.record_count).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert!(files.iter().all(|f| f.path.starts_with("data/dep=hr/")));
        assert_eq!(
            files[1].column_stats["id"].lower,
            Some(ScalarValue::Int64(3))
        );

        let read = io.read_rows(&schema, &files[2]).await.unwrap();
        assert_eq!(read, rows(&[5]));
        assert_eq!(io.data_reads(), 1);
    }

    #[tokio::test]
    async fn delete_files_round_trip() {
        let io = MemoryFileIo::new();
        let schema = schema();
        let spec = PartitionSpec::unpartitioned(0);
        let files = io
            .write_rows(
                WriteRequest {
                    schema: &schema,
                    spec: &spec,
                    partition: PartitionKey::empty(),
                    rows: rows(&[1, 2, 3]),
                },
                &TargetFileSize::default(),
            )
            .await
            .unwrap();
        let positions: BitmapRowSet = [0, 2].into_iter().collect();
        let deletes = io
            .write_position_deletes(&files[0], positions)
            .await
            .unwrap();
        assert_eq!(deletes.referenced_data_file(), Some(&files[0].path));
        match io.read_deletes(&deletes).await.unwrap() {
            DeletePayload::Positions(read) => {
                assert_eq!(read.iter().collect::<Vec<_>>(), vec![0, 2])
            }
            other => panic!("unexpected payload {other:?}"),
        }

        let equality = io
            .write_equality_deletes(
                &schema,
                &spec,
                PartitionKey::empty(),
                vec!["id".into()],
                vec![vec![ScalarValue::Int64(2)], vec![ScalarValue::Null]],
            )
            .await
            .unwrap();
        assert_eq!(equality.record_count, 2);
        assert!(matches!(
            io.read_deletes(&equality).await.unwrap(),
            DeletePayload::Equality { keys, .. } if keys[1] == vec![ScalarValue::Null]
        ));
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let io = MemoryFileIo::new();
        let schema = schema();
        let spec = PartitionSpec::unpartitioned(0);
        io.fail_writes(true);
        let err = io
            .write_rows(
                WriteRequest {
                    schema: &schema,
                    spec: &spec,
                    partition: PartitionKey::empty(),
                    rows: rows(&[1]),
                },
                &TargetFileSize::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IoError::Storage(_)));
        assert_eq!(io.file_count().await, 0);
    }
}
