//! File reader and writer collaborators.
//!
//! The delete path treats files as opaque units: it asks an implementation of
//! [`FileIo`] for the rows of a data file and hands it rows or positions to
//! persist. [`MemoryFileIo`] keeps Arrow record batches in memory.

mod batch;
mod memory;

use std::{fmt, sync::Arc};

use arrow::error::ArrowError;
use futures_util::future::BoxFuture;
use strata_predicate::BitmapRowSet;
use thiserror::Error;

pub use self::memory::MemoryFileIo;
use crate::{
    manifest::{DataFile, DeleteFile},
    partition::{PartitionError, PartitionKey, PartitionSpec},
    schema::{Row, SchemaError, TableSchema},
};

/// Errors raised while reading or writing files.
#[derive(Debug, Error)]
pub enum IoError {
    /// No file exists at the path.
    #[error("file `{0}` not found")]
    NotFound(String),
    /// The file holds a different kind of content than requested.
    #[error("file `{path}` is not a {expected} file")]
    WrongContent {
        /// File path.
        path: String,
        /// Requested content.
        expected: &'static str,
    },
    /// Rows do not match the table schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Rows could not be partitioned.
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Arrow rejected a batch.
    #[error(transparent)]
    Arrow(#[from] ArrowError),
    /// Storage refused the operation.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Future returned by [`FileIo`] operations.
pub type IoFuture<'a, T> = BoxFuture<'a, Result<T, IoError>>;

/// Decides how many output files a batch of rows is split into.
pub trait FileSizingPolicy: fmt::Debug + Send + Sync {
    /// Maximum rows per output file for rows of roughly `row_bytes` bytes each.
    fn rows_per_file(&self, row_bytes: u64) -> usize;
}

/// Sizing policy bounded by a target byte size and a row cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetFileSize {
    /// Target size of one output file in bytes.
    pub target_bytes: u64,
    /// Upper bound on rows per output file.
    pub split_rows: usize,
}

impl Default for TargetFileSize {
    fn default() -> Self {
        Self {
            target_bytes: 512 * 1024 * 1024,
            split_rows: 1_000_000,
        }
    }
}

impl FileSizingPolicy for TargetFileSize {
    fn rows_per_file(&self, row_bytes: u64) -> usize {
        let by_size = usize::try_from(self.target_bytes / row_bytes.max(1)).unwrap_or(usize::MAX);
        by_size.min(self.split_rows).max(1)
    }
}

/// Rows of one partition to be written as data files.
#[derive(Debug)]
pub struct WriteRequest<'a> {
    /// Table schema the rows conform to.
    pub schema: &'a TableSchema,
    /// Spec the output files are written under.
    pub spec: &'a PartitionSpec,
    /// Partition every row belongs to.
    pub partition: PartitionKey,
    /// Rows in output order.
    pub rows: Vec<Row>,
}

/// Decoded content of a delete file.
#[derive(Clone, Debug)]
pub enum DeletePayload {
    /// Deleted positions of the referenced data file.
    Positions(BitmapRowSet),
    /// Deleted key tuples over `columns`.
    Equality {
        /// Key columns.
        columns: Vec<Arc<str>>,
        /// Key tuples.
        keys: Vec<Row>,
    },
}

/// Format reader and writer consumed by scans and the delete path.
pub trait FileIo: Send + Sync {
    /// Rows of `file` in position order.
    fn read_rows<'a>(
        &'a self,
        schema: &'a TableSchema,
        file: &'a DataFile,
    ) -> IoFuture<'a, Vec<Row>>;

    /// Writes rows into as many files as `sizing` asks for. No rows, no files.
    fn write_rows<'a>(
        &'a self,
        request: WriteRequest<'a>,
        sizing: &'a dyn FileSizingPolicy,
    ) -> IoFuture<'a, Vec<DataFile>>;

    /// Writes a positional delete file against `data_file`.
    fn write_position_deletes<'a>(
        &'a self,
        data_file: &'a DataFile,
        positions: BitmapRowSet,
    ) -> IoFuture<'a, DeleteFile>;

    /// Writes an equality delete file scoped to one partition of `spec`.
    fn write_equality_deletes<'a>(
        &'a self,
        schema: &'a TableSchema,
        spec: &'a PartitionSpec,
        partition: PartitionKey,
        columns: Vec<Arc<str>>,
        keys: Vec<Row>,
    ) -> IoFuture<'a, DeleteFile>;

    /// Decodes a delete file.
    fn read_deletes<'a>(&'a self, file: &'a DeleteFile) -> IoFuture<'a, DeletePayload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_size_caps_rows() {
        let policy = TargetFileSize {
            target_bytes: 100,
            split_rows: 3,
        };
        assert_eq!(policy.rows_per_file(10), 3);
        assert_eq!(policy.rows_per_file(50), 2);
        assert_eq!(policy.rows_per_file(1_000), 1);
        assert_eq!(policy.rows_per_file(0), 3);
    }
}
