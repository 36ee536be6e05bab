use std::{collections::BTreeMap, sync::Arc};

use strata_predicate::ScalarValue;

use crate::partition::{PartitionKey, SpecId};

/// Physical format of a file. Files are otherwise opaque to the delete path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Arrow record batches.
    Arrow,
}

/// Per-column statistics gathered when a data file is written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnStats {
    /// Smallest non-null value.
    pub lower: Option<ScalarValue>,
    /// Largest non-null value.
    pub upper: Option<ScalarValue>,
    /// Number of `NULL` values.
    pub null_count: u64,
    /// Number of values, including `NULL`.
    pub value_count: u64,
}

/// Immutable file of table rows.
#[derive(Clone, Debug, PartialEq)]
pub struct DataFile {
    /// Location, unique across the table.
    pub path: Arc<str>,
    /// Spec the file was written under.
    pub spec_id: SpecId,
    /// Partition values under that spec.
    pub partition: PartitionKey,
    /// Number of rows.
    pub record_count: u64,
    /// Size on storage.
    pub size_bytes: u64,
    /// Physical format.
    pub format: FileFormat,
    /// Statistics keyed by column name.
    pub column_stats: BTreeMap<Arc<str>, ColumnStats>,
}

/// What a delete file removes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteKind {
    /// Row positions within one data file.
    Position {
        /// Path of the data file the positions refer to.
        referenced_data_file: Arc<str>,
    },
    /// Rows whose values in `columns` equal one of the stored key tuples.
    Equality {
        /// Key columns.
        columns: Vec<Arc<str>>,
    },
}

/// Immutable file recording deleted rows for merge-on-read.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteFile {
    /// Location, unique across the table.
    pub path: Arc<str>,
    /// Spec the file was written under.
    pub spec_id: SpecId,
    /// Partition the deletes are scoped to.
    pub partition: PartitionKey,
    /// Number of positions or key tuples.
    pub record_count: u64,
    /// Size on storage.
    pub size_bytes: u64,
    /// Physical format.
    pub format: FileFormat,
    /// Position or equality deletes.
    pub kind: DeleteKind,
}

impl DeleteFile {
    /// Data file targeted by a positional delete file.
    pub fn referenced_data_file(&self) -> Option<&Arc<str>> {
        match &self.kind {
            DeleteKind::Position {
                referenced_data_file,
            } => Some(referenced_data_file),
            DeleteKind::Equality { .. } => None,
        }
    }
}

/// File tracked by a manifest entry, tagged by content.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentFile {
    /// Table rows.
    Data(Arc<DataFile>),
    /// Deleted rows.
    Deletes(Arc<DeleteFile>),
}

impl ContentFile {
    /// File location.
    pub fn path(&self) -> &Arc<str> {
        match self {
            ContentFile::Data(file) => &file.path,
            ContentFile::Deletes(file) => &file.path,
        }
    }

    /// Spec the file was written under.
    pub fn spec_id(&self) -> SpecId {
        match self {
            ContentFile::Data(file) => file.spec_id,
            ContentFile::Deletes(file) => file.spec_id,
        }
    }

    /// Partition values under the file's spec.
    pub fn partition(&self) -> &PartitionKey {
        match self {
            ContentFile::Data(file) => &file.partition,
            ContentFile::Deletes(file) => &file.partition,
        }
    }

    /// Rows, positions or key tuples held by the file.
    pub fn record_count(&self) -> u64 {
        match self {
            ContentFile::Data(file) => file.record_count,
            ContentFile::Deletes(file) => file.record_count,
        }
    }
}
