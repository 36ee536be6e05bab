use std::{fmt, sync::Arc};

use super::{ContentFile, DataFile, DeleteFile};

/// Identifier of a snapshot. Ids increase strictly with every commit.
pub type SnapshotId = u64;

/// Data sequence number assigned by a commit, used to order deletes against data.
pub type SequenceNumber = u64;

/// Status of a file within a manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// Added by the snapshot recorded on the entry.
    Added,
    /// Carried over from an earlier snapshot.
    Existing,
    /// Removed by the snapshot recorded on the entry.
    Deleted,
}

/// One file reference inside a manifest.
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestEntry {
    /// Status relative to `snapshot_id`.
    pub status: EntryStatus,
    /// Snapshot that set the status.
    pub snapshot_id: SnapshotId,
    /// Sequence number of the commit that added the file.
    pub sequence_number: SequenceNumber,
    /// Referenced file.
    pub file: ContentFile,
}

impl ManifestEntry {
    /// Whether the file is part of the table state.
    pub fn is_live(&self) -> bool {
        self.status != EntryStatus::Deleted
    }
}

/// Ordered list of file entries, shared between snapshots that did not change it.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    id: Arc<str>,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Manifest holding `entries`.
    pub fn new(id: impl Into<Arc<str>>, entries: Vec<ManifestEntry>) -> Self {
        Self {
            id: id.into(),
            entries,
        }
    }

    /// Manifest id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All entries, including deleted ones.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Entries whose file is live.
    pub fn live_entries(&self) -> impl Iterator<Item = &ManifestEntry> + '_ {
        self.entries.iter().filter(|entry| entry.is_live())
    }
}

/// Kind of change a snapshot made.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Only added data files.
    Append,
    /// Only removed whole files.
    Delete,
    /// Removed or masked rows, possibly adding data or delete files.
    Overwrite,
    /// Rewrote files without changing table rows.
    Replace,
}

impl Operation {
    /// Lower-case name, as recorded in history.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Append => "append",
            Operation::Delete => "delete",
            Operation::Overwrite => "overwrite",
            Operation::Replace => "replace",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters describing one commit and the table state after it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Data files added.
    pub added_data_files: u64,
    /// Data files removed.
    pub deleted_data_files: u64,
    /// Delete files added.
    pub added_delete_files: u64,
    /// Delete files removed.
    pub removed_delete_files: u64,
    /// Rows in added data files.
    pub added_records: u64,
    /// Rows in removed data files.
    pub deleted_records: u64,
    /// Positions recorded by added position delete files.
    pub added_position_deletes: u64,
    /// Key tuples recorded by added equality delete files.
    pub added_equality_deletes: u64,
    /// Distinct partitions touched, counted per spec.
    pub changed_partition_count: u64,
    /// Live data files after the commit.
    pub total_data_files: u64,
    /// Live delete files after the commit.
    pub total_delete_files: u64,
    /// Rows in live data files after the commit, before applying deletes.
    pub total_records: u64,
}

/// Immutable state of a table produced by one commit.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// Snapshot id.
    pub snapshot_id: SnapshotId,
    /// Snapshot this one was derived from.
    pub parent_id: Option<SnapshotId>,
    /// Sequence number of the commit.
    pub sequence_number: SequenceNumber,
    /// Commit time in milliseconds since the epoch.
    pub timestamp_ms: u64,
    /// Kind of change.
    pub operation: Operation,
    /// Manifests listing every file of the table state.
    pub manifests: Vec<Arc<Manifest>>,
    /// Commit counters.
    pub summary: SnapshotSummary,
}

/// Live data file with the sequence number it was added at.
#[derive(Clone, Debug)]
pub struct LiveDataFile {
    /// The file.
    pub file: Arc<DataFile>,
    /// Sequence number of the commit that added it.
    pub sequence_number: SequenceNumber,
}

/// Live delete file with the sequence number it was added at.
#[derive(Clone, Debug)]
pub struct LiveDeleteFile {
    /// The file.
    pub file: Arc<DeleteFile>,
    /// Sequence number of the commit that added it.
    pub sequence_number: SequenceNumber,
}

impl Snapshot {
    /// Live data files in manifest order.
    pub fn data_files(&self) -> Vec<LiveDataFile> {
        self.live_entries()
            .filter_map(|entry| match &entry.file {
                ContentFile::Data(file) => Some(LiveDataFile {
                    file: Arc::clone(file),
                    sequence_number: entry.sequence_number,
                }),
                ContentFile::Deletes(_) => None,
            })
            .collect()
    }

    /// Live delete files in manifest order.
    pub fn delete_files(&self) -> Vec<LiveDeleteFile> {
        self.live_entries()
            .filter_map(|entry| match &entry.file {
                ContentFile::Deletes(file) => Some(LiveDeleteFile {
                    file: Arc::clone(file),
                    sequence_number: entry.sequence_number,
                }),
                ContentFile::Data(_) => None,
            })
            .collect()
    }

    /// Whether a file with `path` is live in this snapshot.
    pub fn is_live(&self, path: &str) -> bool {
        self.live_entries().any(|entry| entry.file.path().as_ref() == path)
    }

    /// Files added by this very snapshot.
    pub fn added_files(&self) -> impl Iterator<Item = &ContentFile> + '_ {
        self.manifests
            .iter()
            .flat_map(|manifest| manifest.entries())
            .filter(move |entry| {
                entry.status == EntryStatus::Added && entry.snapshot_id == self.snapshot_id
            })
            .map(|entry| &entry.file)
    }

    /// Files removed by this very snapshot.
    pub fn removed_files(&self) -> impl Iterator<Item = &ContentFile> + '_ {
        self.manifests
            .iter()
            .flat_map(|manifest| manifest.entries())
            .filter(move |entry| {
                entry.status == EntryStatus::Deleted && entry.snapshot_id == self.snapshot_id
            })
            .map(|entry| &entry.file)
    }

    fn live_entries(&self) -> impl Iterator<Item = &ManifestEntry> + '_ {
        self.manifests
            .iter()
            .flat_map(|manifest| manifest.live_entries())
    }
}
