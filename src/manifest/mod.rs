//! Snapshot, manifest and file descriptors making up a table's versioned state.
//!
//! Everything here is an immutable value. A commit builds the next
//! [`TableMetadata`] with [`SnapshotProducer`] and hands it to the snapshot
//! store, which swaps it in atomically.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::partition::SpecId;

mod file;
mod metadata;
mod producer;
mod snapshot;

pub use file::{ColumnStats, ContentFile, DataFile, DeleteFile, DeleteKind, FileFormat};
pub use metadata::TableMetadata;
pub use producer::SnapshotProducer;
pub use snapshot::{
    EntryStatus, LiveDataFile, LiveDeleteFile, Manifest, ManifestEntry, Operation,
    SequenceNumber, Snapshot, SnapshotId, SnapshotSummary,
};

/// Error type surfaced by the manifest layer.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No spec with this id was ever registered.
    #[error("unknown partition spec {0}")]
    UnknownSpec(SpecId),
    /// No snapshot with this id exists in the table history.
    #[error("unknown snapshot {0}")]
    UnknownSnapshot(SnapshotId),
    /// The base snapshot is not an ancestor of the current snapshot.
    #[error("snapshot {0:?} is not an ancestor of the current snapshot")]
    NotAncestor(Option<SnapshotId>),
    /// Files scheduled for removal are no longer live.
    #[error("files are no longer live: {}", paths.join(", "))]
    NotLive {
        /// Missing paths.
        paths: Vec<String>,
    },
    /// An added file reuses the path of a live file.
    #[error("file `{0}` is already live")]
    DuplicateFile(String),
    /// Invariant violation detected while building metadata.
    #[error("invariant violation: {0}")]
    Invariant(&'static str),
}

/// Convenience result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Commit timestamp in milliseconds since the epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}
