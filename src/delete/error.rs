use std::fmt;

use strata_predicate::PredicateError;
use thiserror::Error;

use crate::{
    config::ConfigError,
    io::IoError,
    manifest::{ManifestError, SnapshotId},
    partition::PartitionError,
    store::StoreError,
};

/// Failure while evaluating rows or writing replacement files.
///
/// Files written before the failure are never referenced by a snapshot.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The predicate could not be evaluated on a row.
    #[error("evaluating predicate on `{path}`: {source}")]
    Predicate {
        /// Data file being evaluated.
        path: String,
        /// Evaluation failure.
        #[source]
        source: PredicateError,
    },
    /// Reading or writing a file failed.
    #[error("rewrite io error: {0}")]
    Io(#[from] IoError),
    /// Surviving rows could not be assigned to a partition.
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Table metadata is inconsistent with the snapshot being rewritten.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Why a commit was refused by validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    /// Concurrently added data files may hold rows matching the predicate.
    ConflictingAppend,
    /// Concurrently added data files fall in the scope of new equality deletes.
    EqualityScope,
    /// Files this delete read or removed were removed concurrently.
    RemovedFiles,
    /// Concurrent delete files target files this delete rewrote or marked.
    ConflictingDeletes,
}

impl ConflictKind {
    /// Whether re-planning against the newer snapshot can resolve the conflict.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ConflictKind::ConflictingAppend)
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictKind::ConflictingAppend => "found conflicting files that can contain rows matching the delete predicate",
            ConflictKind::EqualityScope => "found new data files in the scope of equality deletes",
            ConflictKind::RemovedFiles => "files read by the delete were removed concurrently",
            ConflictKind::ConflictingDeletes => "found concurrent delete files for rewritten data files",
        })
    }
}

/// Isolation-level conflict, naming the files involved.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: [{}]", files.join(", "))]
pub struct ValidationError {
    /// What was violated.
    pub kind: ConflictKind,
    /// Conflicting file paths.
    pub files: Vec<String>,
}

impl ValidationError {
    /// Whether re-planning can resolve the conflict.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Errors surfaced by a delete.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// The predicate calls a non-deterministic function.
    #[error("non-deterministic predicates are not supported: {}", functions.join(", "))]
    UnsupportedPredicate {
        /// Offending functions.
        functions: Vec<String>,
    },
    /// The predicate does not fit the table schema.
    #[error("invalid predicate: {0}")]
    Predicate(#[from] PredicateError),
    /// Row evaluation or file writing failed.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    /// Commit validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The pointer swap lost to another committer.
    #[error("commit raced: expected parent {expected:?}, found {found:?}")]
    CommitRace {
        /// Parent the snapshot was built on.
        expected: Option<SnapshotId>,
        /// Current snapshot at swap time.
        found: Option<SnapshotId>,
    },
    /// Every commit attempt lost the race.
    #[error("commit failed after {attempts} attempts")]
    CommitFailed {
        /// Attempts made.
        attempts: u32,
    },
    /// Snapshot store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Table metadata is inconsistent.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Delete configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
