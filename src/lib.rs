#![deny(missing_docs)]
//! Transactional row-level deletes over versioned, immutable tables.
//!
//! A table is a chain of snapshots, each listing immutable data and delete
//! files through shared manifests. [`Table::delete`] removes the rows matching
//! a predicate by dropping whole files where metadata proves every row
//! matches, and otherwise rewriting files (copy-on-write) or recording deleted
//! rows in delete files (merge-on-read). The result is published with a
//! compare-and-swap on the store's current pointer after checking the
//! concurrent commits it raced with against the configured isolation level.

pub(crate) mod logging;

/// Delete configuration resolved from table properties and per-call options.
pub mod config;

/// Delete planning, row rewriting and optimistic commit.
pub mod delete;

/// ULID file identifiers.
pub mod id;

/// File readers and writers used by scans and deletes.
pub mod io;

/// Snapshots, manifests and content files.
pub mod manifest;

/// Partition specs and transforms.
pub mod partition;

/// Candidate file selection.
pub mod pruning;

/// Scan planning and delete reconciliation.
pub mod scan;

/// Table schema and rows.
pub mod schema;

/// Current-pointer storage for table metadata.
pub mod store;

mod table;

pub use strata_predicate as predicate;

pub use crate::{
    config::{DeleteConfig, DeleteMode, DeleteOptions, IsolationLevel},
    delete::{
        ConflictKind, DeleteError, DeleteOutcome, DeleteStrategy, NoopReason, RewriteError,
        ValidationError,
    },
    io::{FileIo, MemoryFileIo},
    manifest::{Snapshot, SnapshotId, TableMetadata},
    partition::{PartitionField, PartitionSpec, Transform},
    pruning::PrunerKind,
    schema::{Column, DataType, Row, TableSchema},
    store::{MemorySnapshotStore, SnapshotStore},
    table::{Table, TableBuilder, TableError},
};
