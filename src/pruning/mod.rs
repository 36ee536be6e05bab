//! Pruning boundary of the delete path.
//!
//! A [`FilePruner`] maps a predicate and a snapshot to the data files that
//! might hold matching rows. Pruners may keep files that turn out not to match
//! but must never drop one that does; when a pruner fails, the registry falls
//! back to every live file.

mod metrics;
mod noop;

use std::{fmt, str::FromStr};

use futures_util::future::BoxFuture;
use strata_predicate::Predicate;
use thiserror::Error;

pub use self::{metrics::MetricsPruner, noop::NoopPruner};
pub(crate) use metrics::file_outcomes;
use crate::{
    logging::strata_log,
    manifest::{ManifestError, Snapshot, TableMetadata},
    scan::{plan_files, FileScanTask},
};

/// Errors raised by pruning implementations.
#[derive(Debug, Error)]
pub enum PruneError {
    /// Table metadata is inconsistent with the snapshot.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Generic pruning failure.
    #[error("pruning failed: {0}")]
    Message(String),
}

impl PruneError {
    /// Construct a pruning error from a message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// Future returned by [`FilePruner::prune`].
pub type PruneFuture<'a> = BoxFuture<'a, Result<Vec<FileScanTask>, PruneError>>;

/// Maps a predicate to the candidate files of a snapshot.
pub trait FilePruner: Send + Sync {
    /// Files of `snapshot` that could contain a row matching `predicate`.
    fn prune<'a>(
        &'a self,
        predicate: &'a Predicate,
        metadata: &'a TableMetadata,
        snapshot: &'a Snapshot,
    ) -> PruneFuture<'a>;
}

/// Selects the pruning implementation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrunerKind {
    /// Partition values and column statistics.
    #[default]
    Metrics,
    /// Keeps every live file.
    Noop,
}

impl PrunerKind {
    /// Property value naming this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            PrunerKind::Metrics => "metrics",
            PrunerKind::Noop => "noop",
        }
    }
}

impl fmt::Display for PrunerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrunerKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "metrics" => Ok(PrunerKind::Metrics),
            "noop" => Ok(PrunerKind::Noop),
            other => Err(format!("unknown pruner `{other}`")),
        }
    }
}

/// Registry/factory for pruning implementations.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrunerRegistry {
    kind: PrunerKind,
}

impl PrunerRegistry {
    /// Registry resolving to `kind`.
    pub fn new(kind: PrunerKind) -> Self {
        Self { kind }
    }

    /// Run the selected pruner, falling back to every live file on errors.
    pub async fn prune_or_all(
        &self,
        predicate: &Predicate,
        metadata: &TableMetadata,
        snapshot: &Snapshot,
    ) -> Vec<FileScanTask> {
        let result = match self.kind {
            PrunerKind::Metrics => MetricsPruner.prune(predicate, metadata, snapshot).await,
            PrunerKind::Noop => NoopPruner.prune(predicate, metadata, snapshot).await,
        };
        result.unwrap_or_else(|err| {
            strata_log!(
                log::Level::Warn,
                "prune_fallback",
                "snapshot_id={} pruner={} error={}",
                snapshot.snapshot_id,
                self.kind,
                err
            );
            plan_files(metadata, snapshot)
        })
    }
}
