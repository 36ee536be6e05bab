//! Classifies a delete as a no-op, a metadata-only delete or a row rewrite.

use std::fmt;

use strata_predicate::Predicate;

use crate::{
    manifest::{ManifestError, Snapshot, TableMetadata},
    pruning::{file_outcomes, PrunerRegistry},
    scan::{plan_files, FileScanTask},
};

/// Why a delete did not produce a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoopReason {
    /// The predicate can never be true.
    StaticallyFalse,
    /// The table has no live data files.
    EmptyTable,
    /// No file can hold a matching row.
    NoCandidates,
    /// Candidate files were read and no live row matched.
    NoMatchingRows,
}

impl fmt::Display for NoopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NoopReason::StaticallyFalse => "statically_false",
            NoopReason::EmptyTable => "empty_table",
            NoopReason::NoCandidates => "no_candidates",
            NoopReason::NoMatchingRows => "no_matching_rows",
        })
    }
}

/// Files a delete acts on.
#[derive(Clone, Debug, Default)]
pub(crate) struct FilePlan {
    /// Files whose every row matches; dropped without reading.
    pub(crate) drop: Vec<FileScanTask>,
    /// Files that must be read and evaluated row by row.
    pub(crate) rewrite: Vec<FileScanTask>,
    /// The predicate holds for every row; every data and delete file goes.
    pub(crate) full_table: bool,
}

/// Planner decision.
#[derive(Clone, Debug)]
pub(crate) enum DeletePlan {
    Noop(NoopReason),
    Files(FilePlan),
}

/// Plans a delete of `predicate` against `snapshot`.
pub(crate) async fn plan_delete(
    predicate: &Predicate,
    metadata: &TableMetadata,
    snapshot: Option<&Snapshot>,
    pruners: PrunerRegistry,
) -> Result<DeletePlan, ManifestError> {
    let outcomes = predicate.static_outcomes();
    if !outcomes.can_be_true() {
        return Ok(DeletePlan::Noop(NoopReason::StaticallyFalse));
    }
    let Some(snapshot) = snapshot.filter(|snapshot| snapshot.summary.total_data_files > 0) else {
        return Ok(DeletePlan::Noop(NoopReason::EmptyTable));
    };
    if outcomes.is_always_true() {
        return Ok(DeletePlan::Files(FilePlan {
            drop: plan_files(metadata, snapshot),
            rewrite: Vec::new(),
            full_table: true,
        }));
    }

    let mut plan = FilePlan::default();
    for task in pruners.prune_or_all(predicate, metadata, snapshot).await {
        let outcomes = file_outcomes(predicate, metadata, &task.data_file)?;
        if outcomes.is_always_true() {
            plan.drop.push(task);
        } else if outcomes.can_be_true() {
            plan.rewrite.push(task);
        }
    }
    if plan.drop.is_empty() && plan.rewrite.is_empty() {
        return Ok(DeletePlan::Noop(NoopReason::NoCandidates));
    }
    Ok(DeletePlan::Files(plan))
}
