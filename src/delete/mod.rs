//! Transactional row-level deletes.
//!
//! A delete runs as plan, rewrite, validate and commit. Planning and rewriting
//! only read an immutable snapshot; the commit is a compare-and-swap on the
//! store's current pointer. A lost swap goes back to validation against the
//! winner's metadata, and a retryable conflict restarts the pipeline on the
//! newest snapshot, both within [`DeleteConfig::max_attempts`].

mod commit;
mod error;
mod executor;
mod planner;

use std::{fmt, sync::Arc};

use strata_predicate::{Predicate, PredicateError, PredicateFacts};

pub use self::{
    error::{ConflictKind, DeleteError, RewriteError, ValidationError},
    planner::NoopReason,
};
use self::{
    executor::RowRewriteExecutor,
    planner::{plan_delete, DeletePlan},
};
use crate::{
    config::{DeleteConfig, DeleteOptions},
    io::FileIo,
    logging::{strata_log, LogContext},
    manifest::{now_ms, ManifestError, Snapshot},
    pruning::PrunerRegistry,
    store::{CommitOutcome, SnapshotStore},
};

/// How a delete was carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// Nothing to delete; no snapshot was created.
    Noop(NoopReason),
    /// Whole files were dropped without reading rows.
    MetadataOnly,
    /// Candidate files were read and rewritten or marked.
    RowLevel,
}

impl fmt::Display for DeleteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteStrategy::Noop(reason) => write!(f, "noop({reason})"),
            DeleteStrategy::MetadataOnly => f.write_str("metadata_only"),
            DeleteStrategy::RowLevel => f.write_str("row_level"),
        }
    }
}

/// Result of a successful delete.
#[derive(Clone, Debug)]
pub struct DeleteOutcome {
    /// Snapshot created by the delete, `None` for a no-op.
    pub snapshot: Option<Arc<Snapshot>>,
    /// Strategy of the attempt that committed.
    pub strategy: DeleteStrategy,
    /// Commit attempts made, the successful one included.
    pub attempts: u32,
    /// Data files read by the committed attempt.
    pub files_read: usize,
    /// Live rows removed by row-level evaluation.
    pub rows_deleted: u64,
}

impl DeleteOutcome {
    fn noop(reason: NoopReason, attempts: u32) -> Self {
        Self {
            snapshot: None,
            strategy: DeleteStrategy::Noop(reason),
            attempts,
            files_read: 0,
            rows_deleted: 0,
        }
    }
}

/// Rejects non-deterministic predicates and columns `has_column` does not know.
fn check_predicate(
    predicate: &Predicate,
    has_column: impl Fn(&str) -> bool,
) -> Result<PredicateFacts, DeleteError> {
    let facts = PredicateFacts::collect(predicate);
    if !facts.is_deterministic() {
        return Err(DeleteError::UnsupportedPredicate {
            functions: facts.non_deterministic,
        });
    }
    if let Some(missing) = facts.columns.iter().find(|name| !has_column(name)) {
        return Err(PredicateError::UnknownColumn(missing.clone()).into());
    }
    Ok(facts)
}

/// Deletes every row of `table` matching `predicate`.
pub(crate) async fn execute_delete(
    store: &dyn SnapshotStore,
    io: &dyn FileIo,
    table: &str,
    predicate: &Predicate,
    options: &DeleteOptions,
) -> Result<DeleteOutcome, DeleteError> {
    let ctx = LogContext::for_table(table);
    let mut metadata = store.load(table).await?;
    let facts = check_predicate(predicate, |name| {
        metadata.schema().index_of(name).is_some()
    })?;
    let config = DeleteConfig::resolve(metadata.schema(), metadata.properties(), options)?;
    let max_attempts = config.max_attempts();
    let pruners = PrunerRegistry::new(config.pruner);

    let mut attempts = 0u32;
    let mut last_conflict: Option<ValidationError> = None;
    'plan: loop {
        let base = metadata.current_snapshot().cloned();
        let file_plan = match plan_delete(predicate, &metadata, base.as_deref(), pruners).await? {
            DeletePlan::Noop(reason) => {
                strata_log!(
                    log::Level::Debug,
                    ctx: &ctx,
                    "delete_noop",
                    "reason={} snapshot_id={:?}",
                    reason,
                    metadata.current_snapshot_id()
                );
                return Ok(DeleteOutcome::noop(reason, attempts));
            }
            DeletePlan::Files(plan) => plan,
        };
        let Some(snapshot) = base else {
            return Err(ManifestError::Invariant("planned files without a snapshot").into());
        };
        let strategy = if file_plan.rewrite.is_empty() {
            DeleteStrategy::MetadataOnly
        } else {
            DeleteStrategy::RowLevel
        };
        strata_log!(
            log::Level::Debug,
            ctx: &ctx,
            "delete_planned",
            "snapshot_id={} strategy={} drop={} rewrite={} full_table={}",
            snapshot.snapshot_id,
            strategy,
            file_plan.drop.len(),
            file_plan.rewrite.len(),
            file_plan.full_table
        );

        let executor = RowRewriteExecutor {
            io,
            metadata: &metadata,
            snapshot: &snapshot,
            predicate,
            config: &config,
            uses_subquery: facts.uses_subquery,
        };
        let delta = executor.execute(file_plan).await.inspect_err(|err| {
            strata_log!(
                log::Level::Warn,
                ctx: &ctx,
                "delete_rewrite_failed",
                "snapshot_id={} error={}",
                snapshot.snapshot_id,
                err
            );
        })?;
        if delta.is_empty() {
            return Ok(DeleteOutcome::noop(NoopReason::NoMatchingRows, attempts));
        }

        let base_id = Some(snapshot.snapshot_id);
        let mut current = Arc::clone(&metadata);
        loop {
            if attempts >= max_attempts {
                strata_log!(
                    log::Level::Warn,
                    ctx: &ctx,
                    "delete_retries_exhausted",
                    "attempts={}",
                    attempts
                );
                return Err(match last_conflict {
                    Some(conflict) => conflict.into(),
                    None => DeleteError::CommitFailed { attempts },
                });
            }
            attempts += 1;

            let produced = delta
                .validate(predicate, config.isolation_level, base_id, &current)
                .and_then(|()| Ok(delta.producer.produce(&current, now_ms())?));
            let next = match produced {
                Ok(next) => next,
                Err(DeleteError::Validation(conflict)) if conflict.is_retryable() => {
                    strata_log!(
                        log::Level::Info,
                        ctx: &ctx,
                        "delete_conflict",
                        "attempt={} base={:?} error={}",
                        attempts,
                        base_id,
                        conflict
                    );
                    last_conflict = Some(conflict);
                    metadata = store.load(table).await?;
                    continue 'plan;
                }
                Err(DeleteError::Manifest(ManifestError::NotLive { paths })) => {
                    let conflict = ValidationError {
                        kind: ConflictKind::RemovedFiles,
                        files: paths,
                    };
                    strata_log!(
                        log::Level::Info,
                        ctx: &ctx,
                        "delete_conflict",
                        "attempt={} base={:?} error={}",
                        attempts,
                        base_id,
                        conflict
                    );
                    last_conflict = Some(conflict);
                    metadata = store.load(table).await?;
                    continue 'plan;
                }
                Err(err) => return Err(err),
            };

            let expected = current.current_snapshot_id();
            match store.try_commit(table, expected, next).await? {
                CommitOutcome::Committed(committed) => {
                    let snapshot = committed.current_snapshot().cloned();
                    strata_log!(
                        log::Level::Info,
                        ctx: &ctx,
                        "delete_committed",
                        "snapshot_id={:?} strategy={} attempts={} files_read={} rows_deleted={}",
                        snapshot.as_ref().map(|snapshot| snapshot.snapshot_id),
                        strategy,
                        attempts,
                        delta.files_read,
                        delta.rows_deleted
                    );
                    return Ok(DeleteOutcome {
                        snapshot,
                        strategy,
                        attempts,
                        files_read: delta.files_read,
                        rows_deleted: delta.rows_deleted,
                    });
                }
                CommitOutcome::Conflict { current: winner } => {
                    let race = DeleteError::CommitRace {
                        expected,
                        found: winner.current_snapshot_id(),
                    };
                    strata_log!(
                        log::Level::Info,
                        ctx: &ctx,
                        "delete_commit_race",
                        "attempt={} error={}",
                        attempts,
                        race
                    );
                    last_conflict = None;
                    current = winner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_predicate::{ColumnRef, PredicateBuilder, ScalarValue};

    use super::*;

    #[test]
    fn rejects_non_deterministic_and_unknown_columns() {
        let random = PredicateBuilder::and()
            .equals(ColumnRef::new("id"), ScalarValue::from(1i64))
            .non_deterministic("rand")
            .build();
        match check_predicate(&random, |_| true) {
            Err(DeleteError::UnsupportedPredicate { functions }) => {
                assert_eq!(functions, vec!["rand".to_string()])
            }
            other => panic!("unexpected {other:?}"),
        }

        let unknown = PredicateBuilder::leaf()
            .is_null(ColumnRef::new("missing"))
            .build();
        assert!(matches!(
            check_predicate(&unknown, |name| name == "id"),
            Err(DeleteError::Predicate(PredicateError::UnknownColumn(name))) if name == "missing"
        ));
    }
}
