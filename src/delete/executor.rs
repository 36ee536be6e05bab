//! Row-level rewrite of candidate files.
//!
//! Each candidate file is read and evaluated independently; results are
//! merged in candidate order so the produced delta does not depend on
//! completion order.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use futures_util::future::try_join_all;
use strata_predicate::{BitmapRowSet, Predicate, RowSet, Truth};

use super::{
    commit::{DeleteDelta, EqualityScope},
    error::RewriteError,
    planner::FilePlan,
};
use crate::{
    config::{DeleteConfig, DeleteMode},
    io::{FileIo, WriteRequest},
    manifest::{Operation, Snapshot, TableMetadata},
    partition::{PartitionKey, SpecId},
    scan::{read_task, FileScanTask, TaskRows},
    schema::Row,
};

/// Per-file choice between rewriting and marking rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum RowDeleteStrategy {
    CopyOnWrite,
    MergeOnRead,
    Adaptive { ratio: f64 },
}

impl DeleteMode {
    /// Build the per-file strategy for this mode.
    pub(crate) fn build(self, ratio: f64) -> RowDeleteStrategy {
        match self {
            DeleteMode::CopyOnWrite => RowDeleteStrategy::CopyOnWrite,
            DeleteMode::MergeOnRead => RowDeleteStrategy::MergeOnRead,
            DeleteMode::Adaptive => RowDeleteStrategy::Adaptive { ratio },
        }
    }
}

/// What happens to one evaluated file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileAction {
    Untouched,
    Drop,
    CopyOnWrite,
    MergeOnRead,
}

impl RowDeleteStrategy {
    fn choose(self, matched: usize, live: usize) -> FileAction {
        if matched == 0 {
            return FileAction::Untouched;
        }
        if matched >= live {
            return FileAction::Drop;
        }
        match self {
            RowDeleteStrategy::CopyOnWrite => FileAction::CopyOnWrite,
            RowDeleteStrategy::MergeOnRead => FileAction::MergeOnRead,
            RowDeleteStrategy::Adaptive { ratio } => {
                if matched as f64 / live as f64 >= ratio {
                    FileAction::CopyOnWrite
                } else {
                    FileAction::MergeOnRead
                }
            }
        }
    }
}

struct EvaluatedFile {
    task: FileScanTask,
    rows: TaskRows,
    matched: BitmapRowSet,
    action: FileAction,
}

impl EvaluatedFile {
    fn survivors(&self) -> impl Iterator<Item = &Row> + '_ {
        self.rows
            .live()
            .filter(|(position, _)| !self.matched.contains(*position))
            .map(|(_, row)| row)
    }

    fn matched_rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.rows
            .live()
            .filter(|(position, _)| self.matched.contains(*position))
            .map(|(_, row)| row)
    }
}

/// Applies a [`FilePlan`] and collects the resulting file-set delta.
pub(crate) struct RowRewriteExecutor<'a> {
    pub(crate) io: &'a dyn FileIo,
    pub(crate) metadata: &'a TableMetadata,
    pub(crate) snapshot: &'a Snapshot,
    pub(crate) predicate: &'a Predicate,
    pub(crate) config: &'a DeleteConfig,
    pub(crate) uses_subquery: bool,
}

impl RowRewriteExecutor<'_> {
    pub(crate) async fn execute(&self, plan: FilePlan) -> Result<DeleteDelta, RewriteError> {
        let mut delta = DeleteDelta::new(Operation::Delete);
        if plan.full_table {
            for task in &plan.drop {
                delta.remove_data(task);
            }
            for delete in self.snapshot.delete_files() {
                delta.producer.remove_file(Arc::clone(&delete.file.path));
            }
            return Ok(delta);
        }
        for task in &plan.drop {
            delta.remove_data(task);
            delta.remove_positional_deletes(task);
        }
        if plan.rewrite.is_empty() {
            return Ok(delta);
        }

        let strategy = self.config.mode.build(self.config.adaptive_ratio);
        let evaluated = try_join_all(
            plan.rewrite
                .into_iter()
                .map(|task| self.evaluate(task, strategy)),
        )
        .await?;
        delta.files_read = evaluated.len();

        let mut survivors: BTreeMap<PartitionKey, Vec<Row>> = BTreeMap::new();
        let mut marked: BTreeMap<(SpecId, PartitionKey), Vec<usize>> = BTreeMap::new();
        let default_spec = self.metadata.default_spec()?;
        let schema = self.metadata.schema();
        for (index, file) in evaluated.iter().enumerate() {
            delta.rows_deleted += file.matched.len() as u64;
            match file.action {
                FileAction::Untouched => {}
                FileAction::Drop => {
                    delta.remove_data(&file.task);
                    delta.remove_positional_deletes(&file.task);
                }
                FileAction::CopyOnWrite => {
                    delta.remove_data(&file.task);
                    delta.remove_positional_deletes(&file.task);
                    for row in file.survivors() {
                        let key = default_spec.partition_key(schema, row)?;
                        survivors.entry(key).or_default().push(row.clone());
                    }
                }
                FileAction::MergeOnRead => marked
                    .entry((file.task.data_file.spec_id, file.task.data_file.partition.clone()))
                    .or_default()
                    .push(index),
            }
        }

        let written = try_join_all(survivors.into_iter().map(|(partition, rows)| {
            self.io.write_rows(
                WriteRequest {
                    schema,
                    spec: default_spec,
                    partition,
                    rows,
                },
                &self.config.sizing,
            )
        }))
        .await?;
        for file in written.into_iter().flatten() {
            delta.producer.add_data_file(Arc::new(file));
        }

        for ((spec_id, partition), members) in marked {
            let scope = EqualityScope {
                spec_id,
                partition,
                global: self.metadata.spec(spec_id)?.is_unpartitioned(),
            };
            match self.equality_keys(&scope, &members, &evaluated, &delta) {
                Some(keys) => {
                    let spec = self.metadata.spec(spec_id)?;
                    let file = self
                        .io
                        .write_equality_deletes(
                            schema,
                            spec,
                            scope.partition.clone(),
                            self.config.equality_columns.clone(),
                            keys,
                        )
                        .await?;
                    for &index in &members {
                        delta.mark(&evaluated[index].task);
                    }
                    delta.producer.add_delete_file(Arc::new(file));
                    delta.equality_scopes.push(scope);
                }
                None => {
                    for &index in &members {
                        let file = &evaluated[index];
                        let deletes = self
                            .io
                            .write_position_deletes(&file.task.data_file, file.matched.clone())
                            .await?;
                        delta.mark(&file.task);
                        delta.producer.add_delete_file(Arc::new(deletes));
                    }
                }
            }
        }

        if delta.has_additions() {
            delta.set_operation(Operation::Overwrite);
        }
        Ok(delta)
    }

    async fn evaluate(
        &self,
        task: FileScanTask,
        strategy: RowDeleteStrategy,
    ) -> Result<EvaluatedFile, RewriteError> {
        let schema = self.metadata.schema();
        let rows = read_task(self.io, schema, &task).await?;
        let mut matched = BitmapRowSet::new();
        let mut live = 0;
        for (position, row) in rows.live() {
            live += 1;
            let truth = self
                .predicate
                .evaluate(&schema.view(row))
                .map_err(|source| RewriteError::Predicate {
                    path: task.data_file.path.to_string(),
                    source,
                })?;
            if truth == Truth::True {
                matched.insert(position);
            }
        }
        let action = strategy.choose(matched.len(), live);
        Ok(EvaluatedFile {
            task,
            rows,
            matched,
            action,
        })
    }

    /// Key tuples for one equality delete covering `members`, when such a
    /// delete removes exactly the matched rows of its scope.
    fn equality_keys(
        &self,
        scope: &EqualityScope,
        members: &[usize],
        evaluated: &[EvaluatedFile],
        delta: &DeleteDelta,
    ) -> Option<Vec<Row>> {
        if !self.uses_subquery || self.config.equality_columns.is_empty() {
            return None;
        }
        let schema = self.metadata.schema();
        let columns = &self.config.equality_columns;

        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        for &index in members {
            for row in evaluated[index].matched_rows() {
                let key = schema.project(row, columns).ok()?;
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }

        // Every other row the delete would reach must carry a different key.
        for data in self.snapshot.data_files() {
            if !scope.covers(&data.file) || delta.removes(&data.file.path) {
                continue;
            }
            let file = evaluated
                .iter()
                .find(|file| file.task.data_file.path == data.file.path)?;
            for row in file.survivors() {
                if seen.contains(&schema.project(row, columns).ok()?) {
                    return None;
                }
            }
        }
        Some(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_switches_on_ratio() {
        let strategy = DeleteMode::Adaptive.build(0.5);
        assert_eq!(strategy.choose(0, 10), FileAction::Untouched);
        assert_eq!(strategy.choose(2, 10), FileAction::MergeOnRead);
        assert_eq!(strategy.choose(5, 10), FileAction::CopyOnWrite);
        assert_eq!(strategy.choose(10, 10), FileAction::Drop);
        assert_eq!(
            DeleteMode::MergeOnRead.build(0.0).choose(9, 10),
            FileAction::MergeOnRead
        );
    }
}
