//! Commit-time validation of a delete against concurrent commits.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use strata_predicate::Predicate;

use super::error::{ConflictKind, DeleteError, ValidationError};
use crate::{
    config::IsolationLevel,
    manifest::{
        ContentFile, DataFile, DeleteKind, Operation, SnapshotId, SnapshotProducer,
        TableMetadata,
    },
    partition::{PartitionKey, SpecId},
    pruning::file_outcomes,
    scan::FileScanTask,
};

/// Partition reached by a new equality delete file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EqualityScope {
    pub(crate) spec_id: SpecId,
    pub(crate) partition: PartitionKey,
    /// The delete's spec is unpartitioned, so it reaches every data file.
    pub(crate) global: bool,
}

impl EqualityScope {
    pub(crate) fn covers(&self, file: &DataFile) -> bool {
        self.global || (file.spec_id == self.spec_id && file.partition == self.partition)
    }
}

/// File-set delta of one delete attempt plus what validation needs to know.
#[derive(Debug)]
pub(crate) struct DeleteDelta {
    pub(crate) producer: SnapshotProducer,
    /// Data files removed or marked by new delete files.
    touched: BTreeMap<Arc<str>, Arc<DataFile>>,
    pub(crate) equality_scopes: Vec<EqualityScope>,
    pub(crate) files_read: usize,
    pub(crate) rows_deleted: u64,
}

impl DeleteDelta {
    pub(crate) fn new(operation: Operation) -> Self {
        Self {
            producer: SnapshotProducer::new(operation),
            touched: BTreeMap::new(),
            equality_scopes: Vec::new(),
            files_read: 0,
            rows_deleted: 0,
        }
    }

    pub(crate) fn remove_data(&mut self, task: &FileScanTask) {
        self.producer.remove_file(Arc::clone(&task.data_file.path));
        self.mark(task);
    }

    /// Removes the positional delete files of a data file that is going away.
    pub(crate) fn remove_positional_deletes(&mut self, task: &FileScanTask) {
        for delete in &task.deletes {
            if matches!(delete.file.kind, DeleteKind::Position { .. }) {
                self.producer.remove_file(Arc::clone(&delete.file.path));
            }
        }
    }

    pub(crate) fn mark(&mut self, task: &FileScanTask) {
        self.touched
            .insert(Arc::clone(&task.data_file.path), Arc::clone(&task.data_file));
    }

    pub(crate) fn removes(&self, path: &str) -> bool {
        self.producer.removed_paths().contains(path)
    }

    pub(crate) fn has_additions(&self) -> bool {
        !self.producer.added_data_files().is_empty()
            || !self.producer.added_delete_files().is_empty()
    }

    pub(crate) fn set_operation(&mut self, operation: Operation) {
        let mut producer = SnapshotProducer::new(operation);
        for file in self.producer.added_data_files() {
            producer.add_data_file(Arc::clone(file));
        }
        for file in self.producer.added_delete_files() {
            producer.add_delete_file(Arc::clone(file));
        }
        for path in self.producer.removed_paths() {
            producer.remove_file(Arc::clone(path));
        }
        self.producer = producer;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.producer.is_empty()
    }

    /// Validates the delta built on `base` against the commits in `current`.
    pub(crate) fn validate(
        &self,
        predicate: &Predicate,
        isolation: IsolationLevel,
        base: Option<SnapshotId>,
        current: &TableMetadata,
    ) -> Result<(), DeleteError> {
        let mut appended = BTreeSet::new();
        let mut in_scope = BTreeSet::new();
        let mut removed = BTreeSet::new();
        let mut deletes = BTreeSet::new();

        for snapshot in current.snapshots_since(base)? {
            for file in snapshot.added_files() {
                match file {
                    ContentFile::Data(data) => {
                        if isolation == IsolationLevel::Serializable
                            && file_outcomes(predicate, current, data)?.can_be_true()
                        {
                            appended.insert(data.path.to_string());
                        }
                        if self.equality_scopes.iter().any(|scope| scope.covers(data)) {
                            in_scope.insert(data.path.to_string());
                        }
                    }
                    ContentFile::Deletes(delete) => {
                        let conflicts = match &delete.kind {
                            DeleteKind::Position {
                                referenced_data_file,
                            } => self.touched.contains_key(referenced_data_file),
                            DeleteKind::Equality { .. } => {
                                let global = current.is_global_delete(delete);
                                self.touched.values().any(|data| {
                                    global
                                        || (data.spec_id == delete.spec_id
                                            && data.partition == delete.partition)
                                })
                            }
                        };
                        if conflicts {
                            deletes.insert(delete.path.to_string());
                        }
                    }
                }
            }
            for file in snapshot.removed_files() {
                let path = file.path();
                if self.touched.contains_key(path) || self.removes(path) {
                    removed.insert(path.to_string());
                }
            }
        }

        let conflict = [
            (ConflictKind::ConflictingAppend, appended),
            (ConflictKind::RemovedFiles, removed),
            (ConflictKind::ConflictingDeletes, deletes),
            (ConflictKind::EqualityScope, in_scope),
        ]
        .into_iter()
        .find(|(_, files)| !files.is_empty());
        match conflict {
            Some((kind, files)) => Err(ValidationError {
                kind,
                files: files.into_iter().collect(),
            }
            .into()),
            None => Ok(()),
        }
    }
}
