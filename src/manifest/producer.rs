use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use super::{
    ContentFile, DataFile, DeleteFile, DeleteKind, EntryStatus, Manifest, ManifestEntry,
    ManifestError, Operation, Snapshot, SnapshotSummary, TableMetadata,
};
use crate::partition::{PartitionKey, SpecId};

/// Collects a file-set delta and turns it into the next snapshot of a table.
///
/// The producer is cheap to keep around: [`SnapshotProducer::produce`] can be
/// called again against a newer base when a commit has to be retried.
#[derive(Clone, Debug)]
pub struct SnapshotProducer {
    operation: Operation,
    added_data: Vec<Arc<DataFile>>,
    added_deletes: Vec<Arc<DeleteFile>>,
    removed: BTreeSet<Arc<str>>,
}

impl SnapshotProducer {
    /// Empty delta for `operation`.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            added_data: Vec::new(),
            added_deletes: Vec::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Operation recorded on the produced snapshot.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Adds a data file.
    pub fn add_data_file(&mut self, file: Arc<DataFile>) {
        self.added_data.push(file);
    }

    /// Adds a delete file.
    pub fn add_delete_file(&mut self, file: Arc<DeleteFile>) {
        self.added_deletes.push(file);
    }

    /// Removes the live data or delete file at `path`.
    pub fn remove_file(&mut self, path: Arc<str>) {
        self.removed.insert(path);
    }

    /// Data files being added.
    pub fn added_data_files(&self) -> &[Arc<DataFile>] {
        &self.added_data
    }

    /// Delete files being added.
    pub fn added_delete_files(&self) -> &[Arc<DeleteFile>] {
        &self.added_deletes
    }

    /// Paths being removed.
    pub fn removed_paths(&self) -> &BTreeSet<Arc<str>> {
        &self.removed
    }

    /// True when committing would not change the table.
    pub fn is_empty(&self) -> bool {
        self.added_data.is_empty() && self.added_deletes.is_empty() && self.removed.is_empty()
    }

    /// Builds the snapshot following the current snapshot of `base`.
    ///
    /// Fails with [`ManifestError::NotLive`] when a removed path is not live
    /// in `base`, so a producer can be safely replayed against newer metadata.
    pub fn produce(
        &self,
        base: &TableMetadata,
        timestamp_ms: u64,
    ) -> Result<Snapshot, ManifestError> {
        let snapshot_id = base.next_snapshot_id();
        let sequence_number = base.next_sequence_number();
        let parent = base.current_snapshot();

        let mut summary = SnapshotSummary::default();
        let mut changed_partitions = HashSet::<(SpecId, PartitionKey)>::new();
        let mut found = BTreeSet::new();
        let mut live_paths = HashSet::new();
        let mut manifests = Vec::new();
        let mut manifest_seq = 0usize;
        let mut next_manifest_id = || {
            manifest_seq += 1;
            format!("snap-{snapshot_id}-m{manifest_seq}")
        };

        for manifest in parent.iter().flat_map(|parent| parent.manifests.iter()) {
            let touched = manifest
                .live_entries()
                .any(|entry| self.removed.contains(entry.file.path()));
            if !touched {
                if manifest.live_entries().next().is_some() {
                    live_paths.extend(manifest.live_entries().map(|e| Arc::clone(e.file.path())));
                    manifests.push(Arc::clone(manifest));
                }
                continue;
            }

            let mut entries = Vec::with_capacity(manifest.entries().len());
            for entry in manifest.live_entries() {
                let path = entry.file.path();
                if self.removed.contains(path) {
                    found.insert(Arc::clone(path));
                    changed_partitions.insert((entry.file.spec_id(), entry.file.partition().clone()));
                    match &entry.file {
                        ContentFile::Data(file) => {
                            summary.deleted_data_files += 1;
                            summary.deleted_records += file.record_count;
                        }
                        ContentFile::Deletes(_) => summary.removed_delete_files += 1,
                    }
                    entries.push(ManifestEntry {
                        status: EntryStatus::Deleted,
                        snapshot_id,
                        sequence_number: entry.sequence_number,
                        file: entry.file.clone(),
                    });
                } else {
                    live_paths.insert(Arc::clone(path));
                    entries.push(ManifestEntry {
                        status: EntryStatus::Existing,
                        ..entry.clone()
                    });
                }
            }
            manifests.push(Arc::new(Manifest::new(next_manifest_id(), entries)));
        }

        if found.len() != self.removed.len() {
            let paths = self
                .removed
                .difference(&found)
                .map(|path| path.to_string())
                .collect();
            return Err(ManifestError::NotLive { paths });
        }

        let added_entry = |file: ContentFile| ManifestEntry {
            status: EntryStatus::Added,
            snapshot_id,
            sequence_number,
            file,
        };
        let mut check_new = |path: &Arc<str>| {
            if live_paths.insert(Arc::clone(path)) {
                Ok(())
            } else {
                Err(ManifestError::DuplicateFile(path.to_string()))
            }
        };

        if !self.added_data.is_empty() {
            let mut entries = Vec::with_capacity(self.added_data.len());
            for file in &self.added_data {
                base.spec(file.spec_id)?;
                check_new(&file.path)?;
                summary.added_data_files += 1;
                summary.added_records += file.record_count;
                changed_partitions.insert((file.spec_id, file.partition.clone()));
                entries.push(added_entry(ContentFile::Data(Arc::clone(file))));
            }
            manifests.push(Arc::new(Manifest::new(next_manifest_id(), entries)));
        }
        if !self.added_deletes.is_empty() {
            let mut entries = Vec::with_capacity(self.added_deletes.len());
            for file in &self.added_deletes {
                base.spec(file.spec_id)?;
                check_new(&file.path)?;
                summary.added_delete_files += 1;
                match file.kind {
                    DeleteKind::Position { .. } => {
                        summary.added_position_deletes += file.record_count
                    }
                    DeleteKind::Equality { .. } => {
                        summary.added_equality_deletes += file.record_count
                    }
                }
                changed_partitions.insert((file.spec_id, file.partition.clone()));
                entries.push(added_entry(ContentFile::Deletes(Arc::clone(file))));
            }
            manifests.push(Arc::new(Manifest::new(next_manifest_id(), entries)));
        }

        summary.changed_partition_count = changed_partitions.len() as u64;
        for entry in manifests.iter().flat_map(|manifest| manifest.live_entries()) {
            match &entry.file {
                ContentFile::Data(file) => {
                    summary.total_data_files += 1;
                    summary.total_records += file.record_count;
                }
                ContentFile::Deletes(_) => summary.total_delete_files += 1,
            }
        }

        Ok(Snapshot {
            snapshot_id,
            parent_id: base.current_snapshot_id(),
            sequence_number,
            timestamp_ms,
            operation: self.operation,
            manifests,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        manifest::FileFormat,
        partition::PartitionSpec,
        schema::{Column, DataType, TableSchema},
    };

    fn metadata() -> TableMetadata {
        let schema = TableSchema::new(vec![Column::new("id", DataType::Int64)]).unwrap();
        TableMetadata::new("t", schema, PartitionSpec::unpartitioned(0), BTreeMap::new())
    }

    fn data_file(path: &str, rows: u64) -> Arc<DataFile> {
        Arc::new(DataFile {
            path: path.into(),
            spec_id: 0,
            partition: PartitionKey::empty(),
            record_count: rows,
            size_bytes: rows * 8,
            format: FileFormat::Arrow,
            column_stats: BTreeMap::new(),
        })
    }

    fn commit(base: &TableMetadata, producer: &SnapshotProducer) -> TableMetadata {
        let snapshot = producer.produce(base, 0).unwrap();
        base.with_snapshot(snapshot).unwrap()
    }

    #[test]
    fn removal_rewrites_only_touched_manifests() {
        let mut append = SnapshotProducer::new(Operation::Append);
        append.add_data_file(data_file("a", 2));
        let table = commit(&metadata(), &append);

        let mut append = SnapshotProducer::new(Operation::Append);
        append.add_data_file(data_file("b", 3));
        let table = commit(&table, &append);
        let untouched = Arc::clone(&table.current_snapshot().unwrap().manifests[1]);

        let mut delete = SnapshotProducer::new(Operation::Delete);
        delete.remove_file("a".into());
        let table = commit(&table, &delete);

        let snapshot = table.current_snapshot().unwrap();
        assert_eq!(snapshot.sequence_number, 3);
        assert_eq!(snapshot.parent_id, Some(2));
        assert!(snapshot.manifests.iter().any(|m| Arc::ptr_eq(m, &untouched)));
        assert!(!snapshot.is_live("a"));
        assert!(snapshot.is_live("b"));
        let removed: Vec<_> = snapshot.removed_files().map(|f| f.path().to_string()).collect();
        assert_eq!(removed, vec!["a".to_string()]);
        assert_eq!(snapshot.summary.deleted_data_files, 1);
        assert_eq!(snapshot.summary.deleted_records, 2);
        assert_eq!(snapshot.summary.total_records, 3);
        assert_eq!(snapshot.summary.total_data_files, 1);

        // The manifest holding only the deleted entry is not carried further.
        let mut append = SnapshotProducer::new(Operation::Append);
        append.add_data_file(data_file("c", 1));
        let table = commit(&table, &append);
        assert_eq!(table.current_snapshot().unwrap().manifests.len(), 2);
        assert_eq!(table.snapshots_since(Some(1)).unwrap().len(), 3);
    }

    #[test]
    fn removing_a_missing_file_fails() {
        let mut delete = SnapshotProducer::new(Operation::Delete);
        delete.remove_file("ghost".into());
        let err = delete.produce(&metadata(), 0).unwrap_err();
        assert!(matches!(err, ManifestError::NotLive { paths } if paths == ["ghost"]));
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut append = SnapshotProducer::new(Operation::Append);
        append.add_data_file(data_file("a", 1));
        let table = commit(&metadata(), &append);
        let err = append.produce(&table, 0).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateFile(path) if path == "a"));
    }

    #[test]
    fn files_under_unknown_specs_are_rejected() {
        let mut append = SnapshotProducer::new(Operation::Append);
        append.add_data_file(Arc::new(DataFile {
            spec_id: 7,
            ..(*data_file("a", 1)).clone()
        }));
        let err = append.produce(&metadata(), 0).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownSpec(7)));

        let mut delete = SnapshotProducer::new(Operation::Overwrite);
        delete.add_delete_file(Arc::new(DeleteFile {
            path: "eq".into(),
            spec_id: 7,
            partition: PartitionKey::empty(),
            record_count: 1,
            size_bytes: 8,
            format: FileFormat::Arrow,
            kind: DeleteKind::Equality {
                columns: vec!["id".into()],
            },
        }));
        let err = delete.produce(&metadata(), 0).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownSpec(7)));
    }

    #[test]
    fn unpartitioned_equality_deletes_are_global() {
        let table = metadata();
        let equality = DeleteFile {
            path: "eq".into(),
            spec_id: 0,
            partition: PartitionKey::empty(),
            record_count: 1,
            size_bytes: 8,
            format: FileFormat::Arrow,
            kind: DeleteKind::Equality {
                columns: vec!["id".into()],
            },
        };
        assert!(table.is_global_delete(&equality));
        let positional = DeleteFile {
            kind: DeleteKind::Position {
                referenced_data_file: "a".into(),
            },
            ..equality.clone()
        };
        assert!(!table.is_global_delete(&positional));
        let unknown = DeleteFile {
            spec_id: 7,
            ..equality
        };
        assert!(!table.is_global_delete(&unknown));
    }
}
