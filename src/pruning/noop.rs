//! No-op pruning implementation.

use strata_predicate::Predicate;

use crate::{
    manifest::{Snapshot, TableMetadata},
    pruning::{FilePruner, PruneFuture},
    scan::plan_files,
};

/// Pruner that keeps every live data file.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPruner;

impl FilePruner for NoopPruner {
    fn prune<'a>(
        &'a self,
        _predicate: &'a Predicate,
        metadata: &'a TableMetadata,
        snapshot: &'a Snapshot,
    ) -> PruneFuture<'a> {
        Box::pin(async move { Ok(plan_files(metadata, snapshot)) })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use futures::executor::block_on;
    use strata_predicate::PredicateBuilder;

    use super::*;
    use crate::{
        manifest::{DataFile, FileFormat, Operation, SnapshotProducer},
        partition::{PartitionKey, PartitionSpec},
        schema::{Column, DataType, TableSchema},
    };

    #[test]
    fn keeps_every_live_file() {
        let schema = TableSchema::new(vec![Column::new("id", DataType::Int64)]).unwrap();
        let base = TableMetadata::new("t", schema, PartitionSpec::unpartitioned(0), BTreeMap::new());
        let mut append = SnapshotProducer::new(Operation::Append);
        for path in ["a", "b"] {
            append.add_data_file(Arc::new(DataFile {
                path: path.into(),
                spec_id: 0,
                partition: PartitionKey::empty(),
                record_count: 1,
                size_bytes: 8,
                format: FileFormat::Arrow,
                column_stats: BTreeMap::new(),
            }));
        }
        let metadata = base.with_snapshot(append.produce(&base, 0).unwrap()).unwrap();
        let snapshot = metadata.current_snapshot().unwrap();

        let predicate = PredicateBuilder::leaf().literal(false).build();
        let tasks = block_on(NoopPruner.prune(&predicate, &metadata, snapshot)).unwrap();
        let paths: Vec<_> = tasks.iter().map(|task| task.data_file.path.to_string()).collect();
        assert_eq!(paths, vec!["a".to_string(), "b".to_string()]);
    }
}
