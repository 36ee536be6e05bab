//! Pruning over partition values and column statistics.

use strata_predicate::{ColumnBounds, ColumnRef, DomainOracle, Predicate, ScalarValue, TruthSet};

use crate::{
    manifest::{ColumnStats, DataFile, ManifestError, Snapshot, TableMetadata},
    partition::PartitionSpec,
    pruning::{FilePruner, PruneFuture},
    scan::plan_files,
    schema::TableSchema,
};

/// What one data file's metadata says about its rows.
///
/// Column statistics and every partition field sourced from the column are
/// intersected; the file's own spec is used, not the table default.
struct FileDomain<'a> {
    schema: &'a TableSchema,
    spec: &'a PartitionSpec,
    file: &'a DataFile,
}

fn stats_bounds(stats: &ColumnStats) -> ColumnBounds {
    if stats.value_count == 0 {
        ColumnBounds::unknown()
    } else if stats.null_count >= stats.value_count {
        ColumnBounds::only_null()
    } else {
        ColumnBounds::range(
            stats.lower.clone(),
            stats.upper.clone(),
            stats.null_count > 0,
        )
    }
}

impl DomainOracle for FileDomain<'_> {
    fn bounds(&self, column: &ColumnRef) -> ColumnBounds {
        let Ok((_, declared)) = self.schema.column(&column.name) else {
            return ColumnBounds::unknown();
        };
        let mut bounds = self
            .file
            .column_stats
            .get(&column.name)
            .map_or_else(ColumnBounds::unknown, stats_bounds);
        if !declared.nullable {
            bounds = bounds.intersect(ColumnBounds::range(None, None, false));
        }
        for (field, value) in self.spec.fields().iter().zip(self.file.partition.values()) {
            if field.source == column.name {
                bounds = bounds.intersect(field.transform.source_bounds(value));
            }
        }
        bounds
    }

    fn may_contain(&self, column: &ColumnRef, value: &ScalarValue) -> bool {
        let Ok((_, declared)) = self.schema.column(&column.name) else {
            return true;
        };
        self.spec
            .fields()
            .iter()
            .zip(self.file.partition.values())
            .filter(|(field, _)| field.source == column.name)
            .all(|(field, partition_value)| {
                field
                    .transform
                    .may_produce(declared.data_type, partition_value, value)
            })
    }
}

/// Truth values `predicate` may take on the rows of `file`.
pub(crate) fn file_outcomes(
    predicate: &Predicate,
    metadata: &TableMetadata,
    file: &DataFile,
) -> Result<TruthSet, ManifestError> {
    let spec = metadata.spec(file.spec_id)?;
    let domain = FileDomain {
        schema: metadata.schema(),
        spec,
        file,
    };
    Ok(predicate.possible_outcomes(&domain))
}

/// Pruner that drops files whose metadata proves no row can match.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsPruner;

impl FilePruner for MetricsPruner {
    fn prune<'a>(
        &'a self,
        predicate: &'a Predicate,
        metadata: &'a TableMetadata,
        snapshot: &'a Snapshot,
    ) -> PruneFuture<'a> {
        Box::pin(async move {
            let mut candidates = Vec::new();
            for task in plan_files(metadata, snapshot) {
                if file_outcomes(predicate, metadata, &task.data_file)?.can_be_true() {
                    candidates.push(task);
                }
            }
            Ok(candidates)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use strata_predicate::PredicateBuilder;

    use super::*;
    use crate::{
        manifest::{FileFormat, Operation, SnapshotProducer},
        partition::{PartitionField, PartitionKey, Transform},
        schema::{Column, DataType},
    };

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Column::new("id", DataType::Int64),
            Column::new("dep", DataType::Utf8),
        ])
        .unwrap()
    }

    fn file(path: &str, spec: &PartitionSpec, partition: Vec<ScalarValue>, ids: (i64, i64)) -> Arc<DataFile> {
        let mut column_stats = BTreeMap::new();
        column_stats.insert(
            Arc::from("id"),
            ColumnStats {
                lower: Some(ScalarValue::Int64(ids.0)),
                upper: Some(ScalarValue::Int64(ids.1)),
                null_count: 0,
                value_count: 2,
            },
        );
        Arc::new(DataFile {
            path: path.into(),
            spec_id: spec.spec_id(),
            partition: PartitionKey::new(partition),
            record_count: 2,
            size_bytes: 16,
            format: FileFormat::Arrow,
            column_stats,
        })
    }

    fn table() -> TableMetadata {
        let schema = schema();
        let by_dep = PartitionSpec::new(
            0,
            vec![PartitionField::new("dep", Transform::Identity)],
            &schema,
        )
        .unwrap();
        let by_bucket = PartitionSpec::new(
            1,
            vec![PartitionField::new("id", Transform::Bucket(16))],
            &schema,
        )
        .unwrap();
        let metadata = TableMetadata::new("t", schema, by_dep.clone(), BTreeMap::new())
            .with_default_spec(by_bucket.clone());

        let mut append = SnapshotProducer::new(Operation::Append);
        append.add_data_file(file("hr", &by_dep, vec!["hr".into()], (1, 3)));
        append.add_data_file(file("hardware", &by_dep, vec!["hardware".into()], (2, 2)));
        let bucket = Transform::Bucket(16).apply(&ScalarValue::Int64(40));
        append.add_data_file(file("bucketed", &by_bucket, vec![bucket], (40, 40)));
        let snapshot = append.produce(&metadata, 0).unwrap();
        metadata.with_snapshot(snapshot).unwrap()
    }

    async fn candidates(predicate: &Predicate) -> Vec<String> {
        let metadata = table();
        let snapshot = Arc::clone(metadata.current_snapshot().unwrap());
        MetricsPruner
            .prune(predicate, &metadata, &snapshot)
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.data_file.path.to_string())
            .collect()
    }

    #[tokio::test]
    async fn identity_partitions_prune_per_spec() {
        let predicate = PredicateBuilder::leaf()
            .equals(ColumnRef::new("dep"), ScalarValue::from("hr"))
            .build();
        // The bucketed file says nothing about `dep`.
        assert_eq!(candidates(&predicate).await, vec!["hr", "bucketed"]);
    }

    #[tokio::test]
    async fn stats_and_buckets_refute() {
        let predicate = PredicateBuilder::leaf()
            .greater_than(ColumnRef::new("id"), ScalarValue::Int64(10))
            .build();
        assert_eq!(candidates(&predicate).await, vec!["bucketed"]);

        let predicate = PredicateBuilder::leaf()
            .equals(ColumnRef::new("id"), ScalarValue::Int64(2))
            .build();
        assert_eq!(candidates(&predicate).await, vec!["hr", "hardware"]);
    }

    #[test]
    fn whole_file_matches_are_proven() {
        let metadata = table();
        let snapshot = metadata.current_snapshot().unwrap();
        let files = snapshot.data_files();
        let predicate = PredicateBuilder::leaf()
            .equals(ColumnRef::new("dep"), ScalarValue::from("hr"))
            .build();
        let outcomes = file_outcomes(&predicate, &metadata, &files[0].file).unwrap();
        assert!(outcomes.is_always_true());
        let outcomes = file_outcomes(&predicate, &metadata, &files[2].file).unwrap();
        assert!(outcomes.can_be_true() && !outcomes.is_always_true());
    }
}
