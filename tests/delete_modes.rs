mod common;

use std::sync::Arc;

use common::{id_dep_schema, row, rows, sorted, Fixture};
use strata::{
    config::{DELETE_EQUALITY_COLUMNS, DELETE_MODE, SPLIT_SIZE_ROWS},
    predicate::{
        ColumnRef, MaterializedRows, Operand, Predicate, PredicateBuilder, ScalarValue,
    },
    DeleteMode, DeleteOptions, DeleteStrategy, Row, Table, TableSchema,
};

const DEPARTMENTS: [&str; 3] = ["hr", "ops", "eng"];

fn random_batches(rng: &mut fastrand::Rng) -> Vec<Vec<Row>> {
    let mut next_id = 0;
    (0..3)
        .map(|_| {
            (0..rng.usize(20..60))
                .map(|_| {
                    next_id += 1;
                    let dep = DEPARTMENTS[rng.usize(..DEPARTMENTS.len())];
                    if rng.u8(..10) == 0 {
                        row(None, Some(dep))
                    } else {
                        row(Some(next_id), Some(dep))
                    }
                })
                .collect()
        })
        .collect()
}

fn id_of(row: &Row) -> Option<i64> {
    match row[0] {
        ScalarValue::Int64(id) => Some(id),
        _ => None,
    }
}

fn dep_of(row: &Row) -> &str {
    row[1].as_str().unwrap_or_default()
}

type RowFilter = Box<dyn Fn(&Row) -> bool>;

/// Deletes applied in order, each with a row filter computing its effect.
fn deletes(rng: &mut fastrand::Rng) -> Vec<(Predicate, RowFilter)> {
    let bound = rng.i64(10..40);
    let picked: Vec<i64> = (0..8).map(|_| rng.i64(1..150)).collect();
    let picked_set = picked.clone();
    vec![
        (
            PredicateBuilder::leaf()
                .less_than(ColumnRef::new("id"), ScalarValue::Int64(bound))
                .build(),
            Box::new(move |row: &Row| id_of(row).is_some_and(|id| id < bound)) as RowFilter,
        ),
        (
            PredicateBuilder::leaf()
                .in_list(
                    ColumnRef::new("id"),
                    picked.into_iter().map(ScalarValue::Int64),
                )
                .build(),
            Box::new(move |row: &Row| id_of(row).is_some_and(|id| picked_set.contains(&id))) as RowFilter,
        ),
        (
            PredicateBuilder::and()
                .equals(ColumnRef::new("dep"), ScalarValue::from("ops"))
                .greater_than(ColumnRef::new("id"), ScalarValue::Int64(bound * 2))
                .build(),
            Box::new(move |row: &Row| {
                dep_of(row) == "ops" && id_of(row).is_some_and(|id| id > bound * 2)
            }) as RowFilter,
        ),
        (
            PredicateBuilder::leaf()
                .is_null(ColumnRef::new("id"))
                .build(),
            Box::new(|row: &Row| id_of(row).is_none()) as RowFilter,
        ),
    ]
}

#[tokio::test]
async fn write_modes_agree_on_visible_rows() {
    for seed in [7, 42, 1234] {
        let mut rng = fastrand::Rng::with_seed(seed);
        let batches = random_batches(&mut rng);
        let mut expected: Vec<Row> = batches.iter().flatten().cloned().collect();
        let plan = deletes(&mut rng);
        for (_, removes) in &plan {
            expected.retain(|row| !removes(row));
        }
        let expected = sorted(expected);

        for mode in [
            DeleteMode::CopyOnWrite,
            DeleteMode::MergeOnRead,
            DeleteMode::Adaptive,
        ] {
            let properties = [(DELETE_MODE, mode.as_str()), (SPLIT_SIZE_ROWS, "16")];
            let fixture = Fixture::with_properties(true, &properties).await;
            for batch in &batches {
                fixture.table.append(batch.clone()).await.unwrap();
            }
            for (predicate, _) in &plan {
                fixture.table.delete(predicate).await.unwrap();
            }
            assert_eq!(fixture.scan().await, expected, "seed {seed} mode {mode}");

            let snapshot = fixture.table.current_snapshot().await.unwrap().unwrap();
            if mode == DeleteMode::CopyOnWrite {
                assert_eq!(snapshot.summary.total_delete_files, 0);
            }
        }
    }
}

#[tokio::test]
async fn merge_on_read_keeps_data_files() {
    let fixture = Fixture::new(false).await;
    fixture
        .table
        .append(rows(&[(1, "hr"), (2, "hr"), (3, "ops"), (4, "ops")]))
        .await
        .unwrap();
    let before = fixture.table.current_snapshot().await.unwrap().unwrap();

    let predicate = PredicateBuilder::leaf()
        .equals(ColumnRef::new("dep"), ScalarValue::from("ops"))
        .build();
    let outcome = fixture
        .table
        .delete_with(
            &predicate,
            &DeleteOptions::default().mode(DeleteMode::MergeOnRead),
        )
        .await
        .unwrap();

    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(outcome.strategy, DeleteStrategy::RowLevel);
    assert_eq!(snapshot.summary.added_data_files, 0);
    assert_eq!(snapshot.summary.added_position_deletes, 2);
    assert_eq!(snapshot.summary.total_delete_files, 1);
    assert_eq!(
        snapshot.data_files()[0].file.path,
        before.data_files()[0].file.path
    );
    assert_eq!(fixture.scan().await, rows(&[(1, "hr"), (2, "hr")]));

    // Copy-on-write over a marked file folds its delete file away.
    let outcome = fixture
        .table
        .delete(&common::id_equals(1))
        .await
        .unwrap();
    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.summary.total_delete_files, 0);
    assert_eq!(snapshot.summary.total_records, 1);
    assert_eq!(fixture.scan().await, rows(&[(2, "hr")]));
}

#[tokio::test]
async fn adaptive_mode_picks_per_file() {
    let fixture = Fixture::new(true).await;
    fixture
        .table
        .append(rows(&[
            (1, "hr"),
            (2, "hr"),
            (3, "hr"),
            (4, "hr"),
            (5, "ops"),
            (6, "ops"),
        ]))
        .await
        .unwrap();

    // One of four hr rows and one of two ops rows match.
    let predicate = PredicateBuilder::leaf()
        .in_list(
            ColumnRef::new("id"),
            [ScalarValue::Int64(1), ScalarValue::Int64(5)],
        )
        .build();
    let outcome = fixture
        .table
        .delete_with(
            &predicate,
            &DeleteOptions::default()
                .mode(DeleteMode::Adaptive)
                .adaptive_ratio(0.5),
        )
        .await
        .unwrap();

    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.summary.added_delete_files, 1);
    assert_eq!(snapshot.summary.added_data_files, 1);
    assert_eq!(snapshot.summary.deleted_data_files, 1);
    assert_eq!(
        fixture.scan().await,
        rows(&[(2, "hr"), (3, "hr"), (4, "hr"), (6, "ops")])
    );
}

#[tokio::test]
async fn subquery_deletes_use_equality_keys() {
    let fixture = Fixture::with_properties(
        false,
        &[(DELETE_MODE, "merge-on-read"), (DELETE_EQUALITY_COLUMNS, "id")],
    )
    .await;
    fixture
        .table
        .append((1..=10).map(|id| row(Some(id), Some("hr"))).collect())
        .await
        .unwrap();

    let keys = Arc::new(MaterializedRows::single_column([
        ScalarValue::Int64(2),
        ScalarValue::Int64(3),
    ]));
    let predicate = PredicateBuilder::leaf()
        .in_subquery(vec![Operand::from(ColumnRef::new("id"))], keys)
        .build();
    let outcome = fixture.table.delete(&predicate).await.unwrap();
    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.summary.added_equality_deletes, 2);
    assert_eq!(snapshot.summary.added_position_deletes, 0);

    // Rows written after the equality delete are not masked by it.
    fixture
        .table
        .append(vec![row(Some(2), Some("ops"))])
        .await
        .unwrap();
    let ids: Vec<_> = fixture.scan().await.iter().map(id_of).collect();
    assert_eq!(
        ids,
        [1, 2, 4, 5, 6, 7, 8, 9, 10].map(Some).to_vec()
    );
}

#[tokio::test]
async fn shared_keys_fall_back_to_position_deletes() {
    let fixture = Fixture::with_properties(
        false,
        &[(DELETE_MODE, "merge-on-read"), (DELETE_EQUALITY_COLUMNS, "dep")],
    )
    .await;
    fixture
        .table
        .append(rows(&[(1, "hr"), (2, "hr"), (3, "ops")]))
        .await
        .unwrap();

    let keys = Arc::new(MaterializedRows::single_column([ScalarValue::Int64(1)]));
    let predicate = PredicateBuilder::leaf()
        .in_subquery(vec![Operand::from(ColumnRef::new("id"))], keys)
        .build();
    let outcome = fixture.table.delete(&predicate).await.unwrap();

    // A `dep = 'hr'` key would also hide row 2.
    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.summary.added_equality_deletes, 0);
    assert_eq!(snapshot.summary.added_position_deletes, 1);
    assert_eq!(fixture.scan().await, rows(&[(2, "hr"), (3, "ops")]));
}

#[tokio::test]
async fn invalid_properties_are_rejected() {
    let store = Arc::new(strata::MemorySnapshotStore::new());
    let io = Arc::new(strata::MemoryFileIo::new());
    let schema: TableSchema = id_dep_schema();
    let err = Table::builder("t", schema)
        .property(DELETE_MODE, "rewrite-everything")
        .create(store.clone(), io.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, strata::TableError::Config(_)));

    let table = Table::builder("t", id_dep_schema())
        .create(store, io)
        .await
        .unwrap();
    assert!(table.set_property(SPLIT_SIZE_ROWS, "0").await.is_err());
    table.set_property(SPLIT_SIZE_ROWS, "2").await.unwrap();
    let metadata = table.metadata().await.unwrap();
    assert_eq!(metadata.property(SPLIT_SIZE_ROWS), Some("2"));
}
