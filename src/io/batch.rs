//! Conversion between rows and Arrow record batches.

use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray},
    datatypes::{Field, Float64Type, Int64Type, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use strata_predicate::ScalarValue;

use crate::{
    manifest::ColumnStats,
    schema::{Column, DataType, Row},
};

fn mismatch(column: &Column, value: &ScalarValue) -> ArrowError {
    ArrowError::InvalidArgumentError(format!(
        "column `{}` of type {:?} cannot hold {}",
        column.name,
        column.data_type,
        value.type_name()
    ))
}

fn build_array(
    position: usize,
    column: &Column,
    rows: &[Row],
) -> Result<ArrayRef, ArrowError> {
    let values = rows
        .iter()
        .map(|row| row.get(position).unwrap_or(&ScalarValue::Null));
    let array: ArrayRef = match column.data_type {
        DataType::Boolean => Arc::new(
            values
                .map(|value| match value {
                    ScalarValue::Null => Ok(None),
                    ScalarValue::Boolean(v) => Ok(Some(*v)),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<BooleanArray, _>>()?,
        ),
        DataType::Int64 => Arc::new(
            values
                .map(|value| match value {
                    ScalarValue::Null => Ok(None),
                    ScalarValue::Int64(v) => Ok(Some(*v)),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<Int64Array, _>>()?,
        ),
        DataType::Float64 => Arc::new(
            values
                .map(|value| match value {
                    ScalarValue::Null => Ok(None),
                    ScalarValue::Float64(v) => Ok(Some(*v)),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<Float64Array, _>>()?,
        ),
        DataType::Utf8 => Arc::new(
            values
                .map(|value| match value {
                    ScalarValue::Null => Ok(None),
                    ScalarValue::Utf8(v) => Ok(Some(v.as_str())),
                    other => Err(mismatch(column, other)),
                })
                .collect::<Result<StringArray, _>>()?,
        ),
    };
    Ok(array)
}

/// Encodes `rows` as one batch with a field per column.
pub(super) fn rows_to_batch(columns: &[Column], rows: &[Row]) -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|column| {
                Field::new(
                    column.name.as_ref(),
                    column.data_type.to_arrow(),
                    column.nullable,
                )
            })
            .collect::<Vec<_>>(),
    ));
    let arrays = columns
        .iter()
        .enumerate()
        .map(|(position, column)| build_array(position, column, rows))
        .collect::<Result<Vec<_>, _>>()?;
    RecordBatch::try_new(schema, arrays)
}

fn read_value(column: &Column, array: &dyn Array, row: usize) -> Result<ScalarValue, ArrowError> {
    if array.is_null(row) {
        return Ok(ScalarValue::Null);
    }
    let wrong_type = || {
        ArrowError::SchemaError(format!(
            "column `{}` is stored as {}, expected {:?}",
            column.name,
            array.data_type(),
            column.data_type
        ))
    };
    let value = match column.data_type {
        DataType::Boolean => {
            ScalarValue::Boolean(array.as_boolean_opt().ok_or_else(wrong_type)?.value(row))
        }
        DataType::Int64 => ScalarValue::Int64(
            array
                .as_primitive_opt::<Int64Type>()
                .ok_or_else(wrong_type)?
                .value(row),
        ),
        DataType::Float64 => ScalarValue::Float64(
            array
                .as_primitive_opt::<Float64Type>()
                .ok_or_else(wrong_type)?
                .value(row),
        ),
        DataType::Utf8 => ScalarValue::Utf8(
            array
                .as_string_opt::<i32>()
                .ok_or_else(wrong_type)?
                .value(row)
                .to_owned(),
        ),
    };
    Ok(value)
}

/// Decodes a batch written by [`rows_to_batch`] back into rows.
pub(super) fn batch_to_rows(columns: &[Column], batch: &RecordBatch) -> Result<Vec<Row>, ArrowError> {
    if batch.num_columns() != columns.len() {
        return Err(ArrowError::SchemaError(format!(
            "batch has {} columns, expected {}",
            batch.num_columns(),
            columns.len()
        )));
    }
    (0..batch.num_rows())
        .map(|row| {
            columns
                .iter()
                .zip(batch.columns())
                .map(|(column, array)| read_value(column, array.as_ref(), row))
                .collect()
        })
        .collect()
}

/// Per-column bounds and counts of `rows`.
///
/// Float columns holding NaN get no bounds.
pub(super) fn column_stats(columns: &[Column], rows: &[Row]) -> BTreeMap<Arc<str>, ColumnStats> {
    columns
        .iter()
        .enumerate()
        .map(|(position, column)| {
            let mut stats = ColumnStats {
                value_count: rows.len() as u64,
                ..ColumnStats::default()
            };
            let mut has_nan = false;
            for value in rows.iter().filter_map(|row| row.get(position)) {
                match value {
                    ScalarValue::Null => stats.null_count += 1,
                    ScalarValue::Float64(v) if v.is_nan() => has_nan = true,
                    value => {
                        if stats.lower.as_ref().map_or(true, |lo| value.total_cmp(lo).is_lt()) {
                            stats.lower = Some(value.clone());
                        }
                        if stats.upper.as_ref().map_or(true, |hi| value.total_cmp(hi).is_gt()) {
                            stats.upper = Some(value.clone());
                        }
                    }
                }
            }
            if has_nan {
                stats.lower = None;
                stats.upper = None;
            }
            (Arc::clone(&column.name), stats)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::required("id", DataType::Int64),
            Column::new("dep", DataType::Utf8),
            Column::new("active", DataType::Boolean),
            Column::new("score", DataType::Float64),
        ]
    }

    #[test]
    fn batches_preserve_nulls() {
        let rows: Vec<Row> = vec![
            vec![ScalarValue::Int64(1), "hr".into(), true.into(), 1.5.into()],
            vec![ScalarValue::Int64(2), ScalarValue::Null, ScalarValue::Null, ScalarValue::Null],
        ];
        let batch = rows_to_batch(&columns(), &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch_to_rows(&columns(), &batch).unwrap(), rows);
    }

    #[test]
    fn stats_track_bounds_and_nulls() {
        let rows: Vec<Row> = vec![
            vec![ScalarValue::Int64(7), "b".into(), true.into(), f64::NAN.into()],
            vec![ScalarValue::Int64(3), ScalarValue::Null, false.into(), 2.0.into()],
        ];
        let stats = column_stats(&columns(), &rows);
        let id = &stats["id"];
        assert_eq!(id.lower, Some(ScalarValue::Int64(3)));
        assert_eq!(id.upper, Some(ScalarValue::Int64(7)));
        assert_eq!(stats["dep"].null_count, 1);
        assert_eq!(stats["dep"].value_count, 2);
        assert_eq!(stats["score"].lower, None);
    }

    #[test]
    fn mismatched_values_are_rejected() {
        let rows: Vec<Row> = vec![vec!["x".into(), "hr".into(), true.into(), 1.0.into()]];
        assert!(rows_to_batch(&columns(), &rows).is_err());
    }
}
