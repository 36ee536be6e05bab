//! Table schema and row representation.

use std::{collections::HashMap, sync::Arc};

use arrow::datatypes::{DataType as ArrowType, Field, Schema, SchemaRef};
use strata_predicate::{ColumnRef, RowAccess, ScalarValue};
use thiserror::Error;

/// One table row, values aligned with [`TableSchema::columns`].
pub type Row = Vec<ScalarValue>;

/// Column value types supported by tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// `true` / `false`.
    Boolean,
    /// Signed 64-bit integer.
    Int64,
    /// 64-bit float.
    Float64,
    /// UTF-8 string.
    Utf8,
}

impl DataType {
    /// Arrow type used when rows are materialized into record batches.
    #[must_use]
    pub fn to_arrow(self) -> ArrowType {
        match self {
            DataType::Boolean => ArrowType::Boolean,
            DataType::Int64 => ArrowType::Int64,
            DataType::Float64 => ArrowType::Float64,
            DataType::Utf8 => ArrowType::Utf8,
        }
    }

    pub(crate) fn holds(self, value: &ScalarValue) -> bool {
        matches!(
            (self, value),
            (_, ScalarValue::Null)
                | (DataType::Boolean, ScalarValue::Boolean(_))
                | (DataType::Int64, ScalarValue::Int64(_))
                | (DataType::Float64, ScalarValue::Float64(_))
                | (DataType::Utf8, ScalarValue::Utf8(_))
        )
    }
}

/// Named, typed column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    /// Column name, unique within the schema.
    pub name: Arc<str>,
    /// Value type.
    pub data_type: DataType,
    /// Whether `NULL` is allowed.
    pub nullable: bool,
}

impl Column {
    /// Nullable column.
    pub fn new(name: impl Into<Arc<str>>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    /// Column that rejects `NULL`.
    pub fn required(name: impl Into<Arc<str>>, data_type: DataType) -> Self {
        Self {
            nullable: false,
            ..Self::new(name, data_type)
        }
    }
}

/// Errors raised when rows or schema declarations do not line up.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Two columns share a name.
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),
    /// A referenced column does not exist.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    /// A row has the wrong number of values.
    #[error("row has {found} values, schema has {expected} columns")]
    Arity {
        /// Column count.
        expected: usize,
        /// Value count.
        found: usize,
    },
    /// A value does not match its column type.
    #[error("column `{column}` expects {expected:?}, found {found}")]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Declared type.
        expected: DataType,
        /// Type of the offending value.
        found: &'static str,
    },
    /// `NULL` in a required column.
    #[error("column `{0}` does not accept null")]
    NullViolation(String),
}

/// Ordered column list of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<Column>,
    positions: HashMap<Arc<str>, usize>,
}

impl TableSchema {
    /// Validates column names and builds the schema.
    pub fn new(columns: Vec<Column>) -> Result<Self, SchemaError> {
        let mut positions = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if positions.insert(Arc::clone(&column.name), position).is_some() {
                return Err(SchemaError::DuplicateColumn(column.name.to_string()));
            }
        }
        Ok(Self { columns, positions })
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Position of `name`, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Column named `name`.
    pub fn column(&self, name: &str) -> Result<(usize, &Column), SchemaError> {
        self.index_of(name)
            .map(|index| (index, &self.columns[index]))
            .ok_or_else(|| SchemaError::UnknownColumn(name.to_owned()))
    }

    /// Checks arity, types and nullability of `row`.
    pub fn validate(&self, row: &[ScalarValue]) -> Result<(), SchemaError> {
        if row.len() != self.columns.len() {
            return Err(SchemaError::Arity {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        for (column, value) in self.columns.iter().zip(row) {
            if value.is_null() && !column.nullable {
                return Err(SchemaError::NullViolation(column.name.to_string()));
            }
            if !column.data_type.holds(value) {
                return Err(SchemaError::TypeMismatch {
                    column: column.name.to_string(),
                    expected: column.data_type,
                    found: value.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Projects `row` onto the named columns.
    pub fn project(&self, row: &[ScalarValue], columns: &[Arc<str>]) -> Result<Row, SchemaError> {
        columns
            .iter()
            .map(|name| {
                let (index, _) = self.column(name)?;
                row.get(index).cloned().ok_or(SchemaError::Arity {
                    expected: self.columns.len(),
                    found: row.len(),
                })
            })
            .collect()
    }

    /// Arrow schema mirroring this one.
    pub fn to_arrow(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns
                .iter()
                .map(|column| {
                    Field::new(
                        column.name.as_ref(),
                        column.data_type.to_arrow(),
                        column.nullable,
                    )
                })
                .collect::<Vec<_>>(),
        ))
    }

    /// Binds `row` to this schema for predicate evaluation.
    pub fn view<'a>(&'a self, row: &'a [ScalarValue]) -> RowView<'a> {
        RowView { schema: self, row }
    }
}

/// Row bound to its schema, resolving predicate columns by name.
#[derive(Clone, Copy, Debug)]
pub struct RowView<'a> {
    schema: &'a TableSchema,
    row: &'a [ScalarValue],
}

impl RowAccess for RowView<'_> {
    fn value(&self, column: &ColumnRef) -> Option<&ScalarValue> {
        self.schema
            .index_of(&column.name)
            .and_then(|index| self.row.get(index))
    }
}

#[cfg(test)]
mod tests {
    use strata_predicate::{PredicateBuilder, Truth};

    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Column::required("id", DataType::Int64),
            Column::new("dep", DataType::Utf8),
        ])
        .unwrap()
    }

    #[test]
    fn validates_rows() {
        let schema = schema();
        assert!(schema
            .validate(&[ScalarValue::Int64(1), ScalarValue::Null])
            .is_ok());
        assert!(matches!(
            schema.validate(&[ScalarValue::Null, ScalarValue::from("hr")]),
            Err(SchemaError::NullViolation(column)) if column == "id"
        ));
        assert!(matches!(
            schema.validate(&[ScalarValue::from("1"), ScalarValue::Null]),
            Err(SchemaError::TypeMismatch { .. })
        ));
        assert!(matches!(
            schema.validate(&[ScalarValue::Int64(1)]),
            Err(SchemaError::Arity { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = TableSchema::new(vec![
            Column::new("id", DataType::Int64),
            Column::new("id", DataType::Utf8),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn(name) if name == "id"));
    }

    #[test]
    fn row_view_feeds_predicates() {
        let schema = schema();
        let row = vec![ScalarValue::Int64(3), ScalarValue::from("hr")];
        let predicate = PredicateBuilder::leaf()
            .equals(ColumnRef::new("dep"), ScalarValue::from("hr"))
            .build();
        assert_eq!(predicate.evaluate(&schema.view(&row)).unwrap(), Truth::True);
    }
}
