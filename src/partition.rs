//! Partition specs and transforms.
//!
//! Every data and delete file records the id of the spec it was written
//! under. Specs are never mutated: evolving the layout adds a new spec and
//! makes it the default for subsequent writes.

use std::{cmp::Ordering, fmt, hash::Hash, sync::Arc};

use strata_predicate::{ColumnBounds, ScalarValue};
use thiserror::Error;

use crate::schema::{DataType, SchemaError, TableSchema};

/// Identifier of a partition spec within a table.
pub type SpecId = i32;

/// Errors raised while declaring or applying partition specs.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The transform cannot be applied to the source column's type.
    #[error("transform {transform} cannot be applied to {data_type:?} column `{column}`")]
    InvalidTransform {
        /// Source column.
        column: String,
        /// Rejected transform.
        transform: Transform,
        /// Source column type.
        data_type: DataType,
    },
    /// Source column missing from the schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Function from a source column value to a partition value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transform {
    /// The value itself.
    Identity,
    /// `crc32(value) mod N`.
    Bucket(u32),
    /// Integers floored to a multiple of `W`; strings cut to `W` characters.
    Truncate(u32),
    /// Always `NULL`; keeps a retired field without partitioning on it.
    Void,
}

impl Transform {
    /// Applies the transform. `NULL` maps to `NULL`.
    #[must_use]
    pub fn apply(&self, value: &ScalarValue) -> ScalarValue {
        if value.is_null() {
            return ScalarValue::Null;
        }
        match self {
            Transform::Identity => normalize_zero(value),
            Transform::Bucket(buckets) => bucket_hash(value)
                .map_or(ScalarValue::Null, |hash| {
                    ScalarValue::Int64(i64::from(hash % buckets))
                }),
            Transform::Truncate(width) => match value {
                ScalarValue::Int64(v) => {
                    let width = i64::from(*width);
                    let floor = v.checked_sub(v.rem_euclid(width)).unwrap_or(i64::MIN);
                    ScalarValue::Int64(floor)
                }
                ScalarValue::Utf8(v) => {
                    ScalarValue::Utf8(v.chars().take(*width as usize).collect())
                }
                other => other.clone(),
            },
            Transform::Void => ScalarValue::Null,
        }
    }

    fn check(&self, column: &str, data_type: DataType) -> Result<(), PartitionError> {
        let valid = match self {
            Transform::Identity | Transform::Void => true,
            Transform::Bucket(buckets) => *buckets > 0,
            Transform::Truncate(width) => {
                *width > 0 && matches!(data_type, DataType::Int64 | DataType::Utf8)
            }
        };
        if valid {
            Ok(())
        } else {
            Err(PartitionError::InvalidTransform {
                column: column.to_owned(),
                transform: *self,
                data_type,
            })
        }
    }

    /// What a partition value says about the source column of rows in that partition.
    #[must_use]
    pub fn source_bounds(&self, partition_value: &ScalarValue) -> ColumnBounds {
        if matches!(self, Transform::Void) {
            return ColumnBounds::unknown();
        }
        if partition_value.is_null() {
            return ColumnBounds::only_null();
        }
        match (self, partition_value) {
            (Transform::Identity, value) => ColumnBounds::exact(value.clone()),
            (Transform::Truncate(width), ScalarValue::Int64(floor)) => ColumnBounds::range(
                Some(ScalarValue::Int64(*floor)),
                Some(ScalarValue::Int64(
                    floor.saturating_add(i64::from(*width) - 1),
                )),
                false,
            ),
            // Every string with this prefix sorts at or after it.
            (Transform::Truncate(_), ScalarValue::Utf8(prefix)) => {
                ColumnBounds::range(Some(ScalarValue::Utf8(prefix.clone())), None, false)
            }
            _ => ColumnBounds::range(None, None, false),
        }
    }

    /// Whether a row holding the non-null `value` could land in `partition_value`.
    #[must_use]
    pub fn may_produce(
        &self,
        source_type: DataType,
        partition_value: &ScalarValue,
        value: &ScalarValue,
    ) -> bool {
        if matches!(self, Transform::Void) || !source_type.holds(value) {
            return true;
        }
        let produced = self.apply(value);
        produced == *partition_value
            || produced.compare(partition_value) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => f.write_str("identity"),
            Transform::Bucket(buckets) => write!(f, "bucket[{buckets}]"),
            Transform::Truncate(width) => write!(f, "truncate[{width}]"),
            Transform::Void => f.write_str("void"),
        }
    }
}

/// Hash used by the bucket transform, over a canonical byte encoding.
#[must_use]
pub fn bucket_hash(value: &ScalarValue) -> Option<u32> {
    let hash = match value {
        ScalarValue::Null => return None,
        ScalarValue::Boolean(v) => crc32fast::hash(&[u8::from(*v)]),
        ScalarValue::Int64(v) => crc32fast::hash(&v.to_le_bytes()),
        ScalarValue::Float64(v) => {
            let v = if *v == 0.0 { 0.0_f64 } else { *v };
            crc32fast::hash(&v.to_bits().to_le_bytes())
        }
        ScalarValue::Utf8(v) => crc32fast::hash(v.as_bytes()),
    };
    Some(hash)
}

// `-0.0` and `0.0` compare equal and must land in the same partition.
fn normalize_zero(value: &ScalarValue) -> ScalarValue {
    match value {
        ScalarValue::Float64(v) if *v == 0.0 => ScalarValue::Float64(0.0),
        other => other.clone(),
    }
}

/// One component of a partition key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PartitionField {
    /// Source column name.
    pub source: Arc<str>,
    /// Partition field name.
    pub name: Arc<str>,
    /// Transform applied to the source value.
    pub transform: Transform,
}

impl PartitionField {
    /// Field named after its source and transform.
    pub fn new(source: impl Into<Arc<str>>, transform: Transform) -> Self {
        let source = source.into();
        let name: Arc<str> = match transform {
            Transform::Identity => Arc::clone(&source),
            Transform::Bucket(buckets) => format!("{source}_bucket_{buckets}").into(),
            Transform::Truncate(width) => format!("{source}_trunc_{width}").into(),
            Transform::Void => format!("{source}_null").into(),
        };
        Self {
            source,
            name,
            transform,
        }
    }
}

/// Ordered partition fields identified by a spec id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionSpec {
    spec_id: SpecId,
    fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// Spec without fields: every row lands in one partition.
    #[must_use]
    pub fn unpartitioned(spec_id: SpecId) -> Self {
        Self {
            spec_id,
            fields: Vec::new(),
        }
    }

    /// Validates `fields` against `schema` and builds the spec.
    pub fn new(
        spec_id: SpecId,
        fields: Vec<PartitionField>,
        schema: &TableSchema,
    ) -> Result<Self, PartitionError> {
        for field in &fields {
            let (_, column) = schema.column(&field.source)?;
            field.transform.check(&field.source, column.data_type)?;
        }
        Ok(Self { spec_id, fields })
    }

    /// Spec id.
    pub fn spec_id(&self) -> SpecId {
        self.spec_id
    }

    /// Fields in key order.
    pub fn fields(&self) -> &[PartitionField] {
        &self.fields
    }

    /// True when every row maps to the same partition.
    pub fn is_unpartitioned(&self) -> bool {
        self.fields
            .iter()
            .all(|field| field.transform == Transform::Void)
    }

    /// Same layout as `other`, ignoring spec ids.
    pub fn same_layout(&self, other: &PartitionSpec) -> bool {
        self.fields == other.fields
    }

    /// Partition key of `row` under this spec.
    pub fn partition_key(
        &self,
        schema: &TableSchema,
        row: &[ScalarValue],
    ) -> Result<PartitionKey, PartitionError> {
        self.fields
            .iter()
            .map(|field| {
                let (index, _) = schema.column(&field.source)?;
                let value = row.get(index).unwrap_or(&ScalarValue::Null);
                Ok(field.transform.apply(value))
            })
            .collect::<Result<Vec<_>, PartitionError>>()
            .map(PartitionKey)
    }
}

/// Transformed partition values of a row, one per spec field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PartitionKey(Vec<ScalarValue>);

impl PartitionKey {
    /// Key of an unpartitioned file.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Key from explicit values.
    #[must_use]
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Self(values)
    }

    /// Values in spec field order.
    pub fn values(&self) -> &[ScalarValue] {
        &self.0
    }

    /// Path fragment such as `dep=hr/id_bucket_4=1`.
    pub fn to_path(&self, spec: &PartitionSpec) -> String {
        spec.fields()
            .iter()
            .zip(&self.0)
            .map(|(field, value)| match value {
                ScalarValue::Utf8(text) => format!("{}={text}", field.name),
                other => format!("{}={other}", field.name),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl Ord for PartitionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(lhs, rhs)| lhs.total_cmp(rhs))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

impl PartialOrd for PartitionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Column::required("id", DataType::Int64),
            Column::new("dep", DataType::Utf8),
            Column::new("score", DataType::Float64),
        ])
        .unwrap()
    }

    #[test]
    fn transforms_map_values() {
        assert_eq!(
            Transform::Truncate(10).apply(&ScalarValue::Int64(-3)),
            ScalarValue::Int64(-10)
        );
        assert_eq!(
            Transform::Truncate(2).apply(&ScalarValue::from("hardware")),
            ScalarValue::from("ha")
        );
        assert_eq!(
            Transform::Void.apply(&ScalarValue::Int64(1)),
            ScalarValue::Null
        );
        let bucket = Transform::Bucket(4).apply(&ScalarValue::Int64(7));
        assert!(matches!(bucket, ScalarValue::Int64(b) if (0..4).contains(&b)));
        assert_eq!(Transform::Bucket(4).apply(&ScalarValue::Null), ScalarValue::Null);
    }

    #[test]
    fn rejects_truncate_on_floats() {
        let err = PartitionSpec::new(
            1,
            vec![PartitionField::new("score", Transform::Truncate(3))],
            &schema(),
        )
        .unwrap_err();
        assert!(matches!(err, PartitionError::InvalidTransform { .. }));
    }

    #[test]
    fn partition_keys_follow_field_order() {
        let spec = PartitionSpec::new(
            1,
            vec![
                PartitionField::new("dep", Transform::Identity),
                PartitionField::new("id", Transform::Truncate(10)),
            ],
            &schema(),
        )
        .unwrap();
        let key = spec
            .partition_key(
                &schema(),
                &[ScalarValue::Int64(42), ScalarValue::from("hr"), ScalarValue::Null],
            )
            .unwrap();
        assert_eq!(
            key.values(),
            &[ScalarValue::from("hr"), ScalarValue::Int64(40)]
        );
        assert_eq!(key.to_path(&spec), "dep=hr/id_trunc_10=40");
    }

    #[test]
    fn bucket_refutes_other_values() {
        let transform = Transform::Bucket(8);
        let partition = transform.apply(&ScalarValue::Int64(5));
        assert!(transform.may_produce(DataType::Int64, &partition, &ScalarValue::Int64(5)));
        let refuted = (0..64)
            .map(ScalarValue::Int64)
            .filter(|value| !transform.may_produce(DataType::Int64, &partition, value))
            .count();
        assert!(refuted > 0);
        // Values of another type cannot be hashed consistently and are never refuted.
        assert!(transform.may_produce(DataType::Int64, &partition, &ScalarValue::Float64(5.0)));
    }

    #[test]
    fn negative_zero_shares_the_zero_partition() {
        let negative = ScalarValue::Float64(-0.0);
        let zero = ScalarValue::Float64(0.0);
        assert_eq!(Transform::Identity.apply(&negative), zero);
        assert_eq!(bucket_hash(&negative), bucket_hash(&zero));
        for transform in [Transform::Identity, Transform::Bucket(16)] {
            let partition = transform.apply(&zero);
            assert!(transform.may_produce(DataType::Float64, &partition, &negative));
        }
    }

    #[test]
    fn truncate_saturates_near_the_minimum() {
        assert_eq!(
            Transform::Truncate(3).apply(&ScalarValue::Int64(i64::MIN)),
            ScalarValue::Int64(i64::MIN)
        );
        assert_eq!(
            Transform::Truncate(10).apply(&ScalarValue::Int64(i64::MIN + 5)),
            ScalarValue::Int64(i64::MIN)
        );
        let bounds = Transform::Truncate(3).source_bounds(&ScalarValue::Int64(i64::MIN));
        assert_eq!(
            bounds,
            ColumnBounds::range(
                Some(ScalarValue::Int64(i64::MIN)),
                Some(ScalarValue::Int64(i64::MIN + 2)),
                false,
            )
        );
    }
}
