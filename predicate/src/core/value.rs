use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// Literal values accepted by predicate operands and stored in table rows.
#[derive(Clone, Debug)]
pub enum ScalarValue {
    /// Represents SQL `NULL`.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// Signed 64-bit integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
}

impl ScalarValue {
    /// Returns true when the literal is the `Null` variant.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// SQL comparison: `None` when either side is `NULL` or the types are not comparable.
    ///
    /// Integers and floats compare numerically with each other.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(lhs), Boolean(rhs)) => Some(lhs.cmp(rhs)),
            (Int64(lhs), Int64(rhs)) => Some(lhs.cmp(rhs)),
            (Float64(lhs), Float64(rhs)) => lhs.partial_cmp(rhs),
            (Int64(lhs), Float64(rhs)) => (*lhs as f64).partial_cmp(rhs),
            (Float64(lhs), Int64(rhs)) => lhs.partial_cmp(&(*rhs as f64)),
            (Utf8(lhs), Utf8(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }

    /// Total order used for deterministic grouping and statistics.
    ///
    /// `NULL` sorts first, then values are ordered by type and by value within a type.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        use ScalarValue::*;
        match (self, other) {
            (Boolean(lhs), Boolean(rhs)) => lhs.cmp(rhs),
            (Int64(lhs), Int64(rhs)) => lhs.cmp(rhs),
            (Float64(lhs), Float64(rhs)) => lhs.total_cmp(rhs),
            (Utf8(lhs), Utf8(rhs)) => lhs.cmp(rhs),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Short name of the value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Boolean(_) => "boolean",
            ScalarValue::Int64(_) => "int64",
            ScalarValue::Float64(_) => "float64",
            ScalarValue::Utf8(_) => "utf8",
        }
    }

    /// Returns the string payload for `Utf8` values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(value) => Some(value.as_str()),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Boolean(_) => 1,
            ScalarValue::Int64(_) => 2,
            ScalarValue::Float64(_) => 3,
            ScalarValue::Utf8(_) => 4,
        }
    }
}

// Structural equality: `NULL` equals `NULL` and floats compare by bit pattern.
// SQL equality goes through `compare`.
impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        use ScalarValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(lhs), Boolean(rhs)) => lhs == rhs,
            (Int64(lhs), Int64(rhs)) => lhs == rhs,
            (Float64(lhs), Float64(rhs)) => lhs.to_bits() == rhs.to_bits(),
            (Utf8(lhs), Utf8(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            ScalarValue::Null => {}
            ScalarValue::Boolean(value) => value.hash(state),
            ScalarValue::Int64(value) => value.hash(state),
            ScalarValue::Float64(value) => value.to_bits().hash(state),
            ScalarValue::Utf8(value) => value.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Boolean(value) => write!(f, "{value}"),
            ScalarValue::Int64(value) => write!(f, "{value}"),
            ScalarValue::Float64(value) => write!(f, "{value}"),
            ScalarValue::Utf8(value) => write!(f, "'{value}'"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int64(i64::from(value))
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_owned())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl<T> From<Option<T>> for ScalarValue
where
    T: Into<ScalarValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(ScalarValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_comparison_treats_null_as_incomparable() {
        assert_eq!(ScalarValue::Null.compare(&ScalarValue::Null), None);
        assert_eq!(ScalarValue::Int64(1).compare(&ScalarValue::Null), None);
        assert_eq!(
            ScalarValue::Int64(2).compare(&ScalarValue::Float64(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(ScalarValue::from("a").compare(&ScalarValue::Int64(1)), None);
    }

    #[test]
    fn total_order_puts_null_first() {
        let mut values = vec![
            ScalarValue::from("b"),
            ScalarValue::Int64(3),
            ScalarValue::Null,
            ScalarValue::Int64(-1),
        ];
        values.sort_by(ScalarValue::total_cmp);
        assert_eq!(
            values,
            vec![
                ScalarValue::Null,
                ScalarValue::Int64(-1),
                ScalarValue::Int64(3),
                ScalarValue::from("b"),
            ]
        );
    }
}
