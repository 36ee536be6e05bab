//! Materialized inputs for membership, existence and pattern leaves.

use std::fmt;

use regex::Regex;

use super::{Operand, ScalarValue};
use crate::PredicateError;

/// Rows produced by a subquery that was evaluated before the predicate reached
/// this crate. Every row has the same width.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterializedRows {
    width: usize,
    rows: Vec<Vec<ScalarValue>>,
}

impl MaterializedRows {
    /// Builds a row set, validating that all rows share `width` columns.
    pub fn new(width: usize, rows: Vec<Vec<ScalarValue>>) -> Result<Self, PredicateError> {
        if width == 0 {
            return Err(PredicateError::InvalidSubquery(
                "subquery rows must have at least one column".into(),
            ));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(PredicateError::InvalidSubquery(format!(
                "expected {width} columns, found a row with {}",
                row.len()
            )));
        }
        Ok(Self { width, rows })
    }

    /// Builds a single-column row set from values.
    #[must_use]
    pub fn single_column<I>(values: I) -> Self
    where
        I: IntoIterator<Item = ScalarValue>,
    {
        Self {
            width: 1,
            rows: values.into_iter().map(|value| vec![value]).collect(),
        }
    }

    /// Number of columns per row.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Rows in production order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<ScalarValue>] {
        &self.rows
    }

    /// Returns true when the subquery produced no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column across all rows.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &ScalarValue> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }
}

/// Equality between an outer operand and a column of the materialized rows,
/// used by correlated `EXISTS`.
#[derive(Clone, Debug, PartialEq)]
pub struct Correlation {
    /// Operand resolved against the row being tested.
    pub outer: Operand,
    /// Column of the materialized rows.
    pub inner: usize,
}

impl Correlation {
    /// Correlates `outer` with column `inner` of the subquery rows.
    #[must_use]
    pub fn new(outer: impl Into<Operand>, inner: usize) -> Self {
        Self {
            outer: outer.into(),
            inner,
        }
    }
}

/// SQL `LIKE` pattern with `%` and `_` wildcards.
#[derive(Clone)]
pub struct LikePattern {
    pattern: String,
    regex: Regex,
}

impl LikePattern {
    /// Compiles a `LIKE` pattern. `\` escapes the next character.
    pub fn new(pattern: impl Into<String>) -> Result<Self, PredicateError> {
        let pattern = pattern.into();
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push_str("(?s)^");
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '%' => translated.push_str(".*"),
                '_' => translated.push('.'),
                '\\' => match chars.next() {
                    Some(escaped) => translated.push_str(&regex::escape(&escaped.to_string())),
                    None => {
                        return Err(PredicateError::InvalidPattern {
                            pattern,
                            reason: "trailing escape".into(),
                        })
                    }
                },
                other => translated.push_str(&regex::escape(&other.to_string())),
            }
        }
        translated.push('$');
        let regex = Regex::new(&translated).map_err(|err| PredicateError::InvalidPattern {
            pattern: pattern.clone(),
            reason: err.to_string(),
        })?;
        Ok(Self { pattern, regex })
    }

    /// Original pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Tests a non-null string against the pattern.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Literal prefix before the first wildcard, if any.
    #[must_use]
    pub fn literal_prefix(&self) -> Option<&str> {
        let end = self
            .pattern
            .find(['%', '_', '\\'])
            .unwrap_or(self.pattern.len());
        (end > 0).then(|| &self.pattern[..end])
    }
}

impl PartialEq for LikePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl fmt::Debug for LikePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LikePattern").field(&self.pattern).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_translates_wildcards() {
        let pattern = LikePattern::new("%ware").unwrap();
        assert!(pattern.matches("hardware"));
        assert!(pattern.matches("software"));
        assert!(!pattern.matches("hr"));

        let single = LikePattern::new("h_").unwrap();
        assert!(single.matches("hr"));
        assert!(!single.matches("hrx"));

        let dotted = LikePattern::new("a.c").unwrap();
        assert!(!dotted.matches("abc"));
        assert_eq!(LikePattern::new("abc%").unwrap().literal_prefix(), Some("abc"));
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = MaterializedRows::new(
            2,
            vec![vec![ScalarValue::Int64(1)], vec![ScalarValue::Int64(2)]],
        )
        .unwrap_err();
        assert!(matches!(err, PredicateError::InvalidSubquery(_)));
    }
}
