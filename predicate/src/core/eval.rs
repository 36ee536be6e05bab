//! Three-valued evaluation of predicates against a single row.

use std::cmp::Ordering;

use super::{
    ColumnRef, ComparisonOp, Correlation, MaterializedRows, Operand, Predicate, PredicateLeaf,
    PredicateVisitor, ScalarValue, VisitOutcome,
};
use crate::PredicateError;

/// SQL truth value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Truth {
    /// Predicate holds.
    True,
    /// Predicate does not hold.
    False,
    /// Predicate involves `NULL` and cannot be decided.
    Unknown,
}

impl Truth {
    /// Lifts a two-valued result.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value {
            Truth::True
        } else {
            Truth::False
        }
    }

    /// Only `TRUE` selects a row.
    #[must_use]
    pub fn is_true(self) -> bool {
        matches!(self, Truth::True)
    }

    /// Kleene negation.
    #[must_use]
    pub fn not(self) -> Self {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    /// Kleene conjunction.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    /// Kleene disjunction.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Unknown,
        }
    }
}

/// Column lookup for the row under evaluation.
pub trait RowAccess {
    /// Value of `column`, or `None` when the row has no such column.
    fn value(&self, column: &ColumnRef) -> Option<&ScalarValue>;
}

/// Row with no columns; only constant predicates evaluate against it.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyRow;

impl RowAccess for EmptyRow {
    fn value(&self, _column: &ColumnRef) -> Option<&ScalarValue> {
        None
    }
}

/// SQL `=` / `<` / ... between two values.
#[must_use]
pub fn compare_values(left: &ScalarValue, op: ComparisonOp, right: &ScalarValue) -> Truth {
    match left.compare(right) {
        Some(ordering) => Truth::from_bool(op.test_ordering(ordering)),
        None if left.is_null() || right.is_null() => Truth::Unknown,
        // Mismatched types never compare equal.
        None => Truth::from_bool(op == ComparisonOp::NotEqual),
    }
}

/// `<=>`: `NULL` matches only `NULL`.
#[must_use]
pub fn null_safe_equal(left: &ScalarValue, right: &ScalarValue) -> bool {
    match (left.is_null(), right.is_null()) {
        (true, true) => true,
        (false, false) => left.compare(right) == Some(Ordering::Equal),
        _ => false,
    }
}

/// `value IN (list)` with SQL `NULL` handling.
#[must_use]
pub fn in_list(value: &ScalarValue, list: &[ScalarValue]) -> Truth {
    list.iter().fold(Truth::False, |acc, candidate| {
        acc.or(compare_values(value, ComparisonOp::Equal, candidate))
    })
}

/// `(values) IN (rows)`: a row matches when every column compares equal.
#[must_use]
pub fn in_rows(values: &[ScalarValue], rows: &MaterializedRows) -> Truth {
    rows.rows().iter().fold(Truth::False, |acc, row| {
        let row_equal = values
            .iter()
            .zip(row)
            .fold(Truth::True, |eq, (value, candidate)| {
                eq.and(compare_values(value, ComparisonOp::Equal, candidate))
            });
        acc.or(row_equal)
    })
}

/// Evaluates predicates row by row.
pub struct RowEvaluator<'r, R: ?Sized> {
    row: &'r R,
}

impl<'r, R> RowEvaluator<'r, R>
where
    R: RowAccess + ?Sized,
{
    /// Evaluator bound to `row`.
    pub fn new(row: &'r R) -> Self {
        Self { row }
    }

    /// Evaluates `predicate` against the bound row.
    pub fn evaluate(&mut self, predicate: &Predicate) -> Result<Truth, PredicateError> {
        let outcome = predicate.accept(self)?;
        Ok(outcome.value.unwrap_or(Truth::Unknown))
    }

    fn resolve<'a>(&'a self, operand: &'a Operand) -> Result<&'a ScalarValue, PredicateError> {
        match operand {
            Operand::Literal(value) => Ok(value),
            Operand::Column(column) => self
                .row
                .value(column)
                .ok_or_else(|| PredicateError::UnknownColumn(column.name.to_string())),
        }
    }

    fn exists(
        &self,
        correlations: &[Correlation],
        rows: &MaterializedRows,
    ) -> Result<bool, PredicateError> {
        let outer = correlations
            .iter()
            .map(|correlation| {
                if correlation.inner >= rows.width() {
                    return Err(PredicateError::InvalidSubquery(format!(
                        "correlated column {} out of range for {} columns",
                        correlation.inner,
                        rows.width()
                    )));
                }
                self.resolve(&correlation.outer)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.rows().iter().any(|row| {
            correlations.iter().zip(&outer).all(|(correlation, value)| {
                compare_values(value, ComparisonOp::Equal, &row[correlation.inner]).is_true()
            })
        }))
    }

    fn leaf(&self, leaf: &PredicateLeaf) -> Result<Truth, PredicateError> {
        let truth = match leaf {
            PredicateLeaf::Literal(value) => Truth::from_bool(*value),
            PredicateLeaf::Compare { left, op, right } => {
                compare_values(self.resolve(left)?, *op, self.resolve(right)?)
            }
            PredicateLeaf::NullSafeEqual { left, right } => {
                Truth::from_bool(null_safe_equal(self.resolve(left)?, self.resolve(right)?))
            }
            PredicateLeaf::IsNull { expr, negated } => {
                Truth::from_bool(self.resolve(expr)?.is_null() != *negated)
            }
            PredicateLeaf::InList {
                expr,
                list,
                negated,
            } => {
                let truth = in_list(self.resolve(expr)?, list);
                if *negated {
                    truth.not()
                } else {
                    truth
                }
            }
            PredicateLeaf::InSubquery {
                exprs,
                rows,
                negated,
            } => {
                if exprs.len() != rows.width() {
                    return Err(PredicateError::InvalidSubquery(format!(
                        "{} operands tested against {} subquery columns",
                        exprs.len(),
                        rows.width()
                    )));
                }
                let values = exprs
                    .iter()
                    .map(|expr| self.resolve(expr).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                let truth = in_rows(&values, rows);
                if *negated {
                    truth.not()
                } else {
                    truth
                }
            }
            PredicateLeaf::Exists {
                correlations,
                rows,
                negated,
            } => Truth::from_bool(self.exists(correlations, rows)? != *negated),
            PredicateLeaf::Like {
                expr,
                pattern,
                negated,
            } => match self.resolve(expr)? {
                ScalarValue::Null => Truth::Unknown,
                ScalarValue::Utf8(value) => Truth::from_bool(pattern.matches(value) != *negated),
                other => return Err(PredicateError::NotAString(other.type_name())),
            },
            PredicateLeaf::NonDeterministic { function } => {
                return Err(PredicateError::NonDeterministic(function.to_string()))
            }
        };
        Ok(truth)
    }
}

fn fold_children(
    children: Vec<VisitOutcome<Truth>>,
    init: Truth,
    op: fn(Truth, Truth) -> Truth,
) -> VisitOutcome<Truth> {
    let value = children
        .into_iter()
        .map(|child| child.value.unwrap_or(Truth::Unknown))
        .fold(init, op);
    VisitOutcome::value(value)
}

impl<R> PredicateVisitor for RowEvaluator<'_, R>
where
    R: RowAccess + ?Sized,
{
    type Error = PredicateError;
    type Value = Truth;

    fn visit_leaf(&mut self, leaf: &PredicateLeaf) -> Result<VisitOutcome<Truth>, Self::Error> {
        self.leaf(leaf).map(VisitOutcome::value)
    }

    fn combine_not(
        &mut self,
        _original: &Predicate,
        child: VisitOutcome<Truth>,
    ) -> Result<VisitOutcome<Truth>, Self::Error> {
        Ok(VisitOutcome::value(
            child.value.unwrap_or(Truth::Unknown).not(),
        ))
    }

    fn combine_and(
        &mut self,
        _original: &Predicate,
        children: Vec<VisitOutcome<Truth>>,
    ) -> Result<VisitOutcome<Truth>, Self::Error> {
        Ok(fold_children(children, Truth::True, Truth::and))
    }

    fn combine_or(
        &mut self,
        _original: &Predicate,
        children: Vec<VisitOutcome<Truth>>,
    ) -> Result<VisitOutcome<Truth>, Self::Error> {
        Ok(fold_children(children, Truth::False, Truth::or))
    }
}

impl Predicate {
    /// Evaluates the predicate against one row with SQL three-valued logic.
    pub fn evaluate<R>(&self, row: &R) -> Result<Truth, PredicateError>
    where
        R: RowAccess + ?Sized,
    {
        RowEvaluator::new(row).evaluate(self)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use super::*;
    use crate::{LikePattern, PredicateBuilder};

    struct MapRow(HashMap<&'static str, ScalarValue>);

    impl RowAccess for MapRow {
        fn value(&self, column: &ColumnRef) -> Option<&ScalarValue> {
            self.0.get(column.name.as_ref())
        }
    }

    fn row(id: Option<i64>, dep: Option<&str>) -> MapRow {
        MapRow(HashMap::from([
            ("id", ScalarValue::from(id)),
            ("dep", ScalarValue::from(dep)),
        ]))
    }

    fn id() -> ColumnRef {
        ColumnRef::new("id")
    }

    #[test]
    fn in_list_with_null_only_matches_members() {
        let predicate = PredicateBuilder::leaf()
            .in_list(id(), [ScalarValue::Int64(1), ScalarValue::Null])
            .build();
        assert_eq!(predicate.evaluate(&row(Some(1), None)).unwrap(), Truth::True);
        assert_eq!(
            predicate.evaluate(&row(Some(2), None)).unwrap(),
            Truth::Unknown
        );
        assert_eq!(predicate.evaluate(&row(None, None)).unwrap(), Truth::Unknown);
    }

    #[test]
    fn not_in_with_null_never_selects() {
        let predicate = PredicateBuilder::leaf()
            .not_in_list(id(), [ScalarValue::Null, ScalarValue::Int64(1)])
            .build();
        for candidate in [Some(1), Some(2), None] {
            assert!(!predicate
                .evaluate(&row(candidate, None))
                .unwrap()
                .is_true());
        }
    }

    #[test]
    fn null_safe_equality_matches_nulls() {
        let eq_null = PredicateBuilder::leaf()
            .equals(ColumnRef::new("dep"), ScalarValue::Null)
            .build();
        let safe_null = PredicateBuilder::leaf()
            .null_safe_equals(ColumnRef::new("dep"), ScalarValue::Null)
            .build();
        let null_dep = row(Some(1), None);
        assert_eq!(eq_null.evaluate(&null_dep).unwrap(), Truth::Unknown);
        assert_eq!(safe_null.evaluate(&null_dep).unwrap(), Truth::True);
        assert_eq!(
            safe_null.evaluate(&row(Some(1), Some("hr"))).unwrap(),
            Truth::False
        );
        assert_eq!(
            (!safe_null).evaluate(&row(Some(1), Some("hr"))).unwrap(),
            Truth::True
        );
    }

    #[test]
    fn exists_is_two_valued() {
        let rows = Arc::new(MaterializedRows::single_column([
            ScalarValue::Int64(1),
            ScalarValue::Null,
        ]));
        let exists = PredicateBuilder::leaf()
            .exists(vec![Correlation::new(id(), 0)], Arc::clone(&rows))
            .build();
        assert_eq!(exists.evaluate(&row(Some(1), None)).unwrap(), Truth::True);
        assert_eq!(exists.evaluate(&row(Some(5), None)).unwrap(), Truth::False);
        assert_eq!(exists.evaluate(&row(None, None)).unwrap(), Truth::False);

        let not_exists = PredicateBuilder::leaf()
            .not_exists(vec![Correlation::new(id(), 0)], rows)
            .build();
        assert_eq!(
            not_exists.evaluate(&row(None, None)).unwrap(),
            Truth::True
        );
    }

    #[test]
    fn like_and_non_determinism() {
        let like = PredicateBuilder::leaf()
            .like(ColumnRef::new("dep"), LikePattern::new("%ware").unwrap())
            .build();
        assert!(like.evaluate(&row(Some(1), Some("hardware"))).unwrap().is_true());
        assert_eq!(like.evaluate(&row(Some(1), None)).unwrap(), Truth::Unknown);

        let random = PredicateBuilder::leaf().non_deterministic("rand").build();
        assert!(matches!(
            random.evaluate(&row(Some(1), None)),
            Err(PredicateError::NonDeterministic(_))
        ));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let predicate = PredicateBuilder::leaf()
            .equals(ColumnRef::new("missing"), ScalarValue::Int64(1))
            .build();
        assert!(matches!(
            predicate.evaluate(&row(Some(1), None)),
            Err(PredicateError::UnknownColumn(name)) if name == "missing"
        ));
    }
}
