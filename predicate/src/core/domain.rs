//! Abstract evaluation of predicates over what is known about a group of rows.
//!
//! A [`DomainOracle`] describes the values a column may take inside a group
//! (a file, a partition, or nothing at all). [`OutcomeAnalyzer`] folds that
//! knowledge through the predicate tree and reports every truth value some row
//! of the group could produce. The result over-approximates: an outcome that
//! is absent from the set is impossible for every row.

use std::{cmp::Ordering, convert::Infallible};

use super::{
    eval::{compare_values, in_list, in_rows, null_safe_equal},
    ColumnRef, ComparisonOp, Correlation, EmptyRow, LikePattern, MaterializedRows, Operand,
    Predicate, PredicateLeaf, PredicateVisitor, ScalarValue, Truth, TruthSet, VisitOutcome,
};

/// Known range and nullability of one column within a group of rows.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnBounds {
    /// Inclusive lower bound of non-null values, when known.
    pub lower: Option<ScalarValue>,
    /// Inclusive upper bound of non-null values, when known.
    pub upper: Option<ScalarValue>,
    /// Whether some row may hold `NULL`.
    pub may_be_null: bool,
    /// Whether some row may hold a non-null value.
    pub may_be_non_null: bool,
}

impl ColumnBounds {
    /// Nothing is known.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            lower: None,
            upper: None,
            may_be_null: true,
            may_be_non_null: true,
        }
    }

    /// Every row holds `value` (which may be `NULL`).
    #[must_use]
    pub fn exact(value: ScalarValue) -> Self {
        if value.is_null() {
            return Self::only_null();
        }
        Self {
            lower: Some(value.clone()),
            upper: Some(value),
            may_be_null: false,
            may_be_non_null: true,
        }
    }

    /// Every row holds `NULL`.
    #[must_use]
    pub fn only_null() -> Self {
        Self {
            lower: None,
            upper: None,
            may_be_null: true,
            may_be_non_null: false,
        }
    }

    /// Non-null values lie within `[lower, upper]`.
    #[must_use]
    pub fn range(
        lower: Option<ScalarValue>,
        upper: Option<ScalarValue>,
        may_be_null: bool,
    ) -> Self {
        Self {
            lower,
            upper,
            may_be_null,
            may_be_non_null: true,
        }
    }

    /// Combines two independent facts about the same column.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        let lower = pick_bound(self.lower, other.lower, Ordering::Greater);
        let upper = pick_bound(self.upper, other.upper, Ordering::Less);
        let empty_range = matches!(
            (&lower, &upper),
            (Some(lo), Some(hi)) if lo.compare(hi) == Some(Ordering::Greater)
        );
        Self {
            lower,
            upper,
            may_be_null: self.may_be_null && other.may_be_null,
            may_be_non_null: self.may_be_non_null && other.may_be_non_null && !empty_range,
        }
    }

    /// The single non-null value every row holds, when the bounds pin one.
    #[must_use]
    pub fn single_value(&self) -> Option<&ScalarValue> {
        if self.may_be_null || !self.may_be_non_null {
            return None;
        }
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi)) if lo.compare(hi) == Some(Ordering::Equal) => Some(lo),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        !self.may_be_null && !self.may_be_non_null
    }

    /// `Some(ordering)` of the lower bound relative to `value`.
    fn lower_vs(&self, value: &ScalarValue) -> Option<Ordering> {
        self.lower.as_ref().and_then(|lo| lo.compare(value))
    }

    fn upper_vs(&self, value: &ScalarValue) -> Option<Ordering> {
        self.upper.as_ref().and_then(|hi| hi.compare(value))
    }
}

fn pick_bound(
    lhs: Option<ScalarValue>,
    rhs: Option<ScalarValue>,
    prefer: Ordering,
) -> Option<ScalarValue> {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => match lhs.compare(&rhs) {
            Some(ordering) if ordering == prefer.reverse() => Some(rhs),
            _ => Some(lhs),
        },
        (lhs, rhs) => lhs.or(rhs),
    }
}

/// Source of per-column knowledge for a group of rows.
pub trait DomainOracle {
    /// Known bounds of `column`.
    fn bounds(&self, column: &ColumnRef) -> ColumnBounds;

    /// Whether some row may hold the non-null `value` in `column`.
    ///
    /// Lets hashed or prefixed layouts refute equality beyond what bounds can express.
    fn may_contain(&self, _column: &ColumnRef, _value: &ScalarValue) -> bool {
        true
    }
}

/// Oracle that knows nothing about any column.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unconstrained;

impl DomainOracle for Unconstrained {
    fn bounds(&self, _column: &ColumnRef) -> ColumnBounds {
        ColumnBounds::unknown()
    }
}

/// Visitor computing the [`TruthSet`] of a predicate over a domain.
pub struct OutcomeAnalyzer<'d, D: ?Sized> {
    oracle: &'d D,
}

enum Abstract<'a> {
    Literal(&'a ScalarValue),
    Column(&'a ColumnRef, ColumnBounds),
}

impl<'d, D> OutcomeAnalyzer<'d, D>
where
    D: DomainOracle + ?Sized,
{
    /// Analyzer over `oracle`.
    pub fn new(oracle: &'d D) -> Self {
        Self { oracle }
    }

    /// Possible outcomes of `predicate` over the oracle's rows.
    pub fn analyze(&mut self, predicate: &Predicate) -> TruthSet {
        match predicate.accept(self) {
            Ok(outcome) => outcome.value.unwrap_or(TruthSet::ALL),
            Err(never) => match never {},
        }
    }

    fn abstract_operand<'a>(&self, operand: &'a Operand) -> Abstract<'a> {
        match operand {
            Operand::Literal(value) => Abstract::Literal(value),
            Operand::Column(column) => Abstract::Column(column, self.oracle.bounds(column)),
        }
    }

    fn compare(&self, left: &Operand, op: ComparisonOp, right: &Operand) -> TruthSet {
        match (self.abstract_operand(left), self.abstract_operand(right)) {
            (Abstract::Literal(lhs), Abstract::Literal(rhs)) => {
                TruthSet::only(compare_values(lhs, op, rhs))
            }
            (Abstract::Column(column, bounds), Abstract::Literal(value)) => {
                self.column_vs_literal(column, &bounds, op, value)
            }
            (Abstract::Literal(value), Abstract::Column(column, bounds)) => {
                self.column_vs_literal(column, &bounds, op.flipped(), value)
            }
            (Abstract::Column(_, lhs), Abstract::Column(_, rhs)) => {
                let both = lhs.may_be_non_null && rhs.may_be_non_null;
                TruthSet::of(both, both, lhs.may_be_null || rhs.may_be_null)
            }
        }
    }

    fn equality_possible(&self, column: &ColumnRef, bounds: &ColumnBounds, value: &ScalarValue) -> bool {
        bounds.may_be_non_null
            && bounds.lower_vs(value) != Some(Ordering::Greater)
            && bounds.upper_vs(value) != Some(Ordering::Less)
            && self.oracle.may_contain(column, value)
    }

    fn all_equal(bounds: &ColumnBounds, value: &ScalarValue) -> bool {
        !bounds.may_be_null
            && bounds.lower_vs(value) == Some(Ordering::Equal)
            && bounds.upper_vs(value) == Some(Ordering::Equal)
    }

    fn column_vs_literal(
        &self,
        column: &ColumnRef,
        bounds: &ColumnBounds,
        op: ComparisonOp,
        value: &ScalarValue,
    ) -> TruthSet {
        if bounds.is_empty() {
            return TruthSet::EMPTY;
        }
        if value.is_null() {
            return TruthSet::only(Truth::Unknown);
        }
        let unknown = bounds.may_be_null;
        if !bounds.may_be_non_null {
            return TruthSet::of(false, false, unknown);
        }
        let lo = bounds.lower_vs(value);
        let hi = bounds.upper_vs(value);
        let (can_true, can_false) = match op {
            ComparisonOp::Equal => (
                self.equality_possible(column, bounds, value),
                !Self::all_equal(bounds, value),
            ),
            ComparisonOp::NotEqual => (
                !Self::all_equal(bounds, value),
                self.equality_possible(column, bounds, value),
            ),
            ComparisonOp::LessThan => (
                lo.map_or(true, |o| o == Ordering::Less),
                hi.map_or(true, |o| o != Ordering::Less),
            ),
            ComparisonOp::LessThanOrEqual => (
                lo.map_or(true, |o| o != Ordering::Greater),
                hi.map_or(true, |o| o == Ordering::Greater),
            ),
            ComparisonOp::GreaterThan => (
                hi.map_or(true, |o| o == Ordering::Greater),
                lo.map_or(true, |o| o != Ordering::Greater),
            ),
            ComparisonOp::GreaterThanOrEqual => (
                hi.map_or(true, |o| o != Ordering::Less),
                lo.map_or(true, |o| o == Ordering::Less),
            ),
        };
        TruthSet::of(can_true, can_false, unknown)
    }

    fn null_safe_equal(&self, left: &Operand, right: &Operand) -> TruthSet {
        match (self.abstract_operand(left), self.abstract_operand(right)) {
            (Abstract::Literal(lhs), Abstract::Literal(rhs)) => {
                TruthSet::only(Truth::from_bool(null_safe_equal(lhs, rhs)))
            }
            (Abstract::Column(column, bounds), Abstract::Literal(value))
            | (Abstract::Literal(value), Abstract::Column(column, bounds)) => {
                if value.is_null() {
                    return TruthSet::of(bounds.may_be_null, bounds.may_be_non_null, false);
                }
                let can_true = self.equality_possible(column, &bounds, value);
                let can_false = bounds.may_be_null
                    || (bounds.may_be_non_null && !Self::all_equal(&bounds, value));
                TruthSet::of(can_true, can_false, false)
            }
            (Abstract::Column(_, lhs), Abstract::Column(_, rhs)) => {
                let any = !lhs.is_empty() && !rhs.is_empty();
                TruthSet::of(any, any, false)
            }
        }
    }

    fn is_null(&self, expr: &Operand, negated: bool) -> TruthSet {
        let (null, non_null) = match self.abstract_operand(expr) {
            Abstract::Literal(value) => (value.is_null(), !value.is_null()),
            Abstract::Column(_, bounds) => (bounds.may_be_null, bounds.may_be_non_null),
        };
        if negated {
            TruthSet::of(non_null, null, false)
        } else {
            TruthSet::of(null, non_null, false)
        }
    }

    fn in_list<'a, I>(&self, expr: &Operand, list: I, negated: bool) -> TruthSet
    where
        I: IntoIterator<Item = &'a ScalarValue>,
    {
        let set = match self.abstract_operand(expr) {
            Abstract::Literal(value) => {
                let items: Vec<ScalarValue> = list.into_iter().cloned().collect();
                TruthSet::only(in_list(value, &items))
            }
            Abstract::Column(column, bounds) => {
                let mut set = TruthSet::EMPTY;
                let mut has_null = false;
                let mut is_empty = true;
                let mut can_match = false;
                let mut always_member = false;
                for item in list {
                    is_empty = false;
                    if item.is_null() {
                        has_null = true;
                        continue;
                    }
                    can_match |= self.equality_possible(column, &bounds, item);
                    always_member |= Self::all_equal(&bounds, item);
                }
                if bounds.may_be_non_null {
                    if can_match {
                        set.insert(Truth::True);
                    }
                    if !always_member {
                        set.insert(if has_null { Truth::Unknown } else { Truth::False });
                    }
                }
                if bounds.may_be_null {
                    set.insert(if is_empty { Truth::False } else { Truth::Unknown });
                }
                set
            }
        };
        if negated {
            set.not()
        } else {
            set
        }
    }

    fn in_subquery(&self, exprs: &[Operand], rows: &MaterializedRows, negated: bool) -> TruthSet {
        let literals: Option<Vec<ScalarValue>> = exprs
            .iter()
            .map(|expr| match expr {
                Operand::Literal(value) => Some(value.clone()),
                Operand::Column(_) => None,
            })
            .collect();
        let set = if let Some(values) = literals {
            TruthSet::only(in_rows(&values, rows))
        } else if exprs.len() == 1 {
            return self.in_list(&exprs[0], rows.column(0), negated);
        } else if rows.is_empty() {
            TruthSet::only(Truth::False)
        } else {
            TruthSet::ALL
        };
        if negated {
            set.not()
        } else {
            set
        }
    }

    fn exists(&self, correlations: &[Correlation], rows: &MaterializedRows, negated: bool) -> TruthSet {
        let mut can_match = false;
        let mut must_match = false;
        for row in rows.rows() {
            let matched = correlations.iter().fold(TruthSet::only(Truth::True), |acc, correlation| {
                let inner = row
                    .get(correlation.inner)
                    .map_or(TruthSet::ALL, |value| {
                        self.compare(
                            &correlation.outer,
                            ComparisonOp::Equal,
                            &Operand::Literal(value.clone()),
                        )
                    });
                acc.and(inner)
            });
            can_match |= matched.can_be_true();
            must_match |= matched.is_always_true();
        }
        let set = TruthSet::of(can_match, !must_match, false);
        if negated {
            set.not()
        } else {
            set
        }
    }

    fn like(&self, expr: &Operand, pattern: &LikePattern, negated: bool) -> TruthSet {
        let set = match self.abstract_operand(expr) {
            Abstract::Literal(value) => match value {
                ScalarValue::Null => TruthSet::only(Truth::Unknown),
                ScalarValue::Utf8(text) => TruthSet::only(Truth::from_bool(pattern.matches(text))),
                _ => TruthSet::ALL,
            },
            Abstract::Column(_, bounds) => match bounds.single_value() {
                Some(ScalarValue::Utf8(text)) => {
                    TruthSet::only(Truth::from_bool(pattern.matches(text)))
                }
                _ => TruthSet::of(bounds.may_be_non_null, bounds.may_be_non_null, bounds.may_be_null),
            },
        };
        if negated {
            set.not()
        } else {
            set
        }
    }

    fn leaf(&self, leaf: &PredicateLeaf) -> TruthSet {
        match leaf {
            PredicateLeaf::Literal(value) => TruthSet::only(Truth::from_bool(*value)),
            PredicateLeaf::Compare { left, op, right } => self.compare(left, *op, right),
            PredicateLeaf::NullSafeEqual { left, right } => self.null_safe_equal(left, right),
            PredicateLeaf::IsNull { expr, negated } => self.is_null(expr, *negated),
            PredicateLeaf::InList {
                expr,
                list,
                negated,
            } => self.in_list(expr, list.iter(), *negated),
            PredicateLeaf::InSubquery {
                exprs,
                rows,
                negated,
            } => self.in_subquery(exprs, rows, *negated),
            PredicateLeaf::Exists {
                correlations,
                rows,
                negated,
            } => self.exists(correlations, rows, *negated),
            PredicateLeaf::Like {
                expr,
                pattern,
                negated,
            } => self.like(expr, pattern, *negated),
            PredicateLeaf::NonDeterministic { .. } => TruthSet::ALL,
        }
    }
}

fn fold_children(
    children: Vec<VisitOutcome<TruthSet>>,
    op: fn(TruthSet, TruthSet) -> TruthSet,
) -> VisitOutcome<TruthSet> {
    let value = children
        .into_iter()
        .map(|child| child.value.unwrap_or(TruthSet::ALL))
        .reduce(op)
        .unwrap_or(TruthSet::ALL);
    VisitOutcome::value(value)
}

impl<D> PredicateVisitor for OutcomeAnalyzer<'_, D>
where
    D: DomainOracle + ?Sized,
{
    type Error = Infallible;
    type Value = TruthSet;

    fn visit_leaf(&mut self, leaf: &PredicateLeaf) -> Result<VisitOutcome<TruthSet>, Infallible> {
        Ok(VisitOutcome::value(self.leaf(leaf)))
    }

    fn combine_not(
        &mut self,
        _original: &Predicate,
        child: VisitOutcome<TruthSet>,
    ) -> Result<VisitOutcome<TruthSet>, Infallible> {
        Ok(VisitOutcome::value(
            child.value.unwrap_or(TruthSet::ALL).not(),
        ))
    }

    fn combine_and(
        &mut self,
        _original: &Predicate,
        children: Vec<VisitOutcome<TruthSet>>,
    ) -> Result<VisitOutcome<TruthSet>, Infallible> {
        Ok(fold_children(children, TruthSet::and))
    }

    fn combine_or(
        &mut self,
        _original: &Predicate,
        children: Vec<VisitOutcome<TruthSet>>,
    ) -> Result<VisitOutcome<TruthSet>, Infallible> {
        Ok(fold_children(children, TruthSet::or))
    }
}

impl Predicate {
    /// Truth values the predicate may produce for rows described by `oracle`.
    pub fn possible_outcomes<D>(&self, oracle: &D) -> TruthSet
    where
        D: DomainOracle + ?Sized,
    {
        OutcomeAnalyzer::new(oracle).analyze(self)
    }

    /// Truth values the predicate may produce for any row at all.
    ///
    /// Without `TRUE` the predicate can never select a row; with only `TRUE`
    /// it selects every row.
    #[must_use]
    pub fn static_outcomes(&self) -> TruthSet {
        self.possible_outcomes(&Unconstrained)
    }

    /// Evaluates a predicate that references no columns.
    pub fn evaluate_constant(&self) -> Result<Truth, crate::PredicateError> {
        self.evaluate(&EmptyRow)
    }
}
