use std::{cmp::Ordering, fmt, ops::Not, sync::Arc};

use super::{
    Correlation, LikePattern, MaterializedRows, Operand, PredicateVisitor, ScalarValue,
    VisitOutcome,
};

/// Comparison operator used by binary predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// Equals (`=`).
    Equal,
    /// Not equals (`!=`).
    NotEqual,
    /// Less than (`<`).
    LessThan,
    /// Less than or equal to (`<=`).
    LessThanOrEqual,
    /// Greater than (`>`).
    GreaterThan,
    /// Greater than or equal to (`>=`).
    GreaterThanOrEqual,
}

impl ComparisonOp {
    /// Returns a textual representation of the operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "!=",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessThanOrEqual => "<=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterThanOrEqual => ">=",
        }
    }

    /// Returns the operator that swaps the left/right side of the comparison.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            ComparisonOp::Equal => ComparisonOp::Equal,
            ComparisonOp::NotEqual => ComparisonOp::NotEqual,
            ComparisonOp::LessThan => ComparisonOp::GreaterThan,
            ComparisonOp::LessThanOrEqual => ComparisonOp::GreaterThanOrEqual,
            ComparisonOp::GreaterThan => ComparisonOp::LessThan,
            ComparisonOp::GreaterThanOrEqual => ComparisonOp::LessThanOrEqual,
        }
    }

    /// Returns the logical negation of this operator.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            ComparisonOp::Equal => ComparisonOp::NotEqual,
            ComparisonOp::NotEqual => ComparisonOp::Equal,
            ComparisonOp::LessThan => ComparisonOp::GreaterThanOrEqual,
            ComparisonOp::LessThanOrEqual => ComparisonOp::GreaterThan,
            ComparisonOp::GreaterThan => ComparisonOp::LessThanOrEqual,
            ComparisonOp::GreaterThanOrEqual => ComparisonOp::LessThan,
        }
    }

    /// Evaluates the operator against a comparison ordering.
    #[must_use]
    pub fn test_ordering(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering == Ordering::Equal,
            ComparisonOp::NotEqual => ordering != Ordering::Equal,
            ComparisonOp::LessThan => ordering == Ordering::Less,
            ComparisonOp::LessThanOrEqual => ordering != Ordering::Greater,
            ComparisonOp::GreaterThan => ordering == Ordering::Greater,
            ComparisonOp::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized row predicate consumed by the delete pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    kind: PredicateNode,
}

impl Predicate {
    /// Returns a reference to the underlying node.
    #[must_use]
    pub fn kind(&self) -> &PredicateNode {
        &self.kind
    }

    /// Constant predicate, `TRUE` or `FALSE` for every row.
    #[must_use]
    pub fn always(value: bool) -> Self {
        Self::from_leaf(PredicateLeaf::Literal(value))
    }

    /// Builds a conjunction from the supplied clauses.
    ///
    /// # Panics
    ///
    /// Panics if no clauses are provided.
    #[must_use]
    pub(crate) fn make_and<I>(clauses: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        let mut acc = Vec::new();
        for clause in clauses {
            match clause.into_kind() {
                PredicateNode::Inner(PredicateInner::And(mut nested)) => acc.append(&mut nested),
                other => acc.push(Predicate::from_kind(other)),
            }
        }

        assert!(
            !acc.is_empty(),
            "Predicate::make_and requires at least one clause"
        );

        match acc.len() {
            1 => acc.remove(0),
            _ => Self::from_kind(PredicateNode::Inner(PredicateInner::And(acc))),
        }
    }

    /// Builds a disjunction from the supplied clauses.
    ///
    /// # Panics
    ///
    /// Panics if no clauses are provided.
    #[must_use]
    pub(crate) fn make_or<I>(clauses: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        let mut acc = Vec::new();
        for clause in clauses {
            match clause.into_kind() {
                PredicateNode::Inner(PredicateInner::Or(mut nested)) => acc.append(&mut nested),
                other => acc.push(Predicate::from_kind(other)),
            }
        }

        assert!(
            !acc.is_empty(),
            "Predicate::make_or requires at least one clause"
        );

        match acc.len() {
            1 => acc.remove(0),
            _ => Self::from_kind(PredicateNode::Inner(PredicateInner::Or(acc))),
        }
    }

    /// Applies simple simplification rules to reduce nesting.
    #[must_use]
    pub fn simplify(self) -> Self {
        match self.kind {
            PredicateNode::Leaf(_) => self,
            PredicateNode::Inner(PredicateInner::Not(inner)) => {
                match inner.simplify().into_kind() {
                    PredicateNode::Inner(PredicateInner::Not(grandchild)) => *grandchild,
                    other => Self::negation_of(Self::from_kind(other)),
                }
            }
            PredicateNode::Inner(PredicateInner::And(clauses)) => {
                Predicate::make_and(clauses.into_iter().map(Predicate::simplify))
            }
            PredicateNode::Inner(PredicateInner::Or(clauses)) => {
                Predicate::make_or(clauses.into_iter().map(Predicate::simplify))
            }
        }
    }

    /// Returns the logical negation of this predicate, pushed towards the leaves.
    ///
    /// The result has the same three-valued semantics as `NOT (self)`.
    #[must_use]
    pub fn negate(self) -> Self {
        let negated = match self.kind {
            PredicateNode::Leaf(leaf) => Predicate::negate_leaf(leaf),
            PredicateNode::Inner(PredicateInner::Not(inner)) => *inner,
            PredicateNode::Inner(PredicateInner::And(children)) => {
                Predicate::make_or(children.into_iter().map(Predicate::negate))
            }
            PredicateNode::Inner(PredicateInner::Or(children)) => {
                Predicate::make_and(children.into_iter().map(Predicate::negate))
            }
        };
        negated.simplify()
    }

    /// Builds a conjunction from the supplied predicates, if any are provided.
    #[must_use]
    pub fn conjunction(predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.into_iter().next(),
            _ => Some(Predicate::make_and(predicates).simplify()),
        }
    }

    /// Builds a disjunction from the supplied predicates, if any.
    #[must_use]
    pub fn disjunction(predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.into_iter().next(),
            _ => Some(Predicate::make_or(predicates).simplify()),
        }
    }

    /// Builds a predicate directly from a leaf node.
    #[must_use]
    pub fn from_leaf(leaf: PredicateLeaf) -> Self {
        Self::from_kind(PredicateNode::Leaf(leaf))
    }

    /// Accepts a visitor that walks the predicate tree bottom-up.
    pub fn accept<V>(&self, visitor: &mut V) -> Result<VisitOutcome<V::Value>, V::Error>
    where
        V: PredicateVisitor + ?Sized,
    {
        visitor.visit_predicate(self)
    }

    pub(crate) fn from_kind(kind: PredicateNode) -> Self {
        Self { kind }
    }

    pub(crate) fn negation_of(predicate: Predicate) -> Self {
        Self::from_kind(PredicateNode::Inner(PredicateInner::Not(Box::new(
            predicate,
        ))))
    }

    fn into_kind(self) -> PredicateNode {
        self.kind
    }

    fn negate_leaf(leaf: PredicateLeaf) -> Predicate {
        let negated = match leaf {
            PredicateLeaf::Literal(value) => PredicateLeaf::Literal(!value),
            PredicateLeaf::Compare { left, op, right } => PredicateLeaf::Compare {
                left,
                op: op.negated(),
                right,
            },
            PredicateLeaf::IsNull { expr, negated } => PredicateLeaf::IsNull {
                expr,
                negated: !negated,
            },
            PredicateLeaf::InList {
                expr,
                list,
                negated,
            } => PredicateLeaf::InList {
                expr,
                list,
                negated: !negated,
            },
            PredicateLeaf::InSubquery {
                exprs,
                rows,
                negated,
            } => PredicateLeaf::InSubquery {
                exprs,
                rows,
                negated: !negated,
            },
            PredicateLeaf::Exists {
                correlations,
                rows,
                negated,
            } => PredicateLeaf::Exists {
                correlations,
                rows,
                negated: !negated,
            },
            PredicateLeaf::Like {
                expr,
                pattern,
                negated,
            } => PredicateLeaf::Like {
                expr,
                pattern,
                negated: !negated,
            },
            leaf @ (PredicateLeaf::NullSafeEqual { .. } | PredicateLeaf::NonDeterministic { .. }) => {
                return Predicate::negation_of(Predicate::from_leaf(leaf));
            }
        };
        Predicate::from_leaf(negated)
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

/// Categorises a predicate node as leaf or branch.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateNode {
    /// Leaf predicates without child expressions.
    Leaf(PredicateLeaf),
    /// Branch predicates with one or more child predicates.
    Inner(PredicateInner),
}

/// Leaf predicates encode terminal expressions with no child nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateLeaf {
    /// Constant `TRUE` / `FALSE`.
    Literal(bool),
    /// Binary comparison. `NULL` on either side yields UNKNOWN.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: ComparisonOp,
        /// Right operand.
        right: Operand,
    },
    /// Null-safe equality (`<=>`): `NULL <=> NULL` is TRUE, never UNKNOWN.
    NullSafeEqual {
        /// Left operand.
        left: Operand,
        /// Right operand.
        right: Operand,
    },
    /// Null check (`IS NULL` / `IS NOT NULL`).
    IsNull {
        /// Operand under inspection.
        expr: Operand,
        /// True when representing `IS NOT NULL`.
        negated: bool,
    },
    /// Membership test against a literal list.
    InList {
        /// Value to test.
        expr: Operand,
        /// Literal candidates.
        list: Vec<ScalarValue>,
        /// True when representing `NOT IN`.
        negated: bool,
    },
    /// Membership test of a value tuple against materialized subquery rows.
    InSubquery {
        /// Tuple to test, one operand per subquery column.
        exprs: Vec<Operand>,
        /// Materialized subquery output.
        rows: Arc<MaterializedRows>,
        /// True when representing `NOT IN`.
        negated: bool,
    },
    /// Correlated existence test against materialized subquery rows.
    Exists {
        /// Equalities joining the tested row with subquery rows.
        correlations: Vec<Correlation>,
        /// Materialized subquery output.
        rows: Arc<MaterializedRows>,
        /// True when representing `NOT EXISTS`.
        negated: bool,
    },
    /// String pattern match (`LIKE`).
    Like {
        /// Value to test.
        expr: Operand,
        /// Compiled pattern.
        pattern: LikePattern,
        /// True when representing `NOT LIKE`.
        negated: bool,
    },
    /// Call to a function whose result differs between evaluations, such as `rand()`.
    NonDeterministic {
        /// Function name.
        function: Arc<str>,
    },
}

/// Branch predicates contain one or more child predicates.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateInner {
    /// Logical negation.
    Not(Box<Predicate>),
    /// Conjunction over multiple predicates.
    And(Vec<Predicate>),
    /// Disjunction over multiple predicates.
    Or(Vec<Predicate>),
}
