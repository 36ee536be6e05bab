use super::{Predicate, PredicateInner, PredicateLeaf, PredicateNode};

/// Result produced while evaluating parts of a predicate tree.
#[derive(Clone, Debug, Default)]
pub struct VisitOutcome<T> {
    /// Computed value for the evaluated portion, when available.
    pub value: Option<T>,
    /// Residual predicate that still needs evaluation elsewhere.
    pub residual: Option<Predicate>,
}

impl<T> VisitOutcome<T> {
    /// Outcome containing only a computed value.
    pub fn value(value: T) -> Self {
        Self {
            value: Some(value),
            residual: None,
        }
    }

    /// Outcome containing only a residual predicate.
    pub fn residual(residual: Predicate) -> Self {
        Self {
            value: None,
            residual: Some(residual),
        }
    }

    /// Outcome without value or residual.
    pub fn empty() -> Self {
        Self {
            value: None,
            residual: None,
        }
    }
}

/// Visitor that walks predicate trees and emits custom results plus residual predicates.
pub trait PredicateVisitor {
    /// Error type used when evaluation fails.
    type Error;
    /// Concrete value type produced while walking the predicate.
    type Value;

    /// Evaluates a leaf predicate and returns its result.
    fn visit_leaf(
        &mut self,
        leaf: &PredicateLeaf,
    ) -> Result<VisitOutcome<Self::Value>, Self::Error>;

    /// Combines the result of a negated child predicate.
    fn combine_not(
        &mut self,
        original: &Predicate,
        child: VisitOutcome<Self::Value>,
    ) -> Result<VisitOutcome<Self::Value>, Self::Error>;

    /// Combines an `AND` clause from the supplied child results.
    fn combine_and(
        &mut self,
        original: &Predicate,
        children: Vec<VisitOutcome<Self::Value>>,
    ) -> Result<VisitOutcome<Self::Value>, Self::Error>;

    /// Combines an `OR` clause from the supplied child results.
    fn combine_or(
        &mut self,
        original: &Predicate,
        children: Vec<VisitOutcome<Self::Value>>,
    ) -> Result<VisitOutcome<Self::Value>, Self::Error>;

    /// Visits the supplied predicate by walking the expression tree.
    fn visit_predicate(
        &mut self,
        predicate: &Predicate,
    ) -> Result<VisitOutcome<Self::Value>, Self::Error> {
        self.visit_node(predicate.kind(), predicate)
    }

    /// Internal helper that evaluates a predicate node recursively.
    fn visit_node(
        &mut self,
        node: &PredicateNode,
        original: &Predicate,
    ) -> Result<VisitOutcome<Self::Value>, Self::Error> {
        match node {
            PredicateNode::Leaf(leaf) => self.visit_leaf(leaf),
            PredicateNode::Inner(PredicateInner::Not(inner)) => {
                let child = self.visit_predicate(inner)?;
                self.combine_not(original, child)
            }
            PredicateNode::Inner(PredicateInner::And(clauses)) => {
                debug_assert!(
                    !clauses.is_empty(),
                    "Predicate::make_and enforces at least one clause"
                );
                let children = clauses
                    .iter()
                    .map(|clause| self.visit_predicate(clause))
                    .collect::<Result<Vec<_>, _>>()?;
                self.combine_and(original, children)
            }
            PredicateNode::Inner(PredicateInner::Or(clauses)) => {
                debug_assert!(
                    !clauses.is_empty(),
                    "Predicate::make_or enforces at least one clause"
                );
                let children = clauses
                    .iter()
                    .map(|clause| self.visit_predicate(clause))
                    .collect::<Result<Vec<_>, _>>()?;
                self.combine_or(original, children)
            }
        }
    }
}

/// Collects facts about a predicate that the planner needs before touching data.
#[derive(Clone, Debug, Default)]
pub struct PredicateFacts {
    /// Names of non-deterministic functions, in visit order.
    pub non_deterministic: Vec<String>,
    /// Whether any leaf depends on materialized subquery rows.
    pub uses_subquery: bool,
    /// Referenced columns, deduplicated in first-seen order.
    pub columns: Vec<String>,
}

impl PredicateFacts {
    /// Walks `predicate` once and gathers its facts.
    #[must_use]
    pub fn collect(predicate: &Predicate) -> Self {
        let mut facts = Self::default();
        // `visit_leaf` never fails for this visitor.
        let _ = predicate.accept(&mut facts);
        facts
    }

    /// True when the predicate evaluates the same way on every run.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.non_deterministic.is_empty()
    }

    fn note_operand(&mut self, operand: &super::Operand) {
        if let Some(column) = operand.as_column() {
            if !self.columns.iter().any(|name| **name == *column.name) {
                self.columns.push(column.name.to_string());
            }
        }
    }
}

impl PredicateVisitor for PredicateFacts {
    type Error = std::convert::Infallible;
    type Value = ();

    fn visit_leaf(&mut self, leaf: &PredicateLeaf) -> Result<VisitOutcome<()>, Self::Error> {
        match leaf {
            PredicateLeaf::Literal(_) => {}
            PredicateLeaf::Compare { left, right, .. }
            | PredicateLeaf::NullSafeEqual { left, right } => {
                self.note_operand(left);
                self.note_operand(right);
            }
            PredicateLeaf::IsNull { expr, .. }
            | PredicateLeaf::InList { expr, .. }
            | PredicateLeaf::Like { expr, .. } => self.note_operand(expr),
            PredicateLeaf::InSubquery { exprs, .. } => {
                self.uses_subquery = true;
                for expr in exprs {
                    self.note_operand(expr);
                }
            }
            PredicateLeaf::Exists { correlations, .. } => {
                self.uses_subquery = true;
                for correlation in correlations {
                    self.note_operand(&correlation.outer);
                }
            }
            PredicateLeaf::NonDeterministic { function } => {
                self.non_deterministic.push(function.to_string());
            }
        }
        Ok(VisitOutcome::empty())
    }

    fn combine_not(
        &mut self,
        _original: &Predicate,
        _child: VisitOutcome<()>,
    ) -> Result<VisitOutcome<()>, Self::Error> {
        Ok(VisitOutcome::empty())
    }

    fn combine_and(
        &mut self,
        _original: &Predicate,
        _children: Vec<VisitOutcome<()>>,
    ) -> Result<VisitOutcome<()>, Self::Error> {
        Ok(VisitOutcome::empty())
    }

    fn combine_or(
        &mut self,
        _original: &Predicate,
        _children: Vec<VisitOutcome<()>>,
    ) -> Result<VisitOutcome<()>, Self::Error> {
        Ok(VisitOutcome::empty())
    }
}
