//! Core predicate structures shared by the planner, the pruner and the rewrite path.

mod builder;
mod domain;
mod eval;
mod node;
mod operand;
mod outcome;
mod row_set;
mod subquery;
mod value;
mod visitor;

pub use builder::PredicateBuilder;
pub use domain::{ColumnBounds, DomainOracle, OutcomeAnalyzer, Unconstrained};
pub use eval::{
    compare_values, in_list, in_rows, null_safe_equal, EmptyRow, RowAccess, RowEvaluator, Truth,
};
pub use node::{ComparisonOp, Predicate, PredicateInner, PredicateLeaf, PredicateNode};
pub use operand::{ColumnRef, Operand};
pub use outcome::TruthSet;
pub use row_set::{BitmapRowSet, RowId, RowIdIter, RowSet};
pub use subquery::{Correlation, LikePattern, MaterializedRows};
pub use value::ScalarValue;
pub use visitor::{PredicateFacts, PredicateVisitor, VisitOutcome};
