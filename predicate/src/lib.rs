#![deny(missing_docs)]
//! Predicate trees for strata's delete path.
//!
//! Predicates arrive already normalized: comparisons, null checks, literal
//! lists, materialized subquery rows and `LIKE` patterns under `AND` / `OR` /
//! `NOT`. The crate evaluates them row by row with SQL three-valued logic and
//! analyzes them over column bounds to decide, without reading data, whether a
//! group of rows can (or must) match.

mod core;
mod error;

pub use core::{
    compare_values, in_list, in_rows, null_safe_equal, BitmapRowSet, ColumnBounds, ColumnRef,
    ComparisonOp, Correlation, DomainOracle, EmptyRow, LikePattern, MaterializedRows, Operand,
    OutcomeAnalyzer, Predicate, PredicateBuilder, PredicateFacts, PredicateInner, PredicateLeaf,
    PredicateNode, PredicateVisitor, RowAccess, RowEvaluator, RowId, RowIdIter, RowSet,
    ScalarValue, Truth, TruthSet, Unconstrained, VisitOutcome,
};
pub use error::PredicateError;
