use thiserror::Error;

/// Errors raised while building or evaluating predicates.
#[derive(Debug, Error)]
pub enum PredicateError {
    /// A column referenced by the predicate is not available on the row.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    /// A non-deterministic function cannot be evaluated reproducibly.
    #[error("non-deterministic function `{0}` cannot be evaluated")]
    NonDeterministic(String),
    /// `LIKE` was applied to a value that is not a string.
    #[error("LIKE requires a string operand, found {0}")]
    NotAString(&'static str),
    /// The `LIKE` pattern could not be compiled.
    #[error("invalid LIKE pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// Pattern as written.
        pattern: String,
        /// Compilation failure.
        reason: String,
    },
    /// Materialized subquery rows do not fit the leaf that uses them.
    #[error("invalid subquery: {0}")]
    InvalidSubquery(String),
}
