//! Protocol error types.

use thiserror::Error;

/// Errors raised while constructing or reshaping shared data types.
#[derive(Debug, Error)]
pub enum Error {
    /// A row did not have the arity its consumer expected.
    #[error("arity mismatch: expected {expected} columns, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// A column position was outside the row.
    #[error("column index {index} out of range for row of arity {arity}")]
    ColumnOutOfRange { index: usize, arity: usize },

    /// Row metadata was malformed.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}
