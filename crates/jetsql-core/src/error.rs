//! Core error types.

use thiserror::Error;

/// Errors raised while planning or executing joins.
#[derive(Debug, Error)]
pub enum Error {
    /// The right side of a join is a derived table rather than a direct
    /// relation reference.
    #[error("Subquery on the right side of a join not supported")]
    SubqueryOnRightSide,

    /// The probed side of a join is unbounded.
    #[error("unbounded relation '{0}' cannot be used on the right side of a join")]
    UnboundedRightSide(String),

    /// The join condition is malformed for the row shapes it was given.
    #[error("invalid join condition: {0}")]
    InvalidCondition(String),

    /// The plan has a shape the assembler cannot accept.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Expression evaluation failed (overflow, division by zero, bad column).
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Two values of unrelated types were ordered against each other.
    #[error("cannot compare {left} with {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },

    /// A lookup or scan against a right-relation provider failed.
    #[error("access to relation '{relation}' failed: {message}")]
    Transport {
        relation: String,
        retryable: bool,
        message: String,
    },

    /// A row written to a keyed relation has a null key column.
    #[error("relation '{0}' cannot store a row with a null key")]
    NullKey(String),

    /// The query was cancelled while the join was running.
    #[error("query cancelled")]
    Cancelled,

    /// Materializing the right side exceeded the configured row limit.
    #[error("build side of '{relation}' exceeded the limit of {limit} rows")]
    BuildLimitExceeded { relation: String, limit: usize },

    /// The requested operation is not implemented.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// Shared data type error.
    #[error("protocol error: {0}")]
    Protocol(#[from] jetsql_proto::Error),
}

impl Error {
    /// Build a transport failure for a relation provider.
    pub fn transport(
        relation: impl Into<String>,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        Error::Transport {
            relation: relation.into(),
            retryable,
            message: message.into(),
        }
    }

    /// Whether the runtime may retry the failed stage.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { retryable: true, .. })
    }
}
