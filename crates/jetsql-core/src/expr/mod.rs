//! Predicate evaluation under SQL three-valued logic.

mod evaluator;
mod ternary;

pub use evaluator::{ExprEvaluator, PredicateEvaluator};
pub use ternary::Ternary;

pub(crate) use evaluator::sql_equals;
