//! jetsql shared types.
//!
//! This crate defines the plain data exchanged between the optimizer, the join
//! core and the execution runtime:
//!
//! - [`value`] - Typed, nullable values
//! - [`row`] - Fixed-arity rows
//! - [`expr`] - Resolved predicate and scalar expression trees
//! - [`metadata`] - Result row metadata
//! - [`query_id`] - Query identifiers
//! - [`error`] - Error types
//!
//! Value-level types derive both `rkyv` and `serde`; the recursive [`Expr`]
//! tree derives `serde` only.

pub mod error;
pub mod expr;
pub mod metadata;
pub mod query_id;
pub mod row;
pub mod value;

pub use error::Error;
pub use expr::{ArithmeticOp, CompareOp, Expr};
pub use metadata::{ColumnMetadata, ColumnType, RowMetadata};
pub use query_id::QueryId;
pub use row::Row;
pub use value::Value;
