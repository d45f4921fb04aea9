//! Join planning and execution core for jetsql.
//!
//! This crate provides:
//! - Three-valued predicate evaluation over rows
//! - Equi-join classification of join conditions
//! - Hash-probe and full-scan join execution over bounded, partitioned and
//!   rescanned right relations
//! - Multi-way join chains
//! - Assembly of executable plan fragments

pub mod config;
pub mod error;
pub mod expr;
pub mod join;
pub mod metrics;
pub mod plan;

pub use config::JoinConfig;
pub use error::Error;
pub use expr::{ExprEvaluator, PredicateEvaluator, Ternary};
pub use join::{
    CancellationToken, JoinChain, JoinClassifier, JoinDescriptor, JoinMode, JoinStage,
    KeyedSource, MemoryRelation, PartitionedMap, Projection, RelationKind, RelationRef,
    RelationRegistry, RightRelation, ScanSource, TableRef,
};
pub use metrics::{JoinMetrics, JoinMetricsSnapshot};
pub use plan::{PlanAssembler, PlanFragment, Stage};
