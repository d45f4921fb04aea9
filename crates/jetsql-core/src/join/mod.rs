//! Join classification and execution.
//!
//! Planning produces a [`JoinDescriptor`] per join site through the
//! [`JoinClassifier`]. Execution binds each descriptor to a [`RightRelation`]
//! in a [`JoinStage`]; a [`JoinChain`] runs several stages in sequence.

mod build;
mod cancel;
mod chain;
mod classifier;
mod descriptor;
mod hash_table;
mod key;
mod relation;
mod stage;

pub use build::{BuildSide, SharedBuild};
pub use cancel::CancellationToken;
pub use chain::{JoinChain, Projection};
pub use classifier::JoinClassifier;
pub use descriptor::JoinDescriptor;
pub use hash_table::{JoinHashTable, Probe, RowArena};
pub use relation::{
    DerivedTable, KeyedSource, MemoryRelation, PartitionedMap, RelationKind, RelationRef,
    RelationRegistry, RightRelation, ScanSource, TableRef,
};
pub use stage::{JoinMode, JoinStage, RightAccess};
