//! Plan assembly and the plan fragment handed to the runtime.

mod assembly;
mod dag;
mod fragment;

pub use assembly::{JoinSite, PlanAssembler, SinkSpec, SourceSpec, Stage};
pub use dag::{Dag, Edge, EdgeKind, Vertex, VertexId, VertexKind};
pub use fragment::PlanFragment;
