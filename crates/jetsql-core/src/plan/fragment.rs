//! The compiled plan handed to the execution runtime.

use jetsql_proto::{QueryId, RowMetadata};

use super::assembly::{JoinSite, SinkSpec, SourceSpec};
use super::dag::{Dag, VertexKind};
use crate::error::Error;
use crate::join::Projection;

/// An immutable, executable plan.
///
/// Only [`PlanAssembler`](super::PlanAssembler) creates fragments; nothing
/// mutates one afterwards.
#[derive(Debug, Clone)]
pub struct PlanFragment {
    dag: Dag,
    is_streaming: bool,
    is_insert: bool,
    query_id: QueryId,
    row_metadata: RowMetadata,
}

impl PlanFragment {
    pub(crate) fn new(
        dag: Dag,
        is_streaming: bool,
        is_insert: bool,
        query_id: QueryId,
        row_metadata: RowMetadata,
    ) -> Self {
        Self {
            dag,
            is_streaming,
            is_insert,
            query_id,
            row_metadata,
        }
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// True when any leaf of the plan is unbounded.
    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// True when the plan writes into a sink.
    pub fn is_insert(&self) -> bool {
        self.is_insert
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Shape of the rows the plan produces.
    pub fn row_metadata(&self) -> &RowMetadata {
        &self.row_metadata
    }

    /// Textual plan explanation. Not implemented; always fails.
    pub fn explain(&self) -> Result<String, Error> {
        Err(Error::Unsupported("plan explanation"))
    }

    pub fn source(&self) -> Option<&SourceSpec> {
        self.dag.vertices().iter().find_map(|vertex| match &vertex.kind {
            VertexKind::Source(source) => Some(source),
            _ => None,
        })
    }

    /// Join sites in execution order.
    pub fn join_sites(&self) -> impl Iterator<Item = &JoinSite> + '_ {
        self.dag.vertices().iter().filter_map(|vertex| match &vertex.kind {
            VertexKind::Join(site) => Some(site),
            _ => None,
        })
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.dag.vertices().iter().find_map(|vertex| match &vertex.kind {
            VertexKind::Project(projection) => Some(projection),
            _ => None,
        })
    }

    pub fn sink(&self) -> Option<&SinkSpec> {
        self.dag.vertices().iter().find_map(|vertex| match &vertex.kind {
            VertexKind::Sink(sink) => Some(sink),
            _ => None,
        })
    }
}
