//! Stage graph carried by a plan fragment.

use super::assembly::{JoinSite, SinkSpec, SourceSpec};
use crate::join::{Projection, RelationKind};

pub type VertexId = usize;

/// What a vertex does.
#[derive(Debug, Clone)]
pub enum VertexKind {
    /// The driving input.
    Source(SourceSpec),
    /// A join site; its right relation arrives over a probe edge.
    Join(JoinSite),
    /// The right relation of a join.
    RightInput {
        name: String,
        kind: RelationKind,
        unbounded: bool,
    },
    Project(Projection),
    Sink(SinkSpec),
}

/// A node in the stage graph.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: VertexId,
    pub name: String,
    pub kind: VertexKind,
}

impl Vertex {
    /// Whether this vertex produces rows without end.
    pub fn is_unbounded(&self) -> bool {
        match &self.kind {
            VertexKind::Source(source) => source.unbounded,
            VertexKind::RightInput { unbounded, .. } => *unbounded,
            _ => false,
        }
    }
}

/// How rows travel along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Row stream into the next stage.
    Stream,
    /// Right relation made available to a join for probing.
    Probe,
}

/// A directed link between two vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub upstream: VertexId,
    pub downstream: VertexId,
    pub kind: EdgeKind,
}

/// Directed acyclic graph of stages. Vertex ids are insertion positions.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex and return its id.
    pub fn add_vertex(&mut self, name: impl Into<String>, kind: VertexKind) -> VertexId {
        let id = self.vertices.len();
        self.vertices.push(Vertex {
            id,
            name: name.into(),
            kind,
        });
        id
    }

    /// Link `upstream` to `downstream`. Both must already exist and the
    /// upstream must have been added first, which keeps the graph acyclic.
    pub(crate) fn add_edge(&mut self, upstream: VertexId, downstream: VertexId, kind: EdgeKind) {
        debug_assert!(upstream < downstream && downstream < self.vertices.len());
        self.edges.push(Edge {
            upstream,
            downstream,
            kind,
        });
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn inbound(&self, id: VertexId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |edge| edge.downstream == id)
    }

    pub fn outbound(&self, id: VertexId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |edge| edge.upstream == id)
    }

    /// Vertices with no inbound edges.
    pub fn leaves(&self) -> impl Iterator<Item = &Vertex> + '_ {
        self.vertices
            .iter()
            .filter(move |vertex| self.inbound(vertex.id).next().is_none())
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}
