//! Plan assembly.
//!
//! Turns a linear list of planned stages into a [`PlanFragment`]:
//!
//! ```text
//! source ──> join(m1) ──> join(m2) ──> project ──> sink
//!               ^            ^
//!          right(m1)    right(m2)      (probe edges)
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use jetsql_proto::{Expr, QueryId, RowMetadata};

use super::dag::{Dag, EdgeKind, VertexId, VertexKind};
use super::fragment::PlanFragment;
use crate::error::Error;
use crate::join::{JoinClassifier, JoinDescriptor, Projection, RelationKind, RelationRef};

/// The driving input of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub arity: usize,
    pub unbounded: bool,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            unbounded: false,
        }
    }

    pub fn with_unbounded(mut self, unbounded: bool) -> Self {
        self.unbounded = unbounded;
        self
    }
}

/// A planned join: its right relation and compiled condition.
#[derive(Debug, Clone)]
pub struct JoinSite {
    pub right: RelationRef,
    pub kind: RelationKind,
    pub descriptor: Arc<JoinDescriptor>,
}

impl JoinSite {
    pub fn new(right: RelationRef, kind: RelationKind, descriptor: JoinDescriptor) -> Self {
        Self {
            right,
            kind,
            descriptor: Arc::new(descriptor),
        }
    }

    /// Classify `condition` against `right` and build the site.
    pub fn classify(
        right: RelationRef,
        kind: RelationKind,
        condition: Expr,
        left_arity: usize,
    ) -> Result<Self, Error> {
        let descriptor = JoinClassifier::classify_join(&right, condition, left_arity)?;
        Ok(Self::new(right, kind, descriptor))
    }

    /// Name of the right table. Derived tables have none.
    pub fn table_name(&self) -> Result<&str, Error> {
        match &self.right {
            RelationRef::Table(table) => Ok(&table.name),
            RelationRef::Subquery(_) => Err(Error::SubqueryOnRightSide),
        }
    }
}

/// Target of an insert plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    pub target: String,
}

impl SinkSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// One planned stage, in pipeline order.
#[derive(Debug, Clone)]
pub enum Stage {
    Source(SourceSpec),
    Join(JoinSite),
    Project(Projection),
    Sink(SinkSpec),
}

/// Assembles planned stages into plan fragments.
pub struct PlanAssembler;

impl PlanAssembler {
    /// Assemble `stages` into a fragment.
    ///
    /// The plan must start with its only source, may follow it with joins,
    /// then at most one projection, then a sink exactly when `is_insert`.
    /// `is_streaming` is a hint; the fragment's flag is computed from its
    /// leaves and wins on disagreement.
    pub fn assemble(
        stages: Vec<Stage>,
        is_streaming: bool,
        is_insert: bool,
        query_id: QueryId,
        row_metadata: RowMetadata,
    ) -> Result<PlanFragment, Error> {
        let mut stages = stages.into_iter();
        let source = match stages.next() {
            Some(Stage::Source(source)) => source,
            _ => {
                return Err(Error::InvalidPlan(
                    "a plan must start with exactly one source".to_string(),
                ))
            }
        };

        let mut dag = Dag::new();
        let mut width = source.arity;
        let mut tail = dag.add_vertex(
            format!("source({})", source.name),
            VertexKind::Source(source),
        );
        let mut projected = false;
        let mut sink = false;

        for stage in stages {
            if sink {
                return Err(Error::InvalidPlan("no stage may follow the sink".to_string()));
            }
            tail = match stage {
                Stage::Source(_) => {
                    return Err(Error::InvalidPlan(
                        "a plan must start with exactly one source".to_string(),
                    ))
                }
                Stage::Join(site) => {
                    if projected {
                        return Err(Error::InvalidPlan(
                            "joins must precede the projection".to_string(),
                        ));
                    }
                    let (vertex, right_arity) = add_join(&mut dag, tail, site, width)?;
                    width += right_arity;
                    vertex
                }
                Stage::Project(projection) => {
                    if projected {
                        return Err(Error::InvalidPlan(
                            "a plan may have at most one projection".to_string(),
                        ));
                    }
                    projection.validate(width)?;
                    width = projection.output_arity(width);
                    projected = true;
                    let vertex = dag.add_vertex("project", VertexKind::Project(projection));
                    dag.add_edge(tail, vertex, EdgeKind::Stream);
                    vertex
                }
                Stage::Sink(spec) => {
                    sink = true;
                    let vertex =
                        dag.add_vertex(format!("sink({})", spec.target), VertexKind::Sink(spec));
                    dag.add_edge(tail, vertex, EdgeKind::Stream);
                    vertex
                }
            };
        }

        if sink != is_insert {
            return Err(Error::InvalidPlan(if is_insert {
                "an insert plan must end with a sink".to_string()
            } else {
                "only insert plans may have a sink".to_string()
            }));
        }
        if !row_metadata.columns().is_empty() && row_metadata.column_count() != width {
            return Err(Error::InvalidPlan(format!(
                "row metadata describes {} columns but the plan produces {}",
                row_metadata.column_count(),
                width
            )));
        }

        let streaming = dag.leaves().any(|vertex| vertex.is_unbounded());
        if streaming != is_streaming {
            warn!(
                query_id = %query_id,
                requested = is_streaming,
                computed = streaming,
                "streaming flag disagrees with plan sources, using computed value"
            );
        }

        debug!(
            query_id = %query_id,
            vertices = dag.len(),
            streaming,
            is_insert,
            "assembled plan fragment"
        );

        Ok(PlanFragment::new(dag, streaming, is_insert, query_id, row_metadata))
    }
}

fn add_join(
    dag: &mut Dag,
    tail: VertexId,
    site: JoinSite,
    width: usize,
) -> Result<(VertexId, usize), Error> {
    let table = match &site.right {
        RelationRef::Subquery(_) => return Err(Error::SubqueryOnRightSide),
        RelationRef::Table(table) => table.clone(),
    };
    if table.unbounded {
        return Err(Error::UnboundedRightSide(table.name));
    }
    let descriptor = &site.descriptor;
    if descriptor.left_arity() != width {
        return Err(Error::InvalidPlan(format!(
            "join with '{}' was classified for a left row of {} columns but receives {}",
            table.name,
            descriptor.left_arity(),
            width
        )));
    }
    if descriptor.right_arity() != table.arity {
        return Err(Error::InvalidPlan(format!(
            "join with '{}' was classified for {} right columns but the table has {}",
            table.name,
            descriptor.right_arity(),
            table.arity
        )));
    }

    let right_arity = table.arity;
    let right = dag.add_vertex(
        format!("right({})", table.name),
        VertexKind::RightInput {
            name: table.name.clone(),
            kind: site.kind,
            unbounded: false,
        },
    );
    let join = dag.add_vertex(format!("join({})", table.name), VertexKind::Join(site));
    dag.add_edge(tail, join, EdgeKind::Stream);
    dag.add_edge(right, join, EdgeKind::Probe);
    Ok((join, right_arity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::{DerivedTable, TableRef};
    use jetsql_proto::{ColumnMetadata, ColumnType};

    fn map_site(left_arity: usize) -> JoinSite {
        JoinSite::classify(
            RelationRef::Table(TableRef::new("m", 2)),
            RelationKind::Partitioned,
            Expr::eq(Expr::col(0), Expr::col(left_arity)),
            left_arity,
        )
        .unwrap()
    }

    fn metadata(names: &[&str]) -> RowMetadata {
        RowMetadata::new(
            names
                .iter()
                .map(|name| ColumnMetadata::new(*name, ColumnType::Int))
                .collect(),
        )
        .unwrap()
    }

    fn query_id() -> QueryId {
        QueryId::new(1, 1)
    }

    #[test]
    fn test_batch_select() {
        let fragment = PlanAssembler::assemble(
            vec![Stage::Source(SourceSpec::new("l", 1)), Stage::Join(map_site(1))],
            false,
            false,
            query_id(),
            metadata(&["v", "__key", "this"]),
        )
        .unwrap();

        assert!(!fragment.is_streaming());
        assert!(!fragment.is_insert());
        assert_eq!(fragment.query_id(), query_id());
        assert_eq!(fragment.row_metadata().column_count(), 3);
        assert_eq!(fragment.join_sites().count(), 1);
        assert_eq!(fragment.source().map(|s| s.arity), Some(1));
        // source, right input, join
        assert_eq!(fragment.dag().len(), 3);
        assert_eq!(
            fragment
                .dag()
                .edges()
                .iter()
                .filter(|e| e.kind == EdgeKind::Probe)
                .count(),
            1
        );
    }

    #[test]
    fn test_streaming_flag_is_computed() {
        let stages = || {
            vec![
                Stage::Source(SourceSpec::new("s", 1).with_unbounded(true)),
                Stage::Join(map_site(1)),
            ]
        };
        let fragment =
            PlanAssembler::assemble(stages(), true, false, query_id(), RowMetadata::empty())
                .unwrap();
        assert!(fragment.is_streaming());

        let fragment =
            PlanAssembler::assemble(stages(), false, false, query_id(), RowMetadata::empty())
                .unwrap();
        assert!(fragment.is_streaming());
    }

    #[test]
    fn test_insert_plan() {
        let fragment = PlanAssembler::assemble(
            vec![
                Stage::Source(SourceSpec::new("l", 1)),
                Stage::Join(map_site(1)),
                Stage::Project(Projection::new(vec![Expr::col(0), Expr::col(2)])),
                Stage::Sink(SinkSpec::new("t")),
            ],
            false,
            true,
            query_id(),
            RowMetadata::empty(),
        )
        .unwrap();
        assert!(fragment.is_insert());
        assert_eq!(fragment.sink().map(|s| s.target.as_str()), Some("t"));
        assert!(fragment.projection().is_some());
    }

    #[test]
    fn test_sink_must_match_insert_flag() {
        let with_sink = vec![
            Stage::Source(SourceSpec::new("l", 1)),
            Stage::Sink(SinkSpec::new("t")),
        ];
        assert!(matches!(
            PlanAssembler::assemble(with_sink, false, false, query_id(), RowMetadata::empty()),
            Err(Error::InvalidPlan(_))
        ));

        let without_sink = vec![Stage::Source(SourceSpec::new("l", 1))];
        assert!(matches!(
            PlanAssembler::assemble(without_sink, false, true, query_id(), RowMetadata::empty()),
            Err(Error::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_subquery_site_rejected() {
        let descriptor =
            JoinClassifier::classify(Expr::eq(Expr::col(0), Expr::col(1)), 1, 2).unwrap();
        let site = JoinSite::new(
            RelationRef::Subquery(DerivedTable::new("m", 2)),
            RelationKind::Bounded,
            descriptor,
        );
        let result = PlanAssembler::assemble(
            vec![Stage::Source(SourceSpec::new("l", 1)), Stage::Join(site)],
            false,
            false,
            query_id(),
            RowMetadata::empty(),
        );
        assert!(matches!(result, Err(Error::SubqueryOnRightSide)));
    }

    #[test]
    fn test_unbounded_right_rejected() {
        let site = JoinSite::classify(
            RelationRef::Table(TableRef::new("s", 1).with_unbounded(true)),
            RelationKind::Bounded,
            Expr::eq(Expr::col(0), Expr::col(1)),
            1,
        )
        .unwrap();
        let result = PlanAssembler::assemble(
            vec![Stage::Source(SourceSpec::new("l", 1)), Stage::Join(site)],
            false,
            false,
            query_id(),
            RowMetadata::empty(),
        );
        assert!(matches!(result, Err(Error::UnboundedRightSide(name)) if name == "s"));
    }

    #[test]
    fn test_widened_arity_checked() {
        let result = PlanAssembler::assemble(
            vec![
                Stage::Source(SourceSpec::new("l", 1)),
                Stage::Join(map_site(1)),
                Stage::Join(map_site(1)),
            ],
            false,
            false,
            query_id(),
            RowMetadata::empty(),
        );
        assert!(matches!(result, Err(Error::InvalidPlan(_))));

        let fragment = PlanAssembler::assemble(
            vec![
                Stage::Source(SourceSpec::new("l", 1)),
                Stage::Join(map_site(1)),
                Stage::Join(map_site(3)),
            ],
            false,
            false,
            query_id(),
            RowMetadata::empty(),
        )
        .unwrap();
        assert_eq!(fragment.join_sites().count(), 2);
    }

    #[test]
    fn test_stage_order() {
        let no_source = vec![Stage::Join(map_site(1))];
        assert!(
            PlanAssembler::assemble(no_source, false, false, query_id(), RowMetadata::empty())
                .is_err()
        );

        let two_sources = vec![
            Stage::Source(SourceSpec::new("l", 1)),
            Stage::Source(SourceSpec::new("r", 1)),
        ];
        assert!(
            PlanAssembler::assemble(two_sources, false, false, query_id(), RowMetadata::empty())
                .is_err()
        );

        let join_after_project = vec![
            Stage::Source(SourceSpec::new("l", 1)),
            Stage::Project(Projection::default()),
            Stage::Join(map_site(1)),
        ];
        assert!(PlanAssembler::assemble(
            join_after_project,
            false,
            false,
            query_id(),
            RowMetadata::empty()
        )
        .is_err()
        );
    }

    #[test]
    fn test_metadata_width_checked() {
        let result = PlanAssembler::assemble(
            vec![Stage::Source(SourceSpec::new("l", 1)), Stage::Join(map_site(1))],
            false,
            false,
            query_id(),
            metadata(&["v"]),
        );
        assert!(matches!(result, Err(Error::InvalidPlan(_))));
    }

    #[test]
    fn test_explain_is_unsupported() {
        let fragment = PlanAssembler::assemble(
            vec![Stage::Source(SourceSpec::new("l", 1))],
            false,
            false,
            query_id(),
            RowMetadata::empty(),
        )
        .unwrap();
        let err = fragment.explain().unwrap_err();
        assert!(matches!(err, Error::Unsupported("plan explanation")));
        assert_eq!(err.to_string(), "plan explanation is not supported");
    }
}
