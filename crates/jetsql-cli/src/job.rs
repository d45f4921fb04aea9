//! Join jobs loaded from JSON.
//!
//! A job names a driving source, the right relations it joins against, the
//! join sites in order and an optional projection. Rows are plain JSON
//! arrays; conditions use the serialized [`Expr`] form.
//!
//! ```json
//! {
//!   "source": { "name": "l", "arity": 1, "rows": [[0], [1], [null]] },
//!   "relations": [
//!     { "name": "m", "kind": "partitioned", "arity": 2, "key_columns": [0],
//!       "rows": [[1, "value-1"], [2, "value-2"]] }
//!   ],
//!   "joins": [
//!     { "relation": "m",
//!       "on": { "Compare": { "op": "Eq", "left": { "Column": 0 }, "right": { "Column": 1 } } } }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use jetsql_core::plan::{JoinSite, SinkSpec, SourceSpec};
use jetsql_core::{
    CancellationToken, ExprEvaluator, JoinChain, JoinClassifier, JoinConfig, MemoryRelation,
    PartitionedMap, PlanAssembler, PlanFragment, Projection, RelationKind, RelationRef,
    RelationRegistry, RightRelation, Stage, TableRef,
};
use jetsql_proto::{ColumnMetadata, ColumnType, Expr, QueryId, Row, RowMetadata, Value};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::CliError;

fn default_partitions() -> usize {
    1
}

/// The driving input of a job.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDef {
    pub name: String,
    pub arity: usize,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub unbounded: bool,
}

/// A right relation a job joins against.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    pub arity: usize,
    /// Store key columns. Required for partitioned relations.
    #[serde(default)]
    pub key_columns: Vec<usize>,
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// One join site: either an `on` condition or `using` column pairs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinDef {
    pub relation: String,
    #[serde(default)]
    pub on: Option<Expr>,
    /// `(left column, right column)` pairs.
    #[serde(default)]
    pub using: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub source: SourceDef,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    #[serde(default)]
    pub joins: Vec<JoinDef>,
    #[serde(default)]
    pub projection: Option<Projection>,
    /// Output column names. Defaults to `c0, c1, ...`.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Insert target. When present the job writes instead of returning rows.
    #[serde(default)]
    pub sink: Option<String>,
}

/// Rows produced by a job run.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub sink: Option<String>,
}

impl JobSpec {
    /// Read and parse a job file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    fn relation(&self, name: &str) -> Result<&RelationDef, CliError> {
        self.relations
            .iter()
            .find(|relation| relation.name == name)
            .ok_or_else(|| CliError::Job(format!("join references unknown relation '{}'", name)))
    }

    /// Classify every join site and assemble the plan.
    pub fn plan(&self, query_id: QueryId) -> Result<PlanFragment, CliError> {
        let source = &self.source;
        let mut stages = vec![Stage::Source(
            SourceSpec::new(&source.name, source.arity).with_unbounded(source.unbounded),
        )];

        let mut width = source.arity;
        for join in &self.joins {
            let relation = self.relation(&join.relation)?;
            let right = RelationRef::Table(TableRef::new(&relation.name, relation.arity));
            let site = match (&join.on, join.using.is_empty()) {
                (Some(condition), true) => {
                    JoinSite::classify(right, relation.kind, condition.clone(), width)?
                }
                (None, false) => {
                    let descriptor = JoinClassifier::using(&join.using, width, relation.arity)?;
                    JoinSite::new(right, relation.kind, descriptor)
                }
                _ => {
                    return Err(CliError::Job(format!(
                        "join with '{}' needs exactly one of 'on' or 'using'",
                        join.relation
                    )))
                }
            };
            width += relation.arity;
            stages.push(Stage::Join(site));
        }

        if let Some(projection) = &self.projection {
            width = projection.output_arity(width);
            stages.push(Stage::Project(projection.clone()));
        }

        let metadata = match &self.sink {
            Some(target) => {
                stages.push(Stage::Sink(SinkSpec::new(target)));
                RowMetadata::empty()
            }
            None => RowMetadata::new(
                self.column_names(width)
                    .into_iter()
                    .map(|name| ColumnMetadata::new(name, ColumnType::Unknown))
                    .collect(),
            )?,
        };

        Ok(PlanAssembler::assemble(
            stages,
            source.unbounded,
            self.sink.is_some(),
            query_id,
            metadata,
        )?)
    }

    fn column_names(&self, width: usize) -> Vec<String> {
        if self.columns.is_empty() {
            (0..width).map(|i| format!("c{}", i)).collect()
        } else {
            self.columns.clone()
        }
    }

    /// Materialize the declared right relations.
    pub fn registry(&self) -> Result<RelationRegistry, CliError> {
        let mut registry = RelationRegistry::new();
        for def in &self.relations {
            let rows = to_rows(&def.rows)?;
            let relation = match def.kind {
                RelationKind::Bounded => RightRelation::Bounded(Arc::new(MemoryRelation::new(
                    &def.name, def.arity, rows,
                )?)),
                RelationKind::Rescan => RightRelation::Rescan(Arc::new(MemoryRelation::new(
                    &def.name, def.arity, rows,
                )?)),
                RelationKind::Partitioned => {
                    let map = PartitionedMap::new(
                        &def.name,
                        def.arity,
                        def.key_columns.clone(),
                        def.partitions,
                    )?;
                    map.insert_all(rows)?;
                    RightRelation::Partitioned(Arc::new(map))
                }
            };
            debug!(relation = %def.name, kind = %def.kind, "registered relation");
            registry.register(relation);
        }
        Ok(registry)
    }

    /// Plan and run the job.
    ///
    /// With more than one partition the source rows are dealt round-robin
    /// and joined on worker threads.
    pub fn run(
        &self,
        config: &JoinConfig,
        partitions: usize,
        query_id: QueryId,
    ) -> Result<JobOutput, CliError> {
        let fragment = self.plan(query_id)?;
        let registry = self.registry()?;
        let chain = JoinChain::from_fragment(
            &fragment,
            &registry,
            Arc::new(ExprEvaluator::new()),
            config,
        )?;

        let input = to_rows(&self.source.rows)?;
        let cancel = CancellationToken::new();
        let rows = if partitions > 1 {
            let mut split: Vec<Vec<Row>> = (0..partitions).map(|_| Vec::new()).collect();
            for (i, row) in input.into_iter().enumerate() {
                split[i % partitions].push(row);
            }
            chain.execute_partitioned(split, &cancel)?
        } else {
            chain.execute(input.into_iter().map(Ok), &cancel)?
        };
        chain.release();

        info!(
            query_id = %fragment.query_id(),
            stages = chain.stages().len(),
            rows = rows.len(),
            "job finished"
        );

        Ok(JobOutput {
            columns: fragment
                .row_metadata()
                .columns()
                .iter()
                .map(|column| column.name.clone())
                .collect(),
            rows,
            sink: fragment.sink().map(|sink| sink.target.clone()),
        })
    }
}

fn to_rows(rows: &[Vec<serde_json::Value>]) -> Result<Vec<Row>, CliError> {
    rows.iter()
        .map(|values| {
            values
                .iter()
                .map(json_to_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Row::new)
        })
        .collect()
}

/// Convert a JSON scalar into a row value.
pub fn json_to_value(json: &serde_json::Value) -> Result<Value, CliError> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i32::try_from(i).map_or(Value::Int64(i), Value::Int32))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float64(f))
            } else {
                Err(CliError::Job(format!("number {} out of range", n)))
            }
        }
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        other => Err(CliError::Job(format!("unsupported row value: {}", other))),
    }
}
