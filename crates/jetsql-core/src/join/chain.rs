//! Multi-way joins.
//!
//! A chain pushes each driving row through its join sites left to right. The
//! output of site `n` is the left input of site `n + 1`, so descriptors of
//! later sites index into the widened row.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use jetsql_proto::{Expr, Row, Value};

use super::cancel::CancellationToken;
use super::relation::RelationRegistry;
use super::stage::{run_partitioned, JoinStage};
use crate::config::JoinConfig;
use crate::error::Error;
use crate::expr::PredicateEvaluator;
use crate::plan::PlanFragment;

/// Filter and projection applied to joined rows.
///
/// An empty `exprs` list passes the (filtered) row through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    #[serde(default)]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub exprs: Vec<Expr>,
}

impl Projection {
    pub fn new(exprs: Vec<Expr>) -> Self {
        Self { filter: None, exprs }
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Arity of the rows this projection produces from `input_arity` columns.
    pub fn output_arity(&self, input_arity: usize) -> usize {
        if self.exprs.is_empty() {
            input_arity
        } else {
            self.exprs.len()
        }
    }

    /// Check every column reference against `input_arity`.
    pub fn validate(&self, input_arity: usize) -> Result<(), Error> {
        let columns = self
            .filter
            .iter()
            .chain(&self.exprs)
            .flat_map(Expr::columns);
        for column in columns {
            if column >= input_arity {
                return Err(Error::InvalidPlan(format!(
                    "projection references ${} but the row has {} columns",
                    column, input_arity
                )));
            }
        }
        Ok(())
    }

    /// Apply to one row. Rows the filter does not accept yield `None`.
    pub fn apply(
        &self,
        row: Row,
        evaluator: &dyn PredicateEvaluator,
    ) -> Result<Option<Row>, Error> {
        if let Some(filter) = &self.filter {
            if !evaluator.evaluate(filter, row.values())?.is_true() {
                return Ok(None);
            }
        }
        if self.exprs.is_empty() {
            return Ok(Some(row));
        }
        let values = self
            .exprs
            .iter()
            .map(|expr| evaluator.evaluate_value(expr, row.values()))
            .collect::<Result<Vec<Value>, Error>>()?;
        Ok(Some(Row::new(values)))
    }
}

/// Ordered join sites over one driving input.
pub struct JoinChain {
    base_arity: usize,
    stages: Vec<JoinStage>,
    projection: Option<Projection>,
    evaluator: Arc<dyn PredicateEvaluator>,
    parallelism: usize,
}

impl JoinChain {
    /// Chain `stages` over driving rows of `base_arity` columns.
    ///
    /// Each stage's descriptor must have been classified against the row
    /// widened by all earlier stages.
    pub fn new(
        base_arity: usize,
        stages: Vec<JoinStage>,
        evaluator: Arc<dyn PredicateEvaluator>,
    ) -> Result<Self, Error> {
        let mut width = base_arity;
        for (position, stage) in stages.iter().enumerate() {
            let descriptor = stage.descriptor();
            if descriptor.left_arity() != width {
                return Err(Error::InvalidPlan(format!(
                    "join site {} expects a left row of {} columns but receives {}",
                    position,
                    descriptor.left_arity(),
                    width
                )));
            }
            width += descriptor.right_arity();
        }
        Ok(Self {
            base_arity,
            stages,
            projection: None,
            evaluator,
            parallelism: 1,
        })
    }

    /// Apply `projection` to every joined row.
    pub fn with_projection(mut self, projection: Projection) -> Result<Self, Error> {
        projection.validate(self.joined_arity())?;
        self.projection = Some(projection);
        Ok(self)
    }

    /// Worker count used by [`execute_partitioned`](Self::execute_partitioned).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Instantiate the join sites of an assembled plan.
    pub fn from_fragment(
        fragment: &PlanFragment,
        registry: &RelationRegistry,
        evaluator: Arc<dyn PredicateEvaluator>,
        config: &JoinConfig,
    ) -> Result<Self, Error> {
        let source = fragment
            .source()
            .ok_or_else(|| Error::InvalidPlan("plan has no source".to_string()))?;

        let mut stages = Vec::new();
        for site in fragment.join_sites() {
            let relation = registry.resolve(site.table_name()?, site.kind)?;
            stages.push(JoinStage::new(
                Arc::clone(&site.descriptor),
                relation,
                Arc::clone(&evaluator),
                config.clone(),
            )?);
        }

        debug!(
            query_id = %fragment.query_id(),
            sites = stages.len(),
            "instantiated join chain"
        );

        let chain =
            Self::new(source.arity, stages, evaluator)?.with_parallelism(config.parallelism);
        match fragment.projection() {
            Some(projection) => chain.with_projection(projection.clone()),
            None => Ok(chain),
        }
    }

    pub fn stages(&self) -> &[JoinStage] {
        &self.stages
    }

    pub fn base_arity(&self) -> usize {
        self.base_arity
    }

    /// Arity after all join sites, before projection.
    pub fn joined_arity(&self) -> usize {
        self.base_arity
            + self
                .stages
                .iter()
                .map(|stage| stage.descriptor().right_arity())
                .sum::<usize>()
    }

    pub fn output_arity(&self) -> usize {
        let joined = self.joined_arity();
        self.projection
            .as_ref()
            .map_or(joined, |projection| projection.output_arity(joined))
    }

    /// Push one driving row through every site.
    ///
    /// Suited to unbounded input: nothing is buffered between calls.
    pub fn process_row(&self, row: Row, cancel: &CancellationToken) -> Result<Vec<Row>, Error> {
        cancel.check()?;
        row.expect_arity(self.base_arity)?;
        let mut current = vec![row];
        for stage in &self.stages {
            let mut next = Vec::new();
            for left in &current {
                stage.probe_row(left.values(), cancel, &mut next)?;
            }
            if next.is_empty() {
                return Ok(next);
            }
            current = next;
        }

        match &self.projection {
            None => Ok(current),
            Some(projection) => {
                let mut out = Vec::with_capacity(current.len());
                for row in current {
                    if let Some(row) = projection.apply(row, self.evaluator.as_ref())? {
                        out.push(row);
                    }
                }
                Ok(out)
            }
        }
    }

    /// Run the chain over a whole driving input.
    pub fn execute<I>(&self, input: I, cancel: &CancellationToken) -> Result<Vec<Row>, Error>
    where
        I: IntoIterator<Item = Result<Row, Error>>,
    {
        let mut out = Vec::new();
        let result = input.into_iter().try_for_each(|row| -> Result<(), Error> {
            out.extend(self.process_row(row?, cancel)?);
            Ok(())
        });
        self.finish(result.map(|_| out))
    }

    /// Run the chain over partitioned driving input on worker threads.
    pub fn execute_partitioned(
        &self,
        partitions: Vec<Vec<Row>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, Error> {
        let result = run_partitioned(partitions, self.parallelism, |rows| {
            let mut out = Vec::new();
            for row in rows {
                out.extend(self.process_row(row, cancel)?);
            }
            Ok(out)
        });
        self.finish(result)
    }

    /// Release the build sides of every site.
    pub fn release(&self) {
        for stage in &self.stages {
            stage.release();
        }
    }

    fn finish(&self, result: Result<Vec<Row>, Error>) -> Result<Vec<Row>, Error> {
        if matches!(result, Err(Error::Cancelled)) {
            self.release();
        }
        result
    }
}

impl std::fmt::Debug for JoinChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinChain")
            .field("base_arity", &self.base_arity)
            .field("stages", &self.stages)
            .field("projection", &self.projection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprEvaluator;
    use crate::join::classifier::JoinClassifier;
    use crate::join::relation::{MemoryRelation, RightRelation};
    use jetsql_proto::row;

    fn evaluator() -> Arc<dyn PredicateEvaluator> {
        Arc::new(ExprEvaluator::new())
    }

    fn bounded(name: &str, rows: Vec<Row>, arity: usize) -> RightRelation {
        RightRelation::Bounded(Arc::new(MemoryRelation::new(name, arity, rows).unwrap()))
    }

    fn join(condition: Expr, left_arity: usize, right: RightRelation) -> JoinStage {
        let descriptor = JoinClassifier::classify(condition, left_arity, right.arity()).unwrap();
        JoinStage::new(Arc::new(descriptor), right, evaluator(), JoinConfig::default()).unwrap()
    }

    #[test]
    fn test_projection_filter_and_exprs() {
        let projection = Projection::new(vec![
            Expr::col(0),
            Expr::concat(Expr::col(1), Expr::lit("-s")),
        ])
        .with_filter(Expr::lt(Expr::col(0), Expr::lit(2i32)));
        let evaluator = ExprEvaluator::new();

        let kept = projection.apply(row![1i32, "value-1"], &evaluator).unwrap();
        assert_eq!(kept, Some(row![1i32, "value-1-s"]));
        assert_eq!(projection.apply(row![2i32, "value-2"], &evaluator).unwrap(), None);
        assert_eq!(projection.output_arity(5), 2);
        assert_eq!(Projection::default().output_arity(5), 5);
    }

    #[test]
    fn test_projection_validation() {
        let projection = Projection::new(vec![Expr::col(3)]);
        assert!(projection.validate(3).is_err());
        assert!(projection.validate(4).is_ok());
    }

    #[test]
    fn test_two_site_chain() {
        // l(v) JOIN m1(k, a) ON l.v = m1.k JOIN m2(k, b) ON m1.a = m2.k
        let m1 = bounded("m1", vec![row![1i32, 10i32], row![2i32, 20i32]], 2);
        let m2 = bounded("m2", vec![row![10i32, "ten"], row![20i32, "twenty"]], 2);
        let first = join(Expr::eq(Expr::col(0), Expr::col(1)), 1, m1);
        let second = join(Expr::eq(Expr::col(2), Expr::col(3)), 3, m2);
        let chain = JoinChain::new(1, vec![first, second], evaluator()).unwrap();
        assert_eq!(chain.output_arity(), 5);

        let out = chain
            .execute(vec![Ok(row![1i32]), Ok(row![3i32])], &CancellationToken::new())
            .unwrap();
        assert_eq!(out, vec![row![1i32, 1i32, 10i32, 10i32, "ten"]]);
    }

    #[test]
    fn test_widened_arity_is_enforced() {
        let m1 = bounded("m1", vec![], 2);
        let m2 = bounded("m2", vec![], 2);
        let first = join(Expr::eq(Expr::col(0), Expr::col(1)), 1, m1);
        // Classified against the base row instead of the widened one.
        let second = join(Expr::eq(Expr::col(0), Expr::col(1)), 1, m2);
        let result = JoinChain::new(1, vec![first, second], evaluator());
        assert!(matches!(result, Err(Error::InvalidPlan(_))));
    }

    #[test]
    fn test_process_row_checks_base_arity() {
        let chain = JoinChain::new(2, vec![], evaluator()).unwrap();
        let result = chain.process_row(row![1i32], &CancellationToken::new());
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_cancel_releases_all_sites() {
        let m1 = bounded("m1", vec![row![1i32]], 1);
        let site = join(Expr::eq(Expr::col(0), Expr::col(1)), 1, m1);
        let chain = JoinChain::new(1, vec![site], evaluator()).unwrap();
        let cancel = CancellationToken::new();
        chain.process_row(row![1i32], &cancel).unwrap();
        assert!(chain.stages()[0].is_built());

        cancel.cancel();
        let result = chain.execute(vec![Ok(row![1i32])], &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!chain.stages()[0].is_built());
    }
}
