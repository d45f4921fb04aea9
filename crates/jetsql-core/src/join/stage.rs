//! Join execution for a single join site.
//!
//! A stage picks its [`JoinMode`] once, from the descriptor, and its
//! [`RightAccess`] once, from the kind of right relation it was given. Neither
//! changes while the stage runs.

use std::sync::Arc;

use tracing::debug;

use jetsql_proto::{Expr, Row, Value};

use super::build::{BuildSide, SharedBuild};
use super::cancel::CancellationToken;
use super::descriptor::JoinDescriptor;
use super::key::hash_key;
use super::relation::RightRelation;
use crate::config::JoinConfig;
use crate::error::Error;
use crate::expr::{sql_equals, PredicateEvaluator};
use crate::metrics::JoinMetrics;

/// Right rows visited between cancellation checks inside one full scan.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Matching strategy for a join site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Key equality through a hash index or keyed lookup, then the residual.
    HashProbe,
    /// The full condition against every right row.
    FullScan,
}

/// How a stage reaches right-side rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightAccess {
    /// Scanned once into a shared build side.
    Materialized,
    /// Point lookups against a keyed store, one per left row.
    Lookup,
    /// Scanned again for every left row.
    Rescan,
}

/// One join site: a compiled descriptor bound to a right relation.
///
/// A stage is shared by every task working on the site. The build side is
/// created by whichever task needs it first and is read-only afterwards.
pub struct JoinStage {
    descriptor: Arc<JoinDescriptor>,
    right: RightRelation,
    evaluator: Arc<dyn PredicateEvaluator>,
    config: JoinConfig,
    mode: JoinMode,
    access: RightAccess,
    /// Left positions to project, in store key order, for direct lookups.
    lookup_key: Vec<usize>,
    build: SharedBuild,
    metrics: Arc<JoinMetrics>,
}

impl JoinStage {
    pub fn new(
        descriptor: Arc<JoinDescriptor>,
        right: RightRelation,
        evaluator: Arc<dyn PredicateEvaluator>,
        config: JoinConfig,
    ) -> Result<Self, Error> {
        if right.is_unbounded() {
            return Err(Error::UnboundedRightSide(right.name().to_string()));
        }
        if right.arity() != descriptor.right_arity() {
            return Err(Error::InvalidPlan(format!(
                "relation '{}' has {} columns but the join expects {}",
                right.name(),
                right.arity(),
                descriptor.right_arity()
            )));
        }

        let mode = if descriptor.is_equi_join() {
            JoinMode::HashProbe
        } else {
            JoinMode::FullScan
        };

        let (access, lookup_key) = match (&right, mode) {
            (RightRelation::Rescan(_), _) => (RightAccess::Rescan, Vec::new()),
            (RightRelation::Partitioned(source), JoinMode::HashProbe) => {
                match covering_key(&descriptor, source.key_columns()) {
                    Some(key) => (RightAccess::Lookup, key),
                    None => (RightAccess::Materialized, Vec::new()),
                }
            }
            _ => (RightAccess::Materialized, Vec::new()),
        };

        debug!(
            relation = right.name(),
            kind = %right.kind(),
            ?mode,
            ?access,
            "prepared join stage"
        );

        Ok(Self {
            descriptor,
            right,
            evaluator,
            config,
            mode,
            access,
            lookup_key,
            build: SharedBuild::new(),
            metrics: Arc::new(JoinMetrics::new()),
        })
    }

    pub fn descriptor(&self) -> &Arc<JoinDescriptor> {
        &self.descriptor
    }

    pub fn right(&self) -> &RightRelation {
        &self.right
    }

    pub fn mode(&self) -> JoinMode {
        self.mode
    }

    pub fn access(&self) -> RightAccess {
        self.access
    }

    pub fn metrics(&self) -> &Arc<JoinMetrics> {
        &self.metrics
    }

    /// Whether the shared build side currently exists.
    pub fn is_built(&self) -> bool {
        self.build.is_built()
    }

    /// Drop the shared build side.
    pub fn release(&self) {
        if self.build.release() {
            debug!(relation = self.right.name(), "released join build side");
        }
    }

    /// Join one left row, appending matches to `out`.
    pub fn probe_row(
        &self,
        left: &[Value],
        cancel: &CancellationToken,
        out: &mut Vec<Row>,
    ) -> Result<(), Error> {
        cancel.check()?;
        if left.len() != self.descriptor.left_arity() {
            return Err(jetsql_proto::Error::ArityMismatch {
                expected: self.descriptor.left_arity(),
                actual: left.len(),
            }
            .into());
        }
        self.record(JoinMetrics::record_probe);

        let emitted = out.len();
        match self.mode {
            JoinMode::HashProbe => self.probe_keyed(left, cancel, out)?,
            JoinMode::FullScan => self.probe_all(left, cancel, out)?,
        }
        let emitted = out.len() - emitted;
        if emitted > 0 {
            self.record(|m| m.record_emitted(emitted));
        }
        Ok(())
    }

    /// Join every row of `left`, collecting the output.
    ///
    /// On cancellation the build side is released and no rows are returned.
    pub fn execute<I>(&self, left: I, cancel: &CancellationToken) -> Result<Vec<Row>, Error>
    where
        I: IntoIterator<Item = Result<Row, Error>>,
    {
        let mut out = Vec::new();
        let result = left.into_iter().try_for_each(|row| {
            let row = row?;
            self.probe_row(row.values(), cancel, &mut out)
        });
        self.finish(result.map(|_| out))
    }

    /// Join left input split into partitions, one worker per partition up to
    /// the configured parallelism. Output order is unspecified.
    pub fn execute_partitioned(
        &self,
        partitions: Vec<Vec<Row>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, Error> {
        let result = run_partitioned(partitions, self.config.parallelism, |rows| {
            let mut out = Vec::new();
            for row in rows {
                self.probe_row(row.values(), cancel, &mut out)?;
            }
            Ok(out)
        });
        self.finish(result)
    }

    fn finish(&self, result: Result<Vec<Row>, Error>) -> Result<Vec<Row>, Error> {
        if matches!(result, Err(Error::Cancelled)) {
            self.release();
        }
        result
    }

    fn probe_keyed(
        &self,
        left: &[Value],
        cancel: &CancellationToken,
        out: &mut Vec<Row>,
    ) -> Result<(), Error> {
        let Some(key) = self.descriptor.left_key(left) else {
            self.record(JoinMetrics::record_null_key_skip);
            return Ok(());
        };

        match self.access {
            RightAccess::Materialized => {
                let side = self.build_side()?;
                for position in side.candidates(hash_key(key.iter().copied())) {
                    let right = side.arena().row(position);
                    if self.keys_match(left, right) {
                        self.emit_if(self.descriptor.non_equi_condition(), left, right, out)?;
                    }
                }
            }
            RightAccess::Lookup => {
                let RightRelation::Partitioned(source) = &self.right else {
                    return Err(Error::InvalidPlan(format!(
                        "relation '{}' does not support lookups",
                        self.right.name()
                    )));
                };
                let lookup: Vec<Value> = self.lookup_key.iter().map(|&i| left[i].clone()).collect();
                cancel.check()?;
                self.record(JoinMetrics::record_lookup);
                for row in source.lookup(&lookup)? {
                    row.expect_arity(self.descriptor.right_arity())?;
                    if self.keys_match(left, row.values()) {
                        let residual = self.descriptor.non_equi_condition();
                        self.emit_if(residual, left, row.values(), out)?;
                    }
                }
            }
            RightAccess::Rescan => {
                for row in self.rescan()? {
                    if self.keys_match(left, row.values()) {
                        let residual = self.descriptor.non_equi_condition();
                        self.emit_if(residual, left, row.values(), out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn probe_all(
        &self,
        left: &[Value],
        cancel: &CancellationToken,
        out: &mut Vec<Row>,
    ) -> Result<(), Error> {
        let condition = Some(self.descriptor.condition());
        match self.access {
            RightAccess::Rescan => {
                for (i, row) in self.rescan()?.iter().enumerate() {
                    check_periodically(cancel, i)?;
                    self.emit_if(condition, left, row.values(), out)?;
                }
            }
            RightAccess::Materialized | RightAccess::Lookup => {
                let side = self.build_side()?;
                for (i, right) in side.arena().iter().enumerate() {
                    check_periodically(cancel, i)?;
                    self.emit_if(condition, left, right, out)?;
                }
            }
        }
        Ok(())
    }

    fn build_side(&self) -> Result<Arc<BuildSide>, Error> {
        self.build.get_or_build(|| {
            let keys = match self.mode {
                JoinMode::HashProbe => Some(self.descriptor.right_equi_indices()),
                JoinMode::FullScan => None,
            };
            self.record(JoinMetrics::record_scan);
            let side = BuildSide::build(&self.right, keys, &self.config)?;
            self.record(|m| m.record_build(side.len()));
            Ok(side)
        })
    }

    fn rescan(&self) -> Result<Vec<Row>, Error> {
        self.record(JoinMetrics::record_scan);
        let rows = self.right.scan()?;
        for row in &rows {
            row.expect_arity(self.descriptor.right_arity())?;
        }
        Ok(rows)
    }

    fn keys_match(&self, left: &[Value], right: &[Value]) -> bool {
        self.descriptor
            .left_equi_indices()
            .iter()
            .zip(self.descriptor.right_equi_indices())
            .all(|(&l, &r)| sql_equals(&left[l], &right[r]).is_true())
    }

    /// Emit `left ⧺ right` when `predicate` is absent or evaluates to true.
    fn emit_if(
        &self,
        predicate: Option<&Expr>,
        left: &[Value],
        right: &[Value],
        out: &mut Vec<Row>,
    ) -> Result<(), Error> {
        let joined = Row::concat(left, right);
        if let Some(predicate) = predicate {
            if !self.evaluator.evaluate(predicate, joined.values())?.is_true() {
                self.record(JoinMetrics::record_residual_rejection);
                return Ok(());
            }
        }
        out.push(joined);
        Ok(())
    }

    fn record(&self, f: impl FnOnce(&JoinMetrics)) {
        if self.config.collect_metrics {
            f(&self.metrics);
        }
    }
}

impl std::fmt::Debug for JoinStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinStage")
            .field("right", &self.right)
            .field("mode", &self.mode)
            .field("access", &self.access)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Cancellation check for the `i`-th right row of a scan.
fn check_periodically(cancel: &CancellationToken, i: usize) -> Result<(), Error> {
    if i % CANCEL_CHECK_INTERVAL == CANCEL_CHECK_INTERVAL - 1 {
        cancel.check()?;
    }
    Ok(())
}

/// Left positions feeding each store key column, when every key column is
/// covered by an equi pair.
fn covering_key(descriptor: &JoinDescriptor, key_columns: &[usize]) -> Option<Vec<usize>> {
    key_columns
        .iter()
        .map(|column| {
            descriptor
                .right_equi_indices()
                .iter()
                .position(|r| r == column)
                .map(|i| descriptor.left_equi_indices()[i])
        })
        .collect()
}

/// Run `work` over left partitions on scoped threads.
///
/// Partitions are dealt round-robin to at most `parallelism` workers. The
/// first error wins; a panicking worker re-raises its panic on this thread.
pub(crate) fn run_partitioned<F>(
    partitions: Vec<Vec<Row>>,
    parallelism: usize,
    work: F,
) -> Result<Vec<Row>, Error>
where
    F: Fn(Vec<Row>) -> Result<Vec<Row>, Error> + Sync,
{
    let workers = parallelism.max(1).min(partitions.len().max(1));
    let mut assigned: Vec<Vec<Vec<Row>>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, partition) in partitions.into_iter().enumerate() {
        assigned[i % workers].push(partition);
    }

    let work = &work;
    let results: Vec<Result<Vec<Row>, Error>> = std::thread::scope(|scope| {
        let handles: Vec<_> = assigned
            .into_iter()
            .map(|batches| {
                scope.spawn(move || -> Result<Vec<Row>, Error> {
                    let mut out = Vec::new();
                    for rows in batches {
                        out.extend(work(rows)?);
                    }
                    Ok(out)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut out = Vec::new();
    for result in results {
        out.extend(result?);
    }
    Ok(out)
}
