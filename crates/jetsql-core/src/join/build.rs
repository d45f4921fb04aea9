//! One-time materialization of a join's right side.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{info, instrument};

use jetsql_proto::Row;

use super::hash_table::{JoinHashTable, RowArena, MAX_INDEXED_ROWS};
use super::key::hash_key;
use super::relation::RightRelation;
use crate::config::JoinConfig;
use crate::error::Error;

/// Materialized right-side rows, optionally indexed by join key.
///
/// Immutable once built. Tasks hold it through an `Arc` and probe without
/// locking.
#[derive(Debug)]
pub struct BuildSide {
    arena: RowArena,
    index: Option<JoinHashTable>,
}

impl BuildSide {
    /// Scan `relation` into an arena and, when `key_indices` is given, index
    /// every row whose key has no null component.
    #[instrument(skip_all, fields(relation = relation.name()))]
    pub fn build(
        relation: &RightRelation,
        key_indices: Option<&[usize]>,
        config: &JoinConfig,
    ) -> Result<Self, Error> {
        let started = Instant::now();
        let rows = relation.scan()?;
        let limit = config
            .max_build_rows
            .map_or(MAX_INDEXED_ROWS, |limit| limit.min(MAX_INDEXED_ROWS));
        if rows.len() > limit {
            return Err(Error::BuildLimitExceeded {
                relation: relation.name().to_string(),
                limit,
            });
        }

        let side = Self::from_rows(
            rows,
            relation.arity(),
            key_indices,
            config.hash_capacity_hint,
        )?;
        info!(
            rows = side.len(),
            indexed = side.indexed_rows(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "built join side"
        );
        Ok(side)
    }

    /// Build from already-scanned rows. The index is sized for at least
    /// `capacity_hint` rows.
    pub fn from_rows(
        rows: Vec<Row>,
        arity: usize,
        key_indices: Option<&[usize]>,
        capacity_hint: usize,
    ) -> Result<Self, Error> {
        check_capacity(rows.len())?;
        let mut arena = RowArena::with_capacity(arity, rows.len());
        let mut index =
            key_indices.map(|_| JoinHashTable::with_capacity(rows.len().max(capacity_hint)));

        for row in rows {
            row.expect_arity(arity)?;
            let position = arena.push(row);
            if let (Some(table), Some(keys)) = (index.as_mut(), key_indices) {
                let values = arena.row(position);
                if keys.iter().all(|&k| !values[k].is_null()) {
                    table.insert(hash_key(keys.iter().map(|&k| &values[k])), position);
                }
            }
        }

        Ok(Self { arena, index })
    }

    pub fn arena(&self) -> &RowArena {
        &self.arena
    }

    /// Arena positions that may match a key with the given hash.
    ///
    /// Empty when the side was built without an index.
    pub fn candidates(&self, hash: u64) -> impl Iterator<Item = usize> + '_ {
        self.index.as_ref().map(|table| table.probe(hash)).into_iter().flatten()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Rows with a non-null key present in the index.
    pub fn indexed_rows(&self) -> usize {
        self.index.as_ref().map_or(0, JoinHashTable::len)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

fn check_capacity(rows: usize) -> Result<(), Error> {
    if rows > MAX_INDEXED_ROWS {
        return Err(Error::InvalidPlan(format!(
            "build side of {} rows exceeds the join table capacity of {} rows",
            rows, MAX_INDEXED_ROWS
        )));
    }
    Ok(())
}

/// Coordinates a single build shared by many probing tasks.
///
/// The first caller runs the build while holding the builder lock; concurrent
/// callers wait on that lock and then read the finished side. A failed build
/// leaves the slot empty so a later caller can try again.
#[derive(Debug, Default)]
pub struct SharedBuild {
    builder: Mutex<()>,
    slot: RwLock<Option<Arc<BuildSide>>>,
}

impl SharedBuild {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the built side, running `build` first if nobody has yet.
    pub fn get_or_build<F>(&self, build: F) -> Result<Arc<BuildSide>, Error>
    where
        F: FnOnce() -> Result<BuildSide, Error>,
    {
        if let Some(side) = self.get() {
            return Ok(side);
        }

        let _builder = self.builder.lock();
        if let Some(side) = self.get() {
            return Ok(side);
        }

        let side = Arc::new(build()?);
        *self.slot.write() = Some(Arc::clone(&side));
        Ok(side)
    }

    /// The built side, if a build has completed.
    pub fn get(&self) -> Option<Arc<BuildSide>> {
        self.slot.read().as_ref().map(Arc::clone)
    }

    pub fn is_built(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Drop the shared reference to the built side.
    ///
    /// Tasks still holding an `Arc` keep their copy alive until they finish.
    pub fn release(&self) -> bool {
        self.slot.write().take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetsql_proto::{row, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_null_keys_are_stored_but_not_indexed() {
        let rows = vec![row![1i32, "a"], Row::new(vec![Value::Null, Value::from("b")])];
        let side = BuildSide::from_rows(rows, 2, Some(&[0]), 16).unwrap();
        assert_eq!(side.len(), 2);
        assert_eq!(side.indexed_rows(), 1);
        assert!(side.is_indexed());
    }

    #[test]
    fn test_capacity_bounded_by_row_positions() {
        assert!(check_capacity(MAX_INDEXED_ROWS).is_ok());
        assert!(matches!(
            check_capacity(u32::MAX as usize),
            Err(Error::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_unlimited_build_still_capped() {
        let relation = RightRelation::Bounded(Arc::new(
            crate::join::MemoryRelation::new("r", 1, vec![row![1i32]]).unwrap(),
        ));
        let config = JoinConfig::default().unlimited_build();
        let side = BuildSide::build(&relation, Some(&[0]), &config).unwrap();
        assert_eq!(side.len(), 1);
    }

    #[test]
    fn test_unindexed_side_has_no_candidates() {
        let side = BuildSide::from_rows(vec![row![1i32]], 1, None, 16).unwrap();
        assert!(!side.is_indexed());
        assert_eq!(side.candidates(hash_key([&Value::Int32(1)])).count(), 0);
    }

    #[test]
    fn test_candidates_by_hash() {
        let rows = vec![row![1i32], row![2i32], row![1i32]];
        let side = BuildSide::from_rows(rows, 1, Some(&[0]), 16).unwrap();
        let mut found: Vec<usize> = side.candidates(hash_key([&Value::Int64(1)])).collect();
        found.sort_unstable();
        assert_eq!(found, vec![0, 2]);
    }

    #[test]
    fn test_arity_checked() {
        let result = BuildSide::from_rows(vec![row![1i32, 2i32]], 1, None, 16);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_build_runs_once() {
        let shared = SharedBuild::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            shared
                .get_or_build(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    BuildSide::from_rows(vec![], 1, None, 16)
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_build_is_retried() {
        let shared = SharedBuild::new();
        let failed = shared.get_or_build(|| Err(Error::transport("m", true, "timeout")));
        assert!(failed.is_err());
        assert!(!shared.is_built());

        shared
            .get_or_build(|| BuildSide::from_rows(vec![], 1, None, 16))
            .unwrap();
        assert!(shared.is_built());
    }

    #[test]
    fn test_release() {
        let shared = SharedBuild::new();
        let side = shared
            .get_or_build(|| BuildSide::from_rows(vec![row![1i32]], 1, None, 16))
            .unwrap();
        assert!(shared.release());
        assert!(!shared.is_built());
        assert_eq!(side.len(), 1);
        assert!(!shared.release());
    }
}
