//! Right-relation references and providers.
//!
//! The planner names a join's right side with a [`RelationRef`]. At execution
//! time the name resolves, through a [`RelationRegistry`], to a
//! [`RightRelation`] backed by one of two provider capabilities:
//!
//! - [`ScanSource`]: a finite, restartable scan.
//! - [`KeyedSource`]: a partitioned key/value store with point lookups.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use jetsql_proto::{Row, Value};

use super::key::{hash_key, KeyAtom};
use crate::error::Error;
use crate::expr::sql_equals;

/// The right-hand side of a join as the planner sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationRef {
    /// A direct table or map reference.
    Table(TableRef),
    /// A derived table such as `(SELECT * FROM t)`.
    Subquery(DerivedTable),
}

impl RelationRef {
    /// Arity of the rows this reference produces.
    pub fn arity(&self) -> usize {
        match self {
            RelationRef::Table(table) => table.arity,
            RelationRef::Subquery(derived) => derived.arity,
        }
    }
}

/// A named table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub arity: usize,
    /// Whether the table is fed by an unbounded (streaming) source.
    #[serde(default)]
    pub unbounded: bool,
}

impl TableRef {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            unbounded: false,
        }
    }

    /// Mark the table as unbounded.
    pub fn with_unbounded(mut self, unbounded: bool) -> Self {
        self.unbounded = unbounded;
        self
    }
}

/// A derived table appearing where a relation is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedTable {
    pub alias: String,
    pub arity: usize,
}

impl DerivedTable {
    pub fn new(alias: impl Into<String>, arity: usize) -> Self {
        Self {
            alias: alias.into(),
            arity,
        }
    }
}

/// How the catalog says a right relation must be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Finite; materialized once per query.
    Bounded,
    /// Externally partitioned key/value store.
    Partitioned,
    /// Must be scanned again for each probe.
    Rescan,
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RelationKind::Bounded => "bounded",
            RelationKind::Partitioned => "partitioned",
            RelationKind::Rescan => "rescan",
        };
        f.write_str(name)
    }
}

/// A finite relation that can be scanned in full, any number of times.
pub trait ScanSource: Send + Sync {
    fn name(&self) -> &str;

    fn arity(&self) -> usize;

    /// Unbounded sources can drive a plan but never sit on a join's right side.
    fn is_unbounded(&self) -> bool {
        false
    }

    fn scan(&self) -> Result<Vec<Row>, Error>;
}

/// A partitioned key/value relation.
///
/// Lookups may be remote; implementations report failures as
/// [`Error::Transport`] and the join core surfaces them unchanged.
pub trait KeyedSource: Send + Sync {
    fn name(&self) -> &str;

    fn arity(&self) -> usize;

    /// Row positions forming the store key, in key order.
    fn key_columns(&self) -> &[usize];

    fn partition_count(&self) -> usize;

    /// Rows whose key equals `key`, given in [`key_columns`](Self::key_columns) order.
    fn lookup(&self, key: &[Value]) -> Result<Vec<Row>, Error>;

    fn scan(&self) -> Result<Vec<Row>, Error>;
}

/// A resolved right relation together with its access kind.
#[derive(Clone)]
pub enum RightRelation {
    Bounded(Arc<dyn ScanSource>),
    Partitioned(Arc<dyn KeyedSource>),
    Rescan(Arc<dyn ScanSource>),
}

impl RightRelation {
    pub fn name(&self) -> &str {
        match self {
            RightRelation::Bounded(source) | RightRelation::Rescan(source) => source.name(),
            RightRelation::Partitioned(source) => source.name(),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            RightRelation::Bounded(source) | RightRelation::Rescan(source) => source.arity(),
            RightRelation::Partitioned(source) => source.arity(),
        }
    }

    pub fn kind(&self) -> RelationKind {
        match self {
            RightRelation::Bounded(_) => RelationKind::Bounded,
            RightRelation::Partitioned(_) => RelationKind::Partitioned,
            RightRelation::Rescan(_) => RelationKind::Rescan,
        }
    }

    /// Keyed stores are addressable by construction and never unbounded.
    pub fn is_unbounded(&self) -> bool {
        match self {
            RightRelation::Bounded(source) | RightRelation::Rescan(source) => {
                source.is_unbounded()
            }
            RightRelation::Partitioned(_) => false,
        }
    }

    /// Read every row of the relation once.
    pub fn scan(&self) -> Result<Vec<Row>, Error> {
        match self {
            RightRelation::Bounded(source) | RightRelation::Rescan(source) => source.scan(),
            RightRelation::Partitioned(source) => source.scan(),
        }
    }
}

impl std::fmt::Debug for RightRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RightRelation")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("arity", &self.arity())
            .finish()
    }
}

/// An in-memory scan source.
#[derive(Debug, Clone)]
pub struct MemoryRelation {
    name: String,
    arity: usize,
    rows: Vec<Row>,
    unbounded: bool,
}

impl MemoryRelation {
    /// Create a relation, checking every row against `arity`.
    pub fn new(name: impl Into<String>, arity: usize, rows: Vec<Row>) -> Result<Self, Error> {
        for row in &rows {
            row.expect_arity(arity)?;
        }
        Ok(Self {
            name: name.into(),
            arity,
            rows,
            unbounded: false,
        })
    }

    /// Flag the relation as an unbounded source.
    pub fn with_unbounded(mut self, unbounded: bool) -> Self {
        self.unbounded = unbounded;
        self
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ScanSource for MemoryRelation {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn is_unbounded(&self) -> bool {
        self.unbounded
    }

    fn scan(&self) -> Result<Vec<Row>, Error> {
        Ok(self.rows.clone())
    }
}

/// An in-process partitioned key/value store.
///
/// Rows are keyed by a projection of their own columns and spread over a
/// fixed number of partitions by key hash. Writing a row whose key equals an
/// existing row's key replaces it.
pub struct PartitionedMap {
    name: String,
    arity: usize,
    key_columns: Vec<usize>,
    // Numeric keys that collide after widening to f64 share one entry; rows
    // within an entry are told apart by `same_key`.
    partitions: Vec<DashMap<Vec<Option<KeyAtom>>, Vec<Row>>>,
}

impl PartitionedMap {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        key_columns: Vec<usize>,
        partition_count: usize,
    ) -> Result<Self, Error> {
        let name = name.into();
        if key_columns.is_empty() {
            return Err(Error::InvalidPlan(format!(
                "keyed relation '{}' needs at least one key column",
                name
            )));
        }
        if let Some(&column) = key_columns.iter().find(|&&c| c >= arity) {
            return Err(jetsql_proto::Error::ColumnOutOfRange {
                index: column,
                arity,
            }
            .into());
        }
        let partitions = (0..partition_count.max(1)).map(|_| DashMap::new()).collect();
        Ok(Self {
            name,
            arity,
            key_columns,
            partitions,
        })
    }

    /// Store a row, replacing any row with an equal key.
    ///
    /// Composite keys may have null components, but not every component.
    pub fn insert(&self, row: Row) -> Result<(), Error> {
        row.expect_arity(self.arity)?;
        let key_values: Vec<&Value> = self.key_columns.iter().map(|&c| &row.values()[c]).collect();
        let atoms: Vec<Option<KeyAtom>> = key_values.iter().map(|v| KeyAtom::of(v)).collect();
        if atoms.iter().all(Option::is_none) {
            return Err(Error::NullKey(self.name.clone()));
        }
        let partition = self.partition_of_hash(hash_key(key_values.iter().copied()));

        let mut entry = self.partitions[partition].entry(atoms).or_default();
        entry.retain(|existing| !self.same_key(existing.values(), row.values()));
        entry.push(row);
        Ok(())
    }

    /// Store many rows.
    pub fn insert_all(&self, rows: impl IntoIterator<Item = Row>) -> Result<(), Error> {
        for row in rows {
            self.insert(row)?;
        }
        Ok(())
    }

    /// Partition that owns `key`, or `None` if the key has a null component.
    pub fn partition_of(&self, key: &[Value]) -> Option<usize> {
        if key.iter().any(Value::is_null) {
            return None;
        }
        Some(self.partition_of_hash(hash_key(key)))
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.partitions
            .iter()
            .map(|partition| partition.iter().map(|entry| entry.value().len()).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn partition_of_hash(&self, hash: u64) -> usize {
        (hash % self.partitions.len() as u64) as usize
    }

    /// Store identity: SQL equality per key column, except that null
    /// matches null here.
    fn same_key(&self, a: &[Value], b: &[Value]) -> bool {
        self.key_columns.iter().all(|&c| match (&a[c], &b[c]) {
            (Value::Null, Value::Null) => true,
            (x, y) => sql_equals(x, y).is_true(),
        })
    }
}

impl KeyedSource for PartitionedMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn lookup(&self, key: &[Value]) -> Result<Vec<Row>, Error> {
        if key.len() != self.key_columns.len() {
            return Err(Error::InvalidCondition(format!(
                "lookup on '{}' expects {} key values, got {}",
                self.name,
                self.key_columns.len(),
                key.len()
            )));
        }
        let Some(partition) = self.partition_of(key) else {
            return Ok(Vec::new());
        };
        let atoms: Vec<Option<KeyAtom>> = key.iter().map(KeyAtom::of).collect();
        let Some(entry) = self.partitions[partition].get(&atoms) else {
            return Ok(Vec::new());
        };
        Ok(entry
            .iter()
            .filter(|row| {
                self.key_columns
                    .iter()
                    .zip(key)
                    .all(|(&c, k)| sql_equals(&row.values()[c], k).is_true())
            })
            .cloned()
            .collect())
    }

    fn scan(&self) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        for partition in &self.partitions {
            for entry in partition.iter() {
                rows.extend(entry.value().iter().cloned());
            }
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for PartitionedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedMap")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("key_columns", &self.key_columns)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

/// Resolves relation names from a plan to executable right relations.
#[derive(Debug, Default, Clone)]
pub struct RelationRegistry {
    relations: HashMap<String, RightRelation>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation under its own name, replacing any previous entry.
    pub fn register(&mut self, relation: RightRelation) {
        self.relations.insert(relation.name().to_string(), relation);
    }

    pub fn get(&self, name: &str) -> Option<&RightRelation> {
        self.relations.get(name)
    }

    /// Resolve a table name, checking that the registered kind matches.
    pub fn resolve(&self, name: &str, kind: RelationKind) -> Result<RightRelation, Error> {
        let relation = self
            .relations
            .get(name)
            .ok_or_else(|| Error::InvalidPlan(format!("unknown relation '{}'", name)))?;
        if relation.kind() != kind {
            return Err(Error::InvalidPlan(format!(
                "relation '{}' is registered as {} but the plan expects {}",
                name,
                relation.kind(),
                kind
            )));
        }
        Ok(relation.clone())
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetsql_proto::row;

    fn map() -> PartitionedMap {
        let map = PartitionedMap::new("m", 2, vec![0], 4).unwrap();
        map.insert_all((1i32..=3).map(|k| row![k, format!("value-{}", k)]))
            .unwrap();
        map
    }

    #[test]
    fn test_memory_relation_checks_arity() {
        let result = MemoryRelation::new("l", 2, vec![row![1]]);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_memory_relation_scan_is_restartable() {
        let relation = MemoryRelation::new("l", 1, vec![row![1], row![2]]).unwrap();
        assert_eq!(relation.scan().unwrap(), relation.scan().unwrap());
        assert!(!relation.is_unbounded());
        assert!(relation.with_unbounded(true).is_unbounded());
    }

    #[test]
    fn test_lookup_finds_row() {
        let map = map();
        let rows = map.lookup(&[Value::Int32(2)]).unwrap();
        assert_eq!(rows, vec![row![2, "value-2"]]);
        assert!(map.lookup(&[Value::Int32(9)]).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_across_numeric_widths() {
        let map = map();
        let rows = map.lookup(&[Value::Int64(3)]).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_null_lookup_is_empty() {
        assert!(map().lookup(&[Value::Null]).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_wrong_key_width() {
        let result = map().lookup(&[Value::Int32(1), Value::Int32(2)]);
        assert!(matches!(result, Err(Error::InvalidCondition(_))));
    }

    #[test]
    fn test_insert_replaces_equal_key() {
        let map = map();
        map.insert(row![2, "other"]).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.lookup(&[Value::Int32(2)]).unwrap(), vec![row![2, "other"]]);
    }

    #[test]
    fn test_wide_integer_keys_stay_distinct() {
        // 2^53 and 2^53 + 1 widen to the same f64.
        let low = 1i64 << 53;
        let map = PartitionedMap::new("m", 2, vec![0], 4).unwrap();
        map.insert(row![low, "a"]).unwrap();
        map.insert(row![low + 1, "b"]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup(&[Value::Int64(low)]).unwrap(), vec![row![low, "a"]]);
        assert_eq!(
            map.lookup(&[Value::Int64(low + 1)]).unwrap(),
            vec![row![low + 1, "b"]]
        );

        map.insert(row![low + 1, "c"]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.lookup(&[Value::Int64(low + 1)]).unwrap(),
            vec![row![low + 1, "c"]]
        );
    }

    #[test]
    fn test_insert_rejects_null_key() {
        let map = map();
        let result = map.insert(Row::new(vec![Value::Null, Value::from("x")]));
        assert!(matches!(result, Err(Error::NullKey(name)) if name == "m"));
    }

    #[test]
    fn test_scan_returns_all_partitions() {
        let map = map();
        let mut keys: Vec<i64> = map
            .scan()
            .unwrap()
            .iter()
            .filter_map(|row| row.values()[0].as_i64())
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(map.partition_count(), 4);
    }

    #[test]
    fn test_composite_key_with_null_part() {
        let map = PartitionedMap::new("c", 2, vec![0, 1], 2).unwrap();
        map.insert(Row::new(vec![Value::Null, Value::from("value-1")]))
            .unwrap();
        map.insert(row![2i32, "value-2"]).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map
            .lookup(&[Value::Null, Value::from("value-1")])
            .unwrap()
            .is_empty());
        assert!(map
            .insert(Row::new(vec![Value::Null, Value::Null]))
            .is_err());
    }

    #[test]
    fn test_composite_key_partitioning() {
        let map = PartitionedMap::new("c", 3, vec![0, 1], 3).unwrap();
        map.insert(row![1, "a", 10]).unwrap();
        map.insert(row![1, "b", 20]).unwrap();
        assert_eq!(
            map.lookup(&[Value::Int32(1), Value::from("b")]).unwrap(),
            vec![row![1, "b", 20]]
        );
        let key = [Value::Int32(1), Value::from("a")];
        assert!(map.partition_of(&key).unwrap() < 3);
        assert_eq!(map.partition_of(&[Value::Null, Value::from("a")]), None);
    }

    #[test]
    fn test_invalid_key_columns() {
        assert!(PartitionedMap::new("m", 2, vec![], 1).is_err());
        assert!(PartitionedMap::new("m", 2, vec![2], 1).is_err());
    }

    #[test]
    fn test_registry_resolve() {
        let mut registry = RelationRegistry::new();
        registry.register(RightRelation::Partitioned(Arc::new(map())));

        let relation = registry.resolve("m", RelationKind::Partitioned).unwrap();
        assert_eq!(relation.arity(), 2);
        assert!(registry.resolve("m", RelationKind::Bounded).is_err());
        assert!(registry.resolve("missing", RelationKind::Bounded).is_err());
    }

    #[test]
    fn test_relation_ref_serde() {
        let reference = RelationRef::Table(TableRef::new("m", 2));
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, r#"{"table":{"name":"m","arity":2,"unbounded":false}}"#);
        let back: RelationRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reference);
    }
}
