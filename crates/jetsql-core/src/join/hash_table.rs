//! Build-side storage: a flat row arena and a chained hash index over it.
//!
//! ```text
//! RowArena       values: [r0c0 r0c1 | r1c0 r1c1 | ...]   stride = arity
//! JoinHashTable  heads:   [bucket -> first entry]
//!                entries: [(hash, row, next), ...]        one per indexed row
//! ```
//!
//! The index stores full hashes so probes reject most non-matches without
//! touching row data. Candidates still need an equality check by the caller.

use jetsql_proto::{Row, Value};

const END: u32 = u32::MAX;
const MIN_BUCKETS: usize = 16;

/// Most rows one table can index. Positions are `u32` and `u32::MAX` ends a chain.
pub const MAX_INDEXED_ROWS: usize = END as usize - 1;

/// Right-side rows stored back to back in one allocation.
#[derive(Debug, Clone, Default)]
pub struct RowArena {
    arity: usize,
    values: Vec<Value>,
    len: usize,
}

impl RowArena {
    pub fn with_capacity(arity: usize, rows: usize) -> Self {
        Self {
            arity,
            values: Vec::with_capacity(arity * rows),
            len: 0,
        }
    }

    /// Append a row and return its position. The row must have the arena's arity.
    pub fn push(&mut self, row: Row) -> usize {
        debug_assert_eq!(row.arity(), self.arity);
        self.values.extend(row.into_values());
        self.len += 1;
        self.len - 1
    }

    /// Row at `index` as a slice.
    #[inline]
    pub fn row(&self, index: usize) -> &[Value] {
        let start = index * self.arity;
        &self.values[start..start + self.arity]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Value]> + '_ {
        (0..self.len).map(move |index| self.row(index))
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    hash: u64,
    row: u32,
    next: u32,
}

/// Hash index from join key hashes to arena positions.
///
/// Duplicate keys are chained; nothing assumes key uniqueness.
#[derive(Debug, Clone)]
pub struct JoinHashTable {
    heads: Vec<u32>,
    entries: Vec<Entry>,
    mask: u64,
}

impl JoinHashTable {
    /// Size the bucket array for about `rows` entries at a 75% load factor.
    pub fn with_capacity(rows: usize) -> Self {
        let buckets = (rows.saturating_mul(4) / 3)
            .max(MIN_BUCKETS)
            .next_power_of_two();
        Self {
            heads: vec![END; buckets],
            entries: Vec::with_capacity(rows),
            mask: (buckets - 1) as u64,
        }
    }

    /// Index the arena row at `row` under `hash`.
    ///
    /// Callers keep both the row position and the entry count within
    /// [`MAX_INDEXED_ROWS`].
    pub fn insert(&mut self, hash: u64, row: usize) {
        debug_assert!(row <= MAX_INDEXED_ROWS && self.entries.len() <= MAX_INDEXED_ROWS);
        let bucket = (hash & self.mask) as usize;
        let position = self.entries.len() as u32;
        self.entries.push(Entry {
            hash,
            row: row as u32,
            next: self.heads[bucket],
        });
        self.heads[bucket] = position;
    }

    /// Arena positions whose stored hash equals `hash`.
    pub fn probe(&self, hash: u64) -> Probe<'_> {
        Probe {
            table: self,
            hash,
            cursor: self.heads[(hash & self.mask) as usize],
        }
    }

    /// Number of indexed rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.heads.len()
    }
}

/// Iterator over hash candidates for one probe.
pub struct Probe<'a> {
    table: &'a JoinHashTable,
    hash: u64,
    cursor: u32,
}

impl Iterator for Probe<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.cursor != END {
            let entry = self.table.entries[self.cursor as usize];
            self.cursor = entry.next;
            if entry.hash == self.hash {
                return Some(entry.row as usize);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetsql_proto::row;

    #[test]
    fn test_arena_rows_are_contiguous() {
        let mut arena = RowArena::with_capacity(2, 2);
        assert_eq!(arena.push(row![1i32, "a"]), 0);
        assert_eq!(arena.push(row![2i32, "b"]), 1);

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.row(1), &[Value::Int32(2), Value::from("b")]);
        assert_eq!(arena.iter().count(), 2);
    }

    #[test]
    fn test_zero_arity_arena() {
        let mut arena = RowArena::with_capacity(0, 3);
        arena.push(Row::default());
        arena.push(Row::default());
        assert_eq!(arena.len(), 2);
        assert!(arena.row(1).is_empty());
    }

    #[test]
    fn test_duplicates_are_chained() {
        let mut table = JoinHashTable::with_capacity(4);
        table.insert(42, 0);
        table.insert(7, 1);
        table.insert(42, 2);

        let mut rows: Vec<usize> = table.probe(42).collect();
        rows.sort_unstable();
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(table.probe(7).collect::<Vec<_>>(), vec![1]);
        assert_eq!(table.probe(8).count(), 0);
    }

    #[test]
    fn test_bucket_collisions_filtered_by_hash() {
        let mut table = JoinHashTable::with_capacity(0);
        let buckets = table.bucket_count() as u64;
        table.insert(3, 0);
        table.insert(3 + buckets, 1);
        assert_eq!(table.probe(3).collect::<Vec<_>>(), vec![0]);
        assert_eq!(table.probe(3 + buckets).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_sizing() {
        assert_eq!(JoinHashTable::with_capacity(0).bucket_count(), MIN_BUCKETS);
        assert!(JoinHashTable::with_capacity(1000).bucket_count() >= 1333);
        assert!(JoinHashTable::with_capacity(0).is_empty());
    }
}
