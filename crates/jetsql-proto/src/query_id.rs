//! Query identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Cluster-unique identifier of a compiled query.
///
/// The member half names the node that compiled the query; the local half is
/// unique within that node's process.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct QueryId {
    member_id: u64,
    local_id: u64,
}

impl QueryId {
    /// Create an id from its two halves.
    pub fn new(member_id: u64, local_id: u64) -> Self {
        Self {
            member_id,
            local_id,
        }
    }

    /// Issue a fresh id for a query compiled on `member_id`.
    pub fn generate(member_id: u64) -> Self {
        Self::new(member_id, NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Member half.
    pub fn member_id(&self) -> u64 {
        self.member_id
    }

    /// Local half.
    pub fn local_id(&self) -> u64 {
        self.local_id
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}", self.member_id, self.local_id)
    }
}
