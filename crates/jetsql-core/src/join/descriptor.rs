//! Compiled join condition.

use serde::{Deserialize, Serialize};

use jetsql_proto::{Expr, Value};

/// The compiled form of one join site's condition.
///
/// Produced once during planning by [`JoinClassifier`](super::JoinClassifier)
/// and then shared read-only (behind an `Arc`) by every task executing the
/// join. Equi-join indices are positional pairs: `left_equi_indices[i]` in the
/// left row must equal `right_equi_indices[i]` in the right row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinDescriptor {
    left_equi_indices: Vec<usize>,
    right_equi_indices: Vec<usize>,
    non_equi_condition: Option<Expr>,
    condition: Expr,
    left_arity: usize,
    right_arity: usize,
}

impl JoinDescriptor {
    /// Assemble a descriptor. The index vectors must be the same length.
    pub(crate) fn new(
        left_equi_indices: Vec<usize>,
        right_equi_indices: Vec<usize>,
        non_equi_condition: Option<Expr>,
        condition: Expr,
        left_arity: usize,
        right_arity: usize,
    ) -> Self {
        debug_assert_eq!(left_equi_indices.len(), right_equi_indices.len());
        Self {
            left_equi_indices,
            right_equi_indices,
            non_equi_condition,
            condition,
            left_arity,
            right_arity,
        }
    }

    /// Positions in the left row that take part in equality matching.
    pub fn left_equi_indices(&self) -> &[usize] {
        &self.left_equi_indices
    }

    /// Positions in the right row paired with [`left_equi_indices`](Self::left_equi_indices).
    pub fn right_equi_indices(&self) -> &[usize] {
        &self.right_equi_indices
    }

    /// Residual predicate over the combined row, evaluated after equi matching.
    pub fn non_equi_condition(&self) -> Option<&Expr> {
        self.non_equi_condition.as_ref()
    }

    /// The original, undecomposed condition.
    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    /// Arity of the left row this descriptor was classified against.
    pub fn left_arity(&self) -> usize {
        self.left_arity
    }

    /// Arity of the right row this descriptor was classified against.
    pub fn right_arity(&self) -> usize {
        self.right_arity
    }

    /// Arity of the joined output row.
    pub fn output_arity(&self) -> usize {
        self.left_arity + self.right_arity
    }

    /// True when at least one equality pair was extracted.
    pub fn is_equi_join(&self) -> bool {
        !self.right_equi_indices.is_empty()
    }

    /// Project the left row's join key, or `None` if any component is null.
    pub fn left_key<'a>(&self, left: &'a [Value]) -> Option<Vec<&'a Value>> {
        project_key(left, &self.left_equi_indices)
    }

    /// Project the right row's join key, or `None` if any component is null.
    pub fn right_key<'a>(&self, right: &'a [Value]) -> Option<Vec<&'a Value>> {
        project_key(right, &self.right_equi_indices)
    }
}

fn project_key<'a>(row: &'a [Value], indices: &[usize]) -> Option<Vec<&'a Value>> {
    let mut key = Vec::with_capacity(indices.len());
    for &index in indices {
        match row.get(index) {
            Some(value) if !value.is_null() => key.push(value),
            _ => return None,
        }
    }
    Some(key)
}
