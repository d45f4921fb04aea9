//! Equi-join classification.
//!
//! Splits a resolved join condition into equality pairs usable for hash
//! matching and a residual predicate evaluated row by row.
//!
//! The condition is read as a top-level conjunction. Each conjunct of the form
//! `left_column = right_column` becomes one pair; everything else (other
//! comparisons, expressions over columns, constants, single-side predicates)
//! is kept in the residual in its original order. A condition that is not a
//! conjunction, such as a top-level `OR`, yields no pairs at all.

use tracing::debug;

use jetsql_proto::{CompareOp, Expr};

use super::descriptor::JoinDescriptor;
use super::relation::RelationRef;
use crate::error::Error;

/// Classifies join conditions into [`JoinDescriptor`]s.
pub struct JoinClassifier;

impl JoinClassifier {
    /// Classify `condition` over a combined row of `left_arity + right_arity`
    /// columns, where positions `0..left_arity` belong to the left row.
    pub fn classify(
        condition: Expr,
        left_arity: usize,
        right_arity: usize,
    ) -> Result<JoinDescriptor, Error> {
        let width = left_arity + right_arity;
        if let Some(&column) = condition.columns().iter().find(|&&c| c >= width) {
            return Err(Error::InvalidCondition(format!(
                "column ${} is outside the joined row of {} columns",
                column, width
            )));
        }

        let mut conjuncts = Vec::new();
        collect_conjuncts(&condition, &mut conjuncts);

        let mut left_equi_indices = Vec::new();
        let mut right_equi_indices = Vec::new();
        let mut residual = Vec::new();

        for conjunct in conjuncts {
            match equi_pair(conjunct, left_arity, width) {
                Some((left, right)) => {
                    left_equi_indices.push(left);
                    right_equi_indices.push(right);
                }
                None => residual.push(conjunct.clone()),
            }
        }

        let non_equi_condition = if residual.is_empty() {
            None
        } else {
            Some(Expr::and(residual))
        };

        debug!(
            pairs = left_equi_indices.len(),
            has_residual = non_equi_condition.is_some(),
            left_arity,
            right_arity,
            "classified join condition"
        );

        Ok(JoinDescriptor::new(
            left_equi_indices,
            right_equi_indices,
            non_equi_condition,
            condition,
            left_arity,
            right_arity,
        ))
    }

    /// Classify a join against its right-hand relation reference.
    ///
    /// Derived tables are rejected regardless of the condition's shape.
    pub fn classify_join(
        right: &RelationRef,
        condition: Expr,
        left_arity: usize,
    ) -> Result<JoinDescriptor, Error> {
        match right {
            RelationRef::Subquery(_) => Err(Error::SubqueryOnRightSide),
            RelationRef::Table(table) => Self::classify(condition, left_arity, table.arity),
        }
    }

    /// Classify a `JOIN ... USING (...)` clause.
    ///
    /// Each `(left, right)` pair names a left-row position and a right-row
    /// position holding the shared column.
    pub fn using(
        columns: &[(usize, usize)],
        left_arity: usize,
        right_arity: usize,
    ) -> Result<JoinDescriptor, Error> {
        if columns.is_empty() {
            return Err(Error::InvalidCondition(
                "USING requires at least one column".to_string(),
            ));
        }
        let mut equalities = Vec::with_capacity(columns.len());
        for &(left, right) in columns {
            if left >= left_arity || right >= right_arity {
                return Err(Error::InvalidCondition(format!(
                    "USING column pair ({}, {}) is outside rows of arity {} and {}",
                    left, right, left_arity, right_arity
                )));
            }
            equalities.push(Expr::eq(Expr::col(left), Expr::col(left_arity + right)));
        }
        Self::classify(Expr::and(equalities), left_arity, right_arity)
    }
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::And(operands) => {
            for operand in operands {
                collect_conjuncts(operand, out);
            }
        }
        other => out.push(other),
    }
}

/// Returns `(left_index, right_local_index)` for a direct cross-side equality.
fn equi_pair(expr: &Expr, left_arity: usize, width: usize) -> Option<(usize, usize)> {
    let Expr::Compare {
        op: CompareOp::Eq,
        left,
        right,
    } = expr
    else {
        return None;
    };
    let (Expr::Column(a), Expr::Column(b)) = (left.as_ref(), right.as_ref()) else {
        return None;
    };
    let is_left = |c: usize| c < left_arity;
    let is_right = |c: usize| c >= left_arity && c < width;

    if is_left(*a) && is_right(*b) {
        Some((*a, *b - left_arity))
    } else if is_left(*b) && is_right(*a) {
        Some((*b, *a - left_arity))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::relation::{DerivedTable, TableRef};

    #[test]
    fn test_single_equality() {
        // l.v = m.__key with left (v) and right (__key, this)
        let d = JoinClassifier::classify(Expr::eq(Expr::col(0), Expr::col(1)), 1, 2).unwrap();
        assert_eq!(d.left_equi_indices(), &[0]);
        assert_eq!(d.right_equi_indices(), &[0]);
        assert!(d.non_equi_condition().is_none());
        assert!(d.is_equi_join());
    }

    #[test]
    fn test_reversed_operands() {
        let d = JoinClassifier::classify(Expr::eq(Expr::col(2), Expr::col(0)), 1, 2).unwrap();
        assert_eq!(d.left_equi_indices(), &[0]);
        assert_eq!(d.right_equi_indices(), &[1]);
    }

    #[test]
    fn test_equi_and_non_equi() {
        // l.v1 = m.__key AND l.v2 != m.__key
        let condition = Expr::and(vec![
            Expr::eq(Expr::col(0), Expr::col(2)),
            Expr::not_eq(Expr::col(1), Expr::col(2)),
        ]);
        let d = JoinClassifier::classify(condition, 2, 2).unwrap();
        assert_eq!(d.left_equi_indices(), &[0]);
        assert_eq!(d.right_equi_indices(), &[0]);
        assert_eq!(
            d.non_equi_condition(),
            Some(&Expr::not_eq(Expr::col(1), Expr::col(2)))
        );
    }

    #[test]
    fn test_nested_conjunctions_are_flattened_in_order() {
        let condition = Expr::and(vec![
            Expr::eq(Expr::col(1), Expr::col(3)),
            Expr::and(vec![
                Expr::gt(Expr::col(0), Expr::lit(1i32)),
                Expr::eq(Expr::col(0), Expr::col(2)),
            ]),
        ]);
        let d = JoinClassifier::classify(condition, 2, 2).unwrap();
        assert_eq!(d.left_equi_indices(), &[1, 0]);
        assert_eq!(d.right_equi_indices(), &[1, 0]);
        assert_eq!(
            d.non_equi_condition(),
            Some(&Expr::gt(Expr::col(0), Expr::lit(1i32)))
        );
    }

    #[test]
    fn test_multiple_residuals_are_conjoined() {
        let condition = Expr::and(vec![
            Expr::lt(Expr::col(0), Expr::col(1)),
            Expr::is_not_null(Expr::col(1)),
        ]);
        let d = JoinClassifier::classify(condition, 1, 1).unwrap();
        assert!(!d.is_equi_join());
        assert!(matches!(d.non_equi_condition(), Some(Expr::And(ops)) if ops.len() == 2));
    }

    #[test]
    fn test_disjunction_yields_no_pairs() {
        // l.v1 = m.id OR l.v2 = m.name
        let condition = Expr::or(vec![
            Expr::eq(Expr::col(0), Expr::col(2)),
            Expr::eq(Expr::col(1), Expr::col(3)),
        ]);
        let d = JoinClassifier::classify(condition.clone(), 2, 2).unwrap();
        assert!(!d.is_equi_join());
        assert!(d.left_equi_indices().is_empty());
        assert_eq!(d.non_equi_condition(), Some(&condition));
        assert_eq!(d.condition(), &condition);
    }

    #[test]
    fn test_expression_operand_is_residual() {
        // l.v = 2 * m.__key
        let condition = Expr::eq(Expr::col(0), Expr::mul(Expr::lit(2i32), Expr::col(1)));
        let d = JoinClassifier::classify(condition, 1, 2).unwrap();
        assert!(!d.is_equi_join());
        assert!(d.non_equi_condition().is_some());
    }

    #[test]
    fn test_same_side_equality_is_residual() {
        let condition = Expr::and(vec![
            Expr::eq(Expr::col(0), Expr::col(1)),
            Expr::eq(Expr::col(2), Expr::col(3)),
        ]);
        let d = JoinClassifier::classify(condition, 2, 2).unwrap();
        assert!(!d.is_equi_join());
    }

    #[test]
    fn test_duplicate_left_index_is_kept() {
        // l.v = m.__key AND l.v = m.id
        let condition = Expr::and(vec![
            Expr::eq(Expr::col(0), Expr::col(1)),
            Expr::eq(Expr::col(0), Expr::col(2)),
        ]);
        let d = JoinClassifier::classify(condition, 1, 3).unwrap();
        assert_eq!(d.left_equi_indices(), &[0, 0]);
        assert_eq!(d.right_equi_indices(), &[0, 1]);
    }

    #[test]
    fn test_literal_true_is_full_scan() {
        let d = JoinClassifier::classify(Expr::lit(true), 1, 1).unwrap();
        assert!(!d.is_equi_join());
        assert_eq!(d.non_equi_condition(), Some(&Expr::lit(true)));
    }

    #[test]
    fn test_out_of_range_column() {
        let result = JoinClassifier::classify(Expr::eq(Expr::col(0), Expr::col(5)), 1, 2);
        assert!(matches!(result, Err(Error::InvalidCondition(_))));
    }

    #[test]
    fn test_subquery_rejected_for_every_condition_shape() {
        let right = RelationRef::Subquery(DerivedTable::new("m", 2));
        let conditions = vec![
            Expr::eq(Expr::col(0), Expr::col(1)),
            Expr::gt(Expr::col(0), Expr::col(1)),
            Expr::or(vec![
                Expr::eq(Expr::col(0), Expr::col(1)),
                Expr::eq(Expr::col(0), Expr::col(2)),
            ]),
            Expr::lit(true),
        ];
        for condition in conditions {
            let err = JoinClassifier::classify_join(&right, condition, 1).unwrap_err();
            assert!(matches!(err, Error::SubqueryOnRightSide));
            assert!(err
                .to_string()
                .contains("Subquery on the right side of a join not supported"));
        }
    }

    #[test]
    fn test_classify_join_uses_table_arity() {
        let right = RelationRef::Table(TableRef::new("m", 2));
        let d = JoinClassifier::classify_join(&right, Expr::eq(Expr::col(0), Expr::col(1)), 1)
            .unwrap();
        assert_eq!(d.right_arity(), 2);
        assert_eq!(d.output_arity(), 3);
    }

    #[test]
    fn test_using() {
        let d = JoinClassifier::using(&[(0, 0)], 1, 2).unwrap();
        assert_eq!(d.left_equi_indices(), &[0]);
        assert_eq!(d.right_equi_indices(), &[0]);
        assert_eq!(d.condition(), &Expr::eq(Expr::col(0), Expr::col(1)));

        assert!(JoinClassifier::using(&[], 1, 2).is_err());
        assert!(JoinClassifier::using(&[(0, 2)], 1, 2).is_err());
    }
}
