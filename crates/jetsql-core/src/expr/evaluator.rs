//! Expression evaluation against rows.
//!
//! This module provides the [`PredicateEvaluator`] capability used by join
//! stages and the default tree-walking [`ExprEvaluator`].

use std::borrow::Cow;
use std::cmp::Ordering;

use jetsql_proto::{ArithmeticOp, CompareOp, Expr, Value};

use super::ternary::Ternary;
use crate::error::Error;

/// Evaluates resolved expressions over a row.
///
/// Join stages hold this behind an `Arc` and call it from many tasks at once.
pub trait PredicateEvaluator: Send + Sync {
    /// Evaluate a boolean predicate. Nulls yield [`Ternary::Unknown`].
    fn evaluate(&self, predicate: &Expr, row: &[Value]) -> Result<Ternary, Error>;

    /// Evaluate a scalar expression.
    fn evaluate_value(&self, expr: &Expr, row: &[Value]) -> Result<Value, Error>;
}

/// Tree-walking evaluator for [`Expr`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprEvaluator;

impl ExprEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl PredicateEvaluator for ExprEvaluator {
    fn evaluate(&self, predicate: &Expr, row: &[Value]) -> Result<Ternary, Error> {
        eval_predicate(predicate, row)
    }

    fn evaluate_value(&self, expr: &Expr, row: &[Value]) -> Result<Value, Error> {
        eval_operand(expr, row).map(Cow::into_owned)
    }
}

fn eval_predicate(expr: &Expr, row: &[Value]) -> Result<Ternary, Error> {
    match expr {
        Expr::Compare { op, left, right } => {
            let left = eval_operand(left, row)?;
            let right = eval_operand(right, row)?;
            compare(*op, &left, &right)
        }
        Expr::And(operands) => {
            let mut result = Ternary::True;
            for operand in operands {
                result = result.and(eval_predicate(operand, row)?);
                if result == Ternary::False {
                    break;
                }
            }
            Ok(result)
        }
        Expr::Or(operands) => {
            let mut result = Ternary::False;
            for operand in operands {
                result = result.or(eval_predicate(operand, row)?);
                if result == Ternary::True {
                    break;
                }
            }
            Ok(result)
        }
        Expr::Not(inner) => Ok(!eval_predicate(inner, row)?),
        Expr::IsNull(inner) => Ok(eval_operand(inner, row)?.is_null().into()),
        Expr::IsNotNull(inner) => Ok((!eval_operand(inner, row)?.is_null()).into()),
        Expr::Column(_) | Expr::Literal(_) | Expr::Arithmetic { .. } | Expr::Concat(..) => {
            as_ternary(eval_operand(expr, row)?.as_ref())
        }
    }
}

fn eval_operand<'a>(expr: &Expr, row: &'a [Value]) -> Result<Cow<'a, Value>, Error> {
    match expr {
        Expr::Column(index) => row.get(*index).map(Cow::Borrowed).ok_or_else(|| {
            Error::Evaluation(format!(
                "column ${} out of range for row of arity {}",
                index,
                row.len()
            ))
        }),
        Expr::Literal(value) => Ok(Cow::Owned(value.clone())),
        Expr::Arithmetic { op, left, right } => {
            let left = eval_operand(left, row)?;
            let right = eval_operand(right, row)?;
            arithmetic(*op, &left, &right).map(Cow::Owned)
        }
        Expr::Concat(left, right) => {
            let left = eval_operand(left, row)?;
            let right = eval_operand(right, row)?;
            if left.is_null() || right.is_null() {
                return Ok(Cow::Owned(Value::Null));
            }
            let mut text = text_of(&left);
            text.push_str(&text_of(&right));
            Ok(Cow::Owned(Value::String(text)))
        }
        Expr::Compare { .. }
        | Expr::And(_)
        | Expr::Or(_)
        | Expr::Not(_)
        | Expr::IsNull(_)
        | Expr::IsNotNull(_) => {
            let value = match eval_predicate(expr, row)? {
                Ternary::True => Value::Bool(true),
                Ternary::False => Value::Bool(false),
                Ternary::Unknown => Value::Null,
            };
            Ok(Cow::Owned(value))
        }
    }
}

fn as_ternary(value: &Value) -> Result<Ternary, Error> {
    match value {
        Value::Null => Ok(Ternary::Unknown),
        Value::Bool(b) => Ok((*b).into()),
        other => Err(Error::Evaluation(format!(
            "expected BOOLEAN predicate, got {}",
            other.type_name()
        ))),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// How two non-null values relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Ordered(Ordering),
    /// Same type class but no order (a NaN was involved).
    Unordered,
    /// Unrelated type classes.
    Incompatible,
}

/// Compare two non-null values.
///
/// Integer widths compare as `i64`; mixed integer and float compare as `f64`.
fn relate(a: &Value, b: &Value) -> Relation {
    let ordering = match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => return Relation::Incompatible,
            }
        }
        (
            Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_),
            Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_),
        ) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => match a.partial_cmp(&b) {
                Some(ordering) => Some(ordering),
                None => return Relation::Unordered,
            },
            _ => return Relation::Incompatible,
        },
        _ => return Relation::Incompatible,
    };
    match ordering {
        Some(ordering) => Relation::Ordered(ordering),
        None => Relation::Incompatible,
    }
}

/// SQL equality: unknown when either side is null.
pub(crate) fn sql_equals(a: &Value, b: &Value) -> Ternary {
    if a.is_null() || b.is_null() {
        return Ternary::Unknown;
    }
    (relate(a, b) == Relation::Ordered(Ordering::Equal)).into()
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> Result<Ternary, Error> {
    if a.is_null() || b.is_null() {
        return Ok(Ternary::Unknown);
    }
    let ordering = match relate(a, b) {
        Relation::Ordered(ordering) => ordering,
        Relation::Unordered => return Ok((op == CompareOp::NotEq).into()),
        Relation::Incompatible => {
            return match op {
                CompareOp::Eq => Ok(Ternary::False),
                CompareOp::NotEq => Ok(Ternary::True),
                _ => Err(Error::TypeMismatch {
                    left: a.type_name(),
                    right: b.type_name(),
                }),
            };
        }
    };
    let result = match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::NotEq => ordering.is_ne(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::LtEq => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::GtEq => ordering.is_ge(),
    };
    Ok(result.into())
}

fn arithmetic(op: ArithmeticOp, a: &Value, b: &Value) -> Result<Value, Error> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match (a, b) {
        (Value::Int32(x), Value::Int32(y)) => {
            let result = match op {
                ArithmeticOp::Add => x.checked_add(*y),
                ArithmeticOp::Sub => x.checked_sub(*y),
                ArithmeticOp::Mul => x.checked_mul(*y),
                ArithmeticOp::Div => checked_divisor(*y as i64).and_then(|_| x.checked_div(*y)),
                ArithmeticOp::Mod => checked_divisor(*y as i64).and_then(|_| x.checked_rem(*y)),
            };
            result.map(Value::Int32).ok_or_else(|| overflow_or_zero(op))
        }
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            let (x, y) = match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(arithmetic_mismatch(op, a, b)),
            };
            let result = match op {
                ArithmeticOp::Add => x.checked_add(y),
                ArithmeticOp::Sub => x.checked_sub(y),
                ArithmeticOp::Mul => x.checked_mul(y),
                ArithmeticOp::Div => checked_divisor(y).and_then(|_| x.checked_div(y)),
                ArithmeticOp::Mod => checked_divisor(y).and_then(|_| x.checked_rem(y)),
            };
            result.map(Value::Int64).ok_or_else(|| overflow_or_zero(op))
        }
        _ => {
            let (x, y) = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(arithmetic_mismatch(op, a, b)),
            };
            if matches!(op, ArithmeticOp::Div | ArithmeticOp::Mod) && y == 0.0 {
                return Err(Error::Evaluation("division by zero".to_string()));
            }
            let result = match op {
                ArithmeticOp::Add => x + y,
                ArithmeticOp::Sub => x - y,
                ArithmeticOp::Mul => x * y,
                ArithmeticOp::Div => x / y,
                ArithmeticOp::Mod => x % y,
            };
            Ok(Value::Float64(result))
        }
    }
}

fn checked_divisor(divisor: i64) -> Option<i64> {
    (divisor != 0).then_some(divisor)
}

fn overflow_or_zero(op: ArithmeticOp) -> Error {
    match op {
        ArithmeticOp::Div | ArithmeticOp::Mod => {
            Error::Evaluation("division by zero or overflow".to_string())
        }
        _ => Error::Evaluation("integer overflow".to_string()),
    }
}

fn arithmetic_mismatch(op: ArithmeticOp, a: &Value, b: &Value) -> Error {
    Error::Evaluation(format!(
        "cannot apply '{}' to {} and {}",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}
