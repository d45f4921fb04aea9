//! Predicate and scalar expression trees.
//!
//! Join conditions arrive from the optimizer as resolved trees whose column
//! references are positions in the combined `left ⧺ right` row. The core never
//! parses SQL; it only inspects and evaluates these trees.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// SQL spelling of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOp {
    /// SQL spelling of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        }
    }
}

/// A resolved expression over a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a column position in the evaluated row.
    Column(usize),
    /// Constant value.
    Literal(Value),
    /// Binary comparison.
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Conjunction of one or more predicates.
    And(Vec<Expr>),
    /// Disjunction of one or more predicates.
    Or(Vec<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// `expr IS NULL`.
    IsNull(Box<Expr>),
    /// `expr IS NOT NULL`.
    IsNotNull(Box<Expr>),
    /// Binary arithmetic.
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// String concatenation (`||`).
    Concat(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Column reference.
    pub fn col(index: usize) -> Self {
        Expr::Column(index)
    }

    /// Literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Build a comparison.
    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn not_eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::NotEq, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn lt_eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::LtEq, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn gt_eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::GtEq, left, right)
    }

    /// Conjunction. A single operand is returned unchanged.
    pub fn and(mut operands: Vec<Expr>) -> Self {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::And(operands)
        }
    }

    /// Disjunction. A single operand is returned unchanged.
    pub fn or(mut operands: Vec<Expr>) -> Self {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::Or(operands)
        }
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    pub fn is_null(expr: Expr) -> Self {
        Expr::IsNull(Box::new(expr))
    }

    pub fn is_not_null(expr: Expr) -> Self {
        Expr::IsNotNull(Box::new(expr))
    }

    /// Build an arithmetic expression.
    pub fn arithmetic(op: ArithmeticOp, left: Expr, right: Expr) -> Self {
        Expr::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Self::arithmetic(ArithmeticOp::Add, left, right)
    }

    pub fn mul(left: Expr, right: Expr) -> Self {
        Self::arithmetic(ArithmeticOp::Mul, left, right)
    }

    pub fn concat(left: Expr, right: Expr) -> Self {
        Expr::Concat(Box::new(left), Box::new(right))
    }

    /// All column positions referenced by this expression.
    pub fn columns(&self) -> BTreeSet<usize> {
        let mut columns = BTreeSet::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns(&self, out: &mut BTreeSet<usize>) {
        match self {
            Expr::Column(index) => {
                out.insert(*index);
            }
            Expr::Literal(_) => {}
            Expr::Compare { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Concat(left, right) => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::And(operands) | Expr::Or(operands) => {
                for operand in operands {
                    operand.collect_columns(out);
                }
            }
            Expr::Not(inner) | Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
                inner.collect_columns(out);
            }
        }
    }

    /// Return a copy with every column reference moved by `offset`.
    ///
    /// Used to rebase a right-local expression onto the combined row.
    pub fn shift_columns(&self, offset: usize) -> Expr {
        match self {
            Expr::Column(index) => Expr::Column(index + offset),
            Expr::Literal(value) => Expr::Literal(value.clone()),
            Expr::Compare { op, left, right } => {
                Self::compare(*op, left.shift_columns(offset), right.shift_columns(offset))
            }
            Expr::Arithmetic { op, left, right } => {
                Self::arithmetic(*op, left.shift_columns(offset), right.shift_columns(offset))
            }
            Expr::Concat(left, right) => {
                Self::concat(left.shift_columns(offset), right.shift_columns(offset))
            }
            Expr::And(operands) => {
                Expr::And(operands.iter().map(|e| e.shift_columns(offset)).collect())
            }
            Expr::Or(operands) => {
                Expr::Or(operands.iter().map(|e| e.shift_columns(offset)).collect())
            }
            Expr::Not(inner) => Self::not(inner.shift_columns(offset)),
            Expr::IsNull(inner) => Self::is_null(inner.shift_columns(offset)),
            Expr::IsNotNull(inner) => Self::is_not_null(inner.shift_columns(offset)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(index) => write!(f, "${}", index),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Compare { op, left, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::Arithmetic { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Concat(left, right) => write!(f, "({} || {})", left, right),
            Expr::And(operands) => write_joined(f, operands, " AND "),
            Expr::Or(operands) => write_joined(f, operands, " OR "),
            Expr::Not(inner) => write!(f, "NOT ({})", inner),
            Expr::IsNull(inner) => write!(f, "{} IS NULL", inner),
            Expr::IsNotNull(inner) => write!(f, "{} IS NOT NULL", inner),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, operands: &[Expr], separator: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", separator)?;
        }
        write!(f, "{}", operand)?;
    }
    write!(f, ")")
}
