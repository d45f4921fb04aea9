//! SQL three-valued logic.

use std::fmt;

/// Result of evaluating a predicate under SQL null semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ternary {
    True,
    False,
    /// The predicate involved a null and has no definite truth value.
    Unknown,
}

impl Ternary {
    /// Only `True` passes a `WHERE` or `ON` clause.
    pub fn is_true(self) -> bool {
        matches!(self, Ternary::True)
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Ternary::Unknown)
    }

    /// Kleene conjunction.
    pub fn and(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::False, _) | (_, Ternary::False) => Ternary::False,
            (Ternary::True, Ternary::True) => Ternary::True,
            _ => Ternary::Unknown,
        }
    }

    /// Kleene disjunction.
    pub fn or(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::True, _) | (_, Ternary::True) => Ternary::True,
            (Ternary::False, Ternary::False) => Ternary::False,
            _ => Ternary::Unknown,
        }
    }
}

impl std::ops::Not for Ternary {
    type Output = Ternary;

    fn not(self) -> Ternary {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Unknown => Ternary::Unknown,
        }
    }
}

impl From<bool> for Ternary {
    fn from(value: bool) -> Self {
        if value {
            Ternary::True
        } else {
            Ternary::False
        }
    }
}

impl fmt::Display for Ternary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ternary::True => write!(f, "TRUE"),
            Ternary::False => write!(f, "FALSE"),
            Ternary::Unknown => write!(f, "UNKNOWN"),
        }
    }
}
