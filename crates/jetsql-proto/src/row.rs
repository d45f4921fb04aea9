//! Fixed-arity rows.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::value::Value;

/// An ordered, fixed-arity sequence of values. Any position may be null.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Default,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Concatenate two rows into `left ⧺ right`.
    pub fn concat(left: &[Value], right: &[Value]) -> Self {
        let mut values = Vec::with_capacity(left.len() + right.len());
        values.extend_from_slice(left);
        values.extend_from_slice(right);
        Self { values }
    }

    /// Number of columns.
    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// Value at a column position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value at a column position, or an error if out of range.
    pub fn try_get(&self, index: usize) -> Result<&Value, Error> {
        self.values.get(index).ok_or(Error::ColumnOutOfRange {
            index,
            arity: self.values.len(),
        })
    }

    /// All values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Check that the row has the expected arity.
    pub fn expect_arity(&self, expected: usize) -> Result<(), Error> {
        if self.values.len() == expected {
            Ok(())
        } else {
            Err(Error::ArityMismatch {
                expected,
                actual: self.values.len(),
            })
        }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Build a [`Row`] from a list of values convertible into [`Value`].
///
/// ```
/// use jetsql_proto::{row, Value};
///
/// let r = row![1i32, "value-1", Value::Null];
/// assert_eq!(r.arity(), 3);
/// ```
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::Row::new(vec![$($crate::Value::from($value)),*])
    };
}
