//! Join key hashing.
//!
//! Hashes must agree with SQL equality as decided by the evaluator: any two
//! values that compare equal hash the same. Numbers therefore hash through
//! their `f64` value regardless of width, with `-0.0` folded into `0.0`.
//! Distinct values may still collide; callers always verify candidates.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use jetsql_proto::Value;

/// Hashable, equality-compatible image of a non-null value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyAtom {
    Bool(bool),
    Number(u64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(i64),
}

impl KeyAtom {
    /// Returns `None` for null, which has no key image.
    pub(crate) fn of(value: &Value) -> Option<KeyAtom> {
        let atom = match value {
            Value::Null => return None,
            Value::Bool(b) => KeyAtom::Bool(*b),
            Value::String(s) => KeyAtom::Text(s.clone()),
            Value::Bytes(b) => KeyAtom::Bytes(b.clone()),
            Value::Timestamp(t) => KeyAtom::Timestamp(*t),
            Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_) => {
                KeyAtom::Number(number_bits(value.as_f64()?))
            }
        };
        Some(atom)
    }
}

fn number_bits(x: f64) -> u64 {
    if x == 0.0 {
        0.0f64.to_bits()
    } else if x.is_nan() {
        f64::NAN.to_bits()
    } else {
        x.to_bits()
    }
}

/// Hash a key tuple. Nulls hash to their own tag.
pub(crate) fn hash_key<'a>(values: impl IntoIterator<Item = &'a Value>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for value in values {
        hash_value(value, &mut hasher);
    }
    hasher.finish()
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_) => {
            2u8.hash(state);
            number_bits(value.as_f64().unwrap_or(f64::NAN)).hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Bytes(b) => {
            4u8.hash(state);
            b.hash(state);
        }
        Value::Timestamp(t) => {
            5u8.hash(state);
            t.hash(state);
        }
    }
}
