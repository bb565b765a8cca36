// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Primitive values flowing through query results and column accessors.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::ser::Serializer;
use serde::Serialize;

mod date;
pub use self::date::Date;

/// A dense per-partition sequence id.
pub type LocalId = u32;

/// Sentinel encoding an absent integer inside an int column.
pub const INT_NULL: i32 = i32::MIN;

/// A single typed value read from a column or produced by an action.
/// Counts are `i64` even though int columns store `i32`.
#[derive(Debug, Clone, PartialOrd)]
pub enum DataValue {
    // NOTE: Null comes first.
    // => NULL is less than any non-NULL value in the derived order
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Date(Date),
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Total order used by result sorting: the derived `PartialOrd` where it
    /// is defined, with NaN floats sorting below all other floats and
    /// mismatched variants falling back to variant order.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DataValue::Float(left), DataValue::Float(right)) => left.total_cmp(right),
            _ => self
                .partial_cmp(other)
                .unwrap_or_else(|| discriminant_rank(self).cmp(&discriminant_rank(other))),
        }
    }
}

fn discriminant_rank(value: &DataValue) -> u8 {
    match value {
        DataValue::Null => 0,
        DataValue::Int(_) => 1,
        DataValue::Float(_) => 2,
        DataValue::String(_) => 3,
        DataValue::Date(_) => 4,
    }
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => left.to_bits() == right.to_bits(),
            (Self::String(left), Self::String(right)) => left == right,
            (Self::Date(left), Self::Date(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant_rank(self).hash(state);
        match self {
            Self::Null => {}
            Self::Int(value) => value.hash(state),
            Self::Float(value) => value.to_bits().hash(state),
            Self::String(value) => value.hash(state),
            Self::Date(value) => value.hash(state),
        }
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::String(value) => serializer.serialize_str(value),
            Self::Date(value) => serializer.collect_str(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_below_values() {
        assert_eq!(
            DataValue::Null.total_cmp(&DataValue::Int(i64::MIN)),
            Ordering::Less
        );
        assert_eq!(
            DataValue::String("".into()).total_cmp(&DataValue::Null),
            Ordering::Greater
        );
    }

    #[test]
    fn nan_has_a_stable_position() {
        let nan = DataValue::Float(f64::NAN);
        assert_eq!(nan.total_cmp(&DataValue::Float(0.0)), Ordering::Less);
        assert_eq!(nan.total_cmp(&nan), Ordering::Equal);
    }

    #[test]
    fn serializes_dates_as_iso_strings() {
        let value = DataValue::Date("2022-02-01".parse().unwrap());
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            "\"2022-02-01\""
        );
        assert_eq!(serde_json::to_string(&DataValue::Null).unwrap(), "null");
    }
}
