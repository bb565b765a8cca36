// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use crate::types::{DataValue, LocalId};

/// A float column; NaN encodes an absent value and is excluded from range
/// predicates.
#[derive(Debug, Default, Clone)]
pub struct FloatColumnPartition {
    values: Vec<f64>,
}

impl FloatColumnPartition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: Option<f64>) {
        self.values.push(value.unwrap_or(f64::NAN));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, local_id: LocalId) -> DataValue {
        let value = self.values[local_id as usize];
        if value.is_nan() {
            DataValue::Null
        } else {
            DataValue::Float(value)
        }
    }

    pub(crate) fn from_parts(values: Vec<f64>) -> Self {
        Self { values }
    }
}
