// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use crate::types::{DataValue, LocalId, INT_NULL};

/// An integer column; [`INT_NULL`] encodes an absent value and is excluded
/// from range predicates.
#[derive(Debug, Default, Clone)]
pub struct IntColumnPartition {
    values: Vec<i32>,
}

impl IntColumnPartition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: Option<i32>) {
        self.values.push(value.unwrap_or(INT_NULL));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn value(&self, local_id: LocalId) -> DataValue {
        match self.values[local_id as usize] {
            INT_NULL => DataValue::Null,
            value => DataValue::Int(i64::from(value)),
        }
    }

    pub(crate) fn from_parts(values: Vec<i32>) -> Self {
        Self { values }
    }
}
