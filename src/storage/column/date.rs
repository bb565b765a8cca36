// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use crate::types::{DataValue, Date, LocalId};

/// A date column: one day-count per row, [`Date::NULL`] for absent values.
///
/// When the column is the schema's sort date, values are non-decreasing
/// within every chunk of the partition and range filters binary-search the
/// chunk runs instead of scanning.
#[derive(Debug, Default, Clone)]
pub struct DateColumnPartition {
    values: Vec<Date>,
    is_sorted: bool,
}

impl DateColumnPartition {
    pub fn new(is_sorted: bool) -> Self {
        Self {
            values: Vec::new(),
            is_sorted,
        }
    }

    pub fn insert(&mut self, value: Option<Date>) {
        self.values.push(value.unwrap_or(Date::NULL));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }

    pub fn get(&self, local_id: LocalId) -> Date {
        self.values[local_id as usize]
    }

    pub fn values(&self) -> &[Date] {
        &self.values
    }

    pub fn value(&self, local_id: LocalId) -> DataValue {
        let date = self.values[local_id as usize];
        if date.is_null() {
            DataValue::Null
        } else {
            DataValue::Date(date)
        }
    }

    pub(crate) fn from_parts(values: Vec<Date>, is_sorted: bool) -> Self {
        Self { values, is_sorted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_dates_read_back_as_null() {
        let mut column = DateColumnPartition::new(false);
        column.insert("2021-05-12".parse().ok());
        column.insert(None);
        assert_eq!(
            column.value(0),
            DataValue::Date("2021-05-12".parse().unwrap())
        );
        assert_eq!(column.value(1), DataValue::Null);
    }
}
