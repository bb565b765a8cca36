// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use ahash::AHashMap;
use rayon::prelude::*;

use super::super::error::{QueryError, Result};
use super::super::operator::OperatorResult;
use super::super::QueryResultEntry;
use super::compare_values;
use crate::catalog::ColumnKind;
use crate::db::Database;
use crate::types::DataValue;

/// Count matching sequences, optionally grouped by metadata columns.
pub(super) fn execute(
    group_by_fields: &[String],
    database: &Database,
    filters: &[OperatorResult],
) -> Result<Vec<QueryResultEntry>> {
    if group_by_fields.is_empty() {
        let count: u64 = filters.par_iter().map(|filter| filter.len()).sum();
        return Ok(vec![QueryResultEntry::from([(
            "count",
            DataValue::Int(count as i64),
        )])]);
    }

    let group_columns: Vec<(String, ColumnKind)> = group_by_fields
        .iter()
        .map(|field| {
            let config = database.schema.column(field).ok_or_else(|| {
                QueryError::bad_request(format!("unknown groupByField {field:?}"))
            })?;
            Ok((config.name.clone(), config.kind()))
        })
        .collect::<Result<_>>()?;

    let counts: AHashMap<Vec<DataValue>, u64> = database
        .partitions
        .par_iter()
        .zip(filters)
        .map(|(partition, filter)| {
            let mut partial: AHashMap<Vec<DataValue>, u64> = AHashMap::new();
            for local_id in filter.iter() {
                let key: Vec<DataValue> = group_columns
                    .iter()
                    .map(|(name, kind)| partition.columns.value(name, *kind, local_id))
                    .collect();
                *partial.entry(key).or_insert(0) += 1;
            }
            partial
        })
        .reduce(AHashMap::new, |mut merged, partial| {
            for (key, count) in partial {
                *merged.entry(key).or_insert(0) += count;
            }
            merged
        });

    let mut entries: Vec<QueryResultEntry> = counts
        .into_iter()
        .map(|(key, count)| {
            let mut entry = QueryResultEntry::default();
            for ((name, _), value) in group_columns.iter().zip(key) {
                entry.fields.insert(name.clone(), value);
            }
            entry.fields.insert("count".into(), DataValue::Int(count as i64));
            entry
        })
        .collect();
    // Hash order is not reproducible; group rows sort by their key values.
    entries.sort_by(|left, right| {
        group_columns
            .iter()
            .map(|(name, _)| {
                compare_values(
                    left.fields.get(name).unwrap_or(&DataValue::Null),
                    right.fields.get(name).unwrap_or(&DataValue::Null),
                )
            })
            .find(|ordering| *ordering != std::cmp::Ordering::Equal)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(entries)
}
