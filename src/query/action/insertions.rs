// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeMap;

use regex::Regex;

use super::super::error::{QueryError, Result};
use super::super::operator::OperatorResult;
use super::super::QueryResultEntry;
use crate::catalog::ColumnKind;
use crate::db::Database;
use crate::types::DataValue;

/// Grouped counts of the insertion entries matching the requested segment,
/// position and text pattern, restricted to the filtered sequences.
pub(super) fn execute(
    column: Option<&str>,
    sequence_name: Option<&str>,
    position: Option<u32>,
    value: Option<&str>,
    database: &Database,
    filters: &[OperatorResult],
) -> Result<Vec<QueryResultEntry>> {
    // The query text is matched literally; metacharacters are escaped.
    let pattern = match value {
        Some(value) => Regex::new(&format!(".*{}.*", regex::escape(value))).map_err(|error| {
            QueryError::bad_request(format!("invalid insertion pattern: {error}"))
        })?,
        None => Regex::new(".*").expect("a wildcard pattern always compiles"),
    };
    if let Some(name) = column {
        let kind = database
            .schema
            .column(name)
            .map(|config| config.kind())
            .ok_or_else(|| QueryError::bad_request(format!("unknown column {name:?}")))?;
        if kind != ColumnKind::Insertion {
            return Err(QueryError::bad_request(format!(
                "column {name:?} does not support insertion search"
            )));
        }
    }

    // (segment, position, text) -> count, ordered for reproducible output.
    let mut counts: BTreeMap<(String, u32, String), u64> = BTreeMap::new();
    for (partition, filter) in database.partitions.iter().zip(filters) {
        for (name, insertion_column) in &partition.columns.insertion_columns {
            if column.is_some_and(|wanted| wanted != name) {
                continue;
            }
            if sequence_name.is_some_and(|wanted| wanted != insertion_column.sequence_name()) {
                continue;
            }
            for (entry_position, entry) in insertion_column.matching_entries(position, &pattern) {
                let count = filter.intersection_len(entry.row_ids());
                if count > 0 {
                    let key = (
                        insertion_column.sequence_name().to_string(),
                        entry_position,
                        entry.value().to_string(),
                    );
                    *counts.entry(key).or_insert(0) += count;
                }
            }
        }
    }

    Ok(counts
        .into_iter()
        .map(|((segment, entry_position, text), count)| {
            QueryResultEntry::from([
                (
                    "insertion",
                    DataValue::String(format!("ins_{segment}:{entry_position}:{text}")),
                ),
                ("sequenceName", DataValue::String(segment)),
                ("position", DataValue::Int(i64::from(entry_position))),
                ("insertedSymbols", DataValue::String(text)),
                ("count", DataValue::Int(count as i64)),
            ])
        })
        .collect())
}
