// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The details action: materialize metadata tuples for every matching
//! sequence.
//!
//! With a limit, each partition produces only its best `limit + offset` rows
//! through a bounded heap and the per-partition runs are merged; without
//! one, all rows are produced in partition order and sorted at the end if
//! requested.

use binary_heap_plus::BinaryHeap;
use itertools::Itertools;
use rayon::prelude::*;

use super::super::error::{QueryError, Result};
use super::super::operator::OperatorResult;
use super::super::QueryResultEntry;
use super::{compare_entries, OrderByField};
use crate::catalog::ColumnKind;
use crate::db::Database;
use crate::storage::DatabasePartition;
use crate::types::LocalId;

pub(super) fn execute(
    fields: &[String],
    database: &Database,
    filters: &[OperatorResult],
    order_by_fields: &[OrderByField],
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<Vec<QueryResultEntry>> {
    let field_metadata = resolve_fields(fields, database)?;
    for order_by in order_by_fields {
        if !field_metadata
            .iter()
            .any(|(name, _)| name == &order_by.field)
        {
            return Err(QueryError::bad_request(format!(
                "orderByField {:?} is not contained in the result of this operation",
                order_by.field
            )));
        }
    }

    let offset = offset.unwrap_or(0);
    let mut entries = match limit {
        Some(limit) => {
            let to_produce = limit.saturating_add(offset);
            if order_by_fields.is_empty() {
                take_in_partition_order(&field_metadata, database, filters, to_produce)
            } else {
                top_rows_per_partition(
                    &field_metadata,
                    database,
                    filters,
                    order_by_fields,
                    to_produce,
                )
            }
        }
        None => {
            let mut all = produce_all(&field_metadata, database, filters);
            if !order_by_fields.is_empty() {
                all.sort_by(|left, right| compare_entries(left, right, order_by_fields));
            }
            all
        }
    };

    if offset > 0 {
        if offset as usize >= entries.len() {
            return Ok(Vec::new());
        }
        entries.drain(..offset as usize);
    }
    if let Some(limit) = limit {
        entries.truncate(limit as usize);
    }
    Ok(entries)
}

fn resolve_fields(
    fields: &[String],
    database: &Database,
) -> Result<Vec<(String, ColumnKind)>> {
    if fields.is_empty() {
        return Ok(database
            .schema
            .metadata
            .iter()
            .map(|column| (column.name.clone(), column.kind()))
            .collect());
    }
    fields
        .iter()
        .map(|field| {
            let config = database
                .schema
                .column(field)
                .ok_or_else(|| QueryError::bad_request(format!("unknown field {field:?}")))?;
            Ok((config.name.clone(), config.kind()))
        })
        .collect()
}

fn read_row(
    field_metadata: &[(String, ColumnKind)],
    partition: &DatabasePartition,
    local_id: LocalId,
) -> QueryResultEntry {
    let mut entry = QueryResultEntry::default();
    for (name, kind) in field_metadata {
        entry
            .fields
            .insert(name.clone(), partition.columns.value(name, *kind, local_id));
    }
    entry
}

fn produce_all(
    field_metadata: &[(String, ColumnKind)],
    database: &Database,
    filters: &[OperatorResult],
) -> Vec<QueryResultEntry> {
    database
        .partitions
        .par_iter()
        .zip(filters)
        .map(|(partition, filter)| {
            filter
                .iter()
                .map(|local_id| read_row(field_metadata, partition, local_id))
                .collect::<Vec<_>>()
        })
        .reduce(Vec::new, |mut merged, mut rows| {
            merged.append(&mut rows);
            merged
        })
}

/// Unordered limit: the first ids in partition order are as good as any.
fn take_in_partition_order(
    field_metadata: &[(String, ColumnKind)],
    database: &Database,
    filters: &[OperatorResult],
    to_produce: u32,
) -> Vec<QueryResultEntry> {
    let mut entries = Vec::new();
    for (partition, filter) in database.partitions.iter().zip(filters) {
        for local_id in filter.iter() {
            if entries.len() as u32 == to_produce {
                return entries;
            }
            entries.push(read_row(field_metadata, partition, local_id));
        }
    }
    entries
}

/// Ordered limit: a bounded max-heap per partition keeps the best
/// `to_produce` rows, the sorted runs are then merged.
fn top_rows_per_partition(
    field_metadata: &[(String, ColumnKind)],
    database: &Database,
    filters: &[OperatorResult],
    order_by_fields: &[OrderByField],
    to_produce: u32,
) -> Vec<QueryResultEntry> {
    let runs: Vec<Vec<QueryResultEntry>> = database
        .partitions
        .par_iter()
        .zip(filters)
        .map(|(partition, filter)| {
            let mut heap = BinaryHeap::with_capacity_by(
                to_produce as usize + 1,
                |left: &QueryResultEntry, right: &QueryResultEntry| {
                    compare_entries(left, right, order_by_fields)
                },
            );
            for local_id in filter.iter() {
                heap.push(read_row(field_metadata, partition, local_id));
                if heap.len() > to_produce as usize {
                    heap.pop();
                }
            }
            heap.into_sorted_vec()
        })
        .collect();

    runs.into_iter()
        .kmerge_by(|left, right| {
            compare_entries(left, right, order_by_fields) == std::cmp::Ordering::Less
        })
        .take(to_produce as usize)
        .collect()
}
