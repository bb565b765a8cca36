// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Mutation frequency tables over a filter result.
//!
//! For every position the action counts, per valid mutation symbol, the
//! filtered sequences carrying that symbol. Partitions the filter covers
//! completely are served from bitmap cardinalities alone; the rest go
//! through intersection cardinalities. Ambiguity codes and the missing
//! marker stay out of the denominator.

use rayon::prelude::*;

use super::super::error::Result;
use super::super::operator::OperatorResult;
use super::super::QueryResultEntry;
use crate::storage::SequenceStorePartition;
use crate::symbols::Symbol;
use crate::types::DataValue;

/// Work granularity along the genome axis.
const POSITIONS_PER_TASK: usize = 300;

pub(super) fn execute<S: Symbol>(
    reference: &[S],
    stores: &[&SequenceStorePartition<S>],
    filters: &mut [OperatorResult],
    min_proportion: f64,
) -> Result<Vec<QueryResultEntry>> {
    let (partial, full) = prefilter(stores, filters);
    let filters: &[OperatorResult] = filters;
    debug_assert!(S::VALID_MUTATION_SYMBOLS.len() <= 32);

    let entries: Vec<Vec<QueryResultEntry>> = (0..reference.len())
        .into_par_iter()
        .with_min_len(POSITIONS_PER_TASK)
        .map(|position| {
            let reference_symbol = reference[position];
            let mut counts = [0u64; 32];
            for &partition_index in &partial {
                let filter: &OperatorResult = &filters[partition_index];
                let index = stores[partition_index].position(position);
                for (slot, &symbol) in S::VALID_MUTATION_SYMBOLS.iter().enumerate() {
                    let bitmap = index.bitmap(symbol);
                    counts[slot] += if index.is_flipped(symbol) {
                        filter.len() - filter.intersection_len(bitmap)
                    } else {
                        filter.intersection_len(bitmap)
                    };
                }
            }
            for &partition_index in &full {
                let store = stores[partition_index];
                let index = store.position(position);
                for (slot, &symbol) in S::VALID_MUTATION_SYMBOLS.iter().enumerate() {
                    counts[slot] += index.symbol_count(symbol, store.sequence_count());
                }
            }

            let total: u64 = counts[..S::VALID_MUTATION_SYMBOLS.len()].iter().sum();
            if total == 0 {
                return Vec::new();
            }
            let threshold_count =
                ((total as f64 * min_proportion).ceil() as u64).saturating_sub(1);

            S::VALID_MUTATION_SYMBOLS
                .iter()
                .enumerate()
                .filter(|(_, &symbol)| symbol != reference_symbol)
                .filter(|(slot, _)| counts[*slot] > threshold_count)
                .map(|(slot, &symbol)| {
                    let count = counts[slot];
                    let proportion = count as f64 / total as f64;
                    QueryResultEntry::from([
                        (
                            "mutation",
                            DataValue::String(format!(
                                "{}{}{}",
                                reference_symbol.to_char(),
                                position + 1,
                                symbol.to_char()
                            )),
                        ),
                        ("count", DataValue::Int(count as i64)),
                        ("proportion", DataValue::Float(proportion)),
                    ])
                })
                .collect()
        })
        .collect();

    Ok(entries.into_iter().flatten().collect())
}

/// Split partitions into those the filter covers completely and those that
/// need intersection counting; empty filters drop out entirely.
fn prefilter<S: Symbol>(
    stores: &[&SequenceStorePartition<S>],
    filters: &mut [OperatorResult],
) -> (Vec<usize>, Vec<usize>) {
    let mut partial = Vec::new();
    let mut full = Vec::new();
    for (partition_index, filter) in filters.iter_mut().enumerate() {
        let cardinality = filter.len();
        if cardinality == 0 {
            continue;
        }
        if cardinality == u64::from(stores[partition_index].sequence_count()) {
            full.push(partition_index);
        } else {
            filter.optimize();
            partial.push(partition_index);
        }
    }
    (partial, full)
}
