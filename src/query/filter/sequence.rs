// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Compilation of symbol-level filters against a sequence store.

use super::super::error::{QueryError, Result};
use super::super::operator::{BitmapSelectionMode, Operator};
use super::AmbiguityMode;
use crate::db::Database;
use crate::storage::{DatabasePartition, SequenceStorePartition};
use crate::symbols::{AminoAcid, Nucleotide, Symbol};

pub(super) fn resolve_nuc_store<'a>(
    database: &Database,
    partition: &'a DatabasePartition,
    sequence_name: Option<&str>,
) -> Result<&'a SequenceStorePartition<Nucleotide>> {
    let name = sequence_name.unwrap_or(&database.schema.default_nucleotide_sequence);
    partition.nuc_store(name).ok_or_else(|| {
        QueryError::bad_request(format!(
            "database does not contain the nucleotide sequence {name:?}"
        ))
    })
}

pub(super) fn resolve_aa_store<'a>(
    partition: &'a DatabasePartition,
    sequence_name: Option<&str>,
) -> Result<&'a SequenceStorePartition<AminoAcid>> {
    let name = sequence_name.ok_or_else(|| {
        QueryError::bad_request("amino acid filters require a sequenceName")
    })?;
    partition.aa_store(name).ok_or_else(|| {
        QueryError::bad_request(format!(
            "database does not contain the amino acid sequence {name:?}"
        ))
    })
}

/// Compile "symbol at position" into the cheapest exact operator.
///
/// The rewrites here are load-bearing: a flipped bitmap must be read through
/// a complement, and the missing marker lives in the per-sequence bitmaps.
pub(super) fn compile_symbol_equals<'a, S: Symbol>(
    store: &'a SequenceStorePartition<S>,
    position: u32,
    symbol: Option<S>,
    mode: AmbiguityMode,
    row_count: u32,
) -> Result<Operator<'a>> {
    if position as usize >= store.reference().len() {
        return Err(QueryError::bad_request(format!(
            "position {} is out of bounds for a segment of length {}",
            position + 1,
            store.reference().len()
        )));
    }
    let reference_symbol = store.reference()[position as usize];
    let symbol = symbol.unwrap_or(reference_symbol);

    if mode == AmbiguityMode::UpperBound {
        let expanded = symbol
            .ambiguity_symbols()
            .iter()
            .map(|&concrete| {
                compile_symbol_equals(store, position, Some(concrete), AmbiguityMode::None, row_count)
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Operator::Union { children: expanded });
    }

    if symbol == S::MISSING {
        return Ok(Operator::BitmapSelection {
            bitmaps: store.missing_symbol_bitmaps(),
            mode: BitmapSelectionMode::Contains,
            position,
        });
    }

    let index = store.position(position as usize);
    if index.is_flipped(symbol) {
        return Ok(Operator::Complement {
            child: Box::new(Operator::IndexScan {
                bitmap: index.bitmap(symbol),
            }),
            row_count,
        });
    }
    Ok(Operator::IndexScan {
        bitmap: index.bitmap(symbol),
    })
}

/// A short literal pattern is the conjunction of one symbol filter per
/// offset.
pub(super) fn compile_pattern_search<'a>(
    sequence_name: Option<&str>,
    position: u32,
    pattern: &[Nucleotide],
    mode: AmbiguityMode,
    database: &'a Database,
    partition: &'a DatabasePartition,
) -> Result<Operator<'a>> {
    let store = resolve_nuc_store(database, partition, sequence_name)?;
    if pattern.is_empty() {
        return Err(QueryError::bad_request("pattern must not be empty"));
    }
    if position as usize + pattern.len() > store.reference().len() {
        return Err(QueryError::bad_request(format!(
            "pattern of length {} starting at position {} runs past the segment end",
            pattern.len(),
            position + 1
        )));
    }
    let row_count = partition.sequence_count;
    let mut positive = Vec::new();
    let mut negated = Vec::new();
    for (offset, &symbol) in pattern.iter().enumerate() {
        let operator =
            compile_symbol_equals(store, position + offset as u32, Some(symbol), mode, row_count)?;
        match operator {
            Operator::Empty => return Ok(Operator::Empty),
            Operator::Full { .. } => {}
            Operator::Complement { child, .. } => negated.push(*child),
            operator => positive.push(operator),
        }
    }
    Ok(match (positive.len(), negated.len()) {
        (0, 0) => Operator::Full { row_count },
        (1, 0) => positive.pop().unwrap(),
        (0, _) => Operator::Complement {
            child: Box::new(Operator::Union { children: negated }),
            row_count,
        },
        _ => Operator::Intersection {
            children: positive,
            negated_children: negated,
            row_count,
        },
    })
}
