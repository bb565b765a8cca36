// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Compilation of metadata-column filters.

use regex::Regex;

use super::super::error::{QueryError, Result};
use super::super::operator::{Operator, Predicate};
use crate::catalog::ColumnKind;
use crate::db::Database;
use crate::storage::DatabasePartition;
use crate::types::Date;

fn column_kind(database: &Database, column: &str) -> Result<ColumnKind> {
    database
        .schema
        .column(column)
        .map(|config| config.kind())
        .ok_or_else(|| QueryError::bad_request(format!("unknown column {column:?}")))
}

fn expect_kind(
    database: &Database,
    column: &str,
    expected: ColumnKind,
    capability: &str,
) -> Result<()> {
    let kind = column_kind(database, column)?;
    if kind != expected {
        return Err(QueryError::bad_request(format!(
            "column {column:?} does not support {capability}"
        )));
    }
    Ok(())
}

pub(super) fn compile_date_between<'a>(
    column: &str,
    from: Option<Date>,
    to: Option<Date>,
    database: &'a Database,
    partition: &'a DatabasePartition,
) -> Result<Operator<'a>> {
    expect_kind(database, column, ColumnKind::Date, "date ranges")?;
    let column = &partition.columns.date_columns[column];
    if from.is_none() && to.is_none() {
        return Ok(Operator::Full {
            row_count: partition.sequence_count,
        });
    }
    if column.is_sorted() {
        Ok(Operator::RangeSelection {
            values: column.values(),
            chunks: &partition.chunks,
            from,
            to,
        })
    } else {
        Ok(Operator::Selection {
            predicate: Predicate::DateBetween {
                values: column.values(),
                from,
                to,
            },
        })
    }
}

pub(super) fn compile_int_between<'a>(
    column: &str,
    from: Option<i32>,
    to: Option<i32>,
    database: &'a Database,
    partition: &'a DatabasePartition,
) -> Result<Operator<'a>> {
    expect_kind(database, column, ColumnKind::Int, "integer ranges")?;
    Ok(Operator::Selection {
        predicate: Predicate::IntBetween {
            values: partition.columns.int_columns[column].values(),
            from,
            to,
        },
    })
}

pub(super) fn compile_float_between<'a>(
    column: &str,
    from: Option<f64>,
    to: Option<f64>,
    database: &'a Database,
    partition: &'a DatabasePartition,
) -> Result<Operator<'a>> {
    expect_kind(database, column, ColumnKind::Float, "float ranges")?;
    Ok(Operator::Selection {
        predicate: Predicate::FloatBetween {
            values: partition.columns.float_columns[column].values(),
            from,
            to,
        },
    })
}

pub(super) fn compile_string_equals<'a>(
    column: &str,
    value: &str,
    database: &'a Database,
    partition: &'a DatabasePartition,
) -> Result<Operator<'a>> {
    match column_kind(database, column)? {
        ColumnKind::IndexedString => {
            let column = &partition.columns.indexed_string_columns[column];
            Ok(match column.bitmap_for_equality(value) {
                Some(bitmap) => Operator::IndexScan { bitmap },
                None => Operator::Empty,
            })
        }
        ColumnKind::RawString => Ok(Operator::Selection {
            predicate: Predicate::StringEquals {
                column: &partition.columns.string_columns[column],
                value: value.to_string(),
            },
        }),
        ColumnKind::PangoLineage => {
            compile_pango_lineage_equals(column, value, false, database, partition)
        }
        _ => Err(QueryError::bad_request(format!(
            "column {column:?} does not support string equality"
        ))),
    }
}

pub(super) fn compile_string_search<'a>(
    column: &str,
    value: &str,
    database: &'a Database,
    partition: &'a DatabasePartition,
) -> Result<Operator<'a>> {
    expect_kind(database, column, ColumnKind::RawString, "substring search")?;
    Ok(Operator::Selection {
        predicate: Predicate::StringContains {
            column: &partition.columns.string_columns[column],
            value: value.to_string(),
        },
    })
}

pub(super) fn compile_pango_lineage_equals<'a>(
    column: &str,
    value: &str,
    include_sublineages: bool,
    database: &'a Database,
    partition: &'a DatabasePartition,
) -> Result<Operator<'a>> {
    expect_kind(
        database,
        column,
        ColumnKind::PangoLineage,
        "lineage equality",
    )?;
    let canonical = database.alias_lookup.unalias(value);
    let column = &partition.columns.pango_lineage_columns[column];
    Ok(
        match column.bitmap_for_lineage(&canonical, include_sublineages) {
            Some(bitmap) => Operator::IndexScan { bitmap },
            None => Operator::Empty,
        },
    )
}

pub(super) fn compile_insertion_contains<'a>(
    column: Option<&str>,
    sequence_name: Option<&str>,
    position: u32,
    value: &str,
    database: &'a Database,
    partition: &'a DatabasePartition,
) -> Result<Operator<'a>> {
    // The query text is matched literally; metacharacters are escaped.
    let pattern = Regex::new(&format!(".*{}.*", regex::escape(value)))
        .map_err(|error| QueryError::bad_request(format!("invalid insertion pattern: {error}")))?;
    let segment = sequence_name.unwrap_or(&database.schema.default_nucleotide_sequence);

    let mut columns = Vec::new();
    match column {
        Some(name) => {
            expect_kind(database, name, ColumnKind::Insertion, "insertion search")?;
            columns.push(&partition.columns.insertion_columns[name]);
        }
        None => {
            columns.extend(
                partition
                    .columns
                    .insertion_columns
                    .values()
                    .filter(|column| column.sequence_name() == segment),
            );
        }
    }

    // The index keys insertions by their 1-based position.
    let children: Vec<Operator<'a>> = columns
        .iter()
        .flat_map(|column| column.matching_entries(Some(position + 1), &pattern))
        .map(|(_, entry)| Operator::IndexScan {
            bitmap: entry.row_ids(),
        })
        .collect();
    Ok(match children.len() {
        0 => Operator::Empty,
        1 => children.into_iter().next().unwrap(),
        _ => Operator::Union { children },
    })
}
