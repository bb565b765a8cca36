// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Typed per-partition metadata columns.

use std::collections::HashMap;

mod date;
mod dictionary;
mod float;
mod indexed_string;
mod insertion;
mod int;
mod pango_lineage;
mod string;

pub use self::date::DateColumnPartition;
pub use self::dictionary::Dictionary;
pub use self::float::FloatColumnPartition;
pub use self::indexed_string::IndexedStringColumnPartition;
pub use self::insertion::{parse_insertion, Insertion, InsertionColumnPartition, InsertionEntry};
pub use self::int::IntColumnPartition;
pub use self::pango_lineage::{is_sublineage_of, PangoLineageColumnPartition};
pub use self::string::RawStringColumnPartition;

use crate::catalog::{ColumnKind, Schema};
use crate::types::{DataValue, LocalId};

/// All metadata columns of one partition, grouped by storage kind.
#[derive(Debug, Default, Clone)]
pub struct ColumnGroup {
    pub string_columns: HashMap<String, RawStringColumnPartition>,
    pub indexed_string_columns: HashMap<String, IndexedStringColumnPartition>,
    pub int_columns: HashMap<String, IntColumnPartition>,
    pub float_columns: HashMap<String, FloatColumnPartition>,
    pub date_columns: HashMap<String, DateColumnPartition>,
    pub pango_lineage_columns: HashMap<String, PangoLineageColumnPartition>,
    pub insertion_columns: HashMap<String, InsertionColumnPartition>,
}

impl ColumnGroup {
    /// Create one empty column per schema entry.
    pub fn initialize(schema: &Schema) -> Self {
        let mut group = ColumnGroup::default();
        for column in &schema.metadata {
            let name = column.name.clone();
            match column.kind() {
                ColumnKind::RawString => {
                    group
                        .string_columns
                        .insert(name, RawStringColumnPartition::new());
                }
                ColumnKind::IndexedString => {
                    group
                        .indexed_string_columns
                        .insert(name, IndexedStringColumnPartition::new());
                }
                ColumnKind::Int => {
                    group.int_columns.insert(name, IntColumnPartition::new());
                }
                ColumnKind::Float => {
                    group
                        .float_columns
                        .insert(name, FloatColumnPartition::new());
                }
                ColumnKind::Date => {
                    let is_sorted = schema.date_to_sort_by.as_deref() == Some(&column.name);
                    group
                        .date_columns
                        .insert(name, DateColumnPartition::new(is_sorted));
                }
                ColumnKind::PangoLineage => {
                    group
                        .pango_lineage_columns
                        .insert(name, PangoLineageColumnPartition::new());
                }
                ColumnKind::Insertion => {
                    let sequence_name = column
                        .sequence_name
                        .clone()
                        .unwrap_or_else(|| schema.default_nucleotide_sequence.clone());
                    group
                        .insertion_columns
                        .insert(name, InsertionColumnPartition::new(sequence_name));
                }
            }
        }
        group
    }

    /// Read one typed value; the caller resolved the column's kind from the
    /// schema.
    pub fn value(&self, name: &str, kind: ColumnKind, local_id: LocalId) -> DataValue {
        match kind {
            ColumnKind::RawString => self.string_columns[name].value(local_id),
            ColumnKind::IndexedString => self.indexed_string_columns[name].value(local_id),
            ColumnKind::Int => self.int_columns[name].value(local_id),
            ColumnKind::Float => self.float_columns[name].value(local_id),
            ColumnKind::Date => self.date_columns[name].value(local_id),
            ColumnKind::PangoLineage => self.pango_lineage_columns[name].value(local_id),
            ColumnKind::Insertion => self.insertion_columns[name].value(local_id),
        }
    }
}
