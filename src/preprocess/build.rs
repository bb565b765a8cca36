// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::AHashSet;
use tracing::info;

use super::partitioning::Partitions;
use super::{PangoLineageAliasLookup, PreprocessingError, Record};
use crate::catalog::{ColumnKind, Schema};
use crate::db::Database;
use crate::storage::{parse_reference, DatabasePartition, ReferenceGenomes, SequenceStorePartition};
use crate::storage::column::ColumnGroup;
use crate::symbols::{AminoAcid, Nucleotide};
use crate::types::Date;

/// Sequences are indexed in batches of this many records.
const BATCH_SIZE: usize = 1024;

/// Build an immutable database snapshot from one ordered record stream per
/// partition. The streams must follow the layout's partition order and each
/// partition's global sort order; local ids are assigned by arrival.
pub fn build_database<I>(
    schema: Schema,
    reference_genomes: &ReferenceGenomes,
    alias_lookup: PangoLineageAliasLookup,
    layout: &Partitions,
    partition_sources: Vec<I>,
) -> Result<Database, PreprocessingError>
where
    I: IntoIterator<Item = Record>,
{
    if partition_sources.len() != layout.len() {
        return Err(PreprocessingError::LayoutMismatch {
            expected: layout.len(),
            got: partition_sources.len(),
        });
    }

    let nuc_references: HashMap<String, Arc<[Nucleotide]>> = reference_genomes
        .nucleotide_sequences
        .iter()
        .map(|(name, text)| Ok((name.clone(), parse_reference::<Nucleotide>(text)?)))
        .collect::<Result<_, PreprocessingError>>()?;
    let aa_references: HashMap<String, Arc<[AminoAcid]>> = reference_genomes
        .amino_acid_sequences
        .iter()
        .map(|(name, text)| Ok((name.clone(), parse_reference::<AminoAcid>(text)?)))
        .collect::<Result<_, PreprocessingError>>()?;

    let mut seen_primary_keys: AHashSet<String> = AHashSet::new();
    let mut partitions = Vec::with_capacity(partition_sources.len());

    for (partition_index, source) in partition_sources.into_iter().enumerate() {
        let descriptor = &layout.partitions[partition_index];
        let mut builder = PartitionBuilder::new(&schema, &alias_lookup, &nuc_references, &aa_references);
        for record in source {
            builder.push(record, &mut seen_primary_keys)?;
        }
        let partition = builder.finish(descriptor.chunks.clone())?;

        let expected = descriptor.sequence_count();
        if partition.sequence_count != expected {
            return Err(PreprocessingError::PartitionCountMismatch {
                partition: partition_index,
                expected,
                got: partition.sequence_count,
            });
        }
        info!(
            partition = partition_index,
            sequences = partition.sequence_count,
            "partition built"
        );
        partitions.push(partition);
    }

    Ok(Database::assemble(
        schema,
        alias_lookup,
        nuc_references,
        aa_references,
        partitions,
    ))
}

struct PartitionBuilder<'a> {
    schema: &'a Schema,
    alias_lookup: &'a PangoLineageAliasLookup,
    columns: ColumnGroup,
    nuc_stores: HashMap<String, SequenceStorePartition<Nucleotide>>,
    aa_stores: HashMap<String, SequenceStorePartition<AminoAcid>>,
    nuc_batches: HashMap<String, Vec<Option<String>>>,
    aa_batches: HashMap<String, Vec<Option<String>>>,
    count: u32,
}

impl<'a> PartitionBuilder<'a> {
    fn new(
        schema: &'a Schema,
        alias_lookup: &'a PangoLineageAliasLookup,
        nuc_references: &HashMap<String, Arc<[Nucleotide]>>,
        aa_references: &HashMap<String, Arc<[AminoAcid]>>,
    ) -> Self {
        Self {
            schema,
            alias_lookup,
            columns: ColumnGroup::initialize(schema),
            nuc_stores: nuc_references
                .iter()
                .map(|(name, reference)| {
                    (name.clone(), SequenceStorePartition::new(reference.clone()))
                })
                .collect(),
            aa_stores: aa_references
                .iter()
                .map(|(name, reference)| {
                    (name.clone(), SequenceStorePartition::new(reference.clone()))
                })
                .collect(),
            nuc_batches: nuc_references
                .keys()
                .map(|name| (name.clone(), Vec::with_capacity(BATCH_SIZE)))
                .collect(),
            aa_batches: aa_references
                .keys()
                .map(|name| (name.clone(), Vec::with_capacity(BATCH_SIZE)))
                .collect(),
            count: 0,
        }
    }

    fn push(
        &mut self,
        mut record: Record,
        seen_primary_keys: &mut AHashSet<String>,
    ) -> Result<(), PreprocessingError> {
        let primary_key = record
            .metadata
            .get(&self.schema.primary_key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                PreprocessingError::MissingPrimaryKey(self.schema.primary_key.clone())
            })?;
        if !seen_primary_keys.insert(primary_key.clone()) {
            return Err(PreprocessingError::DuplicatePrimaryKey(primary_key.clone()));
        }

        for column in &self.schema.metadata {
            let raw = record
                .metadata
                .get(&column.name)
                .map(String::as_str)
                .unwrap_or("");
            self.insert_metadata_value(&column.name, column.kind(), raw)?;
        }

        for segment in record.nucleotide_sequences.keys() {
            if !self.nuc_stores.contains_key(segment) {
                return Err(PreprocessingError::UnknownSegment(segment.clone()));
            }
        }
        for segment in record.amino_acid_sequences.keys() {
            if !self.aa_stores.contains_key(segment) {
                return Err(PreprocessingError::UnknownSegment(segment.clone()));
            }
        }
        for (segment, batch) in &mut self.nuc_batches {
            batch.push(record.nucleotide_sequences.remove(segment).flatten());
        }
        for (segment, batch) in &mut self.aa_batches {
            batch.push(record.amino_acid_sequences.remove(segment).flatten());
        }
        self.count += 1;
        if self.count as usize % BATCH_SIZE == 0 {
            self.flush_batches()?;
        }
        Ok(())
    }

    fn insert_metadata_value(
        &mut self,
        name: &str,
        kind: ColumnKind,
        raw: &str,
    ) -> Result<(), PreprocessingError> {
        let malformed = |message: String| PreprocessingError::MalformedValue {
            column: name.to_string(),
            value: raw.to_string(),
            message,
        };
        match kind {
            ColumnKind::RawString => {
                self.columns.string_columns.get_mut(name).unwrap().insert(raw);
            }
            ColumnKind::IndexedString => {
                self.columns
                    .indexed_string_columns
                    .get_mut(name)
                    .unwrap()
                    .insert(raw);
            }
            ColumnKind::Int => {
                let value = if raw.is_empty() {
                    None
                } else {
                    Some(raw.parse::<i32>().map_err(|error| malformed(error.to_string()))?)
                };
                self.columns.int_columns.get_mut(name).unwrap().insert(value);
            }
            ColumnKind::Float => {
                let value = if raw.is_empty() {
                    None
                } else {
                    Some(raw.parse::<f64>().map_err(|error| malformed(error.to_string()))?)
                };
                self.columns.float_columns.get_mut(name).unwrap().insert(value);
            }
            ColumnKind::Date => {
                let value = if raw.is_empty() {
                    None
                } else {
                    Some(raw.parse::<Date>().map_err(|error| malformed(error.to_string()))?)
                };
                self.columns.date_columns.get_mut(name).unwrap().insert(value);
            }
            ColumnKind::PangoLineage => {
                let canonical = self.alias_lookup.unalias(raw);
                self.columns
                    .pango_lineage_columns
                    .get_mut(name)
                    .unwrap()
                    .insert(&canonical);
            }
            ColumnKind::Insertion => {
                self.columns
                    .insertion_columns
                    .get_mut(name)
                    .unwrap()
                    .insert(raw)
                    .map_err(malformed)?;
            }
        }
        Ok(())
    }

    fn flush_batches(&mut self) -> Result<(), PreprocessingError> {
        for (segment, batch) in &mut self.nuc_batches {
            if !batch.is_empty() {
                self.nuc_stores.get_mut(segment).unwrap().interpret(batch)?;
                batch.clear();
            }
        }
        for (segment, batch) in &mut self.aa_batches {
            if !batch.is_empty() {
                self.aa_stores.get_mut(segment).unwrap().interpret(batch)?;
                batch.clear();
            }
        }
        Ok(())
    }

    fn finish(
        mut self,
        chunks: Vec<crate::storage::Chunk>,
    ) -> Result<DatabasePartition, PreprocessingError> {
        self.flush_batches()?;
        for store in self.nuc_stores.values_mut() {
            store.finalize();
        }
        for store in self.aa_stores.values_mut() {
            store.finalize();
        }
        for column in self.columns.pango_lineage_columns.values_mut() {
            column.finalize();
        }
        for column in self.columns.indexed_string_columns.values_mut() {
            column.optimize();
        }
        Ok(DatabasePartition {
            sequence_count: self.count,
            chunks,
            columns: self.columns,
            nuc_sequences: self.nuc_stores,
            aa_sequences: self.aa_stores,
        })
    }
}
