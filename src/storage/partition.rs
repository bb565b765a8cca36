// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::column::ColumnGroup;
use super::sequence::SequenceStorePartition;
use crate::symbols::{AminoAcid, Nucleotide};

/// One merged run of partition-key values inside a partition.
///
/// Rows of a chunk are contiguous in the local id space, starting at
/// `offset`; within a chunk rows are ordered by the sort date (if
/// configured) and primary key, which is what date range filters
/// binary-search on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub key_low: String,
    pub key_high: String,
    pub offset: u32,
    pub count: u32,
}

/// One horizontal shard of the database: the metadata columns and sequence
/// indexes for a dense local id space `[0, sequence_count)`.
#[derive(Debug, Default, Clone)]
pub struct DatabasePartition {
    pub sequence_count: u32,
    pub chunks: Vec<Chunk>,
    pub columns: ColumnGroup,
    pub nuc_sequences: HashMap<String, SequenceStorePartition<Nucleotide>>,
    pub aa_sequences: HashMap<String, SequenceStorePartition<AminoAcid>>,
}

impl DatabasePartition {
    pub fn nuc_store(&self, name: &str) -> Option<&SequenceStorePartition<Nucleotide>> {
        self.nuc_sequences.get(name)
    }

    pub fn aa_store(&self, name: &str) -> Option<&SequenceStorePartition<AminoAcid>> {
        self.aa_sequences.get(name)
    }
}
