// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Shared fixtures: a small four-sequence database over the reference
//! `ACGT` plus one spike-like amino-acid segment.

use std::collections::HashMap;

use silo::catalog::{ColumnConfig, ColumnType, Schema};
use silo::preprocess::{PangoLineageAliasLookup, Partitions, Record};
use silo::storage::ReferenceGenomes;
use silo::Database;

pub fn schema() -> Schema {
    let config = |name: &str, column_type: ColumnType| ColumnConfig {
        name: name.to_string(),
        column_type,
        generate_index: false,
        sequence_name: None,
    };
    Schema {
        instance_name: "test_instance".to_string(),
        metadata: vec![
            config("key", ColumnType::String),
            config("pango_lineage", ColumnType::PangoLineage),
            config("date", ColumnType::Date),
            ColumnConfig {
                generate_index: true,
                ..config("country", ColumnType::String)
            },
            config("age", ColumnType::Int),
            config("qc_value", ColumnType::Float),
            config("nuc_insertions", ColumnType::Insertion),
        ],
        primary_key: "key".to_string(),
        partition_by: None,
        date_to_sort_by: Some("date".to_string()),
        default_nucleotide_sequence: "main".to_string(),
    }
}

pub fn reference_genomes() -> ReferenceGenomes {
    serde_json::from_value(serde_json::json!({
        "nucleotideSequences": {"main": "ACGT"},
        "aminoAcidSequences": {"S": "MF"}
    }))
    .unwrap()
}

pub fn alias_lookup() -> PangoLineageAliasLookup {
    PangoLineageAliasLookup::new(HashMap::from([(
        "BA".to_string(),
        "B.1.1.529".to_string(),
    )]))
}

#[allow(clippy::too_many_arguments)]
pub fn record(
    key: &str,
    lineage: &str,
    date: &str,
    country: &str,
    age: &str,
    qc_value: &str,
    insertions: &str,
    genome: &str,
    spike: &str,
) -> Record {
    Record {
        metadata: HashMap::from([
            ("key".to_string(), key.to_string()),
            ("pango_lineage".to_string(), lineage.to_string()),
            ("date".to_string(), date.to_string()),
            ("country".to_string(), country.to_string()),
            ("age".to_string(), age.to_string()),
            ("qc_value".to_string(), qc_value.to_string()),
            ("nuc_insertions".to_string(), insertions.to_string()),
        ]),
        nucleotide_sequences: HashMap::from([("main".to_string(), Some(genome.to_string()))]),
        amino_acid_sequences: HashMap::from([("S".to_string(), Some(spike.to_string()))]),
    }
}

/// Four sequences over the reference: S1 `ACGT`, S2 `ACGA`, S3 `AAGT`,
/// S4 `NCGT`, enriched with metadata exercising every column kind.
pub fn records() -> Vec<Record> {
    vec![
        record(
            "S1", "B.1", "2021-01-01", "Denmark", "10", "0.91", "248:G", "ACGT", "MF",
        ),
        record(
            "S2", "B.1.1.7", "2021-01-02", "Denmark", "20", "0.35", "", "ACGA", "ML",
        ),
        record(
            "S3", "BA.5", "2021-01-03", "Peru", "30", "0.77", "248:GT,300:TT", "AAGT", "MF",
        ),
        record("S4", "", "2021-01-04", "", "", "", "", "NCGT", "XF"),
    ]
}

pub fn database() -> Database {
    Database::build(
        schema(),
        &reference_genomes(),
        alias_lookup(),
        &Partitions::single(4),
        vec![records()],
    )
    .unwrap()
}
