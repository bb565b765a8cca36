// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Everything that turns loader output into an immutable database snapshot.
//!
//! The relational loader itself is an external collaborator: it groups and
//! sorts the raw input into one ordered [`Record`] stream per partition.
//! This module owns the partitioning algorithm both sides must agree on, the
//! alias resolution for lineage labels, and the build step that fills the
//! column and sequence stores.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

mod build;
mod pango_alias;
mod partitioning;

pub use self::build::build_database;
pub use self::pango_alias::PangoLineageAliasLookup;
pub use self::partitioning::{PartitionDescriptor, Partitions};

/// One input row as produced by the loader: the metadata values (raw
/// strings, empty for absent) and one optional aligned sequence per segment.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub metadata: HashMap<String, String>,
    pub nucleotide_sequences: HashMap<String, Option<String>>,
    pub amino_acid_sequences: HashMap<String, Option<String>>,
}

/// The preprocessing configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreprocessingConfig {
    pub input_directory: PathBuf,
    pub output_directory: PathBuf,
    pub reference_genomes_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pango_alias_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_definitions_file: Option<PathBuf>,
}

impl PreprocessingConfig {
    pub fn from_file(path: &Path) -> Result<Self, PreprocessingError> {
        let file = File::open(path).map_err(|source| {
            PreprocessingError::MissingFile(path.display().to_string(), source)
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|error| {
            PreprocessingError::MalformedDocument {
                document: "preprocessing config",
                message: error.to_string(),
            }
        })
    }
}

/// Input violated the schema or the reference; the build aborts and leaves
/// any existing snapshot untouched.
#[derive(thiserror::Error, Debug)]
pub enum PreprocessingError {
    #[error("cannot open {0}: {1}")]
    MissingFile(String, #[source] std::io::Error),
    #[error("malformed {document}: {message}")]
    MalformedDocument {
        document: &'static str,
        message: String,
    },
    #[error("illegal character {character:?} in {alphabet} sequence")]
    IllegalCharacter {
        character: char,
        alphabet: &'static str,
    },
    #[error("sequence length {got} does not match the reference length {expected}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("duplicate primary key {0:?}")]
    DuplicatePrimaryKey(String),
    #[error("record is missing a value for the primary key column {0:?}")]
    MissingPrimaryKey(String),
    #[error("invalid value {value:?} for column {column:?}: {message}")]
    MalformedValue {
        column: String,
        value: String,
        message: String,
    },
    #[error("record carries no data for segment {0:?}")]
    UnknownSegment(String),
    #[error(
        "partition {partition} holds {got} sequences but the descriptor declares {expected}"
    )]
    PartitionCountMismatch {
        partition: usize,
        expected: u32,
        got: u32,
    },
    #[error("the layout describes {expected} partitions but {got} input streams were provided")]
    LayoutMismatch { expected: usize, got: usize },
}
