// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::preprocess::PreprocessingError;

/// The reference-genomes document: one aligned reference string per segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReferenceGenomes {
    pub nucleotide_sequences: BTreeMap<String, String>,
    pub amino_acid_sequences: BTreeMap<String, String>,
}

impl ReferenceGenomes {
    pub fn from_file(path: &Path) -> Result<Self, PreprocessingError> {
        let file = File::open(path).map_err(|source| {
            PreprocessingError::MissingFile(path.display().to_string(), source)
        })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|error| PreprocessingError::MalformedDocument {
                document: "reference genomes",
                message: error.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_two_segment_maps() {
        let genomes: ReferenceGenomes = serde_json::from_value(serde_json::json!({
            "nucleotideSequences": {"main": "ACGT"},
            "aminoAcidSequences": {"S": "MFVF*"}
        }))
        .unwrap();
        assert_eq!(genomes.nucleotide_sequences["main"], "ACGT");
        assert_eq!(genomes.amino_acid_sequences["S"], "MFVF*");
    }
}
