// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::PreprocessingError;

/// Resolution of aliased lineage labels to their canonical dotted form.
///
/// The alias table maps the first label segment to a canonical prefix:
/// `BA -> B.1.1.529` turns `BA.5` into `B.1.1.529.5`. Sub-lineage bitmaps
/// are computed over canonical labels only, so resolution happens both at
/// build time and on query values.
#[derive(Debug, Clone, Default)]
pub struct PangoLineageAliasLookup {
    aliases: HashMap<String, String>,
}

impl PangoLineageAliasLookup {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self {
            aliases: aliases
                .into_iter()
                .filter(|(_, canonical)| !canonical.is_empty())
                .collect(),
        }
    }

    /// Load the alias document: a JSON map `alias -> canonical prefix`.
    /// Empty canonical values mark root aliases (`A`, `B`) and are ignored.
    pub fn from_file(path: &Path) -> Result<Self, PreprocessingError> {
        let file = File::open(path).map_err(|source| {
            PreprocessingError::MissingFile(path.display().to_string(), source)
        })?;
        let aliases: HashMap<String, String> = serde_json::from_reader(BufReader::new(file))
            .map_err(|error| PreprocessingError::MalformedDocument {
                document: "pango alias table",
                message: error.to_string(),
            })?;
        Ok(Self::new(aliases))
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    /// Replace an aliased first segment with its canonical prefix; labels
    /// without a known alias pass through unchanged.
    pub fn unalias(&self, label: &str) -> String {
        let first_segment = label.split('.').next().unwrap_or(label);
        match self.aliases.get(first_segment) {
            Some(canonical) => {
                let rest = &label[first_segment.len()..];
                format!("{canonical}{rest}")
            }
            None => label.to_string(),
        }
    }
}
