// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The database configuration document: which metadata columns exist, how
//! each is stored, and which columns drive partitioning and sorting.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The resolved storage kind of a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    RawString,
    IndexedString,
    Date,
    Int,
    Float,
    PangoLineage,
    Insertion,
}

/// Column type as written in the configuration document. A `string` column
/// with `generateIndex` becomes an indexed-string column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Date,
    Int,
    Float,
    PangoLineage,
    Insertion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub generate_index: bool,
    /// For insertion columns: the segment the positions refer to. Defaults to
    /// the schema's default nucleotide sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_name: Option<String>,
}

impl ColumnConfig {
    pub fn kind(&self) -> ColumnKind {
        match self.column_type {
            ColumnType::String if self.generate_index => ColumnKind::IndexedString,
            ColumnType::String => ColumnKind::RawString,
            ColumnType::Date => ColumnKind::Date,
            ColumnType::Int => ColumnKind::Int,
            ColumnType::Float => ColumnKind::Float,
            ColumnType::PangoLineage => ColumnKind::PangoLineage,
            ColumnType::Insertion => ColumnKind::Insertion,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Schema {
    pub instance_name: String,
    pub metadata: Vec<ColumnConfig>,
    pub primary_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to_sort_by: Option<String>,
    #[serde(default = "default_nucleotide_sequence")]
    pub default_nucleotide_sequence: String,
}

fn default_nucleotide_sequence() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseConfig {
    pub schema: Schema,
}

impl DatabaseConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)
            .map_err(|source| ConfigError::MissingFile(path.display().to_string(), source))?;
        let config: DatabaseConfig = serde_json::from_reader(BufReader::new(file))?;
        config.schema.validate()?;
        Ok(config)
    }
}

impl Schema {
    pub fn column(&self, name: &str) -> Option<&ColumnConfig> {
        self.metadata.iter().find(|column| column.name == name)
    }

    /// Check the internal consistency required before any build may start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for column in &self.metadata {
            if !seen.insert(column.name.as_str()) {
                return Err(ConfigError::DuplicateColumn(column.name.clone()));
            }
        }
        let primary = self
            .column(&self.primary_key)
            .ok_or_else(|| ConfigError::UnknownColumn("primaryKey", self.primary_key.clone()))?;
        if !matches!(
            primary.kind(),
            ColumnKind::RawString | ColumnKind::IndexedString
        ) {
            return Err(ConfigError::InvalidColumnKind {
                role: "primaryKey",
                column: self.primary_key.clone(),
                expected: "a string column",
            });
        }
        if let Some(partition_by) = &self.partition_by {
            let column = self
                .column(partition_by)
                .ok_or_else(|| ConfigError::UnknownColumn("partitionBy", partition_by.clone()))?;
            if !matches!(
                column.kind(),
                ColumnKind::IndexedString | ColumnKind::PangoLineage
            ) {
                return Err(ConfigError::InvalidColumnKind {
                    role: "partitionBy",
                    column: partition_by.clone(),
                    expected: "an indexed string or pango lineage column",
                });
            }
        }
        if let Some(date_column) = &self.date_to_sort_by {
            let column = self
                .column(date_column)
                .ok_or_else(|| ConfigError::UnknownColumn("dateToSortBy", date_column.clone()))?;
            if column.kind() != ColumnKind::Date {
                return Err(ConfigError::InvalidColumnKind {
                    role: "dateToSortBy",
                    column: date_column.clone(),
                    expected: "a date column",
                });
            }
        }
        Ok(())
    }
}

/// Schema inconsistencies and unreadable configuration files. Fatal at
/// startup.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot open configuration file {0}: {1}")]
    MissingFile(String, #[source] std::io::Error),
    #[error("malformed configuration document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("column {0:?} is configured twice")]
    DuplicateColumn(String),
    #[error("{0} refers to unknown column {1:?}")]
    UnknownColumn(&'static str, String),
    #[error("{role} column {column:?} must be {expected}")]
    InvalidColumnKind {
        role: &'static str,
        column: String,
        expected: &'static str,
    },
}
