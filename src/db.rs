// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::catalog::{ConfigError, DatabaseConfig, Schema};
use crate::preprocess::{
    build_database, PangoLineageAliasLookup, PartitionDescriptor, Partitions, PreprocessingError,
    Record,
};
use crate::query::{QueryEngine, QueryError, QueryResponse};
use crate::storage::persist::{self, PersistenceError};
use crate::storage::{DatabasePartition, ReferenceGenomes};
use crate::symbols::{AminoAcid, Nucleotide, Symbol};

/// An immutable database snapshot.
///
/// Built once, then only read; a rebuild produces a new snapshot that
/// replaces the old one through [`SharedDatabase`].
#[derive(Debug)]
pub struct Database {
    pub schema: Schema,
    pub alias_lookup: PangoLineageAliasLookup,
    pub nuc_references: HashMap<String, Arc<[Nucleotide]>>,
    pub aa_references: HashMap<String, Arc<[AminoAcid]>>,
    pub partitions: Vec<DatabasePartition>,
    pub data_version: String,
}

/// Aggregate size figures, mainly for logs and the info endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub sequence_count: u32,
    pub index_bytes: u64,
    pub missing_bitmap_bytes: u64,
}

impl Database {
    /// Build a snapshot from per-partition record streams; see
    /// [`build_database`] for the contract the streams must follow.
    pub fn build<I>(
        schema: Schema,
        reference_genomes: &ReferenceGenomes,
        alias_lookup: PangoLineageAliasLookup,
        layout: &Partitions,
        partition_sources: Vec<I>,
    ) -> Result<Database, Error>
    where
        I: IntoIterator<Item = Record>,
    {
        schema.validate()?;
        Ok(build_database(
            schema,
            reference_genomes,
            alias_lookup,
            layout,
            partition_sources,
        )?)
    }

    pub(crate) fn assemble(
        schema: Schema,
        alias_lookup: PangoLineageAliasLookup,
        nuc_references: HashMap<String, Arc<[Nucleotide]>>,
        aa_references: HashMap<String, Arc<[AminoAcid]>>,
        partitions: Vec<DatabasePartition>,
    ) -> Database {
        let data_version = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        Database {
            schema,
            alias_lookup,
            nuc_references,
            aa_references,
            partitions,
            data_version,
        }
    }

    /// Answer one JSON query against this snapshot.
    pub fn query(&self, query_text: &str) -> Result<QueryResponse, QueryError> {
        QueryEngine::new(self).execute_query(query_text)
    }

    pub fn info(&self) -> DatabaseInfo {
        let mut info = DatabaseInfo {
            sequence_count: 0,
            index_bytes: 0,
            missing_bitmap_bytes: 0,
        };
        for partition in &self.partitions {
            info.sequence_count += partition.sequence_count;
            for store_info in partition
                .nuc_sequences
                .values()
                .map(|store| store.info())
                .chain(partition.aa_sequences.values().map(|store| store.info()))
            {
                info.index_bytes += store_info.size_in_bytes;
                info.missing_bitmap_bytes += store_info.missing_bitmap_bytes;
            }
        }
        info
    }

    /// Persist this snapshot under `base_directory/<data_version>/`.
    pub fn save(&self, base_directory: &Path) -> Result<PathBuf, Error> {
        let directory = base_directory.join(&self.data_version);
        fs::create_dir_all(&directory)?;

        let config = DatabaseConfig {
            schema: self.schema.clone(),
        };
        serde_json::to_writer_pretty(
            File::create(directory.join("database_config.json"))?,
            &config,
        )
        .map_err(|error| Error::Persistence(PersistenceError::Io(error.into())))?;

        let reference_genomes = ReferenceGenomes {
            nucleotide_sequences: reference_text(&self.nuc_references),
            amino_acid_sequences: reference_text(&self.aa_references),
        };
        serde_json::to_writer_pretty(
            File::create(directory.join("reference_genomes.json"))?,
            &reference_genomes,
        )
        .map_err(|error| Error::Persistence(PersistenceError::Io(error.into())))?;

        serde_json::to_writer_pretty(
            File::create(directory.join("pango_alias.json"))?,
            self.alias_lookup.aliases(),
        )
        .map_err(|error| Error::Persistence(PersistenceError::Io(error.into())))?;

        let layout = Partitions {
            partitions: self
                .partitions
                .iter()
                .map(|partition| PartitionDescriptor {
                    chunks: partition.chunks.clone(),
                })
                .collect(),
        };
        layout.save(&directory.join("partition_descriptor.json"))?;

        for (partition_index, partition) in self.partitions.iter().enumerate() {
            let archive = persist::write_partition(partition);
            let path = directory.join(format!("P{partition_index}.silo"));
            File::create(&path)?.write_all(&archive)?;
        }
        info!(
            directory = %directory.display(),
            partitions = self.partitions.len(),
            "snapshot saved"
        );
        Ok(directory)
    }

    /// Load a snapshot directory produced by [`Database::save`].
    pub fn load(directory: &Path) -> Result<Database, Error> {
        let data_version = directory
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let config = DatabaseConfig::from_file(&directory.join("database_config.json"))?;
        let reference_genomes =
            ReferenceGenomes::from_file(&directory.join("reference_genomes.json"))?;
        let alias_lookup =
            PangoLineageAliasLookup::from_file(&directory.join("pango_alias.json"))?;
        let layout = Partitions::load(&directory.join("partition_descriptor.json"))?;

        let nuc_references = parse_references(&reference_genomes.nucleotide_sequences)?;
        let aa_references = parse_references(&reference_genomes.amino_acid_sequences)?;

        let mut partitions = Vec::with_capacity(layout.len());
        for (partition_index, descriptor) in layout.partitions.iter().enumerate() {
            let path = directory.join(format!("P{partition_index}.silo"));
            let archive = fs::read(&path)?;
            let partition = persist::read_partition(&archive).map_err(Error::Persistence)?;
            if partition.sequence_count != descriptor.sequence_count() {
                return Err(Error::Persistence(PersistenceError::Decode(format!(
                    "partition {partition_index} holds {} sequences but the descriptor \
                     declares {}",
                    partition.sequence_count,
                    descriptor.sequence_count()
                ))));
            }
            partitions.push(partition);
        }

        let database = Database {
            schema: config.schema,
            alias_lookup,
            nuc_references,
            aa_references,
            partitions,
            data_version,
        };
        info!(
            data_version = %database.data_version,
            sequences = database.info().sequence_count,
            "snapshot loaded"
        );
        Ok(database)
    }
}

fn reference_text<S: Symbol>(references: &HashMap<String, Arc<[S]>>) -> BTreeMap<String, String> {
    references
        .iter()
        .map(|(name, reference)| {
            let text: String = reference.iter().map(|symbol| symbol.to_char()).collect();
            (name.clone(), text)
        })
        .collect()
}

fn parse_references<S: Symbol>(
    texts: &BTreeMap<String, String>,
) -> Result<HashMap<String, Arc<[S]>>, Error> {
    texts
        .iter()
        .map(|(name, text)| {
            Ok((
                name.clone(),
                crate::storage::parse_reference::<S>(text).map_err(Error::Preprocessing)?,
            ))
        })
        .collect()
}

/// The swappable cell the front-end keeps the current snapshot in.
///
/// Readers take their own handle and keep it for the whole query; a rebuild
/// replaces the value without waiting for them.
pub struct SharedDatabase {
    current: RwLock<Arc<Database>>,
}

impl SharedDatabase {
    pub fn new(database: Database) -> Self {
        SharedDatabase {
            current: RwLock::new(Arc::new(database)),
        }
    }

    pub fn snapshot(&self) -> Arc<Database> {
        self.current.read().expect("snapshot lock poisoned").clone()
    }

    pub fn replace(&self, database: Database) {
        *self.current.write().expect("snapshot lock poisoned") = Arc::new(database);
    }
}

/// Top-level error type, aggregating the per-phase errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("preprocessing error: {0}")]
    Preprocessing(#[from] PreprocessingError),
    #[error("query error: {0}")]
    Query(#[from] QueryError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
