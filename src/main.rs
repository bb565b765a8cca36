// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! A small interactive shell: load a snapshot, answer one JSON query per
//! line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use silo::Database;
use tracing_subscriber::EnvFilter;

/// SILO: an in-memory columnar index for aligned genomic sequences.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Snapshot directory produced by a preprocessing run.
    #[clap(short, long)]
    snapshot: PathBuf,

    /// Execute a single query from this file and exit.
    #[clap(short, long)]
    query_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let database = Database::load(&args.snapshot)
        .with_context(|| format!("cannot load snapshot {}", args.snapshot.display()))?;
    let info = database.info();
    println!(
        "loaded {} ({} sequences, {} partitions)",
        database.data_version,
        info.sequence_count,
        database.partitions.len()
    );

    if let Some(query_file) = args.query_file {
        let query = std::fs::read_to_string(&query_file)
            .with_context(|| format!("cannot read {}", query_file.display()))?;
        println!("{}", run_query(&database, &query));
        return Ok(());
    }

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                editor.add_history_entry(line.as_str())?;
                println!("{}", run_query(&database, &line));
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        }
    }
    Ok(())
}

fn run_query(database: &Database, query: &str) -> String {
    let document = match database.query(query) {
        Ok(response) => serde_json::to_value(&response).expect("responses serialize"),
        Err(error) => error.to_response(),
    };
    serde_json::to_string_pretty(&document).expect("documents serialize")
}
