// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Randomized invariant checks over a multi-partition database.

mod common;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;
use serde_json::json;
use silo::preprocess::{Partitions, Record};
use silo::query::{AmbiguityMode, Filter};
use silo::storage::column::is_sublineage_of;
use silo::storage::DatabasePartition;
use silo::symbols::{Nucleotide, Symbol};
use silo::types::Date;
use silo::Database;

const REFERENCE: &str = "ACGTACGTACGTACGTACGTACGTACGTAC";
const SEQUENCE_COUNT: usize = 300;
const LINEAGES: &[&str] = &["B.1", "B.1.1", "B.1.1.7", "B.2", "BA.5", ""];
const COUNTRIES: &[&str] = &["Denmark", "Peru", "Kenya", "Japan", ""];

fn random_genome(rng: &mut StdRng) -> String {
    REFERENCE
        .chars()
        .map(|reference| match rng.gen_range(0..100) {
            0..=69 => reference,
            70..=79 => ['A', 'C', 'G', 'T', '-'][rng.gen_range(0..5)],
            80..=89 => 'N',
            90..=94 => 'R',
            _ => 'Y',
        })
        .collect()
}

fn random_records(seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..SEQUENCE_COUNT)
        .map(|index| {
            let date = if rng.gen_bool(0.9) {
                let day = rng.gen_range(1..=28);
                format!("2021-03-{day:02}")
            } else {
                String::new()
            };
            let age = if rng.gen_bool(0.8) {
                rng.gen_range(1..100).to_string()
            } else {
                String::new()
            };
            let insertions = if rng.gen_bool(0.1) { "17:CAG" } else { "" };
            common::record(
                &format!("K{index:04}"),
                LINEAGES[rng.gen_range(0..LINEAGES.len())],
                &date,
                COUNTRIES[rng.gen_range(0..COUNTRIES.len())],
                &age,
                &format!("{:.2}", rng.gen_range(0.0..1.0)),
                insertions,
                &random_genome(&mut rng),
                "MF",
            )
        })
        .collect()
}

/// Emulate the relational loader: group rows by the partition key, order
/// them per the layout's chunks, sorted by date then primary key.
fn build(seed: u64) -> Database {
    let records = random_records(seed);

    let mut histogram: HashMap<Option<String>, u32> = HashMap::new();
    for record in &records {
        let lineage = &record.metadata["pango_lineage"];
        let key = (!lineage.is_empty()).then(|| lineage.clone());
        *histogram.entry(key).or_insert(0) += 1;
    }
    let histogram: Vec<(Option<String>, u32)> = histogram.into_iter().collect();
    let layout = Partitions::compute(&histogram);

    let sort_key = |record: &Record| {
        let date = record.metadata["date"]
            .parse::<Date>()
            .unwrap_or(Date::NULL);
        (date, record.metadata["key"].clone())
    };
    let sources: Vec<Vec<Record>> = layout
        .partitions
        .iter()
        .map(|descriptor| {
            let mut partition_records = Vec::new();
            for chunk in &descriptor.chunks {
                let mut chunk_records: Vec<Record> = records
                    .iter()
                    .filter(|record| record.metadata["pango_lineage"] == chunk.key_low)
                    .cloned()
                    .collect();
                chunk_records.sort_by_key(sort_key);
                partition_records.extend(chunk_records);
            }
            partition_records
        })
        .collect();

    let mut schema = common::schema();
    schema.partition_by = Some("pango_lineage".to_string());
    let reference_genomes = serde_json::from_value(json!({
        "nucleotideSequences": {"main": REFERENCE},
        "aminoAcidSequences": {"S": "MF"}
    }))
    .unwrap();
    Database::build(
        schema,
        &reference_genomes,
        common::alias_lookup(),
        &layout,
        sources,
    )
    .unwrap()
}

/// The logical (flip-corrected) bitmap of a symbol at a position.
fn corrected_bitmap(
    partition: &DatabasePartition,
    position: usize,
    symbol: Nucleotide,
) -> RoaringBitmap {
    let store = partition.nuc_store("main").unwrap();
    let index = store.position(position);
    let mut bitmap = index.bitmap(symbol).clone();
    if index.is_flipped(symbol) {
        let mut full = RoaringBitmap::new();
        full.insert_range(0..store.sequence_count());
        bitmap = full - bitmap;
    }
    bitmap
}

#[test]
fn each_position_partitions_the_id_space() {
    let database = build(7);
    assert!(database.partitions.len() > 1, "fixture should shard");
    for partition in &database.partitions {
        let row_count = u64::from(partition.sequence_count);
        for position in 0..REFERENCE.len() {
            let mut union = RoaringBitmap::new();
            let mut total = 0u64;
            for &symbol in Nucleotide::SYMBOLS {
                let bitmap = corrected_bitmap(partition, position, symbol);
                total += bitmap.len();
                union |= bitmap;
            }
            assert_eq!(total, row_count, "position {position} double-counts ids");
            assert_eq!(union.len(), row_count, "position {position} loses ids");
        }
    }
}

#[test]
fn sublineage_bitmaps_are_prefix_unions() {
    let database = build(11);
    for partition in &database.partitions {
        let column = &partition.columns.pango_lineage_columns["pango_lineage"];
        let labels = column.dictionary().values();
        for (ancestor_id, ancestor) in labels.iter().enumerate() {
            let mut expected = RoaringBitmap::new();
            for (label_id, label) in labels.iter().enumerate() {
                if is_sublineage_of(label, ancestor) {
                    expected |= &column.lineage_bitmaps()[label_id];
                }
            }
            assert_eq!(column.sublineage_bitmaps()[ancestor_id], expected);
        }
    }
}

fn sample_filters() -> Vec<Filter> {
    [
        json!({"type": "StringEquals", "column": "country", "value": "Peru"}),
        json!({"type": "NucleotideSymbolEquals", "position": 3, "symbol": "T"}),
        json!({"type": "NucleotideSymbolEquals", "position": 9, "symbol": "N"}),
        json!({"type": "HasMutation", "position": 17}),
        json!({"type": "DateBetween", "column": "date",
               "from": "2021-03-05", "to": "2021-03-20"}),
        json!({"type": "IntBetween", "column": "age", "from": 30, "to": 60}),
        json!({"type": "Maybe", "child":
               {"type": "NucleotideSymbolEquals", "position": 5, "symbol": "R"}}),
        json!({"type": "NOf", "n": 1, "children": [
            {"type": "StringEquals", "column": "country", "value": "Kenya"},
            {"type": "HasMutation", "position": 2},
        ]}),
        json!({"type": "InsertionContains", "position": 17, "value": "CA"}),
    ]
    .iter()
    .map(|value| Filter::from_json(value).unwrap())
    .collect()
}

fn evaluate(
    filter: &Filter,
    database: &Database,
    partition: &DatabasePartition,
) -> RoaringBitmap {
    filter
        .compile(database, partition, AmbiguityMode::None)
        .unwrap()
        .evaluate()
        .into_owned()
}

#[test]
fn filters_stay_inside_the_partition() {
    let database = build(13);
    for filter in sample_filters() {
        for partition in &database.partitions {
            let result = evaluate(&filter, &database, partition);
            assert!(result.len() <= u64::from(partition.sequence_count));
            if let Some(max) = result.max() {
                assert!(max < partition.sequence_count, "filter {filter} escapes");
            }
        }
    }
}

#[test]
fn double_negation_is_identity() {
    let database = build(17);
    for filter in sample_filters() {
        let doubled = Filter::Negation {
            child: Box::new(Filter::Negation {
                child: Box::new(filter.clone()),
            }),
        };
        for partition in &database.partitions {
            assert_eq!(
                evaluate(&filter, &database, partition),
                evaluate(&doubled, &database, partition),
                "double negation changed {filter}"
            );
        }
    }
}

#[test]
fn de_morgan_holds() {
    let database = build(19);
    let filters = sample_filters();
    for pair in filters.windows(2) {
        let conjunction = Filter::And {
            children: vec![pair[0].clone(), pair[1].clone()],
        };
        let negated_disjunction = Filter::Negation {
            child: Box::new(Filter::Or {
                children: vec![
                    Filter::Negation {
                        child: Box::new(pair[0].clone()),
                    },
                    Filter::Negation {
                        child: Box::new(pair[1].clone()),
                    },
                ],
            }),
        };
        for partition in &database.partitions {
            assert_eq!(
                evaluate(&conjunction, &database, partition),
                evaluate(&negated_disjunction, &database, partition),
                "de morgan failed for {} / {}",
                pair[0],
                pair[1]
            );
        }
    }
}

#[test]
fn mutation_counts_sum_to_the_valid_filtered_set() {
    let database = build(23);
    let filter = Filter::from_json(&json!({
        "type": "StringEquals", "column": "country", "value": "Denmark"
    }))
    .unwrap();
    for partition in &database.partitions {
        let result = evaluate(&filter, &database, partition);
        for position in 0..REFERENCE.len() {
            let mut summed = 0u64;
            let mut valid_union = RoaringBitmap::new();
            for &symbol in Nucleotide::VALID_MUTATION_SYMBOLS {
                let bitmap = corrected_bitmap(partition, position, symbol);
                summed += (&bitmap & &result).len();
                valid_union |= bitmap;
            }
            assert_eq!(summed, (&valid_union & &result).len());
        }
    }
}

#[test]
fn details_limit_matches_sorted_prefix() {
    let database = build(29);
    let ordering = json!([{"field": "date", "ascending": false}, "key"]);
    let limited = json!({
        "filter": {"type": "StringEquals", "column": "country", "value": "Denmark"},
        "action": {"type": "Details", "fields": ["key", "date"],
                   "limit": 25, "orderByFields": ordering}
    });
    let unlimited = json!({
        "filter": {"type": "StringEquals", "column": "country", "value": "Denmark"},
        "action": {"type": "Details", "fields": ["key", "date"],
                   "orderByFields": ordering}
    });
    let limited = database.query(&limited.to_string()).unwrap().query_result;
    let mut unlimited = database.query(&unlimited.to_string()).unwrap().query_result;
    unlimited.truncate(25);
    assert_eq!(limited, unlimited);
}

#[test]
fn rebuilding_is_deterministic() {
    let first = build(31);
    let second = build(31);
    assert_eq!(first.partitions.len(), second.partitions.len());
    for (left, right) in first.partitions.iter().zip(&second.partitions) {
        assert_eq!(left.chunks, right.chunks);
        assert_eq!(left.sequence_count, right.sequence_count);
    }

    let details = json!({
        "filter": {"type": "True"},
        "action": {"type": "Details", "fields": ["key"]}
    });
    assert_eq!(
        first.query(&details.to_string()).unwrap().query_result,
        second.query(&details.to_string()).unwrap().query_result
    );
}
