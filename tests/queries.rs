// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! End-to-end queries against the four-sequence fixture.

mod common;

use serde_json::json;
use silo::types::DataValue;
use silo::Database;

fn count(database: &Database, filter: serde_json::Value) -> i64 {
    let query = json!({"filter": filter, "action": {"type": "Aggregated"}});
    let response = database.query(&query.to_string()).unwrap();
    match response.query_result[0].fields["count"] {
        DataValue::Int(count) => count,
        ref other => panic!("count is not an integer: {other:?}"),
    }
}

fn string_field(entry: &silo::query::QueryResultEntry, field: &str) -> String {
    match &entry.fields[field] {
        DataValue::String(value) => value.clone(),
        other => panic!("{field} is not a string: {other:?}"),
    }
}

#[test]
fn counts_everything() {
    let database = common::database();
    assert_eq!(count(&database, json!({"type": "True"})), 4);
    assert_eq!(count(&database, json!({"type": "False"})), 0);
    assert_eq!(count(&database, json!({"type": "Empty"})), 0);
}

#[test]
fn has_mutation_finds_the_single_substitution() {
    let database = common::database();
    assert_eq!(
        count(&database, json!({"type": "HasMutation", "position": 2})),
        1
    );
}

#[test]
fn dot_symbol_expands_to_the_reference() {
    let database = common::database();
    assert_eq!(
        count(
            &database,
            json!({"type": "NucleotideSymbolEquals", "position": 1, "symbol": "."})
        ),
        3
    );
}

#[test]
fn missing_symbol_is_served_from_the_missing_bitmaps() {
    let database = common::database();
    assert_eq!(
        count(
            &database,
            json!({"type": "NucleotideSymbolEquals", "position": 1, "symbol": "N"})
        ),
        1
    );
}

#[test]
fn conjunction_with_negation_uses_the_andnot_path() {
    let database = common::database();
    let filter = json!({"type": "And", "children": [
        {"type": "HasMutation", "position": 2},
        {"type": "Negation", "child":
            {"type": "NucleotideSymbolEquals", "position": 1, "symbol": "N"}},
    ]});
    assert_eq!(count(&database, filter), 1);
}

#[test]
fn nucleotide_mutations_report_counts_and_proportions() {
    let database = common::database();
    let query = json!({
        "filter": {"type": "True"},
        "action": {"type": "NucleotideMutations", "minProportion": 0.25,
                   "orderByFields": ["mutation"]}
    });
    let response = database.query(&query.to_string()).unwrap();
    let mutations: Vec<(String, DataValue, DataValue)> = response
        .query_result
        .iter()
        .map(|entry| {
            (
                string_field(entry, "mutation"),
                entry.fields["count"].clone(),
                entry.fields["proportion"].clone(),
            )
        })
        .collect();
    // Position 2: S3 reads A against reference C, 1 of 4 valid reads.
    // Position 4: S2 reads A against reference T, 1 of 4 valid reads.
    assert_eq!(
        mutations,
        vec![
            (
                "C2A".to_string(),
                DataValue::Int(1),
                DataValue::Float(0.25)
            ),
            (
                "T4A".to_string(),
                DataValue::Int(1),
                DataValue::Float(0.25)
            ),
        ]
    );
}

#[test]
fn amino_acid_queries_use_the_named_segment() {
    let database = common::database();
    assert_eq!(
        count(
            &database,
            json!({"type": "AminoAcidSymbolEquals", "sequenceName": "S",
                   "position": 2, "symbol": "L"})
        ),
        1
    );
    let query = json!({
        "filter": {"type": "True"},
        "action": {"type": "AminoAcidMutations", "sequenceName": "S", "minProportion": 0.2}
    });
    let response = database.query(&query.to_string()).unwrap();
    assert_eq!(response.query_result.len(), 1);
    assert_eq!(string_field(&response.query_result[0], "mutation"), "F2L");
}

#[test]
fn details_with_limit_produces_the_top_rows() {
    let database = common::database();
    let query = json!({
        "filter": {"type": "True"},
        "action": {"type": "Details", "fields": ["key"], "limit": 2,
                   "orderByFields": [{"field": "key", "ascending": false}]}
    });
    let response = database.query(&query.to_string()).unwrap();
    let keys: Vec<String> = response
        .query_result
        .iter()
        .map(|entry| string_field(entry, "key"))
        .collect();
    assert_eq!(keys, vec!["S4", "S3"]);
}

#[test]
fn details_sorts_nulls_last_even_descending() {
    let database = common::database();
    let query = json!({
        "filter": {"type": "True"},
        "action": {"type": "Details", "fields": ["key", "age"],
                   "orderByFields": [{"field": "age", "ascending": false}]}
    });
    let response = database.query(&query.to_string()).unwrap();
    let keys: Vec<String> = response
        .query_result
        .iter()
        .map(|entry| string_field(entry, "key"))
        .collect();
    // S4 has no age and must come last despite the descending direction.
    assert_eq!(keys, vec!["S3", "S2", "S1", "S4"]);
}

#[test]
fn details_limit_agrees_with_full_sort() {
    let database = common::database();
    let limited = json!({
        "filter": {"type": "True"},
        "action": {"type": "Details", "limit": 3,
                   "orderByFields": [{"field": "date", "ascending": false}]}
    });
    let unlimited = json!({
        "filter": {"type": "True"},
        "action": {"type": "Details",
                   "orderByFields": [{"field": "date", "ascending": false}]}
    });
    let limited = database.query(&limited.to_string()).unwrap().query_result;
    let mut unlimited = database.query(&unlimited.to_string()).unwrap().query_result;
    unlimited.truncate(3);
    assert_eq!(limited, unlimited);
}

#[test]
fn date_between_to_bound_is_exclusive() {
    let database = common::database();
    let filter = json!({"type": "DateBetween", "column": "date",
                        "from": "2021-01-02", "to": "2021-01-04"});
    assert_eq!(count(&database, filter), 2);
    let open_from = json!({"type": "DateBetween", "column": "date",
                           "from": null, "to": "2021-01-02"});
    assert_eq!(count(&database, open_from), 1);
    let open_both = json!({"type": "DateBetween", "column": "date"});
    assert_eq!(count(&database, open_both), 4);
}

#[test]
fn numeric_ranges_exclude_absent_values() {
    let database = common::database();
    assert_eq!(
        count(
            &database,
            json!({"type": "IntBetween", "column": "age", "from": 20, "to": 30})
        ),
        1
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "IntBetween", "column": "age", "from": null, "to": null})
        ),
        3
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "FloatBetween", "column": "qc_value", "from": 0.5, "to": null})
        ),
        2
    );
}

#[test]
fn string_columns_support_equality_and_search() {
    let database = common::database();
    assert_eq!(
        count(
            &database,
            json!({"type": "StringEquals", "column": "country", "value": "Denmark"})
        ),
        2
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "StringEquals", "column": "country", "value": "Atlantis"})
        ),
        0
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "StringSearch", "column": "key", "value": "4"})
        ),
        1
    );
}

#[test]
fn pango_lineages_unalias_and_cover_sublineages() {
    let database = common::database();
    assert_eq!(
        count(
            &database,
            json!({"type": "PangoLineageEquals", "column": "pango_lineage",
                   "value": "B.1", "includeSubLineages": true})
        ),
        3
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "PangoLineageEquals", "column": "pango_lineage",
                   "value": "B.1", "includeSubLineages": false})
        ),
        1
    );
    // BA.5 resolves to B.1.1.529.5 before the dictionary lookup.
    assert_eq!(
        count(
            &database,
            json!({"type": "PangoLineageEquals", "column": "pango_lineage", "value": "BA.5"})
        ),
        1
    );
}

#[test]
fn maybe_expands_ambiguity_codes() {
    let database = common::database();
    let exact = json!({"type": "NucleotideSymbolEquals", "position": 1, "symbol": "R"});
    assert_eq!(count(&database, exact.clone()), 0);
    let maybe = json!({"type": "Maybe", "child": exact});
    // R could be A or G; S1..S3 carry A at position 1.
    assert_eq!(count(&database, maybe.clone()), 3);
    let negated = json!({"type": "Negation", "child": maybe});
    assert_eq!(count(&database, negated), 1);
}

#[test]
fn n_of_counts_matching_children() {
    let database = common::database();
    let children = json!([
        {"type": "NucleotideSymbolEquals", "position": 1, "symbol": "A"},
        {"type": "NucleotideSymbolEquals", "position": 4, "symbol": "T"},
        {"type": "StringEquals", "column": "country", "value": "Denmark"},
    ]);
    assert_eq!(
        count(
            &database,
            json!({"type": "NOf", "n": 2, "children": children})
        ),
        3
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "NOf", "n": 2, "exactly": true, "children": children})
        ),
        2
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "NOf", "n": 4, "children": children})
        ),
        0
    );
}

#[test]
fn pattern_search_matches_literal_runs() {
    let database = common::database();
    assert_eq!(
        count(
            &database,
            json!({"type": "PatternSearch", "position": 2, "pattern": "CGT"})
        ),
        2
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "PatternSearch", "position": 1, "pattern": "ACG"})
        ),
        2
    );
}

#[test]
fn insertion_filters_and_action_agree() {
    let database = common::database();
    assert_eq!(
        count(
            &database,
            json!({"type": "InsertionContains", "position": 248, "value": "G"})
        ),
        2
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "InsertionContains", "position": 248, "value": "GT"})
        ),
        1
    );
    // Metacharacters in the pattern are literal text, not regex syntax.
    assert_eq!(
        count(
            &database,
            json!({"type": "InsertionContains", "position": 248, "value": "."})
        ),
        0
    );
    assert_eq!(
        count(
            &database,
            json!({"type": "InsertionContains", "position": 248, "value": "G.*"})
        ),
        0
    );

    let query = json!({
        "filter": {"type": "True"},
        "action": {"type": "Insertions"}
    });
    let response = database.query(&query.to_string()).unwrap();
    let insertions: Vec<String> = response
        .query_result
        .iter()
        .map(|entry| string_field(entry, "insertion"))
        .collect();
    assert_eq!(
        insertions,
        vec!["ins_main:248:G", "ins_main:248:GT", "ins_main:300:TT"]
    );
}

#[test]
fn aggregated_grouping_counts_per_value() {
    let database = common::database();
    let query = json!({
        "filter": {"type": "True"},
        "action": {"type": "Aggregated", "groupByFields": ["country"]}
    });
    let response = database.query(&query.to_string()).unwrap();
    let groups: Vec<(DataValue, DataValue)> = response
        .query_result
        .iter()
        .map(|entry| (entry.fields["country"].clone(), entry.fields["count"].clone()))
        .collect();
    assert_eq!(
        groups,
        vec![
            (DataValue::String("Denmark".into()), DataValue::Int(2)),
            (DataValue::String("Peru".into()), DataValue::Int(1)),
            (DataValue::Null, DataValue::Int(1)),
        ]
    );
}

#[test]
fn client_faults_are_bad_requests() {
    let database = common::database();
    let errors = [
        json!({"type": "StringEquals", "column": "region", "value": "Europe"}),
        json!({"type": "NucleotideSymbolEquals", "position": 5, "symbol": "A"}),
        json!({"type": "NucleotideSymbolEquals", "position": 1, "symbol": "A",
               "sequenceName": "ORF1a"}),
    ];
    for filter in errors {
        let query = json!({"filter": filter, "action": {"type": "Aggregated"}});
        let error = database.query(&query.to_string()).unwrap_err();
        assert_eq!(error.kind(), "BadRequest", "filter: {filter}");
        assert_eq!(error.to_response()["error"], "BadRequest");
    }
}

#[test]
fn snapshots_round_trip_through_disk() {
    let database = common::database();
    let directory = tempfile::tempdir().unwrap();
    let snapshot_directory = database.save(directory.path()).unwrap();
    let restored = Database::load(&snapshot_directory).unwrap();

    for filter in [
        json!({"type": "True"}),
        json!({"type": "HasMutation", "position": 2}),
        json!({"type": "PangoLineageEquals", "column": "pango_lineage",
               "value": "B.1", "includeSubLineages": true}),
        json!({"type": "InsertionContains", "position": 248, "value": "G"}),
    ] {
        assert_eq!(
            count(&database, filter.clone()),
            count(&restored, filter.clone()),
            "filter: {filter}"
        );
    }

    let details = json!({
        "filter": {"type": "True"},
        "action": {"type": "Details", "orderByFields": ["key"]}
    });
    assert_eq!(
        database.query(&details.to_string()).unwrap().query_result,
        restored.query(&details.to_string()).unwrap().query_result
    );
}
