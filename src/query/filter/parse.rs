// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Validation of the JSON filter document.
//!
//! Parsing is strict: unknown node types, unknown fields inside a known
//! node, and out-of-range values are all rejected with a `BadRequest`
//! naming the offending node.

use serde_json::{Map, Value};
use smallvec::SmallVec;

use super::super::error::{QueryError, Result};
use super::{AmbiguityMode, Filter};
use crate::symbols::{parse_symbol, Nucleotide, Symbol};
use crate::types::Date;

impl Filter {
    pub fn from_json(value: &Value) -> Result<Filter> {
        let map = object(value, "filter")?;
        let node_type = required_str(map, "filter", "type")?;
        match node_type {
            "True" => {
                check_fields(map, node_type, &[])?;
                Ok(Filter::True)
            }
            "False" => {
                check_fields(map, node_type, &[])?;
                Ok(Filter::False)
            }
            "Empty" => {
                check_fields(map, node_type, &[])?;
                Ok(Filter::Empty)
            }
            "And" => {
                check_fields(map, node_type, &["children"])?;
                Ok(Filter::And {
                    children: children(map, node_type)?,
                })
            }
            "Or" => {
                check_fields(map, node_type, &["children"])?;
                Ok(Filter::Or {
                    children: children(map, node_type)?,
                })
            }
            "Negation" => {
                check_fields(map, node_type, &["child"])?;
                Ok(Filter::Negation {
                    child: Box::new(child(map, node_type)?),
                })
            }
            "Maybe" => {
                check_fields(map, node_type, &["child"])?;
                Ok(Filter::Maybe {
                    child: Box::new(child(map, node_type)?),
                })
            }
            "NOf" => {
                check_fields(map, node_type, &["n", "exactly", "children"])?;
                Ok(Filter::NOf {
                    n: required_u32(map, node_type, "n")?,
                    exactly: optional_bool(map, node_type, "exactly")?.unwrap_or(false),
                    children: children(map, node_type)?,
                })
            }
            "DateBetween" => {
                check_fields(map, node_type, &["column", "from", "to"])?;
                Ok(Filter::DateBetween {
                    column: required_str(map, node_type, "column")?.to_string(),
                    from: optional_date(map, node_type, "from")?,
                    to: optional_date(map, node_type, "to")?,
                })
            }
            "IntBetween" => {
                check_fields(map, node_type, &["column", "from", "to"])?;
                Ok(Filter::IntBetween {
                    column: required_str(map, node_type, "column")?.to_string(),
                    from: optional_i32(map, node_type, "from")?,
                    to: optional_i32(map, node_type, "to")?,
                })
            }
            "FloatBetween" => {
                check_fields(map, node_type, &["column", "from", "to"])?;
                Ok(Filter::FloatBetween {
                    column: required_str(map, node_type, "column")?.to_string(),
                    from: optional_f64(map, node_type, "from")?,
                    to: optional_f64(map, node_type, "to")?,
                })
            }
            "StringEquals" => {
                check_fields(map, node_type, &["column", "value"])?;
                Ok(Filter::StringEquals {
                    column: required_str(map, node_type, "column")?.to_string(),
                    value: required_str(map, node_type, "value")?.to_string(),
                })
            }
            "StringSearch" => {
                check_fields(map, node_type, &["column", "value"])?;
                Ok(Filter::StringSearch {
                    column: required_str(map, node_type, "column")?.to_string(),
                    value: required_str(map, node_type, "value")?.to_string(),
                })
            }
            "PangoLineageEquals" => {
                check_fields(map, node_type, &["column", "value", "includeSubLineages"])?;
                Ok(Filter::PangoLineageEquals {
                    column: required_str(map, node_type, "column")?.to_string(),
                    value: required_str(map, node_type, "value")?.to_string(),
                    include_sublineages: optional_bool(map, node_type, "includeSubLineages")?
                        .unwrap_or(false),
                })
            }
            "NucleotideSymbolEquals" => {
                check_fields(map, node_type, &["sequenceName", "position", "symbol"])?;
                Ok(Filter::NucleotideSymbolEquals {
                    sequence_name: optional_str(map, node_type, "sequenceName")?,
                    position: position(map, node_type)?,
                    symbol: symbol(map, node_type)?,
                })
            }
            "AminoAcidSymbolEquals" => {
                check_fields(map, node_type, &["sequenceName", "position", "symbol"])?;
                Ok(Filter::AminoAcidSymbolEquals {
                    sequence_name: optional_str(map, node_type, "sequenceName")?,
                    position: position(map, node_type)?,
                    symbol: symbol(map, node_type)?,
                })
            }
            "HasMutation" => {
                check_fields(map, node_type, &["sequenceName", "position"])?;
                Ok(Filter::HasMutation {
                    sequence_name: optional_str(map, node_type, "sequenceName")?,
                    position: position(map, node_type)?,
                })
            }
            "InsertionContains" => {
                check_fields(
                    map,
                    node_type,
                    &["column", "sequenceName", "position", "value"],
                )?;
                Ok(Filter::InsertionContains {
                    column: optional_str(map, node_type, "column")?,
                    sequence_name: optional_str(map, node_type, "sequenceName")?,
                    position: position(map, node_type)?,
                    value: required_str(map, node_type, "value")?.to_string(),
                })
            }
            "PatternSearch" => {
                check_fields(
                    map,
                    node_type,
                    &["sequenceName", "position", "pattern", "ambiguityMode"],
                )?;
                let pattern_text = required_str(map, node_type, "pattern")?;
                let pattern = pattern_text
                    .chars()
                    .map(|character| {
                        Nucleotide::from_char(character).ok_or_else(|| {
                            QueryError::bad_request(format!(
                                "'{character}' in a PatternSearch pattern is not a {} symbol",
                                Nucleotide::NAME
                            ))
                        })
                    })
                    .collect::<Result<SmallVec<_>>>()?;
                Ok(Filter::PatternSearch {
                    sequence_name: optional_str(map, node_type, "sequenceName")?,
                    position: position(map, node_type)?,
                    pattern,
                    ambiguity_mode: ambiguity_mode(map, node_type)?,
                })
            }
            unknown => Err(QueryError::bad_request(format!(
                "unknown filter type {unknown:?}"
            ))),
        }
    }
}

pub(crate) fn object<'a>(value: &'a Value, context: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| QueryError::bad_request(format!("the {context} must be a JSON object")))
}

/// Reject fields that no known variant of the node carries.
pub(crate) fn check_fields(
    map: &Map<String, Value>,
    node: &str,
    allowed: &[&str],
) -> Result<()> {
    for field in map.keys() {
        if field != "type" && !allowed.contains(&field.as_str()) {
            return Err(QueryError::bad_request(format!(
                "unknown field {field:?} in a {node} expression"
            )));
        }
    }
    Ok(())
}

pub(crate) fn required_str<'a>(
    map: &'a Map<String, Value>,
    node: &str,
    field: &str,
) -> Result<&'a str> {
    match map.get(field) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(QueryError::bad_request(format!(
            "the field {field:?} in a {node} expression must be a string"
        ))),
        None => Err(QueryError::bad_request(format!(
            "the field {field:?} is required in a {node} expression"
        ))),
    }
}

pub(crate) fn optional_str(
    map: &Map<String, Value>,
    node: &str,
    field: &str,
) -> Result<Option<String>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(QueryError::bad_request(format!(
            "the field {field:?} in a {node} expression must be a string"
        ))),
    }
}

pub(crate) fn required_u32(map: &Map<String, Value>, node: &str, field: &str) -> Result<u32> {
    map.get(field)
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| {
            QueryError::bad_request(format!(
                "the field {field:?} in a {node} expression must be a non-negative integer"
            ))
        })
}

pub(crate) fn optional_bool(
    map: &Map<String, Value>,
    node: &str,
    field: &str,
) -> Result<Option<bool>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(QueryError::bad_request(format!(
            "the field {field:?} in a {node} expression must be a boolean"
        ))),
    }
}

/// 1-based position field, converted to the internal 0-based form.
fn position(map: &Map<String, Value>, node: &str) -> Result<u32> {
    let position = required_u32(map, node, "position")?;
    if position == 0 {
        return Err(QueryError::bad_request(format!(
            "the field \"position\" in a {node} expression is 1-based and must be greater than 0"
        )));
    }
    Ok(position - 1)
}

/// A one-character symbol field; `.` selects the reference symbol.
fn symbol<S: Symbol>(map: &Map<String, Value>, node: &str) -> Result<Option<S>> {
    let text = required_str(map, node, "symbol")?;
    if text == "." {
        return Ok(None);
    }
    parse_symbol(text).map(Some).map_err(QueryError::BadRequest)
}

fn optional_date(map: &Map<String, Value>, node: &str, field: &str) -> Result<Option<Date>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => text.parse().map(Some).map_err(|_| {
            QueryError::bad_request(format!(
                "the field {field:?} in a {node} expression must be a YYYY-MM-DD date"
            ))
        }),
        Some(_) => Err(QueryError::bad_request(format!(
            "the field {field:?} in a {node} expression must be a YYYY-MM-DD date"
        ))),
    }
}

fn optional_i32(map: &Map<String, Value>, node: &str, field: &str) -> Result<Option<i32>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|value| i32::try_from(value).ok())
            .map(Some)
            .ok_or_else(|| {
                QueryError::bad_request(format!(
                    "the field {field:?} in a {node} expression must be a 32-bit integer"
                ))
            }),
    }
}

fn optional_f64(map: &Map<String, Value>, node: &str, field: &str) -> Result<Option<f64>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            QueryError::bad_request(format!(
                "the field {field:?} in a {node} expression must be a number"
            ))
        }),
    }
}

fn ambiguity_mode(map: &Map<String, Value>, node: &str) -> Result<Option<AmbiguityMode>> {
    match optional_str(map, node, "ambiguityMode")?.as_deref() {
        None => Ok(None),
        Some("exact") => Ok(Some(AmbiguityMode::None)),
        Some("upperBound") => Ok(Some(AmbiguityMode::UpperBound)),
        Some(other) => Err(QueryError::bad_request(format!(
            "the field \"ambiguityMode\" in a {node} expression must be \"exact\" or \
             \"upperBound\", got {other:?}"
        ))),
    }
}

fn child(map: &Map<String, Value>, node: &str) -> Result<Filter> {
    let value = map.get("child").ok_or_else(|| {
        QueryError::bad_request(format!("the field \"child\" is required in a {node} expression"))
    })?;
    Filter::from_json(value)
}

fn children(map: &Map<String, Value>, node: &str) -> Result<Vec<Filter>> {
    let value = map.get("children").ok_or_else(|| {
        QueryError::bad_request(format!(
            "the field \"children\" is required in a {node} expression"
        ))
    })?;
    let list = value.as_array().ok_or_else(|| {
        QueryError::bad_request(format!(
            "the field \"children\" in a {node} expression must be an array"
        ))
    })?;
    list.iter().map(Filter::from_json).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_logical_filters() {
        let filter = Filter::from_json(&json!({
            "type": "And",
            "children": [
                {"type": "HasMutation", "position": 2},
                {"type": "Negation", "child":
                    {"type": "NucleotideSymbolEquals", "position": 1, "symbol": "N"}},
            ]
        }))
        .unwrap();
        assert_eq!(
            filter,
            Filter::And {
                children: vec![
                    Filter::HasMutation {
                        sequence_name: None,
                        position: 1,
                    },
                    Filter::Negation {
                        child: Box::new(Filter::NucleotideSymbolEquals {
                            sequence_name: None,
                            position: 0,
                            symbol: Some(Nucleotide::N),
                        }),
                    },
                ],
            }
        );
    }

    #[test]
    fn dot_symbol_selects_the_reference() {
        let filter = Filter::from_json(&json!({
            "type": "NucleotideSymbolEquals", "position": 1, "symbol": "."
        }))
        .unwrap();
        assert_eq!(
            filter,
            Filter::NucleotideSymbolEquals {
                sequence_name: None,
                position: 0,
                symbol: None,
            }
        );
    }

    #[test]
    fn rejects_unknown_node_types_and_fields() {
        let unknown_type = Filter::from_json(&json!({"type": "Fancy"}));
        assert!(matches!(unknown_type, Err(QueryError::BadRequest(_))));

        let unknown_field = Filter::from_json(&json!({
            "type": "StringEquals", "column": "country", "value": "Peru", "fuzzy": true
        }));
        assert!(
            matches!(unknown_field, Err(QueryError::BadRequest(ref message)) if message.contains("fuzzy"))
        );
    }

    #[test]
    fn rejects_zero_positions_and_bad_symbols() {
        assert!(Filter::from_json(&json!({
            "type": "NucleotideSymbolEquals", "position": 0, "symbol": "A"
        }))
        .is_err());
        assert!(Filter::from_json(&json!({
            "type": "NucleotideSymbolEquals", "position": 1, "symbol": "Q"
        }))
        .is_err());
        assert!(Filter::from_json(&json!({
            "type": "NucleotideSymbolEquals", "position": 1, "symbol": "AC"
        }))
        .is_err());
    }

    #[test]
    fn parses_between_bounds() {
        let filter = Filter::from_json(&json!({
            "type": "DateBetween", "column": "date", "from": "2021-01-01", "to": null
        }))
        .unwrap();
        assert_eq!(
            filter,
            Filter::DateBetween {
                column: "date".into(),
                from: Some("2021-01-01".parse().unwrap()),
                to: None,
            }
        );
        assert!(Filter::from_json(&json!({
            "type": "DateBetween", "column": "date", "from": "01.01.2021"
        }))
        .is_err());
    }

    #[test]
    fn parses_pattern_search_with_mode() {
        let filter = Filter::from_json(&json!({
            "type": "PatternSearch", "position": 21563, "pattern": "ACG",
            "ambiguityMode": "upperBound"
        }))
        .unwrap();
        match filter {
            Filter::PatternSearch {
                position,
                pattern,
                ambiguity_mode,
                ..
            } => {
                assert_eq!(position, 21562);
                assert_eq!(pattern.len(), 3);
                assert_eq!(ambiguity_mode, Some(AmbiguityMode::UpperBound));
            }
            other => panic!("unexpected filter {other:?}"),
        }
    }
}
