// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Actions: what a query computes over its per-partition filter bitmaps.

use std::cmp::Ordering;

use serde_json::Value;

use super::error::{QueryError, Result};
use super::filter::parse::{check_fields, object, optional_str, required_str};
use super::operator::OperatorResult;
use super::QueryResultEntry;
use crate::db::Database;
use crate::types::DataValue;

mod aggregated;
mod details;
mod insertions;
mod mutations;

const DEFAULT_MIN_PROPORTION: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByField {
    pub field: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum ActionKind {
    Aggregated {
        group_by_fields: Vec<String>,
    },
    Details {
        fields: Vec<String>,
    },
    NucleotideMutations {
        sequence_name: Option<String>,
        min_proportion: f64,
    },
    AminoAcidMutations {
        sequence_name: String,
        min_proportion: f64,
    },
    Insertions {
        column: Option<String>,
        sequence_name: Option<String>,
        position: Option<u32>,
        value: Option<String>,
    },
}

/// A parsed action plus the ordering clause shared by all action types.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    kind: ActionKind,
    order_by_fields: Vec<OrderByField>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl Action {
    pub fn from_json(value: &Value) -> Result<Action> {
        let map = object(value, "action")?;
        let action_type = required_str(map, "action", "type")?;
        let kind = match action_type {
            "Aggregated" => {
                check_fields(map, action_type, &[COMMON_FIELDS, &["groupByFields"]].concat())?;
                ActionKind::Aggregated {
                    group_by_fields: string_list(map, action_type, "groupByFields")?,
                }
            }
            "Details" => {
                check_fields(map, action_type, &[COMMON_FIELDS, &["fields"]].concat())?;
                ActionKind::Details {
                    fields: string_list(map, action_type, "fields")?,
                }
            }
            "NucleotideMutations" => {
                check_fields(
                    map,
                    action_type,
                    &[COMMON_FIELDS, &["sequenceName", "minProportion"]].concat(),
                )?;
                ActionKind::NucleotideMutations {
                    sequence_name: optional_str(map, action_type, "sequenceName")?,
                    min_proportion: min_proportion(map, action_type)?,
                }
            }
            "AminoAcidMutations" => {
                check_fields(
                    map,
                    action_type,
                    &[COMMON_FIELDS, &["sequenceName", "minProportion"]].concat(),
                )?;
                ActionKind::AminoAcidMutations {
                    sequence_name: required_str(map, action_type, "sequenceName")?.to_string(),
                    min_proportion: min_proportion(map, action_type)?,
                }
            }
            "Insertions" => {
                check_fields(
                    map,
                    action_type,
                    &[COMMON_FIELDS, &["column", "sequenceName", "position", "value"]].concat(),
                )?;
                let position = match map.get("position") {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(
                        value
                            .as_u64()
                            .and_then(|position| u32::try_from(position).ok())
                            .filter(|position| *position > 0)
                            .ok_or_else(|| {
                                QueryError::bad_request(
                                    "the field \"position\" in an Insertions action must be a \
                                     positive integer",
                                )
                            })?,
                    ),
                };
                ActionKind::Insertions {
                    column: optional_str(map, action_type, "column")?,
                    sequence_name: optional_str(map, action_type, "sequenceName")?,
                    position,
                    value: optional_str(map, action_type, "value")?,
                }
            }
            unknown => {
                return Err(QueryError::bad_request(format!(
                    "{unknown:?} is not a valid action"
                )))
            }
        };
        Ok(Action {
            kind,
            order_by_fields: order_by_fields(map, action_type)?,
            limit: limit_field(map, action_type, "limit")?,
            offset: limit_field(map, action_type, "offset")?,
        })
    }

    /// Run the action over the per-partition filter results and produce the
    /// final, ordered result rows.
    pub fn execute(
        &self,
        database: &Database,
        mut filters: Vec<OperatorResult>,
    ) -> Result<Vec<QueryResultEntry>> {
        match &self.kind {
            ActionKind::Aggregated { group_by_fields } => {
                self.validate_order_by(group_by_fields.iter().map(String::as_str).chain(["count"]))?;
                let mut entries = aggregated::execute(group_by_fields, database, &filters)?;
                self.apply_order_by_and_limit(&mut entries);
                Ok(entries)
            }
            ActionKind::Details { fields } => details::execute(
                fields,
                database,
                &filters,
                &self.order_by_fields,
                self.limit,
                self.offset,
            ),
            ActionKind::NucleotideMutations {
                sequence_name,
                min_proportion,
            } => {
                self.validate_order_by(["mutation", "count", "proportion"])?;
                let name = sequence_name
                    .as_deref()
                    .unwrap_or(&database.schema.default_nucleotide_sequence);
                let reference = database.nuc_references.get(name).ok_or_else(|| {
                    QueryError::bad_request(format!(
                        "database does not contain the nucleotide sequence {name:?}"
                    ))
                })?;
                let stores: Vec<_> = database
                    .partitions
                    .iter()
                    .map(|partition| &partition.nuc_sequences[name])
                    .collect();
                let mut entries =
                    mutations::execute(reference, &stores, &mut filters, *min_proportion)?;
                self.apply_order_by_and_limit(&mut entries);
                Ok(entries)
            }
            ActionKind::AminoAcidMutations {
                sequence_name,
                min_proportion,
            } => {
                self.validate_order_by(["mutation", "count", "proportion"])?;
                let reference = database.aa_references.get(sequence_name).ok_or_else(|| {
                    QueryError::bad_request(format!(
                        "database does not contain the amino acid sequence {sequence_name:?}"
                    ))
                })?;
                let stores: Vec<_> = database
                    .partitions
                    .iter()
                    .map(|partition| &partition.aa_sequences[sequence_name])
                    .collect();
                let mut entries =
                    mutations::execute(reference, &stores, &mut filters, *min_proportion)?;
                self.apply_order_by_and_limit(&mut entries);
                Ok(entries)
            }
            ActionKind::Insertions {
                column,
                sequence_name,
                position,
                value,
            } => {
                self.validate_order_by([
                    "insertion",
                    "sequenceName",
                    "position",
                    "insertedSymbols",
                    "count",
                ])?;
                let mut entries = insertions::execute(
                    column.as_deref(),
                    sequence_name.as_deref(),
                    *position,
                    value.as_deref(),
                    database,
                    &filters,
                )?;
                self.apply_order_by_and_limit(&mut entries);
                Ok(entries)
            }
        }
    }

    fn validate_order_by<'a>(&self, produced: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let produced: Vec<&str> = produced.into_iter().collect();
        for order_by in &self.order_by_fields {
            if !produced.contains(&order_by.field.as_str()) {
                return Err(QueryError::bad_request(format!(
                    "orderByField {:?} is not contained in the result of this operation",
                    order_by.field
                )));
            }
        }
        Ok(())
    }

    fn apply_order_by_and_limit(&self, entries: &mut Vec<QueryResultEntry>) {
        if !self.order_by_fields.is_empty() {
            entries.sort_by(|left, right| compare_entries(left, right, &self.order_by_fields));
        }
        let offset = self.offset.unwrap_or(0) as usize;
        if offset > 0 {
            if offset >= entries.len() {
                entries.clear();
                return;
            }
            entries.drain(..offset);
        }
        if let Some(limit) = self.limit {
            entries.truncate(limit as usize);
        }
    }
}

const COMMON_FIELDS: &[&str] = &["orderByFields", "limit", "offset"];

/// Sorting treats absent values as largest: NULLs come last in ascending
/// order.
pub(super) fn compare_values(left: &DataValue, right: &DataValue) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => left.total_cmp(right),
    }
}

pub(super) fn compare_entries(
    left: &QueryResultEntry,
    right: &QueryResultEntry,
    order_by_fields: &[OrderByField],
) -> Ordering {
    for order_by in order_by_fields {
        let left_value = left.fields.get(&order_by.field).unwrap_or(&DataValue::Null);
        let right_value = right.fields.get(&order_by.field).unwrap_or(&DataValue::Null);
        // A field's direction applies to values only; NULLs stay last.
        let ordering = match (left_value.is_null(), right_value.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if order_by.ascending => left_value.total_cmp(right_value),
            (false, false) => left_value.total_cmp(right_value).reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn order_by_fields(
    map: &serde_json::Map<String, Value>,
    action_type: &str,
) -> Result<Vec<OrderByField>> {
    let Some(value) = map.get("orderByFields") else {
        return Ok(Vec::new());
    };
    let list = value.as_array().ok_or_else(|| {
        QueryError::bad_request(format!(
            "the field \"orderByFields\" in a {action_type} action must be an array"
        ))
    })?;
    list.iter()
        .map(|entry| match entry {
            Value::String(field) => Ok(OrderByField {
                field: field.clone(),
                ascending: true,
            }),
            Value::Object(spec) => {
                check_fields(spec, "orderByField", &["field", "ascending"])?;
                Ok(OrderByField {
                    field: required_str(spec, "orderByField", "field")?.to_string(),
                    ascending: spec
                        .get("ascending")
                        .and_then(Value::as_bool)
                        .unwrap_or(true),
                })
            }
            _ => Err(QueryError::bad_request(
                "each orderByField must be a string or an object with the fields \
                 \"field\" and \"ascending\"",
            )),
        })
        .collect()
}

fn limit_field(
    map: &serde_json::Map<String, Value>,
    action_type: &str,
    field: &str,
) -> Result<Option<u32>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|value| u32::try_from(value).ok())
            .map(Some)
            .ok_or_else(|| {
                QueryError::bad_request(format!(
                    "if a {action_type} action contains {field:?}, it must be a non-negative \
                     number"
                ))
            }),
    }
}

fn min_proportion(map: &serde_json::Map<String, Value>, action_type: &str) -> Result<f64> {
    match map.get("minProportion") {
        None | Some(Value::Null) => Ok(DEFAULT_MIN_PROPORTION),
        Some(value) => {
            let proportion = value.as_f64().ok_or_else(|| {
                QueryError::bad_request(format!(
                    "the field \"minProportion\" in a {action_type} action must be a number"
                ))
            })?;
            if proportion <= 0.0 || proportion > 1.0 {
                return Err(QueryError::bad_request(
                    "invalid proportion: minProportion must be in interval (0.0, 1.0]",
                ));
            }
            Ok(proportion)
        }
    }
}

fn string_list(
    map: &serde_json::Map<String, Value>,
    action_type: &str,
    field: &str,
) -> Result<Vec<String>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => {
            let list = value.as_array().ok_or_else(|| {
                QueryError::bad_request(format!(
                    "the field {field:?} in a {action_type} action must be an array of strings"
                ))
            })?;
            list.iter()
                .map(|entry| {
                    entry.as_str().map(str::to_string).ok_or_else(|| {
                        QueryError::bad_request(format!(
                            "the field {field:?} in a {action_type} action must be an array of \
                             strings"
                        ))
                    })
                })
                .collect()
        }
    }
}
