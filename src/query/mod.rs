// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The query engine: parse a JSON query, compile its filter per partition,
//! evaluate the operator trees, and run the action over the results.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

pub mod action;
pub mod error;
pub mod filter;
pub mod operator;

pub use self::action::Action;
pub use self::error::{QueryError, Result};
pub use self::filter::{AmbiguityMode, Filter};
use self::filter::parse::{check_fields, object};
use self::operator::{Operator, OperatorResult};
use crate::db::Database;
use crate::types::DataValue;

/// One row of a query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryResultEntry {
    pub fields: BTreeMap<String, DataValue>,
}

impl<const N: usize> From<[(&str, DataValue); N]> for QueryResultEntry {
    fn from(fields: [(&str, DataValue); N]) -> Self {
        QueryResultEntry {
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }
}

/// A parsed query: the filter and the action over its result.
#[derive(Debug, Clone)]
pub struct Query {
    pub filter: Filter,
    pub action: Action,
}

impl Query {
    pub fn parse(text: &str) -> Result<Query> {
        let document: Value = serde_json::from_str(text)
            .map_err(|error| QueryError::bad_request(format!("malformed query json: {error}")))?;
        let map = object(&document, "query")?;
        check_fields(map, "query", &["filter", "action"])?;
        let filter = map
            .get("filter")
            .ok_or_else(|| QueryError::bad_request("a query must contain a filter"))?;
        let action = map
            .get("action")
            .ok_or_else(|| QueryError::bad_request("a query must contain an action"))?;
        Ok(Query {
            filter: Filter::from_json(filter)?,
            action: Action::from_json(action)?,
        })
    }
}

/// The response document: result rows plus the two phase timings in
/// microseconds.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query_result: Vec<QueryResultEntry>,
    pub filter_time: u64,
    pub action_time: u64,
}

/// Executes queries against one database snapshot.
pub struct QueryEngine<'a> {
    database: &'a Database,
}

impl<'a> QueryEngine<'a> {
    pub fn new(database: &'a Database) -> Self {
        QueryEngine { database }
    }

    pub fn execute_query(&self, query_text: &str) -> Result<QueryResponse> {
        let query = Query::parse(query_text)?;
        debug!(filter = %query.filter, "parsed query");

        let filter_start = Instant::now();
        // Compilation is cheap and sequential; evaluation fans out across
        // partitions.
        let operators: Vec<Operator<'a>> = self
            .database
            .partitions
            .iter()
            .map(|partition| query.filter.compile(self.database, partition, AmbiguityMode::None))
            .collect::<Result<_>>()?;
        for (partition_index, operator) in operators.iter().enumerate() {
            debug!(partition = partition_index, operator = %operator, "compiled filter");
        }
        let partition_filters: Vec<OperatorResult<'a>> =
            operators.par_iter().map(Operator::evaluate).collect();
        self.check_filter_invariants(&partition_filters)?;
        let filter_time = filter_start.elapsed().as_micros() as u64;

        let action_start = Instant::now();
        let query_result = query.action.execute(self.database, partition_filters)?;
        let action_time = action_start.elapsed().as_micros() as u64;

        info!(filter_time, action_time, "query executed");
        Ok(QueryResponse {
            query_result,
            filter_time,
            action_time,
        })
    }

    /// Every filter result must stay inside its partition's id space.
    fn check_filter_invariants(&self, partition_filters: &[OperatorResult]) -> Result<()> {
        for (partition, filter) in self.database.partitions.iter().zip(partition_filters) {
            if filter.len() > u64::from(partition.sequence_count) {
                return Err(QueryError::internal(format!(
                    "filter cardinality {} exceeds partition size {}",
                    filter.len(),
                    partition.sequence_count
                )));
            }
            if let Some(max) = filter.max() {
                if max >= partition.sequence_count {
                    return Err(QueryError::internal(format!(
                        "filter produced id {max} outside the partition's id space [0, {})",
                        partition.sequence_count
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_queries_without_filter_or_action() {
        assert!(Query::parse("{").is_err());
        assert!(Query::parse(r#"{"filter": {"type": "True"}}"#).is_err());
        assert!(Query::parse(r#"{"action": {"type": "Aggregated"}}"#).is_err());
        assert!(Query::parse(
            r#"{"filter": {"type": "True"}, "action": {"type": "Aggregated"}, "debug": true}"#
        )
        .is_err());
    }

    #[test]
    fn parses_a_minimal_query() {
        let query =
            Query::parse(r#"{"filter": {"type": "True"}, "action": {"type": "Aggregated"}}"#)
                .unwrap();
        assert_eq!(query.filter, Filter::True);
    }
}
