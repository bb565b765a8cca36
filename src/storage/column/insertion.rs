// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The insertion-list column.
//!
//! Each row carries an ordered list of `(position, inserted_text)` tuples in
//! the coordinate space of one segment; positions are 1-based. Besides the
//! raw per-row values the partition keeps an inverted index
//! `position -> [(text, id-bitmap)]` that insertion filters and the
//! insertions action search with a regex.

use std::collections::BTreeMap;

use regex::Regex;
use roaring::{MultiOps, RoaringBitmap};

use crate::types::{DataValue, LocalId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub position: u32,
    pub value: String,
}

/// Parse one `position:text` element of an insertion-column value.
pub fn parse_insertion(raw: &str) -> Result<Insertion, String> {
    let (position, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected position:text, got {raw:?}"))?;
    let position: u32 = position
        .parse()
        .map_err(|_| format!("invalid insertion position in {raw:?}"))?;
    if position == 0 {
        return Err(format!("insertion position must be 1-based, got {raw:?}"));
    }
    if value.is_empty() {
        return Err(format!("empty insertion text in {raw:?}"));
    }
    Ok(Insertion {
        position,
        value: value.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct InsertionEntry {
    value: String,
    row_ids: RoaringBitmap,
}

impl InsertionEntry {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn row_ids(&self) -> &RoaringBitmap {
        &self.row_ids
    }
}

#[derive(Debug, Clone)]
pub struct InsertionColumnPartition {
    sequence_name: String,
    raw_values: Vec<String>,
    index: BTreeMap<u32, Vec<InsertionEntry>>,
}

impl InsertionColumnPartition {
    pub fn new(sequence_name: String) -> Self {
        Self {
            sequence_name,
            raw_values: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn sequence_name(&self) -> &str {
        &self.sequence_name
    }

    /// Insert the next row's value: a comma-separated list of
    /// `position:text` elements, empty for no insertions.
    pub fn insert(&mut self, raw: &str) -> Result<(), String> {
        let local_id = self.raw_values.len() as LocalId;
        for element in raw.split(',').filter(|element| !element.is_empty()) {
            let insertion = parse_insertion(element)?;
            let entries = self.index.entry(insertion.position).or_default();
            match entries
                .iter_mut()
                .find(|entry| entry.value == insertion.value)
            {
                Some(entry) => {
                    entry.row_ids.insert(local_id);
                }
                None => {
                    let mut row_ids = RoaringBitmap::new();
                    row_ids.insert(local_id);
                    entries.push(InsertionEntry {
                        value: insertion.value,
                        row_ids,
                    });
                }
            }
        }
        self.raw_values.push(raw.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.raw_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_values.is_empty()
    }

    /// Rows with an insertion at `position` whose text matches the pattern.
    pub fn search(&self, position: u32, pattern: &Regex) -> RoaringBitmap {
        match self.index.get(&position) {
            Some(entries) => entries
                .iter()
                .filter(|entry| pattern.is_match(&entry.value))
                .map(|entry| &entry.row_ids)
                .union(),
            None => RoaringBitmap::new(),
        }
    }

    /// All matching `(position, entry)` pairs, in position order; `position`
    /// restricts the walk to one position. Cloning the pattern is cheap, it
    /// is reference-counted internally.
    pub fn matching_entries(
        &self,
        position: Option<u32>,
        pattern: &Regex,
    ) -> impl Iterator<Item = (u32, &InsertionEntry)> + '_ {
        let pattern = pattern.clone();
        self.index
            .iter()
            .filter(move |(index_position, _)| position.is_none_or(|p| p == **index_position))
            .flat_map(move |(index_position, entries)| {
                let pattern = pattern.clone();
                entries
                    .iter()
                    .filter(move |entry| pattern.is_match(&entry.value))
                    .map(move |entry| (*index_position, entry))
            })
    }

    pub fn value(&self, local_id: LocalId) -> DataValue {
        let raw = &self.raw_values[local_id as usize];
        if raw.is_empty() {
            DataValue::Null
        } else {
            DataValue::String(raw.clone())
        }
    }

    pub fn raw_values(&self) -> &[String] {
        &self.raw_values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column() -> InsertionColumnPartition {
        let mut column = InsertionColumnPartition::new("main".to_string());
        column.insert("248:G").unwrap();
        column.insert("").unwrap();
        column.insert("248:G,21881:GAG").unwrap();
        column.insert("248:GT").unwrap();
        column
    }

    #[test]
    fn search_matches_substrings_per_position() {
        let column = column();
        let pattern = Regex::new(".*G.*").unwrap();
        assert_eq!(
            column.search(248, &pattern).iter().collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
        let exact = Regex::new("^G$").unwrap();
        assert_eq!(
            column.search(248, &exact).iter().collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert!(column.search(999, &pattern).is_empty());
    }

    #[test]
    fn rejects_malformed_elements() {
        let mut column = InsertionColumnPartition::new("main".to_string());
        assert!(column.insert("nonsense").is_err());
        assert!(column.insert("0:G").is_err());
        assert!(column.insert("10:").is_err());
    }

    #[test]
    fn enumerates_entries_in_position_order() {
        let column = column();
        let pattern = Regex::new(".*").unwrap();
        let entries: Vec<_> = column
            .matching_entries(None, &pattern)
            .map(|(position, entry)| (position, entry.value().to_string()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (248, "G".to_string()),
                (248, "GT".to_string()),
                (21881, "GAG".to_string()),
            ]
        );
    }
}
