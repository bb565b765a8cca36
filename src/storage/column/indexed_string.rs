// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use roaring::RoaringBitmap;

use super::dictionary::Dictionary;
use crate::types::{DataValue, LocalId};

/// An equality-indexed string column: a dictionary id per row plus one
/// bitmap per distinct value.
///
/// The empty string encodes an absent value; the per-value bitmaps always
/// partition `[0, len)`.
#[derive(Debug, Default, Clone)]
pub struct IndexedStringColumnPartition {
    value_ids: Vec<u32>,
    dictionary: Dictionary,
    bitmaps: Vec<RoaringBitmap>,
}

impl IndexedStringColumnPartition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: &str) {
        let local_id = self.value_ids.len() as LocalId;
        let value_id = self.dictionary.insert_or_get(value);
        if value_id as usize == self.bitmaps.len() {
            self.bitmaps.push(RoaringBitmap::new());
        }
        self.bitmaps[value_id as usize].insert(local_id);
        self.value_ids.push(value_id);
    }

    pub fn len(&self) -> usize {
        self.value_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value_ids.is_empty()
    }

    /// The bitmap of rows holding `value`, or `None` for a value this
    /// partition never saw.
    pub fn bitmap_for_equality(&self, value: &str) -> Option<&RoaringBitmap> {
        let id = self.dictionary.lookup_id(value)?;
        Some(&self.bitmaps[id as usize])
    }

    pub fn value_id(&self, local_id: LocalId) -> u32 {
        self.value_ids[local_id as usize]
    }

    pub fn value_ids(&self) -> &[u32] {
        &self.value_ids
    }

    pub fn lookup_value(&self, value_id: u32) -> &str {
        self.dictionary.lookup_value(value_id)
    }

    pub fn value(&self, local_id: LocalId) -> DataValue {
        let text = self.lookup_value(self.value_ids[local_id as usize]);
        if text.is_empty() {
            DataValue::Null
        } else {
            DataValue::String(text.to_string())
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn bitmaps(&self) -> &[RoaringBitmap] {
        &self.bitmaps
    }

    // No-op: the vendored `roaring` version available in this build does not
    // expose run-compression (`RoaringBitmap::optimize`).
    pub fn optimize(&mut self) {}

    pub(crate) fn from_parts(
        value_ids: Vec<u32>,
        dictionary: Dictionary,
        bitmaps: Vec<RoaringBitmap>,
    ) -> Self {
        Self {
            value_ids,
            dictionary,
            bitmaps,
        }
    }
}
