// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The pango-lineage column: an equality-indexed string column over
//! canonical (un-aliased) dotted labels, with a precomputed sub-lineage
//! bitmap per distinct label.
//!
//! The sub-lineage relation is the prefix relation on dot boundaries:
//! `B.1.1` covers `B.1.1` and `B.1.1.7`, but not `B.1.17`.

use roaring::{MultiOps, RoaringBitmap};

use super::dictionary::Dictionary;
use crate::types::{DataValue, LocalId};

#[derive(Debug, Default, Clone)]
pub struct PangoLineageColumnPartition {
    value_ids: Vec<u32>,
    dictionary: Dictionary,
    lineage_bitmaps: Vec<RoaringBitmap>,
    sublineage_bitmaps: Vec<RoaringBitmap>,
}

/// `candidate` equals `ancestor` or extends it along a dot boundary.
pub fn is_sublineage_of(candidate: &str, ancestor: &str) -> bool {
    candidate == ancestor
        || (candidate.len() > ancestor.len()
            && candidate.starts_with(ancestor)
            && candidate.as_bytes()[ancestor.len()] == b'.')
}

impl PangoLineageColumnPartition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the canonical label of the next row. Alias resolution happens
    /// before insertion; the empty string encodes an absent value.
    pub fn insert(&mut self, canonical_label: &str) {
        let local_id = self.value_ids.len() as LocalId;
        let value_id = self.dictionary.insert_or_get(canonical_label);
        if value_id as usize == self.lineage_bitmaps.len() {
            self.lineage_bitmaps.push(RoaringBitmap::new());
        }
        self.lineage_bitmaps[value_id as usize].insert(local_id);
        self.value_ids.push(value_id);
    }

    /// Precompute the sub-lineage union for every distinct label. Called once
    /// after the partition is filled.
    pub fn finalize(&mut self) {
        self.sublineage_bitmaps = self
            .dictionary
            .values()
            .iter()
            .map(|ancestor| {
                self.dictionary
                    .values()
                    .iter()
                    .zip(&self.lineage_bitmaps)
                    .filter(|(label, _)| is_sublineage_of(label, ancestor))
                    .map(|(_, bitmap)| bitmap)
                    .union()
            })
            .collect();
        // Run-compression skipped: the vendored `roaring` version available in
        // this build does not expose `RoaringBitmap::optimize`.
    }

    pub fn len(&self) -> usize {
        self.value_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value_ids.is_empty()
    }

    /// The bitmap for a canonical label: the rows holding exactly this label,
    /// or, with `include_sublineages`, the union over all its sub-lineages.
    pub fn bitmap_for_lineage(
        &self,
        canonical_label: &str,
        include_sublineages: bool,
    ) -> Option<&RoaringBitmap> {
        let id = self.dictionary.lookup_id(canonical_label)? as usize;
        if include_sublineages {
            Some(&self.sublineage_bitmaps[id])
        } else {
            Some(&self.lineage_bitmaps[id])
        }
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

    pub fn lineage_bitmaps(&self) -> &[RoaringBitmap] {
        &self.lineage_bitmaps
    }

    pub fn sublineage_bitmaps(&self) -> &[RoaringBitmap] {
        &self.sublineage_bitmaps
    }

    pub(crate) fn from_parts(
        value_ids: Vec<u32>,
        dictionary: Dictionary,
        lineage_bitmaps: Vec<RoaringBitmap>,
        sublineage_bitmaps: Vec<RoaringBitmap>,
    ) -> Self {
        Self {
            value_ids,
            dictionary,
            lineage_bitmaps,
            sublineage_bitmaps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_boundaries_separate_lineages() {
        assert!(is_sublineage_of("B.1.1.7", "B.1.1"));
        assert!(is_sublineage_of("B.1.1", "B.1.1"));
        assert!(!is_sublineage_of("B.1.17", "B.1.1"));
        assert!(!is_sublineage_of("B.1", "B.1.1"));
    }

    #[test]
    fn sublineage_bitmaps_union_all_descendants() {
        let mut column = PangoLineageColumnPartition::new();
        for label in ["B.1", "B.1.1", "B.1.1.7", "B.2", "B.1.1"] {
            column.insert(label);
        }
        column.finalize();

        let exact = column.bitmap_for_lineage("B.1.1", false).unwrap();
        assert_eq!(exact.iter().collect::<Vec<_>>(), vec![1, 4]);

        let with_sub = column.bitmap_for_lineage("B.1.1", true).unwrap();
        assert_eq!(with_sub.iter().collect::<Vec<_>>(), vec![1, 2, 4]);

        let root = column.bitmap_for_lineage("B.1", true).unwrap();
        assert_eq!(root.iter().collect::<Vec<_>>(), vec![0, 1, 2, 4]);
        assert!(column.bitmap_for_lineage("XBB", true).is_none());
    }
}
