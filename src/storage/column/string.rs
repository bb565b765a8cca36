// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The unindexed string column.
//!
//! Values are packed into a fixed-size inline representation: strings up to
//! [`PREFIX_CAPACITY`] bytes live entirely inline, longer ones keep their
//! prefix inline for fast comparison and spill the full text into a
//! per-partition overflow table. Every row costs the same number of bytes in
//! the value vector regardless of its length.

use crate::types::{DataValue, LocalId};

/// Bytes stored inline per value.
pub const PREFIX_CAPACITY: usize = 12;

#[derive(Debug, Clone, Copy)]
struct PackedString {
    len: u32,
    prefix: [u8; PREFIX_CAPACITY],
    /// Index into the overflow table; only meaningful when
    /// `len > PREFIX_CAPACITY`.
    overflow: u32,
}

#[derive(Debug, Default, Clone)]
pub struct RawStringColumnPartition {
    values: Vec<PackedString>,
    overflow: Vec<String>,
}

impl RawStringColumnPartition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let mut prefix = [0u8; PREFIX_CAPACITY];
        let inline_len = bytes.len().min(PREFIX_CAPACITY);
        prefix[..inline_len].copy_from_slice(&bytes[..inline_len]);
        let overflow = if bytes.len() > PREFIX_CAPACITY {
            self.overflow.push(value.to_string());
            self.overflow.len() as u32 - 1
        } else {
            0
        };
        self.values.push(PackedString {
            len: bytes.len() as u32,
            prefix,
            overflow,
        });
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, local_id: LocalId) -> &str {
        let packed = &self.values[local_id as usize];
        if packed.len as usize <= PREFIX_CAPACITY {
            // Inline values hold a complete string, so this never splits a
            // UTF-8 character.
            std::str::from_utf8(&packed.prefix[..packed.len as usize]).unwrap_or("")
        } else {
            &self.overflow[packed.overflow as usize]
        }
    }

    pub fn equals(&self, local_id: LocalId, needle: &str) -> bool {
        let packed = &self.values[local_id as usize];
        if packed.len as usize != needle.len() {
            return false;
        }
        let inline_len = needle.len().min(PREFIX_CAPACITY);
        if packed.prefix[..inline_len] != needle.as_bytes()[..inline_len] {
            return false;
        }
        packed.len as usize <= PREFIX_CAPACITY
            || self.overflow[packed.overflow as usize] == needle
    }

    pub fn contains(&self, local_id: LocalId, needle: &str) -> bool {
        self.get(local_id).contains(needle)
    }

    pub fn value(&self, local_id: LocalId) -> DataValue {
        let text = self.get(local_id);
        if text.is_empty() {
            DataValue::Null
        } else {
            DataValue::String(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_values_round_trip() {
        let mut column = RawStringColumnPartition::new();
        column.insert("EPI_ISL_1");
        column.insert("a key that does not fit inline");
        column.insert("");
        assert_eq!(column.get(0), "EPI_ISL_1");
        assert_eq!(column.get(1), "a key that does not fit inline");
        assert_eq!(column.value(2), DataValue::Null);
    }

    #[test]
    fn equality_rejects_on_prefix_without_touching_overflow() {
        let mut column = RawStringColumnPartition::new();
        column.insert("prefix-match-but-long-value-a");
        assert!(column.equals(0, "prefix-match-but-long-value-a"));
        assert!(!column.equals(0, "prefix-match-but-long-value-b"));
        assert!(!column.equals(0, "prefix-mat"));
    }

    #[test]
    fn substring_search_sees_the_full_text() {
        let mut column = RawStringColumnPartition::new();
        column.insert("hCoV-19/Switzerland/ZH-1234/2021");
        assert!(column.contains(0, "ZH-1234"));
        assert!(!column.contains(0, "ZH-9999"));
    }
}
