// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The partitioning algorithm both ingestion and query agree on.
//!
//! Rows are grouped by the partition-by column value; adjacent groups
//! (ordered by value) are merged greedily until a partition would exceed a
//! 1/32 share of the total. Rows without a value form their own trailing
//! partition. The outcome depends only on the histogram, so two builds over
//! the same input produce identical partition boundaries.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::PreprocessingError;
use crate::storage::Chunk;

/// Number of partitions the total row count is aimed to split into.
const TARGET_PARTITION_SHARE: u64 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionDescriptor {
    pub chunks: Vec<Chunk>,
}

impl PartitionDescriptor {
    pub fn sequence_count(&self) -> u32 {
        self.chunks.iter().map(|chunk| chunk.count).sum()
    }
}

/// The partition layout of one build, persisted alongside the partition
/// archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partitions {
    pub partitions: Vec<PartitionDescriptor>,
}

impl Partitions {
    /// The layout used when no partition-by column is configured: a single
    /// partition with a single unkeyed chunk.
    pub fn single(total_count: u32) -> Self {
        Partitions {
            partitions: vec![PartitionDescriptor {
                chunks: vec![Chunk {
                    key_low: String::new(),
                    key_high: String::new(),
                    offset: 0,
                    count: total_count,
                }],
            }],
        }
    }

    /// Compute the layout from the histogram of the partition-by column.
    /// `None` keys are rows without a value.
    pub fn compute(histogram: &[(Option<String>, u32)]) -> Self {
        let mut keyed: Vec<(&str, u32)> = histogram
            .iter()
            .filter_map(|(key, count)| key.as_deref().map(|key| (key, *count)))
            .collect();
        keyed.sort_unstable_by(|left, right| left.0.cmp(right.0));
        let null_count: u64 = histogram
            .iter()
            .filter(|(key, _)| key.is_none())
            .map(|(_, count)| u64::from(*count))
            .sum();

        let total: u64 =
            keyed.iter().map(|(_, count)| u64::from(*count)).sum::<u64>() + null_count;
        let target = total / TARGET_PARTITION_SHARE;

        let mut partitions = Vec::new();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut accumulated = 0u64;
        for (key, count) in keyed {
            if accumulated > 0 && accumulated + u64::from(count) > target {
                partitions.push(PartitionDescriptor {
                    chunks: std::mem::take(&mut chunks),
                });
                accumulated = 0;
            }
            chunks.push(Chunk {
                key_low: key.to_string(),
                key_high: key.to_string(),
                offset: accumulated as u32,
                count,
            });
            accumulated += u64::from(count);
        }
        if !chunks.is_empty() {
            partitions.push(PartitionDescriptor { chunks });
        }
        if null_count > 0 {
            partitions.push(PartitionDescriptor {
                chunks: vec![Chunk {
                    key_low: String::new(),
                    key_high: String::new(),
                    offset: 0,
                    count: null_count as u32,
                }],
            });
        }
        Partitions { partitions }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PreprocessingError> {
        let file = File::open(path).map_err(|source| {
            PreprocessingError::MissingFile(path.display().to_string(), source)
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|error| {
            PreprocessingError::MalformedDocument {
                document: "partition descriptor",
                message: error.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(entries: &[(&str, u32)]) -> Vec<(Option<String>, u32)> {
        entries
            .iter()
            .map(|(key, count)| (Some(key.to_string()), *count))
            .collect()
    }

    #[test]
    fn single_layout_covers_everything() {
        let partitions = Partitions::single(100);
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions.partitions[0].sequence_count(), 100);
    }

    #[test]
    fn merges_small_groups_up_to_the_target() {
        // total = 3200, target = 100
        let mut entries = Vec::new();
        for index in 0..64 {
            entries.push((format!("L.{index:02}"), 50u32));
        }
        let histogram: Vec<_> = entries
            .into_iter()
            .map(|(key, count)| (Some(key), count))
            .collect();
        let partitions = Partitions::compute(&histogram);
        // Two 50-row groups per partition.
        assert_eq!(partitions.len(), 32);
        for partition in &partitions.partitions {
            assert_eq!(partition.chunks.len(), 2);
            assert_eq!(partition.sequence_count(), 100);
            assert_eq!(partition.chunks[1].offset, 50);
        }
    }

    #[test]
    fn oversized_groups_become_their_own_partition() {
        let partitions = Partitions::compute(&histogram(&[
            ("A", 1),
            ("B", 1000),
            ("C", 1),
        ]));
        // target = 1002/32 = 31: "A" cannot absorb "B", "B" overflows alone.
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions.partitions[0].chunks[0].key_low, "A");
        assert_eq!(partitions.partitions[1].sequence_count(), 1000);
    }

    #[test]
    fn null_rows_form_their_own_trailing_partition() {
        let mut histogram = histogram(&[("A", 10), ("B", 10)]);
        histogram.push((None, 5));
        let partitions = Partitions::compute(&histogram);
        let last = partitions.partitions.last().unwrap();
        assert_eq!(last.sequence_count(), 5);
        assert_eq!(last.chunks[0].key_low, "");
    }

    #[test]
    fn layout_is_stable_across_runs() {
        let entries = histogram(&[("B.1", 40), ("A.2", 7), ("C.3.5", 12), ("B.1.1", 9)]);
        let mut shuffled = entries.clone();
        shuffled.reverse();
        assert_eq!(
            Partitions::compute(&entries),
            Partitions::compute(&shuffled)
        );
    }
}
