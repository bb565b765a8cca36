// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The per-position inverted index over one aligned sequence segment.
//!
//! For every position of the segment there is one Roaring bitmap per
//! alphabet symbol; the bitmaps at a position partition the local id space.
//! When a symbol covers more than half the partition its bitmap is stored
//! complemented ("flipped"), which roughly halves memory on conserved
//! positions. Missing symbols are additionally recorded per sequence, since
//! unsequenced regions form long runs along the genome axis.

use std::sync::Arc;

use rayon::prelude::*;
use roaring::RoaringBitmap;

use crate::preprocess::PreprocessingError;
use crate::symbols::{Symbol, SymbolMap};
use crate::types::LocalId;

/// Positions are sharded in batches of this size across worker threads.
const POSITIONS_PER_TASK: usize = 64;

/// The bitmaps of one reference position.
#[derive(Debug, Clone)]
pub struct Position<S: Symbol> {
    bitmaps: SymbolMap<S, RoaringBitmap>,
    flipped: Option<S>,
}

impl<S: Symbol> Default for Position<S> {
    fn default() -> Self {
        Self {
            bitmaps: SymbolMap::new(),
            flipped: None,
        }
    }
}

impl<S: Symbol> Position<S> {
    pub(crate) fn from_parts(bitmaps: SymbolMap<S, RoaringBitmap>, flipped: Option<S>) -> Self {
        Self { bitmaps, flipped }
    }

    pub(crate) fn bitmaps(&self) -> &SymbolMap<S, RoaringBitmap> {
        &self.bitmaps
    }

    /// The stored bitmap for `symbol`. If [`Position::flipped_symbol`]
    /// equals `symbol`, the stored bitmap is the complement of the true set.
    pub fn bitmap(&self, symbol: S) -> &RoaringBitmap {
        &self.bitmaps[symbol]
    }

    pub fn flipped_symbol(&self) -> Option<S> {
        self.flipped
    }

    pub fn is_flipped(&self, symbol: S) -> bool {
        self.flipped == Some(symbol)
    }

    /// True cardinality of `symbol` at this position.
    pub fn symbol_count(&self, symbol: S, sequence_count: u32) -> u64 {
        if self.is_flipped(symbol) {
            u64::from(sequence_count) - self.bitmaps[symbol].len()
        } else {
            self.bitmaps[symbol].len()
        }
    }

    fn flip_most_numerous(&mut self, sequence_count: u32) {
        let mut max_symbol = None;
        let mut max_count = 0u64;
        for (symbol, bitmap) in self.bitmaps.iter() {
            if bitmap.len() > max_count {
                max_count = bitmap.len();
                max_symbol = Some(symbol);
            }
        }
        if let Some(symbol) = max_symbol {
            if 2 * max_count > u64::from(sequence_count) {
                let mut complement = RoaringBitmap::new();
                complement.insert_range(0..sequence_count);
                complement -= &self.bitmaps[symbol];
                self.bitmaps[symbol] = complement;
                self.flipped = Some(symbol);
            }
        }
        // Run-compression skipped: the vendored `roaring` version available in
        // this build does not expose `RoaringBitmap::optimize`.
    }
}

/// Summary of one sequence store partition, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceStoreInfo {
    pub sequence_count: u32,
    pub size_in_bytes: u64,
    pub missing_bitmap_bytes: u64,
}

/// The sequence index of one segment within one partition.
#[derive(Debug, Clone)]
pub struct SequenceStorePartition<S: Symbol> {
    reference: Arc<[S]>,
    positions: Vec<Position<S>>,
    missing_symbol_bitmaps: Vec<RoaringBitmap>,
    sequence_count: u32,
}

impl<S: Symbol> SequenceStorePartition<S> {
    pub fn new(reference: Arc<[S]>) -> Self {
        let positions = (0..reference.len()).map(|_| Position::default()).collect();
        Self {
            reference,
            positions,
            missing_symbol_bitmaps: Vec::new(),
            sequence_count: 0,
        }
    }

    pub fn reference(&self) -> &[S] {
        &self.reference
    }

    /// Segment length in positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn sequence_count(&self) -> u32 {
        self.sequence_count
    }

    pub fn position(&self, position: usize) -> &Position<S> {
        &self.positions[position]
    }

    pub fn missing_symbol_bitmaps(&self) -> &[RoaringBitmap] {
        &self.missing_symbol_bitmaps
    }

    /// Index the next batch of aligned sequences, in local id order. `None`
    /// stands for a sequence without data for this segment; it is treated as
    /// missing at every position.
    pub fn interpret(&mut self, genomes: &[Option<String>]) -> Result<(), PreprocessingError> {
        for genome in genomes.iter().flatten() {
            if genome.len() != self.reference.len() {
                return Err(PreprocessingError::LengthMismatch {
                    expected: self.reference.len(),
                    got: genome.len(),
                });
            }
        }
        self.fill_indexes(genomes)?;
        self.fill_missing_bitmaps(genomes);
        self.sequence_count += genomes.len() as u32;
        Ok(())
    }

    fn fill_indexes(&mut self, genomes: &[Option<String>]) -> Result<(), PreprocessingError> {
        let first_id = self.sequence_count;
        self.positions
            .par_iter_mut()
            .enumerate()
            .with_min_len(POSITIONS_PER_TASK)
            .try_for_each(|(position, index)| {
                let mut ids_per_symbol: SymbolMap<S, Vec<LocalId>> = SymbolMap::new();
                for (offset, genome) in genomes.iter().enumerate() {
                    let symbol = match genome {
                        Some(genome) => {
                            let character = genome.as_bytes()[position] as char;
                            S::from_char(character).ok_or(
                                PreprocessingError::IllegalCharacter {
                                    character,
                                    alphabet: S::NAME,
                                },
                            )?
                        }
                        None => S::MISSING,
                    };
                    ids_per_symbol[symbol].push(first_id + offset as LocalId);
                }
                for (symbol, ids) in ids_per_symbol.iter() {
                    if !ids.is_empty() {
                        index.bitmaps[symbol].extend(ids.iter().copied());
                    }
                }
                Ok(())
            })
    }

    fn fill_missing_bitmaps(&mut self, genomes: &[Option<String>]) {
        let segment_length = self.reference.len() as u32;
        let mut batch: Vec<RoaringBitmap> = genomes
            .par_iter()
            .map(|genome| {
                let mut missing = RoaringBitmap::new();
                match genome {
                    None => {
                        missing.insert_range(0..segment_length);
                    }
                    Some(genome) => {
                        for (position, &byte) in genome.as_bytes().iter().enumerate() {
                            if S::from_char(byte as char) == Some(S::MISSING) {
                                missing.insert(position as u32);
                            }
                        }
                    }
                }
                // Run-compression skipped: the vendored `roaring` version
                // available in this build does not expose `optimize`.
                missing
            })
            .collect();
        self.missing_symbol_bitmaps.append(&mut batch);
    }

    /// Apply the flipped-majority optimization and run-compress every
    /// bitmap. Called once, after the last batch.
    pub fn finalize(&mut self) {
        let sequence_count = self.sequence_count;
        self.positions
            .par_iter_mut()
            .with_min_len(POSITIONS_PER_TASK)
            .for_each(|position| position.flip_most_numerous(sequence_count));
    }

    pub fn info(&self) -> SequenceStoreInfo {
        let size_in_bytes = self
            .positions
            .iter()
            .flat_map(|position| position.bitmaps.iter())
            .map(|(_, bitmap)| bitmap.serialized_size() as u64)
            .sum();
        let missing_bitmap_bytes = self
            .missing_symbol_bitmaps
            .iter()
            .map(|bitmap| bitmap.serialized_size() as u64)
            .sum();
        SequenceStoreInfo {
            sequence_count: self.sequence_count,
            size_in_bytes,
            missing_bitmap_bytes,
        }
    }

    pub(crate) fn from_parts(
        reference: Arc<[S]>,
        positions: Vec<Position<S>>,
        missing_symbol_bitmaps: Vec<RoaringBitmap>,
        sequence_count: u32,
    ) -> Self {
        Self {
            reference,
            positions,
            missing_symbol_bitmaps,
            sequence_count,
        }
    }
}

/// Parse an aligned sequence string into symbols.
pub fn parse_reference<S: Symbol>(text: &str) -> Result<Arc<[S]>, PreprocessingError> {
    text.chars()
        .map(|character| {
            S::from_char(character).ok_or(PreprocessingError::IllegalCharacter {
                character,
                alphabet: S::NAME,
            })
        })
        .collect::<Result<Vec<S>, _>>()
        .map(Arc::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Nucleotide;

    fn store(genomes: &[&str]) -> SequenceStorePartition<Nucleotide> {
        let reference = parse_reference::<Nucleotide>("ACGT").unwrap();
        let mut store = SequenceStorePartition::new(reference);
        let batch: Vec<Option<String>> = genomes.iter().map(|g| Some(g.to_string())).collect();
        store.interpret(&batch).unwrap();
        store.finalize();
        store
    }

    #[test]
    fn symbols_partition_every_position() {
        let store = store(&["ACGT", "ACGA", "AAGT", "NCGT"]);
        for position in 0..store.len() {
            let mut total = 0u64;
            let mut union = RoaringBitmap::new();
            for &symbol in Nucleotide::SYMBOLS {
                let index = store.position(position);
                total += index.symbol_count(symbol, store.sequence_count());
                let mut bitmap = index.bitmap(symbol).clone();
                if index.is_flipped(symbol) {
                    let mut full = RoaringBitmap::new();
                    full.insert_range(0..store.sequence_count());
                    bitmap = full - bitmap;
                }
                union |= bitmap;
            }
            assert_eq!(total, u64::from(store.sequence_count()));
            assert_eq!(union.len(), u64::from(store.sequence_count()));
        }
    }

    #[test]
    fn majority_symbols_are_flipped() {
        let store = store(&["ACGT", "ACGA", "AAGT", "NCGT"]);
        // A holds 3 of 4 sequences at position 0.
        let position = store.position(0);
        assert!(position.is_flipped(Nucleotide::A));
        assert_eq!(position.symbol_count(Nucleotide::A, 4), 3);
        assert_eq!(
            position.bitmap(Nucleotide::A).iter().collect::<Vec<_>>(),
            vec![3]
        );
        // G at position 2 covers everything; the stored bitmap is empty.
        let conserved = store.position(2);
        assert!(conserved.is_flipped(Nucleotide::G));
        assert!(conserved.bitmap(Nucleotide::G).is_empty());
    }

    #[test]
    fn missing_symbols_are_tracked_per_sequence() {
        let store = store(&["ACGT", "NNGT", "ANGT"]);
        assert!(store.missing_symbol_bitmaps()[0].is_empty());
        assert_eq!(
            store.missing_symbol_bitmaps()[1].iter().collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(
            store.missing_symbol_bitmaps()[2].iter().collect::<Vec<_>>(),
            vec![1]
        );
        // The N symbol also participates in the per-position partition.
        assert_eq!(store.position(0).symbol_count(Nucleotide::N, 3), 1);
    }

    #[test]
    fn absent_sequences_are_missing_everywhere() {
        let reference = parse_reference::<Nucleotide>("ACGT").unwrap();
        let mut store = SequenceStorePartition::new(reference);
        store
            .interpret(&[Some("ACGT".to_string()), None])
            .unwrap();
        store.finalize();
        assert_eq!(store.missing_symbol_bitmaps()[1].len(), 4);
        assert_eq!(store.position(3).symbol_count(Nucleotide::N, 2), 1);
    }

    #[test]
    fn rejects_length_mismatch_and_illegal_characters() {
        let reference = parse_reference::<Nucleotide>("ACGT").unwrap();
        let mut store = SequenceStorePartition::new(reference.clone());
        assert!(matches!(
            store.interpret(&[Some("ACG".to_string())]),
            Err(PreprocessingError::LengthMismatch { expected: 4, got: 3 })
        ));
        let mut store = SequenceStorePartition::new(reference);
        assert!(matches!(
            store.interpret(&[Some("AC?T".to_string())]),
            Err(PreprocessingError::IllegalCharacter { character: '?', .. })
        ));
    }
}
