// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! Symbol alphabets for aligned sequence data.
//!
//! Every genomic segment is typed by an alphabet: nucleotide segments use the
//! 16-symbol IUPAC code, amino-acid segments a 26-symbol code. The alphabet
//! fixes the canonical character of each symbol, the "missing" marker used by
//! unsequenced positions, and the ambiguity expansion consulted when a query
//! must not exclude possibly-matching sequences.

use std::fmt::Debug;
use std::hash::Hash;

mod amino_acid;
mod nucleotide;
mod symbol_map;

pub use self::amino_acid::AminoAcid;
pub use self::nucleotide::Nucleotide;
pub use self::symbol_map::SymbolMap;

/// A symbol of a fixed sequence alphabet.
///
/// Implemented by the closed symbol enums; all tables are `'static` so symbol
/// handling never allocates.
pub trait Symbol: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Number of symbols in the alphabet.
    const COUNT: usize;

    /// All symbols, in index order.
    const SYMBOLS: &'static [Self];

    /// The marker written for unsequenced positions (`N` / `X`).
    const MISSING: Self;

    /// Symbols counted in mutation denominators: the concrete symbols plus
    /// the gap, excluding ambiguity codes and the missing marker.
    const VALID_MUTATION_SYMBOLS: &'static [Self];

    /// Alphabet name used in error messages.
    const NAME: &'static str;

    /// Dense index in `[0, COUNT)`.
    fn index(self) -> usize;

    fn from_index(index: usize) -> Option<Self>;

    fn to_char(self) -> char;

    fn from_char(character: char) -> Option<Self>;

    /// The concrete symbols this symbol may represent, including itself.
    ///
    /// `R -> [A, G, R]`; concrete symbols map to themselves only.
    fn ambiguity_symbols(self) -> &'static [Self];
}

/// Parse a one-character symbol string, `Err` carrying the offending input.
pub fn parse_symbol<S: Symbol>(text: &str) -> Result<S, String> {
    let mut characters = text.chars();
    match (characters.next(), characters.next()) {
        (Some(character), None) => S::from_char(character)
            .ok_or_else(|| format!("'{character}' is not a {} symbol", S::NAME)),
        _ => Err(format!(
            "expected a single {} symbol, got {text:?}",
            S::NAME
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_alphabet<S: Symbol>() {
        assert_eq!(S::SYMBOLS.len(), S::COUNT);
        for (index, &symbol) in S::SYMBOLS.iter().enumerate() {
            assert_eq!(symbol.index(), index);
            assert_eq!(S::from_index(index), Some(symbol));
            assert_eq!(S::from_char(symbol.to_char()), Some(symbol));
            assert!(symbol.ambiguity_symbols().contains(&symbol));
        }
        assert!(S::from_index(S::COUNT).is_none());
        assert!(!S::VALID_MUTATION_SYMBOLS.contains(&S::MISSING));
    }

    #[test]
    fn alphabets_are_internally_consistent() {
        check_alphabet::<Nucleotide>();
        check_alphabet::<AminoAcid>();
    }

    #[test]
    fn parses_single_character_symbols() {
        assert_eq!(parse_symbol::<Nucleotide>("G"), Ok(Nucleotide::G));
        assert!(parse_symbol::<Nucleotide>("GT").is_err());
        assert!(parse_symbol::<Nucleotide>("").is_err());
        assert!(parse_symbol::<AminoAcid>("O").is_err());
    }
}
