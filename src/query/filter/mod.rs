// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The filter AST and its per-partition compilation.
//!
//! A filter is parsed once per query and compiled once per partition into an
//! [`Operator`] tree against that partition's stores. Compilation performs
//! the rewrites the evaluator depends on: constant propagation, splitting
//! negated conjuncts for the and-not fast path, complementing flipped
//! symbol bitmaps, and expanding ambiguity codes in upper-bound mode.

use std::fmt::{self, Display, Formatter};

use smallvec::SmallVec;

use super::error::Result;
use super::operator::Operator;
use crate::db::Database;
use crate::storage::DatabasePartition;
use crate::symbols::{AminoAcid, Nucleotide, Symbol};
use crate::types::Date;

mod metadata;
pub(super) mod parse;
mod sequence;

/// How a filter treats ambiguity codes.
///
/// `None` matches stored symbols exactly. `UpperBound` must not exclude any
/// sequence that could match: a queried symbol is expanded into every
/// concrete symbol it may represent. Negation inverts `UpperBound` back to
/// `None`, since the complement of an exact match is a valid upper bound of
/// the complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguityMode {
    None,
    UpperBound,
}

impl AmbiguityMode {
    fn invert(self) -> Self {
        AmbiguityMode::None
    }
}

/// A node of the filter AST. Positions are kept 0-based internally; the
/// JSON surface is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    False,
    Empty,
    And {
        children: Vec<Filter>,
    },
    Or {
        children: Vec<Filter>,
    },
    Negation {
        child: Box<Filter>,
    },
    /// Switches the subtree to upper-bound ambiguity handling.
    Maybe {
        child: Box<Filter>,
    },
    NOf {
        n: u32,
        exactly: bool,
        children: Vec<Filter>,
    },
    DateBetween {
        column: String,
        from: Option<Date>,
        to: Option<Date>,
    },
    IntBetween {
        column: String,
        from: Option<i32>,
        to: Option<i32>,
    },
    FloatBetween {
        column: String,
        from: Option<f64>,
        to: Option<f64>,
    },
    StringEquals {
        column: String,
        value: String,
    },
    StringSearch {
        column: String,
        value: String,
    },
    PangoLineageEquals {
        column: String,
        value: String,
        include_sublineages: bool,
    },
    NucleotideSymbolEquals {
        sequence_name: Option<String>,
        position: u32,
        /// `None` stands for `.`: the reference symbol at the position.
        symbol: Option<Nucleotide>,
    },
    AminoAcidSymbolEquals {
        sequence_name: Option<String>,
        position: u32,
        symbol: Option<AminoAcid>,
    },
    HasMutation {
        sequence_name: Option<String>,
        position: u32,
    },
    InsertionContains {
        column: Option<String>,
        sequence_name: Option<String>,
        position: u32,
        value: String,
    },
    PatternSearch {
        sequence_name: Option<String>,
        position: u32,
        pattern: SmallVec<[Nucleotide; 16]>,
        ambiguity_mode: Option<AmbiguityMode>,
    },
}

impl Filter {
    /// Compile this filter against one partition.
    pub fn compile<'a>(
        &self,
        database: &'a Database,
        partition: &'a DatabasePartition,
        mode: AmbiguityMode,
    ) -> Result<Operator<'a>> {
        let row_count = partition.sequence_count;
        match self {
            Filter::True => Ok(Operator::Full { row_count }),
            Filter::False | Filter::Empty => Ok(Operator::Empty),

            Filter::And { children } => compile_and(children, database, partition, mode),
            Filter::Or { children } => compile_or(children, database, partition, mode),
            Filter::Negation { child } => {
                let inner = child.compile(database, partition, mode.invert())?;
                Ok(negate(inner, row_count))
            }
            Filter::Maybe { child } => {
                child.compile(database, partition, AmbiguityMode::UpperBound)
            }
            Filter::NOf {
                n,
                exactly,
                children,
            } => compile_n_of(*n, *exactly, children, database, partition, mode),

            Filter::DateBetween { column, from, to } => {
                metadata::compile_date_between(column, *from, *to, database, partition)
            }
            Filter::IntBetween { column, from, to } => {
                metadata::compile_int_between(column, *from, *to, database, partition)
            }
            Filter::FloatBetween { column, from, to } => {
                metadata::compile_float_between(column, *from, *to, database, partition)
            }
            Filter::StringEquals { column, value } => {
                metadata::compile_string_equals(column, value, database, partition)
            }
            Filter::StringSearch { column, value } => {
                metadata::compile_string_search(column, value, database, partition)
            }
            Filter::PangoLineageEquals {
                column,
                value,
                include_sublineages,
            } => metadata::compile_pango_lineage_equals(
                column,
                value,
                *include_sublineages,
                database,
                partition,
            ),
            Filter::InsertionContains {
                column,
                sequence_name,
                position,
                value,
            } => metadata::compile_insertion_contains(
                column.as_deref(),
                sequence_name.as_deref(),
                *position,
                value,
                database,
                partition,
            ),

            Filter::NucleotideSymbolEquals {
                sequence_name,
                position,
                symbol,
            } => {
                let store = sequence::resolve_nuc_store(database, partition, sequence_name.as_deref())?;
                sequence::compile_symbol_equals(store, *position, *symbol, mode, row_count)
            }
            Filter::AminoAcidSymbolEquals {
                sequence_name,
                position,
                symbol,
            } => {
                let store = sequence::resolve_aa_store(partition, sequence_name.as_deref())?;
                sequence::compile_symbol_equals(store, *position, *symbol, mode, row_count)
            }
            Filter::HasMutation {
                sequence_name,
                position,
            } => {
                // Differing from the reference is the negation of carrying
                // the reference symbol.
                let equals_reference = Filter::NucleotideSymbolEquals {
                    sequence_name: sequence_name.clone(),
                    position: *position,
                    symbol: None,
                };
                Filter::Negation {
                    child: Box::new(equals_reference),
                }
                .compile(database, partition, mode)
            }
            Filter::PatternSearch {
                sequence_name,
                position,
                pattern,
                ambiguity_mode,
            } => sequence::compile_pattern_search(
                sequence_name.as_deref(),
                *position,
                pattern,
                ambiguity_mode.unwrap_or(mode),
                database,
                partition,
            ),
        }
    }
}

fn negate(inner: Operator<'_>, row_count: u32) -> Operator<'_> {
    match inner {
        Operator::Empty => Operator::Full { row_count },
        Operator::Full { .. } => Operator::Empty,
        Operator::Complement { child, .. } => *child,
        inner => Operator::Complement {
            child: Box::new(inner),
            row_count,
        },
    }
}

fn compile_and<'a>(
    children: &[Filter],
    database: &'a Database,
    partition: &'a DatabasePartition,
    mode: AmbiguityMode,
) -> Result<Operator<'a>> {
    let row_count = partition.sequence_count;
    let mut positive = Vec::new();
    let mut negated = Vec::new();
    for child in children {
        match child.compile(database, partition, mode)? {
            Operator::Empty => return Ok(Operator::Empty),
            Operator::Full { .. } => {}
            Operator::Complement { child, .. } => negated.push(*child),
            operator => positive.push(operator),
        }
    }
    Ok(match (positive.len(), negated.len()) {
        (0, 0) => Operator::Full { row_count },
        (1, 0) => positive.pop().unwrap(),
        (0, _) => Operator::Complement {
            child: Box::new(Operator::Union { children: negated }),
            row_count,
        },
        _ => Operator::Intersection {
            children: positive,
            negated_children: negated,
            row_count,
        },
    })
}

fn compile_or<'a>(
    children: &[Filter],
    database: &'a Database,
    partition: &'a DatabasePartition,
    mode: AmbiguityMode,
) -> Result<Operator<'a>> {
    let mut compiled = Vec::new();
    for child in children {
        match child.compile(database, partition, mode)? {
            Operator::Full { row_count } => return Ok(Operator::Full { row_count }),
            Operator::Empty => {}
            operator => compiled.push(operator),
        }
    }
    Ok(match compiled.len() {
        0 => Operator::Empty,
        1 => compiled.pop().unwrap(),
        _ => Operator::Union { children: compiled },
    })
}

fn compile_n_of<'a>(
    n: u32,
    exactly: bool,
    children: &[Filter],
    database: &'a Database,
    partition: &'a DatabasePartition,
    mode: AmbiguityMode,
) -> Result<Operator<'a>> {
    let row_count = partition.sequence_count;
    if n as usize > children.len() {
        return Ok(Operator::Empty);
    }
    if n == 0 {
        if !exactly {
            return Ok(Operator::Full { row_count });
        }
        // Exactly zero matching children is the complement of their union.
        let union = compile_or(children, database, partition, mode)?;
        return Ok(negate(union, row_count));
    }
    let compiled = children
        .iter()
        .map(|child| child.compile(database, partition, mode))
        .collect::<Result<Vec<_>>>()?;
    Ok(Operator::Threshold {
        children: compiled,
        n,
        exactly,
        row_count,
    })
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Filter::True => write!(f, "True"),
            Filter::False => write!(f, "False"),
            Filter::Empty => write!(f, "Empty"),
            Filter::And { children } => {
                write!(f, "And(")?;
                format_children(f, children)?;
                write!(f, ")")
            }
            Filter::Or { children } => {
                write!(f, "Or(")?;
                format_children(f, children)?;
                write!(f, ")")
            }
            Filter::Negation { child } => write!(f, "!({child})"),
            Filter::Maybe { child } => write!(f, "Maybe({child})"),
            Filter::NOf {
                n,
                exactly,
                children,
            } => {
                let comparison = if *exactly { "exactly" } else { "at least" };
                write!(f, "[{comparison} {n} of ")?;
                format_children(f, children)?;
                write!(f, "]")
            }
            Filter::DateBetween { column, from, to } => write!(
                f,
                "{column} in [{}, {})",
                from.map_or("*".to_string(), |date| date.to_string()),
                to.map_or("*".to_string(), |date| date.to_string()),
            ),
            Filter::IntBetween { column, from, to } => write!(
                f,
                "{column} in [{}, {})",
                from.map_or("*".to_string(), |value| value.to_string()),
                to.map_or("*".to_string(), |value| value.to_string()),
            ),
            Filter::FloatBetween { column, from, to } => write!(
                f,
                "{column} in [{}, {})",
                from.map_or("*".to_string(), |value| value.to_string()),
                to.map_or("*".to_string(), |value| value.to_string()),
            ),
            Filter::StringEquals { column, value } => write!(f, "{column} = {value:?}"),
            Filter::StringSearch { column, value } => write!(f, "{column} ~ {value:?}"),
            Filter::PangoLineageEquals {
                column,
                value,
                include_sublineages,
            } => {
                let star = if *include_sublineages { "*" } else { "" };
                write!(f, "{column} = {value}{star}")
            }
            Filter::NucleotideSymbolEquals {
                sequence_name,
                position,
                symbol,
            } => {
                format_sequence_prefix(f, sequence_name)?;
                let symbol = symbol.map_or('.', Symbol::to_char);
                write!(f, "{}{symbol}", position + 1)
            }
            Filter::AminoAcidSymbolEquals {
                sequence_name,
                position,
                symbol,
            } => {
                format_sequence_prefix(f, sequence_name)?;
                let symbol = symbol.map_or('.', Symbol::to_char);
                write!(f, "{}{symbol}", position + 1)
            }
            Filter::HasMutation {
                sequence_name,
                position,
            } => {
                format_sequence_prefix(f, sequence_name)?;
                write!(f, "{}?", position + 1)
            }
            Filter::InsertionContains {
                column,
                sequence_name,
                position,
                value,
            } => {
                if let Some(column) = column {
                    write!(f, "{column}:")?;
                }
                format_sequence_prefix(f, sequence_name)?;
                write!(f, "ins_{}:{value}", position + 1)
            }
            Filter::PatternSearch {
                sequence_name,
                position,
                pattern,
                ..
            } => {
                format_sequence_prefix(f, sequence_name)?;
                let pattern: String = pattern.iter().map(|symbol| symbol.to_char()).collect();
                write!(f, "{}={pattern}", position + 1)
            }
        }
    }
}

fn format_children(f: &mut Formatter<'_>, children: &[Filter]) -> fmt::Result {
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{child}")?;
    }
    Ok(())
}

fn format_sequence_prefix(f: &mut Formatter<'_>, sequence_name: &Option<String>) -> fmt::Result {
    match sequence_name {
        Some(name) => write!(f, "{name}:"),
        None => Ok(()),
    }
}
