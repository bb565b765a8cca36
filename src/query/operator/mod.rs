// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The operator algebra filters compile into.
//!
//! Every operator evaluates to a Roaring bitmap over the partition's local
//! id space. Results distinguish owned bitmaps, which the single consumer
//! may mutate in place, from borrowed references into the store, which must
//! never be mutated; combinators consume owned inputs without copying and
//! clone borrowed ones only when unavoidable.

use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

use itertools::Itertools;
use roaring::{MultiOps, RoaringBitmap};

use crate::storage::column::RawStringColumnPartition;
use crate::storage::Chunk;
use crate::types::{Date, LocalId};

/// A filter result: either a fresh bitmap or a shared reference into an
/// index.
#[derive(Debug)]
pub enum OperatorResult<'a> {
    Owned(RoaringBitmap),
    Borrowed(&'a RoaringBitmap),
}

impl<'a> OperatorResult<'a> {
    pub fn is_mutable(&self) -> bool {
        matches!(self, OperatorResult::Owned(_))
    }

    pub fn into_owned(self) -> RoaringBitmap {
        match self {
            OperatorResult::Owned(bitmap) => bitmap,
            OperatorResult::Borrowed(bitmap) => bitmap.clone(),
        }
    }

    /// Run-compress an owned result; borrowed results are left alone.
    ///
    /// No-op: the vendored `roaring` version available in this build does not
    /// expose run-compression (`RoaringBitmap::optimize`).
    pub fn optimize(&mut self) {}
}

impl<'a> Deref for OperatorResult<'a> {
    type Target = RoaringBitmap;

    fn deref(&self) -> &RoaringBitmap {
        match self {
            OperatorResult::Owned(bitmap) => bitmap,
            OperatorResult::Borrowed(bitmap) => bitmap,
        }
    }
}

/// Whether [`Operator::BitmapSelection`] keeps ids whose bitmap contains the
/// probed value or those whose bitmap does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapSelectionMode {
    Contains,
    NotContains,
}

/// Row predicates evaluated by a linear [`Operator::Selection`] scan over an
/// unindexed column. Between-predicates are inclusive below and exclusive
/// above; absent values never match.
#[derive(Debug)]
pub enum Predicate<'a> {
    IntBetween {
        values: &'a [i32],
        from: Option<i32>,
        to: Option<i32>,
    },
    FloatBetween {
        values: &'a [f64],
        from: Option<f64>,
        to: Option<f64>,
    },
    DateBetween {
        values: &'a [Date],
        from: Option<Date>,
        to: Option<Date>,
    },
    StringEquals {
        column: &'a RawStringColumnPartition,
        value: String,
    },
    StringContains {
        column: &'a RawStringColumnPartition,
        value: String,
    },
}

impl Predicate<'_> {
    fn row_count(&self) -> usize {
        match self {
            Predicate::IntBetween { values, .. } => values.len(),
            Predicate::FloatBetween { values, .. } => values.len(),
            Predicate::DateBetween { values, .. } => values.len(),
            Predicate::StringEquals { column, .. } => column.len(),
            Predicate::StringContains { column, .. } => column.len(),
        }
    }

    fn matches(&self, local_id: LocalId) -> bool {
        match self {
            Predicate::IntBetween { values, from, to } => {
                let value = values[local_id as usize];
                value != crate::types::INT_NULL
                    && from.is_none_or(|from| value >= from)
                    && to.is_none_or(|to| value < to)
            }
            Predicate::FloatBetween { values, from, to } => {
                let value = values[local_id as usize];
                !value.is_nan()
                    && from.is_none_or(|from| value >= from)
                    && to.is_none_or(|to| value < to)
            }
            Predicate::DateBetween { values, from, to } => {
                let value = values[local_id as usize];
                !value.is_null()
                    && from.is_none_or(|from| value >= from)
                    && to.is_none_or(|to| value < to)
            }
            Predicate::StringEquals { column, value } => column.equals(local_id, value),
            Predicate::StringContains { column, value } => column.contains(local_id, value),
        }
    }
}

/// A compiled filter for one partition.
pub enum Operator<'a> {
    Empty,
    Full {
        row_count: u32,
    },
    /// A shared reference to a stored bitmap; never mutated.
    IndexScan {
        bitmap: &'a RoaringBitmap,
    },
    /// Select ids by probing one bitmap per id for `position`; serves the
    /// per-sequence missing-symbol bitmaps.
    BitmapSelection {
        bitmaps: &'a [RoaringBitmap],
        mode: BitmapSelectionMode,
        position: u32,
    },
    Complement {
        child: Box<Operator<'a>>,
        row_count: u32,
    },
    Union {
        children: Vec<Operator<'a>>,
    },
    Intersection {
        children: Vec<Operator<'a>>,
        negated_children: Vec<Operator<'a>>,
        row_count: u32,
    },
    /// At-least-`n` (or exactly-`n`) of the children.
    Threshold {
        children: Vec<Operator<'a>>,
        n: u32,
        exactly: bool,
        row_count: u32,
    },
    /// Linear scan over an unindexed column.
    Selection {
        predicate: Predicate<'a>,
    },
    /// Binary search over a date column sorted within each chunk.
    RangeSelection {
        values: &'a [Date],
        chunks: &'a [Chunk],
        from: Option<Date>,
        to: Option<Date>,
    },
}

impl<'a> Operator<'a> {
    pub fn evaluate(&self) -> OperatorResult<'a> {
        match self {
            Operator::Empty => OperatorResult::Owned(RoaringBitmap::new()),
            Operator::Full { row_count } => {
                let mut bitmap = RoaringBitmap::new();
                bitmap.insert_range(0..*row_count);
                OperatorResult::Owned(bitmap)
            }
            Operator::IndexScan { bitmap } => OperatorResult::Borrowed(*bitmap),
            Operator::BitmapSelection {
                bitmaps,
                mode,
                position,
            } => {
                let selected = bitmaps
                    .iter()
                    .enumerate()
                    .filter(|(_, bitmap)| match mode {
                        BitmapSelectionMode::Contains => bitmap.contains(*position),
                        BitmapSelectionMode::NotContains => !bitmap.contains(*position),
                    })
                    .map(|(local_id, _)| local_id as LocalId);
                OperatorResult::Owned(
                    RoaringBitmap::from_sorted_iter(selected)
                        .expect("enumeration yields ascending ids"),
                )
            }
            Operator::Complement { child, row_count } => {
                let mut full = RoaringBitmap::new();
                full.insert_range(0..*row_count);
                full -= &*child.evaluate();
                OperatorResult::Owned(full)
            }
            Operator::Union { children } => {
                let results: Vec<OperatorResult<'a>> =
                    children.iter().map(Operator::evaluate).collect();
                OperatorResult::Owned(results.iter().map(Deref::deref).union())
            }
            Operator::Intersection {
                children,
                negated_children,
                row_count,
            } => evaluate_intersection(children, negated_children, *row_count),
            Operator::Threshold {
                children,
                n,
                exactly,
                row_count,
            } => evaluate_threshold(children, *n, *exactly, *row_count),
            Operator::Selection { predicate } => {
                let matching = (0..predicate.row_count() as LocalId)
                    .filter(|local_id| predicate.matches(*local_id));
                OperatorResult::Owned(
                    RoaringBitmap::from_sorted_iter(matching)
                        .expect("scan yields ascending ids"),
                )
            }
            Operator::RangeSelection {
                values,
                chunks,
                from,
                to,
            } => {
                let mut result = RoaringBitmap::new();
                for chunk in chunks.iter() {
                    let run =
                        &values[chunk.offset as usize..(chunk.offset + chunk.count) as usize];
                    // Null dates sort below every real date; an open lower
                    // bound must still exclude them.
                    let lower = match from {
                        Some(from) => run.partition_point(|value| *value < *from),
                        None => run.partition_point(|value| value.is_null()),
                    };
                    let upper = match to {
                        Some(to) => run.partition_point(|value| *value < *to),
                        None => run.len(),
                    };
                    if lower < upper {
                        result
                            .insert_range(chunk.offset + lower as u32..chunk.offset + upper as u32);
                    }
                }
                OperatorResult::Owned(result)
            }
        }
    }
}

/// Intersect two results, reusing an owned side when possible.
fn intersect_two<'a>(first: OperatorResult<'a>, second: OperatorResult<'a>) -> OperatorResult<'a> {
    match (first, second) {
        (OperatorResult::Owned(mut first), second) => {
            first &= &*second;
            OperatorResult::Owned(first)
        }
        (first, OperatorResult::Owned(mut second)) => {
            second &= &*first;
            OperatorResult::Owned(second)
        }
        (OperatorResult::Borrowed(first), OperatorResult::Borrowed(second)) => {
            OperatorResult::Owned(first & second)
        }
    }
}

fn evaluate_intersection<'a>(
    children: &[Operator<'a>],
    negated_children: &[Operator<'a>],
    row_count: u32,
) -> OperatorResult<'a> {
    let mut results: Vec<OperatorResult<'a>> =
        children.iter().map(Operator::evaluate).collect();
    let mut negated_results: Vec<OperatorResult<'a>> =
        negated_children.iter().map(Operator::evaluate).collect();
    // Sort ascending so intermediate results stay small, negated descending
    // so the largest subtractions happen first; also makes evaluation order
    // deterministic.
    results.sort_by_key(|result| result.len());
    negated_results.sort_by_key(|result| std::cmp::Reverse(result.len()));

    let mut result = match results.len() {
        // The compiler only emits intersections with at least one positive
        // child; recover by starting from the full id space.
        0 => Operator::Full { row_count }.evaluate(),
        1 => results.pop().unwrap(),
        _ => {
            let mut iterator = results.into_iter();
            let first = iterator.next().unwrap();
            let second = iterator.next().unwrap();
            let mut accumulated = intersect_two(first, second);
            for other in iterator {
                accumulated = intersect_two(accumulated, other);
            }
            accumulated
        }
    };
    if !negated_results.is_empty() {
        let mut owned = result.into_owned();
        for negated in negated_results {
            owned -= &*negated;
        }
        result = OperatorResult::Owned(owned);
    }
    result
}

fn evaluate_threshold<'a>(
    children: &[Operator<'a>],
    n: u32,
    exactly: bool,
    row_count: u32,
) -> OperatorResult<'a> {
    let mut counts = vec![0u16; row_count as usize];
    for child in children {
        for local_id in child.evaluate().iter() {
            counts[local_id as usize] = counts[local_id as usize].saturating_add(1);
        }
    }
    let matching = (0..row_count).filter(|local_id| {
        let count = u32::from(counts[*local_id as usize]);
        if exactly {
            count == n
        } else {
            count >= n
        }
    });
    OperatorResult::Owned(
        RoaringBitmap::from_sorted_iter(matching).expect("scan yields ascending ids"),
    )
}

impl Display for Operator<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Empty => write!(f, "Empty"),
            Operator::Full { .. } => write!(f, "Full"),
            Operator::IndexScan { .. } => write!(f, "IndexScan"),
            Operator::BitmapSelection { position, mode, .. } => {
                let sign = match mode {
                    BitmapSelectionMode::Contains => "",
                    BitmapSelectionMode::NotContains => "!",
                };
                write!(f, "BitmapSelection({sign}{position})")
            }
            Operator::Complement { child, .. } => write!(f, "!{child}"),
            Operator::Union { children } => {
                write!(f, "({})", children.iter().format(" | "))
            }
            Operator::Intersection {
                children,
                negated_children,
                ..
            } => {
                write!(f, "({}", children.iter().format(" & "))?;
                for negated in negated_children {
                    write!(f, " &! {negated}")?;
                }
                write!(f, ")")
            }
            Operator::Threshold { n, exactly, children, .. } => {
                let comparison = if *exactly { "==" } else { ">=" };
                write!(f, "[{comparison}{n} of {}]", children.iter().format(", "))
            }
            Operator::Selection { .. } => write!(f, "Selection"),
            Operator::RangeSelection { .. } => write!(f, "RangeSelection"),
        }
    }
}
