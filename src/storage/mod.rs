// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The columnar stores a built database is made of.

pub mod column;
mod partition;
pub mod persist;
mod reference;
mod sequence;

pub use self::partition::{Chunk, DatabasePartition};
pub use self::reference::ReferenceGenomes;
pub use self::sequence::{parse_reference, Position, SequenceStorePartition, SequenceStoreInfo};
