// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! SILO: a read-optimized, in-memory columnar index for large collections
//! of aligned genomic sequences and their metadata.
//!
//! The crate is organized around an immutable [`Database`] snapshot: the
//! preprocessing side builds it from loader output, the query side compiles
//! JSON filters into Roaring-bitmap operator trees against it.

#![deny(unused_must_use)]

pub mod catalog;
mod db;
pub mod preprocess;
pub mod query;
pub mod storage;
pub mod symbols;
pub mod types;

pub use self::db::{Database, DatabaseInfo, Error, SharedDatabase};
