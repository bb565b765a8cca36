// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

//! The self-describing binary archive of one partition.
//!
//! Layout: a fixed header (magic, format version, body length, crc32 of the
//! body) followed by the body holding every column and sequence store of the
//! partition. Roaring bitmaps use their portable serialization. The format
//! is identified exactly by the snapshot's data-version string; there is no
//! forward compatibility.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use roaring::RoaringBitmap;

use super::column::{
    ColumnGroup, DateColumnPartition, Dictionary, FloatColumnPartition,
    IndexedStringColumnPartition, InsertionColumnPartition, IntColumnPartition,
    PangoLineageColumnPartition, RawStringColumnPartition,
};
use super::partition::{Chunk, DatabasePartition};
use super::sequence::{Position, SequenceStorePartition};
use crate::symbols::{AminoAcid, Nucleotide, Symbol, SymbolMap};
use crate::types::Date;

const PARTITION_MAGIC: u32 = 0x5349_4C4F; // "SILO"
const FORMAT_VERSION: u32 = 1;
const NO_FLIPPED_SYMBOL: u8 = 0xFF;

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a partition archive (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unsupported archive format version {0}")]
    UnsupportedVersion(u32),
    #[error("archive checksum mismatch: expected {expected:#010x}, got {got:#010x}")]
    ChecksumMismatch { expected: u32, got: u32 },
    #[error("corrupt archive: {0}")]
    Decode(String),
}

type Result<T> = std::result::Result<T, PersistenceError>;

fn decode_error(message: impl Into<String>) -> PersistenceError {
    PersistenceError::Decode(message.into())
}

/// Serialize a partition into an archive, header included.
pub fn write_partition(partition: &DatabasePartition) -> Vec<u8> {
    let mut body = Vec::new();
    body.put_u32_le(partition.sequence_count);
    put_chunks(&mut body, &partition.chunks);
    put_column_group(&mut body, &partition.columns);
    put_sequence_stores(&mut body, &partition.nuc_sequences);
    put_sequence_stores(&mut body, &partition.aa_sequences);

    let mut archive = Vec::with_capacity(body.len() + 20);
    archive.put_u32_le(PARTITION_MAGIC);
    archive.put_u32_le(FORMAT_VERSION);
    archive.put_u64_le(body.len() as u64);
    archive.put_u32_le(crc32fast::hash(&body));
    archive.extend_from_slice(&body);
    archive
}

/// Decode a partition archive, verifying magic, version and checksum.
pub fn read_partition(mut data: &[u8]) -> Result<DatabasePartition> {
    if data.remaining() < 20 {
        return Err(decode_error("archive shorter than its header"));
    }
    let magic = data.get_u32_le();
    if magic != PARTITION_MAGIC {
        return Err(PersistenceError::BadMagic(magic));
    }
    let version = data.get_u32_le();
    if version != FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(version));
    }
    let body_len = data.get_u64_le() as usize;
    let expected_checksum = data.get_u32_le();
    if data.remaining() != body_len {
        return Err(decode_error(format!(
            "body length mismatch: header says {body_len}, archive holds {}",
            data.remaining()
        )));
    }
    let got_checksum = crc32fast::hash(data);
    if got_checksum != expected_checksum {
        return Err(PersistenceError::ChecksumMismatch {
            expected: expected_checksum,
            got: got_checksum,
        });
    }

    let body = &mut data;
    let sequence_count = get_u32(body)?;
    let chunks = get_chunks(body)?;
    let columns = get_column_group(body)?;
    let nuc_sequences = get_sequence_stores::<Nucleotide>(body)?;
    let aa_sequences = get_sequence_stores::<AminoAcid>(body)?;
    if body.has_remaining() {
        return Err(decode_error("trailing bytes after partition body"));
    }
    Ok(DatabasePartition {
        sequence_count,
        chunks,
        columns,
        nuc_sequences,
        aa_sequences,
    })
}

fn put_str(buffer: &mut Vec<u8>, value: &str) {
    buffer.put_u32_le(value.len() as u32);
    buffer.put_slice(value.as_bytes());
}

fn get_u32(data: &mut &[u8]) -> Result<u32> {
    if data.remaining() < 4 {
        return Err(decode_error("unexpected end of archive"));
    }
    Ok(data.get_u32_le())
}

fn get_str(data: &mut &[u8]) -> Result<String> {
    let length = get_u32(data)? as usize;
    if data.remaining() < length {
        return Err(decode_error("string extends past end of archive"));
    }
    let current = *data;
    let (bytes, rest) = current.split_at(length);
    let value = String::from_utf8(bytes.to_vec())
        .map_err(|_| decode_error("string is not valid UTF-8"))?;
    *data = rest;
    Ok(value)
}

fn put_bitmap(buffer: &mut Vec<u8>, bitmap: &RoaringBitmap) {
    buffer.put_u32_le(bitmap.serialized_size() as u32);
    bitmap
        .serialize_into(&mut *buffer)
        .expect("serializing into a Vec cannot fail");
}

fn get_bitmap(data: &mut &[u8]) -> Result<RoaringBitmap> {
    let length = get_u32(data)? as usize;
    if data.remaining() < length {
        return Err(decode_error("bitmap extends past end of archive"));
    }
    let current = *data;
    let (bytes, rest) = current.split_at(length);
    let bitmap = RoaringBitmap::deserialize_from(bytes)
        .map_err(|error| decode_error(format!("bad bitmap: {error}")))?;
    *data = rest;
    Ok(bitmap)
}

fn put_chunks(buffer: &mut Vec<u8>, chunks: &[Chunk]) {
    buffer.put_u32_le(chunks.len() as u32);
    for chunk in chunks {
        put_str(buffer, &chunk.key_low);
        put_str(buffer, &chunk.key_high);
        buffer.put_u32_le(chunk.offset);
        buffer.put_u32_le(chunk.count);
    }
}

fn get_chunks(data: &mut &[u8]) -> Result<Vec<Chunk>> {
    let count = get_u32(data)?;
    (0..count)
        .map(|_| {
            Ok(Chunk {
                key_low: get_str(data)?,
                key_high: get_str(data)?,
                offset: get_u32(data)?,
                count: get_u32(data)?,
            })
        })
        .collect()
}

fn put_dictionary(buffer: &mut Vec<u8>, dictionary: &Dictionary) {
    buffer.put_u32_le(dictionary.len() as u32);
    for value in dictionary.values() {
        put_str(buffer, value);
    }
}

fn get_dictionary(data: &mut &[u8]) -> Result<Dictionary> {
    let count = get_u32(data)?;
    let mut dictionary = Dictionary::new();
    for _ in 0..count {
        let value = get_str(data)?;
        dictionary.insert_or_get(&value);
    }
    Ok(dictionary)
}

fn put_bitmaps(buffer: &mut Vec<u8>, bitmaps: &[RoaringBitmap]) {
    buffer.put_u32_le(bitmaps.len() as u32);
    for bitmap in bitmaps {
        put_bitmap(buffer, bitmap);
    }
}

fn get_bitmaps(data: &mut &[u8]) -> Result<Vec<RoaringBitmap>> {
    let count = get_u32(data)?;
    (0..count).map(|_| get_bitmap(data)).collect()
}

fn put_u32s(buffer: &mut Vec<u8>, values: &[u32]) {
    buffer.put_u32_le(values.len() as u32);
    for &value in values {
        buffer.put_u32_le(value);
    }
}

fn get_u32s(data: &mut &[u8]) -> Result<Vec<u32>> {
    let count = get_u32(data)?;
    (0..count).map(|_| get_u32(data)).collect()
}

fn put_column_group(buffer: &mut Vec<u8>, columns: &ColumnGroup) {
    let mut string_names: Vec<_> = columns.string_columns.keys().collect();
    string_names.sort();
    buffer.put_u32_le(string_names.len() as u32);
    for name in string_names {
        let column = &columns.string_columns[name];
        put_str(buffer, name);
        buffer.put_u32_le(column.len() as u32);
        for local_id in 0..column.len() as u32 {
            put_str(buffer, column.get(local_id));
        }
    }

    let mut indexed_names: Vec<_> = columns.indexed_string_columns.keys().collect();
    indexed_names.sort();
    buffer.put_u32_le(indexed_names.len() as u32);
    for name in indexed_names {
        let column = &columns.indexed_string_columns[name];
        put_str(buffer, name);
        put_dictionary(buffer, column.dictionary());
        put_u32s(buffer, column.value_ids());
        put_bitmaps(buffer, column.bitmaps());
    }

    let mut int_names: Vec<_> = columns.int_columns.keys().collect();
    int_names.sort();
    buffer.put_u32_le(int_names.len() as u32);
    for name in int_names {
        let column = &columns.int_columns[name];
        put_str(buffer, name);
        buffer.put_u32_le(column.len() as u32);
        for &value in column.values() {
            buffer.put_i32_le(value);
        }
    }

    let mut float_names: Vec<_> = columns.float_columns.keys().collect();
    float_names.sort();
    buffer.put_u32_le(float_names.len() as u32);
    for name in float_names {
        let column = &columns.float_columns[name];
        put_str(buffer, name);
        buffer.put_u32_le(column.len() as u32);
        for &value in column.values() {
            buffer.put_f64_le(value);
        }
    }

    let mut date_names: Vec<_> = columns.date_columns.keys().collect();
    date_names.sort();
    buffer.put_u32_le(date_names.len() as u32);
    for name in date_names {
        let column = &columns.date_columns[name];
        put_str(buffer, name);
        buffer.put_u8(column.is_sorted() as u8);
        buffer.put_u32_le(column.len() as u32);
        for &value in column.values() {
            buffer.put_i32_le(value.days());
        }
    }

    let mut pango_names: Vec<_> = columns.pango_lineage_columns.keys().collect();
    pango_names.sort();
    buffer.put_u32_le(pango_names.len() as u32);
    for name in pango_names {
        let column = &columns.pango_lineage_columns[name];
        put_str(buffer, name);
        put_dictionary(buffer, column.dictionary());
        put_u32s(buffer, column.value_ids());
        put_bitmaps(buffer, column.lineage_bitmaps());
        put_bitmaps(buffer, column.sublineage_bitmaps());
    }

    let mut insertion_names: Vec<_> = columns.insertion_columns.keys().collect();
    insertion_names.sort();
    buffer.put_u32_le(insertion_names.len() as u32);
    for name in insertion_names {
        let column = &columns.insertion_columns[name];
        put_str(buffer, name);
        put_str(buffer, column.sequence_name());
        buffer.put_u32_le(column.len() as u32);
        for raw in column.raw_values() {
            put_str(buffer, raw);
        }
    }
}

fn get_column_group(data: &mut &[u8]) -> Result<ColumnGroup> {
    let mut columns = ColumnGroup::default();

    for _ in 0..get_u32(data)? {
        let name = get_str(data)?;
        let count = get_u32(data)?;
        let mut column = RawStringColumnPartition::new();
        for _ in 0..count {
            column.insert(&get_str(data)?);
        }
        columns.string_columns.insert(name, column);
    }

    for _ in 0..get_u32(data)? {
        let name = get_str(data)?;
        let dictionary = get_dictionary(data)?;
        let value_ids = get_u32s(data)?;
        let bitmaps = get_bitmaps(data)?;
        columns.indexed_string_columns.insert(
            name,
            IndexedStringColumnPartition::from_parts(value_ids, dictionary, bitmaps),
        );
    }

    for _ in 0..get_u32(data)? {
        let name = get_str(data)?;
        let count = get_u32(data)?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if data.remaining() < 4 {
                return Err(decode_error("unexpected end of archive"));
            }
            values.push(data.get_i32_le());
        }
        columns
            .int_columns
            .insert(name, IntColumnPartition::from_parts(values));
    }

    for _ in 0..get_u32(data)? {
        let name = get_str(data)?;
        let count = get_u32(data)?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if data.remaining() < 8 {
                return Err(decode_error("unexpected end of archive"));
            }
            values.push(data.get_f64_le());
        }
        columns
            .float_columns
            .insert(name, FloatColumnPartition::from_parts(values));
    }

    for _ in 0..get_u32(data)? {
        let name = get_str(data)?;
        if !data.has_remaining() {
            return Err(decode_error("unexpected end of archive"));
        }
        let is_sorted = data.get_u8() != 0;
        let count = get_u32(data)?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if data.remaining() < 4 {
                return Err(decode_error("unexpected end of archive"));
            }
            values.push(Date::from_days(data.get_i32_le()));
        }
        columns
            .date_columns
            .insert(name, DateColumnPartition::from_parts(values, is_sorted));
    }

    for _ in 0..get_u32(data)? {
        let name = get_str(data)?;
        let dictionary = get_dictionary(data)?;
        let value_ids = get_u32s(data)?;
        let lineage_bitmaps = get_bitmaps(data)?;
        let sublineage_bitmaps = get_bitmaps(data)?;
        columns.pango_lineage_columns.insert(
            name,
            PangoLineageColumnPartition::from_parts(
                value_ids,
                dictionary,
                lineage_bitmaps,
                sublineage_bitmaps,
            ),
        );
    }

    for _ in 0..get_u32(data)? {
        let name = get_str(data)?;
        let sequence_name = get_str(data)?;
        let count = get_u32(data)?;
        let mut column = InsertionColumnPartition::new(sequence_name);
        for _ in 0..count {
            let raw = get_str(data)?;
            column
                .insert(&raw)
                .map_err(|message| decode_error(format!("bad insertion value: {message}")))?;
        }
        columns.insertion_columns.insert(name, column);
    }

    Ok(columns)
}

fn put_sequence_stores<S: Symbol>(
    buffer: &mut Vec<u8>,
    stores: &HashMap<String, SequenceStorePartition<S>>,
) {
    let mut names: Vec<_> = stores.keys().collect();
    names.sort();
    buffer.put_u32_le(names.len() as u32);
    for name in names {
        let store = &stores[name];
        put_str(buffer, name);
        let reference: String = store.reference().iter().map(|symbol| symbol.to_char()).collect();
        put_str(buffer, &reference);
        buffer.put_u32_le(store.len() as u32);
        for position_index in 0..store.len() {
            let position = store.position(position_index);
            let flipped = position
                .flipped_symbol()
                .map(|symbol| symbol.index() as u8)
                .unwrap_or(NO_FLIPPED_SYMBOL);
            buffer.put_u8(flipped);
            for (_, bitmap) in position.bitmaps().iter() {
                put_bitmap(buffer, bitmap);
            }
        }
        put_bitmaps(buffer, store.missing_symbol_bitmaps());
        buffer.put_u32_le(store.sequence_count());
    }
}

fn get_sequence_stores<S: Symbol>(
    data: &mut &[u8],
) -> Result<HashMap<String, SequenceStorePartition<S>>> {
    let count = get_u32(data)?;
    let mut stores = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let name = get_str(data)?;
        let reference_text = get_str(data)?;
        let reference: Arc<[S]> = super::sequence::parse_reference(&reference_text)
            .map_err(|error| decode_error(format!("bad reference sequence: {error}")))?;
        let position_count = get_u32(data)? as usize;
        if position_count != reference.len() {
            return Err(decode_error("position count does not match the reference"));
        }
        let mut positions = Vec::with_capacity(position_count);
        for _ in 0..position_count {
            if !data.has_remaining() {
                return Err(decode_error("unexpected end of archive"));
            }
            let flipped_index = data.get_u8();
            let flipped = if flipped_index == NO_FLIPPED_SYMBOL {
                None
            } else {
                Some(S::from_index(flipped_index as usize).ok_or_else(|| {
                    decode_error(format!("invalid flipped symbol index {flipped_index}"))
                })?)
            };
            let mut bitmaps: SymbolMap<S, RoaringBitmap> = SymbolMap::new();
            for (_, slot) in bitmaps.iter_mut() {
                *slot = get_bitmap(data)?;
            }
            positions.push(Position::from_parts(bitmaps, flipped));
        }
        let missing_symbol_bitmaps = get_bitmaps(data)?;
        let sequence_count = get_u32(data)?;
        stores.insert(
            name,
            SequenceStorePartition::from_parts(
                reference,
                positions,
                missing_symbol_bitmaps,
                sequence_count,
            ),
        );
    }
    Ok(stores)
}
