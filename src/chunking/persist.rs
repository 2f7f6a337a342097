//! C8: hashtable persistence. Serializes the index's bucket arrays with
//! run-length encoding of empty/full rows (§4.8), preceded by an integrity
//! digest of the in-memory contents.

use crate::chunking::index::{HashEntry, HashIndex, HashRow, SLOTS};
use crate::error::{EngineError, Result};
use crate::hash128::{hash_once, truncate_strong};

const RECORD_TAG: u8 = b'C';

/// Serialize both tables of `index` into `dst`. Format: `u64 digest`,
/// then for small then large table: `u64 row_count`, then a run-length
/// stream of `'C' | u64 count | u8 used` records (`used=1` followed by
/// `count` encoded rows; `used=0` means `count` consecutive empty rows).
pub fn compress_hashtable(index: &HashIndex, dst: &mut Vec<u8>) -> u64 {
    let (small, large) = index.snapshot_tables();
    let digest = table_digest(&small, &large);
    dst.extend_from_slice(&digest);

    dst.extend_from_slice(&(small.len() as u64).to_le_bytes());
    encode_rows(&small, dst);
    dst.extend_from_slice(&(large.len() as u64).to_le_bytes());
    encode_rows(&large, dst);

    dst.len() as u64
}

fn encode_rows(rows: &[HashRow], dst: &mut Vec<u8>) {
    let mut i = 0usize;
    while i < rows.len() {
        let empty = rows[i].is_empty_row();
        let mut j = i + 1;
        while j < rows.len() && rows[j].is_empty_row() == empty {
            j += 1;
        }
        let count = (j - i) as u64;
        dst.push(RECORD_TAG);
        dst.extend_from_slice(&count.to_le_bytes());
        dst.push(if empty { 0 } else { 1 });
        if !empty {
            for row in &rows[i..j] {
                encode_row(row, dst);
            }
        }
        i = j;
    }
}

fn encode_row(row: &HashRow, dst: &mut Vec<u8>) {
    for slot in 0..SLOTS {
        let key = row.keys[slot];
        dst.extend_from_slice(&key.to_le_bytes());
        if key == 0 {
            return;
        }
        let e = &row.entries[slot];
        dst.extend_from_slice(&e.offset.to_le_bytes());
        dst.extend_from_slice(&e.slide.to_le_bytes());
        dst.push(e.first_byte);
        dst.extend_from_slice(&e.strong);
    }
}

/// Deserialize a hashtable snapshot produced by `compress_hashtable`,
/// verifying the leading digest.
pub fn decompress_hashtable(src: &[u8]) -> Result<HashIndex> {
    if src.len() < 8 {
        return Err(EngineError::Corrupt("hashtable snapshot truncated".into()));
    }
    let stored_digest = &src[0..8];
    let mut cursor = 8usize;

    let small = decode_rows(src, &mut cursor)?;
    let large = decode_rows(src, &mut cursor)?;

    let digest = table_digest(&small, &large);
    if digest != stored_digest {
        return Err(EngineError::Corrupt("hashtable digest mismatch".into()));
    }
    Ok(HashIndex::from_tables(small, large))
}

fn decode_rows(src: &[u8], cursor: &mut usize) -> Result<Vec<HashRow>> {
    let row_count = read_u64(src, cursor)? as usize;
    let mut rows = Vec::with_capacity(row_count);
    while rows.len() < row_count {
        if *cursor >= src.len() || src[*cursor] != RECORD_TAG {
            return Err(EngineError::Corrupt("hashtable record tag mismatch".into()));
        }
        *cursor += 1;
        let count = read_u64(src, cursor)? as usize;
        let used = read_u8(src, cursor)?;
        if used == 0 {
            rows.extend(std::iter::repeat_with(HashRow::default).take(count));
        } else {
            for _ in 0..count {
                rows.push(decode_row(src, cursor)?);
            }
        }
    }
    Ok(rows)
}

fn decode_row(src: &[u8], cursor: &mut usize) -> Result<HashRow> {
    let mut row = HashRow::default();
    for slot in 0..SLOTS {
        let key = read_u32(src, cursor)?;
        row.keys[slot] = key;
        if key == 0 {
            return Ok(row);
        }
        let offset = read_u64(src, cursor)?;
        let slide = read_u16(src, cursor)?;
        let first_byte = read_u8(src, cursor)?;
        let mut strong = [0u8; 12];
        if *cursor + 12 > src.len() {
            return Err(EngineError::Corrupt("hashtable entry truncated".into()));
        }
        strong.copy_from_slice(&src[*cursor..*cursor + 12]);
        *cursor += 12;
        row.entries[slot] = HashEntry {
            offset,
            slide,
            first_byte,
            strong,
        };
    }
    Ok(row)
}

fn read_u8(src: &[u8], cursor: &mut usize) -> Result<u8> {
    if *cursor >= src.len() {
        return Err(EngineError::Corrupt("hashtable truncated".into()));
    }
    let v = src[*cursor];
    *cursor += 1;
    Ok(v)
}

fn read_u16(src: &[u8], cursor: &mut usize) -> Result<u16> {
    if *cursor + 2 > src.len() {
        return Err(EngineError::Corrupt("hashtable truncated".into()));
    }
    let v = u16::from_le_bytes(src[*cursor..*cursor + 2].try_into().unwrap());
    *cursor += 2;
    Ok(v)
}

fn read_u32(src: &[u8], cursor: &mut usize) -> Result<u32> {
    if *cursor + 4 > src.len() {
        return Err(EngineError::Corrupt("hashtable truncated".into()));
    }
    let v = u32::from_le_bytes(src[*cursor..*cursor + 4].try_into().unwrap());
    *cursor += 4;
    Ok(v)
}

fn read_u64(src: &[u8], cursor: &mut usize) -> Result<u64> {
    if *cursor + 8 > src.len() {
        return Err(EngineError::Corrupt("hashtable truncated".into()));
    }
    let v = u64::from_le_bytes(src[*cursor..*cursor + 8].try_into().unwrap());
    *cursor += 8;
    Ok(v)
}

fn table_digest(small: &[HashRow], large: &[HashRow]) -> [u8; 8] {
    let mut buf = Vec::new();
    for rows in [small, large] {
        for row in rows {
            for slot in 0..SLOTS {
                buf.extend_from_slice(&row.keys[slot].to_le_bytes());
                if row.keys[slot] != 0 {
                    buf.extend_from_slice(&row.entries[slot].offset.to_le_bytes());
                }
            }
        }
    }
    let full = hash_once(false, 0, &buf);
    let strong = truncate_strong(full);
    let mut out = [0u8; 8];
    out.copy_from_slice(&strong[..8]);
    out
}
