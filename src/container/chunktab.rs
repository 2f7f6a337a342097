//! Chunk index: the `CHUNKSCH` section (§4.7). Chunks are totally ordered
//! by `payload` and partition `[0, total_payload)` with no gaps or overlaps
//! (§3 invariants), so restore locates one by binary search.

use crate::error::{EngineError, Result};

pub const TAG: &[u8; 8] = b"CHUNKSCH";

/// One persisted chunk: a contiguous run of packets written atomically by
/// a single worker invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkEntry {
    pub archive_offset: u64,
    pub payload: u64,
    pub payload_length: u32,
    pub compressed_length: u32,
}

/// Sorted, gap-free view over the archive's chunks. Construction does not
/// re-validate the tiling invariant — callers that load from disk should
/// call `validate_tiling` once after building.
#[derive(Clone, Debug, Default)]
pub struct ChunkIndex {
    chunks: Vec<ChunkEntry>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    pub fn from_sorted(chunks: Vec<ChunkEntry>) -> Self {
        Self { chunks }
    }

    pub fn push(&mut self, entry: ChunkEntry) {
        self.chunks.push(entry);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkEntry> {
        self.chunks.iter()
    }

    pub fn total_payload(&self) -> u64 {
        self.chunks
            .last()
            .map(|c| c.payload + c.payload_length as u64)
            .unwrap_or(0)
    }

    /// `find_chunk(payload)`: binary search for the unique chunk whose
    /// range `[payload, payload + payload_length)` contains `payload`.
    pub fn find_chunk(&self, payload: u64) -> Result<usize> {
        match self
            .chunks
            .binary_search_by(|c| c.payload.cmp(&payload))
        {
            Ok(i) => Ok(i),
            Err(0) => Err(EngineError::Corrupt(format!(
                "payload offset {payload} precedes first chunk"
            ))),
            Err(i) => {
                let c = &self.chunks[i - 1];
                if payload < c.payload + c.payload_length as u64 {
                    Ok(i - 1)
                } else {
                    Err(EngineError::Corrupt(format!(
                        "payload offset {payload} falls in a chunk gap"
                    )))
                }
            }
        }
    }

    pub fn get(&self, i: usize) -> Option<&ChunkEntry> {
        self.chunks.get(i)
    }

    /// Verify chunks partition `[0, total)` with no gaps or overlaps.
    pub fn validate_tiling(&self) -> Result<()> {
        let mut expected = 0u64;
        for c in &self.chunks {
            if c.payload != expected {
                return Err(EngineError::Corrupt(format!(
                    "chunk tiling gap/overlap at payload {expected}, chunk starts {}",
                    c.payload
                )));
            }
            expected += c.payload_length as u64;
        }
        Ok(())
    }

    pub fn encode(&self, dst: &mut Vec<u8>) {
        let start = dst.len();
        dst.extend_from_slice(TAG);
        dst.extend_from_slice(&(self.chunks.len() as u64).to_le_bytes());
        for c in &self.chunks {
            dst.extend_from_slice(&c.archive_offset.to_le_bytes());
            dst.extend_from_slice(&c.payload.to_le_bytes());
            dst.extend_from_slice(&c.payload_length.to_le_bytes());
            dst.extend_from_slice(&c.compressed_length.to_le_bytes());
        }
        dst.extend_from_slice(&0u32.to_le_bytes());
        let length = (dst.len() - start + 8) as u64;
        dst.extend_from_slice(&length.to_le_bytes());
    }

    pub fn decode(src: &[u8]) -> Result<(Self, usize)> {
        if src.len() < 8 || &src[0..8] != TAG {
            return Err(EngineError::Corrupt("missing CHUNKSCH tag".into()));
        }
        let mut cursor = 8usize;
        let n = read_u64(src, &mut cursor)? as usize;
        let mut chunks = Vec::with_capacity(n);
        for _ in 0..n {
            let archive_offset = read_u64(src, &mut cursor)?;
            let payload = read_u64(src, &mut cursor)?;
            let payload_length = read_u32(src, &mut cursor)?;
            let compressed_length = read_u32(src, &mut cursor)?;
            chunks.push(ChunkEntry {
                archive_offset,
                payload,
                payload_length,
                compressed_length,
            });
        }
        let terminator = read_u32(src, &mut cursor)?;
        if terminator != 0 {
            return Err(EngineError::Corrupt("CHUNKSCH missing terminator".into()));
        }
        let _length = read_u64(src, &mut cursor)?;
        Ok((Self { chunks }, cursor))
    }
}

fn read_u32(src: &[u8], cursor: &mut usize) -> Result<u32> {
    if *cursor + 4 > src.len() {
        return Err(EngineError::Corrupt("CHUNKSCH truncated".into()));
    }
    let v = u32::from_le_bytes(src[*cursor..*cursor + 4].try_into().unwrap());
    *cursor += 4;
    Ok(v)
}

fn read_u64(src: &[u8], cursor: &mut usize) -> Result<u64> {
    if *cursor + 8 > src.len() {
        return Err(EngineError::Corrupt("CHUNKSCH truncated".into()));
    }
    let v = u64::from_le_bytes(src[*cursor..*cursor + 8].try_into().unwrap());
    *cursor += 8;
    Ok(v)
}
