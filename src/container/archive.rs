//! C7: the archive container. Ties together the header, payload stream,
//! chunk index, contents table(s), backup set(s), and hashtable snapshot
//! into the on-disk layout in §4.7, including tail-first reading and
//! append-only differential updates.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::sync::Arc;

use tracing::{info_span, warn};

use crate::chunking::{persist, HashIndex};
use crate::config::EngineConfig;
use crate::container::backupset::{self, BackupSet};
use crate::container::chunktab::{ChunkEntry, ChunkIndex};
use crate::container::contents::{self, FileRecord};
use crate::container::header::Header;
use crate::error::{EngineError, Result};
use crate::resolve::ChunkSource;

const PAYLOAD_TAG: &[u8; 8] = b"PAYLOADP";
const HASHTBLE_TAG: &[u8; 8] = b"HASHTBLE";
const FOOTER: &[u8; 3] = b"END";

/// One backup set's persisted metadata: the files it named and the
/// summary record appended alongside it.
#[derive(Clone, Debug)]
pub struct Increment {
    pub records: Vec<FileRecord>,
    pub set: BackupSet,
}

/// In-memory model of an archive's structure, independent of how its
/// bytes are stored. Backup/restore operate through this; `save`/`load`
/// are the only points that touch a file.
pub struct Archive {
    pub header: Header,
    pub payload_section_start: u64,
    pub chunks: ChunkIndex,
    pub increments: Vec<Increment>,
    pub hash_index: Arc<HashIndex>,
    payload_bytes: Vec<u8>,
}

impl Archive {
    /// Start a fresh archive for a new backup session.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            header: Header::new(
                config.small_block as u64,
                config.large_block as u64,
                config.hash_seed as u32,
                config.memory_budget,
            ),
            payload_section_start: crate::container::header::HEADER_LEN as u64 + 8,
            chunks: ChunkIndex::new(),
            increments: Vec::new(),
            hash_index: Arc::new(HashIndex::new(config.memory_budget)),
            payload_bytes: Vec::new(),
        }
    }

    pub fn total_payload_bytes(&self) -> u64 {
        self.chunks.total_payload()
    }

    /// Append one worker-emitted chunk's packet stream as a new chunk
    /// record (§3: chunks are recorded once at emit, read-only after).
    pub fn record_chunk(&mut self, payload: u64, payload_length: u32, packet_bytes: &[u8]) {
        let archive_offset = self.payload_section_start + self.payload_bytes.len() as u64;
        self.chunks.push(ChunkEntry {
            archive_offset,
            payload,
            payload_length,
            compressed_length: packet_bytes.len() as u32,
        });
        self.payload_bytes.extend_from_slice(packet_bytes);
    }

    /// Append a completed backup set and its contents table (§3
    /// lifecycles: "appended atomically at end of a successful backup").
    pub fn append_increment(&mut self, records: Vec<FileRecord>, set: BackupSet) {
        self.increments.push(Increment { records, set });
    }

    /// Write the full archive to `path` (fresh backup or the final write
    /// of a differential append), following §4.7's section order.
    pub fn save(&mut self, path: &std::path::Path) -> Result<()> {
        let span = info_span!("archive_save", path = %path.display());
        let _enter = span.enter();

        let mut out = Vec::new();
        out.extend_from_slice(&self.header.encode());

        out.extend_from_slice(PAYLOAD_TAG);
        out.extend_from_slice(&self.payload_bytes);
        out.push(b'X');
        let payload_section_len = (8 + self.payload_bytes.len() + 1 + 8) as u64;
        out.extend_from_slice(&payload_section_len.to_le_bytes());

        self.chunks.encode(&mut out);

        for increment in &self.increments {
            contents::encode(&increment.records, &mut out);
            backupset::encode(&increment.set, &mut out);
        }

        // last_good_offset marks the end of the last section that is safe
        // to read even if the hashtable write below is interrupted or the
        // tail gets truncated (§4.7 crash recovery).
        self.header.last_good_offset = out.len() as u64;
        out[0..crate::container::header::HEADER_LEN].copy_from_slice(&self.header.encode());

        out.extend_from_slice(HASHTBLE_TAG);
        let mut payload = Vec::new();
        let size = persist::compress_hashtable(&self.hash_index, &mut payload);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&payload);
        // Trailer encodes the whole section's on-disk length, itself
        // included, matching the convention every other section uses.
        out.extend_from_slice(&(8 + 8 + size as u64 + 8).to_le_bytes());

        out.extend_from_slice(FOOTER);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&out)?;
        file.sync_all()?;
        Ok(())
    }

    /// Open an existing archive tail-first (§4.7): read the footer if
    /// present, otherwise fall back to `last_good_offset` from the
    /// header, then walk the section trailer chain backwards.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let span = info_span!("archive_open", path = %path.display());
        let _enter = span.enter();

        let mut file = File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let header = Header::decode(&bytes)?;
        let clean_end = if bytes.ends_with(FOOTER) {
            bytes.len() - FOOTER.len()
        } else {
            warn!("archive footer missing, falling back to last_good_offset");
            header.last_good_offset as usize
        };
        if clean_end > bytes.len() {
            return Err(EngineError::Corrupt("last_good_offset past end of file".into()));
        }

        let body = &bytes[..clean_end];
        let payload_section_start = crate::container::header::HEADER_LEN as u64 + 8;
        let after_header = crate::container::header::HEADER_LEN;
        if body.len() < after_header + 8 || &body[after_header..after_header + 8] != PAYLOAD_TAG {
            return Err(EngineError::Corrupt("missing PAYLOADP tag".into()));
        }

        let mut cursor = body.len();
        let mut hash_index = None;
        let mut increments_rev: Vec<Increment> = Vec::new();
        let mut chunks = None;

        while cursor > after_header {
            let length = u64::from_le_bytes(
                body[cursor - 8..cursor]
                    .try_into()
                    .map_err(|_| EngineError::Corrupt("section trailer truncated".into()))?,
            ) as usize;
            if length == 0 {
                break;
            }
            let section_start = cursor
                .checked_sub(length)
                .ok_or_else(|| EngineError::Corrupt("section length exceeds remaining body".into()))?;
            let tag: [u8; 8] = body[section_start..section_start + 8]
                .try_into()
                .map_err(|_| EngineError::Corrupt("section tag truncated".into()))?;

            match &tag {
                HASHTBLE_TAG => {
                    let size = u64::from_le_bytes(body[section_start + 8..section_start + 16].try_into().unwrap()) as usize;
                    let payload = &body[section_start + 16..section_start + 16 + size];
                    hash_index = Some(persist::decompress_hashtable(payload)?);
                }
                b if b == backupset::TAG => {
                    let (set, _) = backupset::decode(&body[section_start..cursor])?;
                    increments_rev.push(Increment { records: Vec::new(), set });
                }
                b if b == contents::TAG => {
                    let (records, _) = contents::decode(&body[section_start..cursor])?;
                    if let Some(last) = increments_rev.last_mut() {
                        last.records = records;
                    }
                }
                b if b == crate::container::chunktab::TAG => {
                    let (idx, _) = ChunkIndex::decode(&body[section_start..cursor])?;
                    chunks = Some(idx);
                }
                _ if section_start == after_header => {
                    break;
                }
                _ => {
                    return Err(EngineError::Corrupt(format!(
                        "unrecognized section tag at offset {section_start}"
                    )));
                }
            }
            cursor = section_start;
        }

        let chunks = chunks.unwrap_or_else(ChunkIndex::new);
        chunks.validate_tiling()?;
        increments_rev.reverse();

        let payload_bytes_end = body.len();
        let payload_bytes = if chunks.is_empty() {
            Vec::new()
        } else {
            let first = chunks.get(0).unwrap();
            let last_archive_end = chunks
                .iter()
                .map(|c| c.archive_offset + c.compressed_length as u64)
                .max()
                .unwrap_or(first.archive_offset);
            body[payload_section_start as usize..last_archive_end.min(payload_bytes_end as u64) as usize].to_vec()
        };

        Ok(Self {
            header,
            payload_section_start,
            chunks,
            increments: increments_rev,
            hash_index: Arc::new(hash_index.unwrap_or_else(|| HashIndex::new(header.memory))),
            payload_bytes,
        })
    }

    pub fn commit_last_good(&mut self, offset: u64) {
        self.header.last_good_offset = offset;
    }
}

impl ChunkSource for Archive {
    fn find_chunk(&self, payload: u64) -> Result<ChunkEntry> {
        let i = self.chunks.find_chunk(payload)?;
        Ok(*self.chunks.get(i).unwrap())
    }

    fn read_chunk_bytes(&self, entry: &ChunkEntry) -> Result<ChunkBytesOwned> {
        let start = (entry.archive_offset - self.payload_section_start) as usize;
        let end = start + entry.compressed_length as usize;
        if end > self.payload_bytes.len() {
            return Err(EngineError::Corrupt("chunk bytes out of range".into()));
        }
        Ok(self.payload_bytes[start..end].to_vec())
    }
}

type ChunkBytesOwned = Vec<u8>;
