//! C6: the resolver. Given `(payload, size)` it reconstructs those bytes
//! by following REFERENCE packets back to their literal bases. The
//! REDESIGN FLAGS in spec.md §9 ask for an explicit work-stack instead of
//! unbounded call-stack recursion; this is that stack, not the recursive
//! restatement of the algorithm.

use std::collections::VecDeque;

use crate::container::chunktab::ChunkEntry;
use crate::error::{EngineError, Result};
use crate::packet::{self, PacketKind};

/// Read access the resolver needs from the archive container: locate the
/// chunk covering a payload offset, and fetch its raw packet stream.
pub trait ChunkSource {
    fn find_chunk(&self, payload: u64) -> Result<ChunkEntry>;
    /// Raw bytes of every packet in the chunk, back to back, starting at
    /// `entry.archive_offset`.
    fn read_chunk_bytes(&self, entry: &ChunkEntry) -> Result<Vec<u8>>;
}

/// Small most-recently-used cache of decoded chunk byte streams, keyed by
/// archive offset. Disabled (capacity 0) unless the caller opts in — the
/// original implementation's always-miss `chunk_cache` is treated as dead
/// code, not reproduced (§9 open questions).
pub struct ChunkCache {
    capacity: usize,
    entries: VecDeque<(u64, std::rc::Rc<Vec<u8>>)>,
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    fn get(&mut self, archive_offset: u64) -> Option<std::rc::Rc<Vec<u8>>> {
        if let Some(pos) = self.entries.iter().position(|(off, _)| *off == archive_offset) {
            let entry = self.entries.remove(pos).unwrap();
            let bytes = entry.1.clone();
            self.entries.push_front(entry);
            Some(bytes)
        } else {
            None
        }
    }

    fn put(&mut self, archive_offset: u64, bytes: std::rc::Rc<Vec<u8>>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front((archive_offset, bytes));
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }
}

/// One decoded packet positioned at an absolute payload offset within its
/// chunk, used while walking a chunk's packet stream.
struct PositionedPacket {
    payload: u64,
    kind: PacketKind,
    payload_length: u32,
    payload_ref: u64,
    body_start: usize,
    packet_size: usize,
}

fn decode_chunk_packets(bytes: &[u8], chunk_payload: u64) -> Result<Vec<PositionedPacket>> {
    let mut packets = Vec::new();
    let mut cursor = 0usize;
    let mut payload = chunk_payload;
    while cursor < bytes.len() {
        let info = packet::info(&bytes[cursor..])?;
        packets.push(PositionedPacket {
            payload,
            kind: info.kind,
            payload_length: info.payload_length,
            payload_ref: info.payload_ref,
            body_start: cursor,
            packet_size: info.packet_size as usize,
        });
        payload += info.payload_length as u64;
        cursor += info.packet_size as usize;
    }
    Ok(packets)
}

/// A pending unit of work: resolve `[payload, payload+size)` and append
/// the result to `buffers[into]`.
struct ResolveTask {
    payload: u64,
    size: u64,
    into: usize,
}

/// After `buffers[from]` has been fully resolved, copy `[skip, skip+take)`
/// of it into `buffers[into]`. This is the explicit stand-in for "a
/// recursive call returned, now use its result".
struct CopyTask {
    from: usize,
    skip: u64,
    take: u64,
    into: usize,
}

enum Work {
    Resolve(ResolveTask),
    Copy(CopyTask),
}

/// `resolve(payload, size, dst, archive)`: reconstruct `size` bytes
/// starting at `payload` into `dst`, using an explicit stack so recursion
/// depth never depends on call-stack size.
pub fn resolve(
    source: &dyn ChunkSource,
    payload: u64,
    size: u64,
    dst: &mut Vec<u8>,
    cache: &mut ChunkCache,
) -> Result<()> {
    let mut buffers: Vec<Vec<u8>> = vec![Vec::new()];
    let mut stack: Vec<Work> = vec![Work::Resolve(ResolveTask { payload, size, into: 0 })];

    while let Some(work) = stack.pop() {
        match work {
            Work::Copy(c) => {
                let slice = {
                    let buf = &buffers[c.from];
                    let start = c.skip as usize;
                    let end = start + c.take as usize;
                    if end > buf.len() {
                        return Err(EngineError::Corrupt("resolved reference shorter than expected".into()));
                    }
                    buf[start..end].to_vec()
                };
                buffers[c.into].extend_from_slice(&slice);
            }
            Work::Resolve(r) => {
                resolve_one(source, r, &mut buffers, &mut stack, cache)?;
            }
        }
    }

    dst.extend_from_slice(&buffers[0]);
    Ok(())
}

fn resolve_one(
    source: &dyn ChunkSource,
    task: ResolveTask,
    buffers: &mut Vec<Vec<u8>>,
    stack: &mut Vec<Work>,
    cache: &mut ChunkCache,
) -> Result<()> {
    let mut payload = task.payload;
    let mut remaining = task.size;
    let into = task.into;

    while remaining > 0 {
        let entry = source.find_chunk(payload)?;
        let raw = match cache.get(entry.archive_offset) {
            Some(bytes) => bytes,
            None => {
                let bytes = std::rc::Rc::new(source.read_chunk_bytes(&entry)?);
                cache.put(entry.archive_offset, bytes.clone());
                bytes
            }
        };
        let packets = decode_chunk_packets(&raw, entry.payload)?;

        let mut consumed_this_chunk = 0u64;
        for p in &packets {
            let p_end = p.payload + p.payload_length as u64;
            if p_end <= payload {
                continue;
            }
            if p.payload >= payload + remaining {
                break;
            }
            let overlap_start = payload.max(p.payload);
            let overlap_end = (payload + remaining).min(p_end);
            let overlap_len = overlap_end - overlap_start;
            let skip_in_packet = overlap_start - p.payload;

            match p.kind {
                PacketKind::Literal => {
                    let mut body = Vec::new();
                    packet::decode(&raw[p.body_start..p.body_start + p.packet_size], &mut body)?;
                    let start = skip_in_packet as usize;
                    let end = start + overlap_len as usize;
                    if end > body.len() {
                        return Err(EngineError::Corrupt("literal packet shorter than header claims".into()));
                    }
                    buffers[into].extend_from_slice(&body[start..end]);
                }
                PacketKind::Reference => {
                    let child = buffers.len();
                    buffers.push(Vec::new());
                    // Order matters: Work is a stack, so push the copy
                    // (which must run *after* the child resolves) before
                    // pushing the child's own resolve task.
                    stack.push(Work::Copy(CopyTask {
                        from: child,
                        skip: skip_in_packet,
                        take: overlap_len,
                        into,
                    }));
                    stack.push(Work::Resolve(ResolveTask {
                        payload: p.payload_ref,
                        size: p.payload_length as u64,
                        into: child,
                    }));
                }
            }
            consumed_this_chunk += overlap_len;
            payload += overlap_len;
            remaining -= overlap_len;
            if remaining == 0 {
                break;
            }
        }

        if consumed_this_chunk == 0 {
            return Err(EngineError::Corrupt(format!(
                "payload offset {payload} not covered by any packet in its chunk"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{HashIndex, Matcher};
    use crate::config::EngineConfig;
    use crate::container::chunktab::ChunkIndex;
    use crate::stats::Stats;
    use std::cell::RefCell;

    struct MemArchive {
        chunks: ChunkIndex,
        bytes: RefCell<Vec<u8>>,
    }

    impl ChunkSource for MemArchive {
        fn find_chunk(&self, payload: u64) -> Result<ChunkEntry> {
            let i = self.chunks.find_chunk(payload)?;
            Ok(*self.chunks.get(i).unwrap())
        }

        fn read_chunk_bytes(&self, entry: &ChunkEntry) -> Result<Vec<u8>> {
            let bytes = self.bytes.borrow();
            let start = entry.archive_offset as usize;
            let end = start + entry.compressed_length as usize;
            Ok(bytes[start..end].to_vec())
        }
    }

    fn build_archive(chunks: &[(u64, Vec<u8>)]) -> MemArchive {
        let mut index = ChunkIndex::new();
        let mut bytes = Vec::new();
        for (payload, packets) in chunks {
            let offset = bytes.len() as u64;
            index.push(ChunkEntry {
                archive_offset: offset,
                payload: *payload,
                payload_length: packets_payload_len(packets),
                compressed_length: packets.len() as u32,
            });
            bytes.extend_from_slice(packets);
        }
        MemArchive { chunks: index, bytes: RefCell::new(bytes) }
    }

    fn packets_payload_len(packets: &[u8]) -> u32 {
        let mut total = 0u32;
        let mut cursor = 0usize;
        while cursor < packets.len() {
            let info = packet::info(&packets[cursor..]).unwrap();
            total += info.payload_length;
            cursor += info.packet_size as usize;
        }
        total
    }

    #[test]
    fn resolve_single_literal_chunk() {
        let mut packets = Vec::new();
        packet::encode_literal(&mut packets, b"hello\n", 2, false).unwrap();
        let archive = build_archive(&[(0, packets)]);
        let mut cache = ChunkCache::disabled();
        let mut out = Vec::new();
        resolve(&archive, 0, 6, &mut out, &mut cache).unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[test]
    fn resolve_follows_reference_packet() {
        let config = {
            let mut c = EngineConfig::default();
            c.small_block = 256;
            c.large_block = 1024;
            c.memory_budget = 2 * 1024 * 1024;
            c
        };
        let index = HashIndex::new(config.memory_budget);
        let stats = Stats::new();
        let matcher = Matcher::new(&index, &config, &stats);

        let a: Vec<u8> = (0..2048u32).map(|i| ((i * 31 + 7) % 251) as u8).collect();

        matcher.hash_chunk(&a, 0);
        let mut first_packets = Vec::new();
        matcher.process_chunk(&a, 0, false, &mut first_packets).unwrap();

        matcher.hash_chunk(&a, a.len() as u64);
        let mut second_packets = Vec::new();
        matcher
            .process_chunk(&a, a.len() as u64, false, &mut second_packets)
            .unwrap();

        let archive = build_archive(&[(0, first_packets), (a.len() as u64, second_packets)]);
        let mut cache = ChunkCache::disabled();
        let mut out = Vec::new();
        resolve(&archive, 0, a.len() as u64 * 2, &mut out, &mut cache).unwrap();

        let mut expected = a.clone();
        expected.extend_from_slice(&a);
        assert_eq!(out, expected);
    }

    #[test]
    fn chunk_cache_serves_repeated_reads() {
        let mut packets = Vec::new();
        packet::encode_literal(&mut packets, b"cached bytes", 2, false).unwrap();
        let archive = build_archive(&[(0, packets)]);
        let mut cache = ChunkCache::new(4);
        let mut out1 = Vec::new();
        resolve(&archive, 0, 12, &mut out1, &mut cache).unwrap();
        let mut out2 = Vec::new();
        resolve(&archive, 0, 12, &mut out2, &mut cache).unwrap();
        assert_eq!(out1, out2);
    }
}
