//! C3: the matcher. Locates duplicate byte ranges against the hash index
//! (large-block pass then small-block pass with coalescing) and turns a
//! chunk of payload into a sequence of packets.

use tracing::trace;

use crate::chunking::index::{HashEntry, HashIndex};
use crate::chunking::window::window;
use crate::config::{EngineConfig, MAX_LITERAL_SIZE};
use crate::hash128::{hash_once, truncate_strong};
use crate::packet;
use crate::stats::Stats;

/// A duplicate region found against the index: `position` is the offset
/// within the scanned slice where the match starts, `source_payload` is
/// the absolute payload offset it duplicates, `length` is the run length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub position: usize,
    pub source_payload: u64,
    pub length: usize,
}

/// Adaptive skip distances used when a window's candidate fails strong-hash
/// confirmation (§4.3 step 3).
const SKIP_NORMAL: usize = 32;
const SKIP_AFTER_RECENT_COLLISION: usize = 1024;
const RECENT_COLLISION_WINDOW: usize = 1024;

pub struct Matcher<'a> {
    pub index: &'a HashIndex,
    pub config: &'a EngineConfig,
    pub stats: &'a Stats,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a HashIndex, config: &'a EngineConfig, stats: &'a Stats) -> Self {
        Self { index, config, stats }
    }

    fn strong_hash(&self, bytes: &[u8]) -> [u8; 12] {
        truncate_strong(hash_once(self.config.crypto_hash, self.config.hash_seed, bytes))
    }

    /// §4.3 `find_match`: scan `src` for a duplicate of `block_size` bytes
    /// against the index, relative to `absolute_payload` (the payload
    /// coordinate of `src[0]`).
    pub fn find_match(
        &self,
        src: &[u8],
        absolute_payload: u64,
        block_size: usize,
        large: bool,
    ) -> Option<Match> {
        let mut cursor = 0usize;
        let mut last_collision_at: Option<usize> = None;

        while cursor + block_size <= src.len() {
            let (anchor_off, w) = window(&src[cursor..], block_size, large);
            if w == 0 {
                cursor += (anchor_off + 1).max(1);
                continue;
            }
            let anchor = cursor + anchor_off;
            if anchor + block_size > src.len() {
                break;
            }

            let candidate = self.index.lookup(w, large);
            if let Some(entry) = candidate {
                if self.confirm(src, anchor, entry, block_size, absolute_payload) {
                    return Some(Match {
                        position: anchor - entry.slide as usize,
                        source_payload: entry.offset,
                        length: block_size,
                    });
                }
                last_collision_at = Some(anchor);
            }

            let skip = match last_collision_at {
                Some(at) if anchor.saturating_sub(at) < RECENT_COLLISION_WINDOW => {
                    SKIP_AFTER_RECENT_COLLISION
                }
                _ => SKIP_NORMAL,
            };
            let mut next = anchor + skip.max(1);
            // Skip identical-byte runs so a long run of one byte value
            // does not re-probe every position.
            if next < src.len() {
                let b = src[anchor];
                while next < src.len() && src[next] == b {
                    next += 1;
                }
            }
            cursor = next.max(cursor + 1);
        }
        None
    }

    /// The reference must strictly precede the position it would be
    /// written from (§3 invariants) — `current_absolute` is that bound.
    fn confirm(
        &self,
        src: &[u8],
        anchor: usize,
        entry: HashEntry,
        block_size: usize,
        absolute_payload: u64,
    ) -> bool {
        let start = match anchor.checked_sub(entry.slide as usize) {
            Some(s) => s,
            None => return false,
        };
        if start + block_size > src.len() {
            return false;
        }
        if src[start] != entry.first_byte {
            return false;
        }
        let current_absolute = absolute_payload + start as u64;
        if entry.offset + block_size as u64 > current_absolute {
            return false;
        }
        let region = &src[start..start + block_size];
        let strong = self.strong_hash(region);
        strong == entry.strong
    }

    /// §4.3 `hash_chunk`: index every non-overlapping small block, plus a
    /// hierarchical large-block hash every `LARGE_BLOCK/SMALL_BLOCK` small
    /// blocks. Insertion failures increment congestion counters; never fatal.
    pub fn hash_chunk(&self, src: &[u8], payload: u64) {
        let small = self.config.small_block;
        let large = self.config.large_block;
        let ratio = large / small;

        let mut small_strongs: Vec<[u8; 12]> = Vec::new();
        let mut i = 0usize;
        while i + small <= src.len() {
            let block = &src[i..i + small];
            let (anchor_off, w) = window(block, small, false);
            let strong = self.strong_hash(block);
            small_strongs.push(strong);
            if w != 0 {
                // w != 0 means window() found a real anchor, so anchor_off
                // is a scan position < slide <= 65536 and always fits u16.
                debug_assert!(anchor_off <= u16::MAX as usize);
                let entry = HashEntry {
                    offset: payload + i as u64,
                    slide: anchor_off as u16,
                    first_byte: block[0],
                    strong,
                };
                if !self.index.insert(w, entry, false) {
                    self.stats.congested_small.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    trace!(offset = entry.offset, "small index congestion");
                }
            }
            if small_strongs.len() % ratio == 0 {
                let base = small_strongs.len() - ratio;
                let large_offset = payload + (base * small) as u64;
                let large_region_start = i + small - large;
                let large_block = &src[large_region_start..large_region_start + large];
                let (anchor_off, w) = window(large_block, large, true);
                if w != 0 {
                    debug_assert!(anchor_off <= u16::MAX as usize);
                    let mut hier = Vec::with_capacity(ratio * 12);
                    for s in &small_strongs[base..base + ratio] {
                        hier.extend_from_slice(s);
                    }
                    let strong = self.strong_hash(&hier);
                    let entry = HashEntry {
                        offset: large_offset,
                        slide: anchor_off as u16,
                        first_byte: large_block[0],
                        strong,
                    };
                    if !self.index.insert(w, entry, true) {
                        self.stats.congested_large.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        trace!(offset = entry.offset, "large index congestion");
                    }
                }
            }
            i += small;
        }
    }

    /// §4.3 `process_chunk`: outer loop over large-block matches, inner
    /// loop over small-block matches with coalescing, literal packets
    /// capped at `MAX_LITERAL_SIZE`.
    pub fn process_chunk(
        &self,
        src: &[u8],
        payload: u64,
        entropy: bool,
        out: &mut Vec<u8>,
    ) -> Result<(), crate::error::EngineError> {
        if entropy {
            packet::encode_literal(out, src, self.config.level, true)?;
            self.stats.high_entropy_bytes.fetch_add(src.len() as u64, std::sync::atomic::Ordering::Relaxed);
            return Ok(());
        }

        let large_block = self.config.large_block;

        let mut outer = 0usize;
        while outer < src.len() {
            let remaining = src.len() - outer;
            let large_match = if remaining >= large_block {
                self.find_match(&src[outer..], payload + outer as u64, large_block, true)
            } else {
                None
            };

            let region_end = match large_match {
                Some(m) => outer + m.position,
                None => src.len(),
            };

            self.emit_small_pass(src, payload, outer, region_end, out)?;

            if let Some(m) = large_match {
                self.stats.large_hits.fetch_add(m.length as u64, std::sync::atomic::Ordering::Relaxed);
                let len = m.length.min(src.len() - (outer + m.position));
                packet::encode_reference(out, m.source_payload, len as u32);
                outer += m.position + large_block;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn emit_small_pass(
        &self,
        src: &[u8],
        payload: u64,
        mut cursor: usize,
        region_end: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), crate::error::EngineError> {
        let small_block = self.config.small_block;
        let mut literal_start = cursor;

        while cursor < region_end {
            let remaining = region_end - cursor;
            if remaining < small_block {
                break;
            }
            let m = self.find_match(
                &src[cursor..region_end],
                payload + cursor as u64,
                small_block,
                false,
            );
            match m {
                Some(mut found) => {
                    let match_start = cursor + found.position;
                    self.flush_literal(src, literal_start, match_start, out)?;

                    // Coalesce consecutive small-block matches whose
                    // source offsets are themselves consecutive.
                    let mut total_len = found.length;
                    let mut probe = match_start + found.length;
                    let mut next_source = found.source_payload + found.length as u64;
                    while probe + small_block <= region_end {
                        match self.find_match(
                            &src[probe..region_end],
                            payload + probe as u64,
                            small_block,
                            false,
                        ) {
                            Some(next) if probe + next.position == probe && next.source_payload == next_source => {
                                total_len += next.length;
                                probe += next.length;
                                next_source += next.length as u64;
                            }
                            _ => break,
                        }
                    }
                    found.length = total_len;
                    self.stats.small_hits.fetch_add(total_len as u64, std::sync::atomic::Ordering::Relaxed);
                    packet::encode_reference(out, found.source_payload, total_len as u32);
                    cursor = match_start + total_len;
                    literal_start = cursor;
                }
                None => break,
            }
        }
        self.flush_literal(src, literal_start, region_end, out)
    }

    fn flush_literal(
        &self,
        src: &[u8],
        start: usize,
        end: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), crate::error::EngineError> {
        let mut pos = start;
        while pos < end {
            let take = (end - pos).min(MAX_LITERAL_SIZE);
            let compressed = packet::encode_literal(out, &src[pos..pos + take], self.config.level, false)?;
            if !compressed {
                self.stats.stored_as_literals.fetch_add(take as u64, std::sync::atomic::Ordering::Relaxed);
            }
            pos += take;
        }
        Ok(())
    }
}
