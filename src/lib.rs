#![forbid(unsafe_code)]

//! `dupcore`: a content-defined deduplicating archive engine. A
//! [`chunking`] matcher turns payload bytes into [`packet`]s against a
//! shared [`chunking::HashIndex`], a [`pipeline`] of worker threads does
//! that concurrently while preserving order, [`resolve`] reconstructs
//! payload ranges by following reference packets, and [`container`]
//! assembles/parses the on-disk archive that holds all of it.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod chunking;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod hash128;
pub mod packet;
pub mod pipeline;
pub mod resolve;
pub mod stats;

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::info_span;

use chunking::HashIndex;
use config::EngineConfig;
use error::Result;
use pipeline::Pipeline;
use stats::{Stats, StatsSnapshot};

pub use error::EngineError;
pub use packet::{PacketInfo, PacketKind};

/// Compression side of the engine (`dup_init_compression`/`dup_compress`/
/// `dup_flush_pend_block`/`dup_uninit_compression`). Owns the hash index,
/// the worker pipeline, and the stats counters for one compression
/// session; dropping it tears the pipeline down.
pub struct Engine {
    index: Arc<HashIndex>,
    stats: Arc<Stats>,
    pipeline: Pipeline,
    emit: Box<dyn FnMut(&[u8]) + Send>,
    pending_chunks: VecDeque<(u64, u32)>,
    unassigned: Vec<u8>,
}

impl Engine {
    /// Build a session around a freshly created hash index. Packets are
    /// delivered to `emit`, one call per originally-submitted chunk, as
    /// soon as that chunk's packets are fully ready.
    pub fn new(config: EngineConfig, emit: Box<dyn FnMut(&[u8]) + Send>) -> Result<Self> {
        let index = Arc::new(HashIndex::new(config.memory_budget));
        Self::with_index(config, index, emit)
    }

    /// Build a session reusing an existing hash index, e.g. one restored
    /// from a prior session's `HASHTBLE` section for a differential
    /// append.
    pub fn with_index(
        config: EngineConfig,
        index: Arc<HashIndex>,
        emit: Box<dyn FnMut(&[u8]) + Send>,
    ) -> Result<Self> {
        config.validate()?;
        let stats = Arc::new(Stats::new());
        let pipeline = Pipeline::new(config, index.clone(), stats.clone());
        Ok(Self {
            index,
            stats,
            pipeline,
            emit,
            pending_chunks: VecDeque::new(),
            unassigned: Vec::new(),
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn index(&self) -> &Arc<HashIndex> {
        &self.index
    }

    /// `dup_compress`: submit one externally-chunked buffer. Blocks only
    /// long enough to find an idle worker; the actual matching happens
    /// concurrently, and previously-submitted chunks may reach `emit`
    /// before this call returns.
    pub fn compress(&mut self, src: &[u8], entropy: bool) -> Result<()> {
        let span = info_span!("engine_compress", len = src.len());
        let _enter = span.enter();
        let payload = self.pipeline.global_payload();
        let mut out = Vec::new();
        self.pipeline.submit(src, entropy, &mut out)?;
        self.pending_chunks.push_back((payload, src.len() as u32));
        self.unassigned.extend_from_slice(&out);
        self.drain_ready()
    }

    /// `dup_flush_pend_block`: block until every submitted buffer has
    /// produced its packets, then deliver them all through `emit`.
    pub fn flush_block(&mut self) -> Result<()> {
        let mut out = Vec::new();
        self.pipeline.flush_block(&mut out)?;
        self.unassigned.extend_from_slice(&out);
        self.drain_ready()
    }

    /// Split `self.unassigned` back into the per-submission byte ranges
    /// it came from and hand each one to `emit`. A submission's packets
    /// are always written to the pipeline's output as one contiguous
    /// run (§4.5), so walking packet headers and summing
    /// `payload_length` against the queued submission size finds each
    /// boundary exactly.
    fn drain_ready(&mut self) -> Result<()> {
        loop {
            let Some(&(_payload, length)) = self.pending_chunks.front() else {
                break;
            };
            let mut cursor = 0usize;
            let mut covered = 0u64;
            while covered < length as u64 {
                if cursor >= self.unassigned.len() {
                    return Ok(());
                }
                let info = packet::info(&self.unassigned[cursor..])?;
                covered += info.payload_length as u64;
                cursor += info.packet_size as usize;
            }
            let chunk_bytes: Vec<u8> = self.unassigned.drain(..cursor).collect();
            (self.emit)(&chunk_bytes);
            self.pending_chunks.pop_front();
        }
        Ok(())
    }

    /// `dup_compress_hashtable`: snapshot the live index into `dst` (§4.8).
    pub fn compress_hashtable(&self, dst: &mut Vec<u8>) -> u64 {
        chunking::persist::compress_hashtable(&self.index, dst)
    }

    /// Shut down the worker pool without waiting for in-flight chunks —
    /// prefer `flush_block` followed by a normal drop for a clean finish.
    pub fn shutdown(self) {
        self.pipeline.shutdown();
    }
}

/// Decompression side of the engine (`dup_init_decompression`/
/// `dup_decompress`). Holds no state beyond what a single packet decode
/// needs, but stays a type (not a free function) so a future streaming
/// mode has somewhere to put cross-call state without an API break.
#[derive(Default)]
pub struct Decompressor;

impl Decompressor {
    pub fn new() -> Self {
        Self
    }

    /// `dup_decompress`: decode one packet from `src`, appending its
    /// payload bytes to `dst`, and return its header metadata.
    pub fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<PacketInfo> {
        packet::decode(src, dst)
    }

    /// `dup_decompress_hashtable`: rebuild a hash index from a persisted
    /// `HASHTBLE` section payload (the bytes after its `size` field).
    pub fn decompress_hashtable(&self, src: &[u8]) -> Result<HashIndex> {
        chunking::persist::decompress_hashtable(src)
    }
}
