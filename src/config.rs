use crate::error::{EngineError, Result};

/// Replaces the original implementation's compile-time globals
/// (`DEDUPE_SMALL`/`DEDUPE_LARGE` and friends) with an explicit, immutable
/// value threaded through every public entry point. No process-wide state.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Small-block size in bytes, used for the residual matching pass.
    pub small_block: usize,
    /// Large-block size in bytes, used for the bulk matching pass.
    /// Must be a multiple of `small_block` and strictly greater than it.
    pub large_block: usize,
    /// Total bytes to reserve for the hash index (small + large tables).
    pub memory_budget: u64,
    /// Number of compression worker threads.
    pub threads: usize,
    /// Compression level: 0 = store raw, 1..=3 = increasing zstd effort.
    pub level: u8,
    /// Selects the strong-hash implementation used to confirm candidate
    /// matches: `true` for the cryptographic-quality `Hash128`, `false` for
    /// a faster non-cryptographic one. The engine never names a concrete
    /// algorithm; see `hash128`.
    pub crypto_hash: bool,
    /// Salt mixed into every hash computation (index keys and content hash).
    pub hash_seed: u64,
    /// Payload offset at which this session's writes begin (0 for a fresh
    /// archive, `total_payload_bytes` of the prior session for a
    /// differential append).
    pub base_payload: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            small_block: 8 * 1024,
            large_block: 2 * 1024 * 1024,
            memory_budget: 256 * 1024 * 1024,
            threads: 4,
            level: 2,
            crypto_hash: true,
            hash_seed: 0,
            base_payload: 0,
        }
    }
}

/// Fixed ratio between large-table and small-table row counts (§4.2).
pub const TABLE_SIZE_RATIO: u64 = 20;

/// Maximum size of a single LITERAL packet's uncompressed payload (§4.3).
pub const MAX_LITERAL_SIZE: usize = 256 * 1024;

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.small_block == 0 || self.large_block == 0 {
            return Err(EngineError::Config("block sizes must be nonzero".into()));
        }
        if self.large_block <= self.small_block {
            return Err(EngineError::Config(
                "large_block must be greater than small_block".into(),
            ));
        }
        if self.large_block % self.small_block != 0 {
            return Err(EngineError::Config(
                "large_block must be a multiple of small_block".into(),
            ));
        }
        if self.memory_budget < 1024 * 1024 {
            return Err(EngineError::Config(
                "memory_budget must be at least 1 MiB".into(),
            ));
        }
        if self.threads == 0 {
            return Err(EngineError::Config("threads must be at least 1".into()));
        }
        if self.level > 3 {
            return Err(EngineError::Config("level must be 0..=3".into()));
        }
        Ok(())
    }
}
