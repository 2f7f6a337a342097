//! The injected hashing capability (§9 design notes): a streaming 128-bit
//! digest used two ways — truncated to 12 bytes as the matcher's strong
//! hash `H` (§4.3), and in full as the per-file content checksum (C9,
//! §4.9). The engine never hard-codes a specific algorithm; callers select
//! a cryptographic-quality hash or a fast one via `EngineConfig::crypto_hash`.

/// A streaming 128-bit hasher. Implementations are not required to be
/// cryptographically secure; `crypto_hash = true` selects one that is.
pub trait Hash128Hasher: Send {
    fn update(&mut self, bytes: &[u8]);
    fn finalize(self: Box<Self>) -> [u8; 16];
}

/// Cryptographic-quality hash, backed by BLAKE3 keyed with the session salt.
pub struct Blake3Hash128 {
    hasher: blake3::Hasher,
}

impl Blake3Hash128 {
    pub fn new(seed: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&seed.to_le_bytes());
        Self { hasher }
    }
}

impl Hash128Hasher for Blake3Hash128 {
    fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn finalize(self: Box<Self>) -> [u8; 16] {
        let out = self.hasher.finalize();
        let mut dst = [0u8; 16];
        dst.copy_from_slice(&out.as_bytes()[..16]);
        dst
    }
}

/// Fast non-cryptographic hash for workloads that do not need collision
/// resistance against an adversary, only against accidental corruption.
/// Two independent FNV-1a lanes (different primes) form the 128 bits.
pub struct FastHash128 {
    lo: u64,
    hi: u64,
}

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME_LO: u64 = 0x100000001b3;
const FNV_PRIME_HI: u64 = 0x9E3779B97F4A7C15;

impl FastHash128 {
    pub fn new(seed: u64) -> Self {
        Self {
            lo: FNV_OFFSET ^ seed,
            hi: FNV_OFFSET ^ seed.rotate_left(32),
        }
    }
}

impl Hash128Hasher for FastHash128 {
    fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.lo = (self.lo ^ b as u64).wrapping_mul(FNV_PRIME_LO);
            self.hi = (self.hi ^ b as u64).wrapping_mul(FNV_PRIME_HI);
        }
    }

    fn finalize(self: Box<Self>) -> [u8; 16] {
        let mut dst = [0u8; 16];
        dst[..8].copy_from_slice(&self.lo.to_le_bytes());
        dst[8..].copy_from_slice(&self.hi.to_le_bytes());
        dst
    }
}

pub fn new_hasher(crypto_hash: bool, seed: u64) -> Box<dyn Hash128Hasher> {
    if crypto_hash {
        Box::new(Blake3Hash128::new(seed))
    } else {
        Box::new(FastHash128::new(seed))
    }
}

/// One-shot convenience: hash `bytes` and return the full 128-bit digest.
pub fn hash_once(crypto_hash: bool, seed: u64, bytes: &[u8]) -> [u8; 16] {
    let mut h = new_hasher(crypto_hash, seed);
    h.update(bytes);
    h.finalize()
}

/// Truncate a 128-bit digest to the matcher's 12-byte strong hash `H`.
pub fn truncate_strong(full: [u8; 16]) -> [u8; 12] {
    let mut out = [0u8; 12];
    out.copy_from_slice(&full[..12]);
    out
}
