//! Archive header (§4.7). Field widths are authoritative over the
//! shorthand "40 B" byte count in the container layout diagram; see
//! DESIGN.md for the same kind of discrepancy resolution as the packet
//! header's "13 bytes" claim.

use crate::error::{EngineError, Result};

pub const MAGIC: &[u8; 8] = b"EXDUPE D";
pub const HEADER_LEN: usize = 8 + 4 + 8 + 8 + 4 + 8 + 8 + 8;

pub const SUPPORTED_MAJOR: u8 = 1;
pub const SUPPORTED_MINOR: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub dev: u8,
    pub dedupe_small: u64,
    pub dedupe_large: u64,
    pub hash_seed: u32,
    pub memory: u64,
    pub last_good_offset: u64,
}

impl Header {
    pub fn new(dedupe_small: u64, dedupe_large: u64, hash_seed: u32, memory: u64) -> Self {
        Self {
            major: SUPPORTED_MAJOR,
            minor: SUPPORTED_MINOR,
            revision: 0,
            dev: 0,
            dedupe_small,
            dedupe_large,
            hash_seed,
            memory,
            last_good_offset: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let mut pos = 0;
        buf[pos..pos + 8].copy_from_slice(MAGIC);
        pos += 8;
        buf[pos] = self.major;
        buf[pos + 1] = self.minor;
        buf[pos + 2] = self.revision;
        buf[pos + 3] = self.dev;
        pos += 4;
        buf[pos..pos + 8].copy_from_slice(&self.dedupe_small.to_le_bytes());
        pos += 8;
        buf[pos..pos + 8].copy_from_slice(&self.dedupe_large.to_le_bytes());
        pos += 8;
        buf[pos..pos + 4].copy_from_slice(&self.hash_seed.to_le_bytes());
        pos += 4;
        buf[pos..pos + 8].copy_from_slice(&self.memory.to_le_bytes());
        pos += 8;
        buf[pos..pos + 8].copy_from_slice(&self.last_good_offset.to_le_bytes());
        pos += 8;
        buf[pos..pos + 8].copy_from_slice(&0u64.to_le_bytes());
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(EngineError::Corrupt("archive header truncated".into()));
        }
        if &src[0..8] != MAGIC {
            return Err(EngineError::Corrupt("bad archive magic".into()));
        }
        let major = src[8];
        let minor = src[9];
        let revision = src[10];
        let dev = src[11];
        if major != SUPPORTED_MAJOR {
            return Err(EngineError::VersionMismatch {
                found: (major, minor),
                supported: (SUPPORTED_MAJOR, SUPPORTED_MINOR),
            });
        }
        let dedupe_small = u64::from_le_bytes(src[12..20].try_into().unwrap());
        let dedupe_large = u64::from_le_bytes(src[20..28].try_into().unwrap());
        if dedupe_small == 0 || dedupe_large <= dedupe_small || dedupe_large % dedupe_small != 0 {
            return Err(EngineError::Corrupt(
                "on-disk block sizes fail LARGE % SMALL == 0 / LARGE > SMALL".into(),
            ));
        }
        let hash_seed = u32::from_le_bytes(src[28..32].try_into().unwrap());
        let memory = u64::from_le_bytes(src[32..40].try_into().unwrap());
        let last_good_offset = u64::from_le_bytes(src[40..48].try_into().unwrap());
        let terminator = u64::from_le_bytes(src[48..56].try_into().unwrap());
        if terminator != 0 {
            return Err(EngineError::Corrupt("header terminator is not zero".into()));
        }
        Ok(Self {
            major,
            minor,
            revision,
            dev,
            dedupe_small,
            dedupe_large,
            hash_seed,
            memory,
            last_good_offset,
        })
    }
}
