//! The injected general-purpose compressor capability (§9 design notes):
//! a black-box `(bytes -> bytes, bytes -> bytes)` codec with a level
//! parameter. The engine names no specific algorithm; `ZstdCodec` is the
//! concrete implementation wired in by default.

use crate::error::Result;

pub mod store;
pub mod zstdc;

pub trait Codec: Send + Sync {
    /// Compress `src` at `level`, appending the result to `dst`.
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>, level: u8) -> Result<()>;
    /// Decompress `src`, appending the result to `dst`.
    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<()>;
}

pub use store::StoreCodec;
pub use zstdc::ZstdCodec;
