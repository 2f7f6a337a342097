use super::Codec;
use crate::error::Result;
use std::io::Write;

pub struct ZstdCodec;

impl Codec for ZstdCodec {
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>, level: u8) -> Result<()> {
        let mut enc = zstd::stream::Encoder::new(Vec::new(), level.max(1) as i32)?;
        enc.write_all(src)?;
        dst.extend_from_slice(&enc.finish()?);
        Ok(())
    }

    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        let mut dec = zstd::stream::Decoder::new(src)?;
        std::io::copy(&mut dec, dst)?;
        Ok(())
    }
}

/// Maps the engine's coarse `level` (0..=3, §4.12) to an actual zstd level,
/// following the original implementation's table (level 0 never reaches
/// the codec: it is handled as a raw store).
pub fn zstd_level_for(level: u8) -> i32 {
    match level {
        1 => 1,
        2 => 10,
        _ => 19,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let c = ZstdCodec;
        let data = b"hello hello hello hello hello world world world".repeat(20);
        let mut compressed = Vec::new();
        c.compress(&data, &mut compressed, 19).unwrap();
        assert!(compressed.len() < data.len());
        let mut out = Vec::new();
        c.decompress(&compressed, &mut out).unwrap();
        assert_eq!(out, data);
    }
}
