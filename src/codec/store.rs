use super::Codec;
use crate::error::Result;

/// Raw passthrough, used when a literal fails the compressibility probe
/// (level tag `'0'`, §4.4).
pub struct StoreCodec;

impl Codec for StoreCodec {
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>, _level: u8) -> Result<()> {
        dst.extend_from_slice(src);
        Ok(())
    }

    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        dst.extend_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let c = StoreCodec;
        let mut compressed = Vec::new();
        c.compress(b"hello", &mut compressed, 0).unwrap();
        assert_eq!(compressed, b"hello");
        let mut out = Vec::new();
        c.decompress(&compressed, &mut out).unwrap();
        assert_eq!(out, b"hello");
    }
}
