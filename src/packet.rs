//! C4: packet encode/decode. A packet is the atomic unit inside a chunk —
//! either a LITERAL (carries compressed bytes) or a REFERENCE (carries a
//! back-pointer into payload).

use crate::codec::{Codec, StoreCodec, ZstdCodec};
use crate::codec::zstdc::zstd_level_for;
use crate::error::{EngineError, Result};

/// `kind(1) | packet_size(4 LE) | payload_length(4 LE) | payload_ref(8 LE)`.
/// The field widths are authoritative; see DESIGN.md for the discrepancy
/// with the short-hand "13 bytes" description, resolved in favor of these
/// widths after checking the original implementation's wire format.
pub const HEADER_LEN: usize = 17;

const KIND_LITERAL: u8 = 0;
const KIND_REFERENCE: u8 = 1;

/// Raw store level tag, written as the first byte of a LITERAL's body when
/// the compressibility probe finds no savings.
pub const LEVEL_RAW: u8 = b'0';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Literal,
    Reference,
}

/// Metadata decoded from a packet header, without materializing the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketInfo {
    pub kind: PacketKind,
    pub packet_size: u32,
    pub payload_length: u32,
    pub payload_ref: u64,
}

/// Inspect a packet's header only (`dup_packet_info`). `src` must contain
/// at least `HEADER_LEN` bytes; only the header is read.
pub fn info(src: &[u8]) -> Result<PacketInfo> {
    if src.len() < HEADER_LEN {
        return Err(EngineError::Corrupt("packet header truncated".into()));
    }
    let kind_byte = src[0];
    let packet_size = u32::from_le_bytes(src[1..5].try_into().unwrap());
    let payload_length = u32::from_le_bytes(src[5..9].try_into().unwrap());
    let payload_ref = u64::from_le_bytes(src[9..17].try_into().unwrap());
    if packet_size == 0 {
        return Err(EngineError::Corrupt("packet_size is zero".into()));
    }
    let kind = match kind_byte {
        KIND_LITERAL => PacketKind::Literal,
        KIND_REFERENCE => PacketKind::Reference,
        other => return Err(EngineError::UnknownPacketKind(other)),
    };
    Ok(PacketInfo {
        kind,
        packet_size,
        payload_length,
        payload_ref,
    })
}

/// `dup_size_compressed`: total on-disk bytes of the packet at `src[0..]`.
pub fn compressed_size(src: &[u8]) -> Result<u32> {
    Ok(info(src)?.packet_size)
}

/// `dup_size_decompressed`: decompressed payload bytes the packet contributes.
pub fn decompressed_size(src: &[u8]) -> Result<u32> {
    Ok(info(src)?.payload_length)
}

fn write_header(out: &mut Vec<u8>, kind: u8, packet_size: u32, payload_length: u32, payload_ref: u64) {
    out.push(kind);
    out.extend_from_slice(&packet_size.to_le_bytes());
    out.extend_from_slice(&payload_length.to_le_bytes());
    out.extend_from_slice(&payload_ref.to_le_bytes());
}

/// Encode a REFERENCE packet: header only, no body (§4.4).
pub fn encode_reference(out: &mut Vec<u8>, payload_ref: u64, payload_length: u32) {
    write_header(out, KIND_REFERENCE, HEADER_LEN as u32, payload_length, payload_ref);
}

/// Probe windows used to decide whether a literal is worth compressing
/// (§4.4): one short window near the start, four of 4096 bytes spread
/// across the candidate.
fn probe_windows(len: usize) -> Vec<(usize, usize)> {
    let mut windows = Vec::new();
    let short = 256.min(len);
    windows.push((0, short));
    let long = 4096;
    if len > long {
        for k in 0..4 {
            let start = (k * (len.saturating_sub(long))) / 4;
            windows.push((start, long));
        }
    }
    windows
}

/// Run the compressibility probe over `src` and report whether compressing
/// the whole literal is expected to save space.
fn probe_is_compressible(src: &[u8], codec: &dyn Codec, level: u8) -> bool {
    let mut raw = 0usize;
    let mut compressed = 0usize;
    for (start, len) in probe_windows(src.len()) {
        let chunk = &src[start..start + len];
        let mut out = Vec::new();
        if codec.compress(chunk, &mut out, level).is_err() {
            return false;
        }
        raw += chunk.len();
        compressed += out.len();
    }
    compressed < raw
}

/// Encode a LITERAL packet from `src`, honoring the caller's entropy flag
/// (force raw store) and the compressibility probe otherwise (§4.4).
pub fn encode_literal(
    out: &mut Vec<u8>,
    src: &[u8],
    level: u8,
    force_raw: bool,
) -> Result<bool> {
    let zstd = ZstdCodec;
    let use_compression = !force_raw && level > 0 && probe_is_compressible(src, &zstd, zstd_level_for(level) as u8);

    let body_start = out.len() + HEADER_LEN;
    if use_compression {
        out.resize(body_start + 1, 0);
        let before = out.len();
        zstd.compress(src, out, zstd_level_for(level) as u8)?;
        let _ = before;
    } else {
        out.resize(body_start + 1, 0);
        StoreCodec.compress(src, out, level)?;
    }
    out[body_start] = if use_compression { level.max(1) } else { LEVEL_RAW };

    let packet_size = (out.len() - (body_start - HEADER_LEN)) as u32;
    let payload_length = src.len() as u32;
    let header_pos = body_start - HEADER_LEN;
    let mut header = Vec::with_capacity(HEADER_LEN);
    write_header(&mut header, KIND_LITERAL, packet_size, payload_length, 0);
    out[header_pos..header_pos + HEADER_LEN].copy_from_slice(&header);

    Ok(use_compression)
}

/// Decode the packet at `src[0..]`, appending its decompressed payload to
/// `dst`. Returns the header info so callers can advance past the packet.
pub fn decode(src: &[u8], dst: &mut Vec<u8>) -> Result<PacketInfo> {
    let meta = info(src)?;
    let packet_size = meta.packet_size as usize;
    if src.len() < packet_size {
        return Err(EngineError::Corrupt("packet body truncated".into()));
    }
    match meta.kind {
        PacketKind::Reference => {}
        PacketKind::Literal => {
            let body = &src[HEADER_LEN..packet_size];
            if body.is_empty() {
                return Err(EngineError::Corrupt("literal packet has no level tag".into()));
            }
            let level_tag = body[0];
            let payload = &body[1..];
            if level_tag == LEVEL_RAW {
                StoreCodec.decompress(payload, dst)?;
            } else {
                ZstdCodec.decompress(payload, dst)?;
            }
        }
    }
    Ok(meta)
}
