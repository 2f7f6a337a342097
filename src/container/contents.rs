//! Contents table: the `CONTENTS` section (§4.7, §3 FileRecord). One
//! record per file emitted by the external walker, persisted verbatim by
//! the core. String fields carry a varint length prefix (§6).

use crate::error::{EngineError, Result};

pub const TAG: &[u8; 8] = b"CONTENTS";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
}

impl FileKind {
    fn to_byte(self) -> u8 {
        match self {
            FileKind::Regular => 0,
            FileKind::Directory => 1,
            FileKind::Symlink => 2,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(FileKind::Regular),
            1 => Ok(FileKind::Directory),
            2 => Ok(FileKind::Symlink),
            other => Err(EngineError::Corrupt(format!("unknown file kind {other}"))),
        }
    }
}

/// Per-file metadata, carried through unchanged by the core. The
/// `volume`/`inode`/`is_hardlink`/`sparse` fields are additive (§3
/// supplement): the core persists them but never interprets them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    pub file_id: u64,
    pub kind: FileKind,
    pub abs_path: String,
    pub name: String,
    pub link_target: String,
    pub size: u64,
    pub payload: u64,
    pub ctime_ms: u64,
    pub mtime_ms: u64,
    pub attributes: u32,
    pub duplicate_of: u64,
    pub content_hash: [u8; 16],
    pub opaque_acl: Vec<u8>,
    pub volume: u64,
    pub inode: u64,
    pub is_hardlink: bool,
    pub sparse: bool,
}

fn write_varint(dst: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            dst.push(byte);
            break;
        }
        dst.push(byte | 0x80);
    }
}

fn read_varint(src: &[u8], cursor: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        if *cursor >= src.len() {
            return Err(EngineError::Corrupt("varint truncated".into()));
        }
        let byte = src[*cursor];
        *cursor += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(EngineError::Corrupt("varint too long".into()));
        }
    }
    Ok(result)
}

fn write_string(dst: &mut Vec<u8>, s: &str) {
    write_varint(dst, s.len() as u64);
    dst.extend_from_slice(s.as_bytes());
}

fn read_string(src: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_varint(src, cursor)? as usize;
    if *cursor + len > src.len() {
        return Err(EngineError::Corrupt("string field truncated".into()));
    }
    let bytes = &src[*cursor..*cursor + len];
    *cursor += len;
    String::from_utf8(bytes.to_vec()).map_err(|_| EngineError::Corrupt("string field not valid UTF-8".into()))
}

fn write_bytes(dst: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(dst, bytes.len() as u64);
    dst.extend_from_slice(bytes);
}

fn read_bytes(src: &[u8], cursor: &mut usize) -> Result<Vec<u8>> {
    let len = read_varint(src, cursor)? as usize;
    if *cursor + len > src.len() {
        return Err(EngineError::Corrupt("byte field truncated".into()));
    }
    let out = src[*cursor..*cursor + len].to_vec();
    *cursor += len;
    Ok(out)
}

impl FileRecord {
    fn encode(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&self.file_id.to_le_bytes());
        dst.push(self.kind.to_byte());
        write_string(dst, &self.abs_path);
        write_string(dst, &self.name);
        write_string(dst, &self.link_target);
        dst.extend_from_slice(&self.size.to_le_bytes());
        dst.extend_from_slice(&self.payload.to_le_bytes());
        dst.extend_from_slice(&self.ctime_ms.to_le_bytes());
        dst.extend_from_slice(&self.mtime_ms.to_le_bytes());
        dst.extend_from_slice(&self.attributes.to_le_bytes());
        dst.extend_from_slice(&self.duplicate_of.to_le_bytes());
        dst.extend_from_slice(&self.content_hash);
        write_bytes(dst, &self.opaque_acl);
        dst.extend_from_slice(&self.volume.to_le_bytes());
        dst.extend_from_slice(&self.inode.to_le_bytes());
        dst.push(self.is_hardlink as u8);
        dst.push(self.sparse as u8);
    }

    fn decode(src: &[u8], cursor: &mut usize) -> Result<Self> {
        let file_id = read_u64(src, cursor)?;
        let kind = FileKind::from_byte(read_u8(src, cursor)?)?;
        let abs_path = read_string(src, cursor)?;
        let name = read_string(src, cursor)?;
        let link_target = read_string(src, cursor)?;
        let size = read_u64(src, cursor)?;
        let payload = read_u64(src, cursor)?;
        let ctime_ms = read_u64(src, cursor)?;
        let mtime_ms = read_u64(src, cursor)?;
        let attributes = read_u32(src, cursor)?;
        let duplicate_of = read_u64(src, cursor)?;
        if *cursor + 16 > src.len() {
            return Err(EngineError::Corrupt("content_hash truncated".into()));
        }
        let mut content_hash = [0u8; 16];
        content_hash.copy_from_slice(&src[*cursor..*cursor + 16]);
        *cursor += 16;
        let opaque_acl = read_bytes(src, cursor)?;
        let volume = read_u64(src, cursor)?;
        let inode = read_u64(src, cursor)?;
        let is_hardlink = read_u8(src, cursor)? != 0;
        let sparse = read_u8(src, cursor)? != 0;
        Ok(Self {
            file_id,
            kind,
            abs_path,
            name,
            link_target,
            size,
            payload,
            ctime_ms,
            mtime_ms,
            attributes,
            duplicate_of,
            content_hash,
            opaque_acl,
            volume,
            inode,
            is_hardlink,
            sparse,
        })
    }
}

fn read_u8(src: &[u8], cursor: &mut usize) -> Result<u8> {
    if *cursor >= src.len() {
        return Err(EngineError::Corrupt("contents record truncated".into()));
    }
    let v = src[*cursor];
    *cursor += 1;
    Ok(v)
}

fn read_u32(src: &[u8], cursor: &mut usize) -> Result<u32> {
    if *cursor + 4 > src.len() {
        return Err(EngineError::Corrupt("contents record truncated".into()));
    }
    let v = u32::from_le_bytes(src[*cursor..*cursor + 4].try_into().unwrap());
    *cursor += 4;
    Ok(v)
}

fn read_u64(src: &[u8], cursor: &mut usize) -> Result<u64> {
    if *cursor + 8 > src.len() {
        return Err(EngineError::Corrupt("contents record truncated".into()));
    }
    let v = u64::from_le_bytes(src[*cursor..*cursor + 8].try_into().unwrap());
    *cursor += 8;
    Ok(v)
}

/// Encode the `CONTENTS` section for one differential increment's records.
pub fn encode(records: &[FileRecord], dst: &mut Vec<u8>) {
    let start = dst.len();
    dst.extend_from_slice(TAG);
    dst.extend_from_slice(&(records.len() as u64).to_le_bytes());
    for r in records {
        r.encode(dst);
    }
    dst.extend_from_slice(&0u32.to_le_bytes());
    let length = (dst.len() - start + 8) as u64;
    dst.extend_from_slice(&length.to_le_bytes());
}

pub fn decode(src: &[u8]) -> Result<(Vec<FileRecord>, usize)> {
    if src.len() < 8 || &src[0..8] != TAG {
        return Err(EngineError::Corrupt("missing CONTENTS tag".into()));
    }
    let mut cursor = 8usize;
    let n = read_u64(src, &mut cursor)? as usize;
    let mut records = Vec::with_capacity(n);
    for _ in 0..n {
        records.push(FileRecord::decode(src, &mut cursor)?);
    }
    let terminator = read_u32(src, &mut cursor)?;
    if terminator != 0 {
        return Err(EngineError::Corrupt("CONTENTS missing terminator".into()));
    }
    let _length = read_u64(src, &mut cursor)?;
    Ok((records, cursor))
}
