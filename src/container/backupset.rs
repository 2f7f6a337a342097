//! Backup set: the `BCKUPSET` section (§4.7, §3). An ordered list of
//! `file_id`s plus summary metadata, appended atomically once per
//! successful backup or differential increment.

use crate::error::{EngineError, Result};

pub const TAG: &[u8; 8] = b"BCKUPSET";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupSet {
    pub file_ids: Vec<u64>,
    pub timestamp_ms: u64,
    pub total_payload_bytes: u64,
    pub file_count: u64,
}

pub fn encode(set: &BackupSet, dst: &mut Vec<u8>) {
    let start = dst.len();
    dst.extend_from_slice(TAG);
    dst.extend_from_slice(&(set.file_ids.len() as u64).to_le_bytes());
    for id in &set.file_ids {
        dst.extend_from_slice(&id.to_le_bytes());
    }
    dst.extend_from_slice(&set.timestamp_ms.to_le_bytes());
    dst.extend_from_slice(&set.total_payload_bytes.to_le_bytes());
    dst.extend_from_slice(&set.file_count.to_le_bytes());
    let length = (dst.len() - start + 8) as u64;
    dst.extend_from_slice(&length.to_le_bytes());
}

pub fn decode(src: &[u8]) -> Result<(BackupSet, usize)> {
    if src.len() < 8 || &src[0..8] != TAG {
        return Err(EngineError::Corrupt("missing BCKUPSET tag".into()));
    }
    let mut cursor = 8usize;
    let k = read_u64(src, &mut cursor)? as usize;
    let mut file_ids = Vec::with_capacity(k);
    for _ in 0..k {
        file_ids.push(read_u64(src, &mut cursor)?);
    }
    let timestamp_ms = read_u64(src, &mut cursor)?;
    let total_payload_bytes = read_u64(src, &mut cursor)?;
    let file_count = read_u64(src, &mut cursor)?;
    let _length = read_u64(src, &mut cursor)?;
    Ok((
        BackupSet {
            file_ids,
            timestamp_ms,
            total_payload_bytes,
            file_count,
        },
        cursor,
    ))
}

fn read_u64(src: &[u8], cursor: &mut usize) -> Result<u64> {
    if *cursor + 8 > src.len() {
        return Err(EngineError::Corrupt("BCKUPSET truncated".into()));
    }
    let v = u64::from_le_bytes(src[*cursor..*cursor + 8].try_into().unwrap());
    *cursor += 8;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let set = BackupSet {
            file_ids: vec![1, 2, 3],
            timestamp_ms: 1_700_000_000_000,
            total_payload_bytes: 4096,
            file_count: 3,
        };
        let mut buf = Vec::new();
        encode(&set, &mut buf);
        let (decoded, consumed) = decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, set);
    }
}
