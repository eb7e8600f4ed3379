//! Encoding for hint-file values: a record position packed into 16 bytes,
//! written with a user key so recovery can rebuild the keydir without
//! reading data bodies (§3, §4.8).

use caskdb_types::{FileId, RecordPosition};

#[must_use]
pub fn encode_position(pos: RecordPosition) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&u32::from(pos.file_id).to_le_bytes());
    buf.extend_from_slice(&pos.offset.to_le_bytes());
    buf.extend_from_slice(&pos.size.to_le_bytes());
    buf
}

#[must_use]
pub fn decode_position(buf: &[u8]) -> Option<RecordPosition> {
    if buf.len() != 16 {
        return None;
    }
    let file_id = u32::from_le_bytes(buf[0..4].try_into().ok()?);
    let offset = i64::from_le_bytes(buf[4..12].try_into().ok()?);
    let size = u32::from_le_bytes(buf[12..16].try_into().ok()?);
    Some(RecordPosition::new(FileId(file_id), offset, size))
}
