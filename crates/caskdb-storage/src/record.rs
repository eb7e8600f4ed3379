//! Log record encoding and decoding (§3, §4.2).
//!
//! ```text
//! [ crc:4 LE | type:1 | key_size:varint | value_size:varint | key | value ]
//! ```
//!
//! The crc covers every byte after itself. `value` is absent (zero-length)
//! for `Deleted` and `TxFinished` records.

use bytes::Bytes;
use caskdb_types::RecordType;

use crate::crc32::crc32;
use crate::error::StorageError;
use crate::varint::{decode_varint, encode_varint};

/// `4 (crc) + 1 (type) + 5 (key_size) + 5 (value_size)`, the maximum
/// possible header width.
pub const MAX_HEADER_SIZE: usize = 4 + 1 + 5 + 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: RecordType,
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    #[must_use]
    pub fn normal(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            record_type: RecordType::Normal,
            key: key.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn deleted(key: impl Into<Bytes>) -> Self {
        Self {
            record_type: RecordType::Deleted,
            key: key.into(),
            value: Bytes::new(),
        }
    }

    #[must_use]
    pub fn tx_finished(key: impl Into<Bytes>) -> Self {
        Self {
            record_type: RecordType::TxFinished,
            key: key.into(),
            value: Bytes::new(),
        }
    }

    /// Encodes this record, returning the full on-disk bytes and their
    /// length.
    #[must_use]
    pub fn encode(&self) -> (Vec<u8>, usize) {
        let mut buf = vec![0u8; 4];
        buf.push(self.record_type.as_byte());
        encode_varint(self.key.len() as i64, &mut buf);
        encode_varint(self.value.len() as i64, &mut buf);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());

        let len = buf.len();
        (buf, len)
    }
}

/// A decoded header plus how many bytes of the input it consumed.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub crc: u32,
    pub record_type: RecordType,
    pub key_size: i64,
    pub value_size: i64,
    pub header_size: usize,
}

/// Result of decoding a header-sized chunk of a segment.
#[derive(Debug)]
pub enum HeaderOutcome {
    Header(Header),
    /// Clean end of readable records: either the buffer was too short to
    /// hold any header, or it was the canonical all-zero "hole" left by a
    /// pre-allocated but unwritten tail.
    Eof,
}

/// Decodes a record header from the start of `buf`. `buf` may be shorter
/// than [`MAX_HEADER_SIZE`] when it was clamped to the remaining bytes of
/// the file (end-of-file case).
pub fn decode_header(buf: &[u8]) -> Result<HeaderOutcome, StorageError> {
    if buf.len() < 5 {
        return Ok(HeaderOutcome::Eof);
    }

    let crc = u32::from_le_bytes(buf[0..4].try_into().expect("checked len >= 5"));
    let type_byte = buf[4];

    let Some((key_size, key_n)) = decode_varint(&buf[5..]) else {
        return Ok(HeaderOutcome::Eof);
    };
    let Some((value_size, value_n)) = decode_varint(&buf[5 + key_n..]) else {
        return Ok(HeaderOutcome::Eof);
    };

    // A pre-allocated but never-written tail reads back as all zero bytes:
    // crc 0, type Normal(=0), both sizes 0. A genuine empty record's crc
    // would not happen to be exactly zero, so this is an unambiguous "hole"
    // signal rather than a valid record.
    if crc == 0 && type_byte == 0 && key_size == 0 && value_size == 0 {
        return Ok(HeaderOutcome::Eof);
    }

    let Some(record_type) = RecordType::from_byte(type_byte) else {
        return Err(StorageError::CorruptFile(format!("unknown record type byte {type_byte}")));
    };

    Ok(HeaderOutcome::Header(Header {
        crc,
        record_type,
        key_size,
        value_size,
        header_size: 5 + key_n + value_n,
    }))
}

/// Verifies `record`'s CRC against `expected`, reconstructing the same byte
/// sequence the encoder would have checksummed: `type || key_size_varint ||
/// value_size_varint || key || value`.
#[must_use]
pub fn verify_crc(header: &Header, key: &[u8], value: &[u8], expected: u32) -> bool {
    let mut buf = Vec::with_capacity(1 + 10 + key.len() + value.len());
    buf.push(header.record_type.as_byte());
    encode_varint(header.key_size, &mut buf);
    encode_varint(header.value_size, &mut buf);
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    crc32(&buf) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Record::normal(&b"k"[..], &b"v"[..]))]
    #[test_case(Record::normal(&b""[..], &b""[..]))]
    #[test_case(Record::deleted(&b"tombstone-key"[..]))]
    #[test_case(Record::tx_finished(&b"tx-finished"[..]))]
    fn round_trips(record: Record) {
        let (bytes, total) = record.encode();
        assert_eq!(bytes.len(), total);

        let header = match decode_header(&bytes).unwrap() {
            HeaderOutcome::Header(h) => h,
            HeaderOutcome::Eof => panic!("expected header"),
        };
        assert_eq!(header.key_size, record.key.len() as i64);
        assert_eq!(header.value_size, record.value.len() as i64);

        let key_start = header.header_size;
        let value_start = key_start + header.key_size as usize;
        let value_end = value_start + header.value_size as usize;
        let key = &bytes[key_start..value_start];
        let value = &bytes[value_start..value_end];
        assert!(verify_crc(&header, key, value, header.crc));
        assert_eq!(key, &record.key[..]);
        assert_eq!(value, &record.value[..]);
    }

    #[test]
    fn tampered_byte_fails_crc() {
        let record = Record::normal(&b"key"[..], &b"value"[..]);
        let (mut bytes, _) = record.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let header = match decode_header(&bytes).unwrap() {
            HeaderOutcome::Header(h) => h,
            HeaderOutcome::Eof => panic!("expected header"),
        };
        let key_start = header.header_size;
        let value_start = key_start + header.key_size as usize;
        let value_end = value_start + header.value_size as usize;
        assert!(!verify_crc(&header, &bytes[key_start..value_start], &bytes[value_start..value_end], header.crc));
    }

    #[test]
    fn short_buffer_is_eof() {
        assert!(matches!(decode_header(&[1, 2, 3]).unwrap(), HeaderOutcome::Eof));
        assert!(matches!(decode_header(&[]).unwrap(), HeaderOutcome::Eof));
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_normal_records_round_trip(key: Vec<u8>, value: Vec<u8>) {
            let record = Record::normal(key.clone(), value.clone());
            let (bytes, _) = record.encode();
            let header = match decode_header(&bytes).unwrap() {
                HeaderOutcome::Header(h) => h,
                HeaderOutcome::Eof => panic!("expected header for non-empty varint-prefixed record"),
            };
            proptest::prop_assert_eq!(header.key_size, key.len() as i64);
            proptest::prop_assert_eq!(header.value_size, value.len() as i64);
            let key_start = header.header_size;
            let value_start = key_start + header.key_size as usize;
            let value_end = value_start + header.value_size as usize;
            proptest::prop_assert!(verify_crc(&header, &bytes[key_start..value_start], &bytes[value_start..value_end], header.crc));
        }
    }
}
