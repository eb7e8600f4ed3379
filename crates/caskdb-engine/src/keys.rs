//! The on-disk key is `encode_uvarint(seq) || user_key` (§3). Sequence zero
//! is reserved for non-batch writes; batched writes use the engine's
//! incrementing sequence counter.

use caskdb_storage::varint::{decode_uvarint, encode_uvarint};
use caskdb_types::NON_TRANSACTION_SEQ_NUM;

#[must_use]
pub fn with_seq(seq: u64, user_key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(user_key.len() + 10);
    encode_uvarint(seq, &mut buf);
    buf.extend_from_slice(user_key);
    buf
}

#[must_use]
pub fn non_transaction(user_key: &[u8]) -> Vec<u8> {
    with_seq(NON_TRANSACTION_SEQ_NUM, user_key)
}

/// Splits a disk key back into its sequence number and user key.
pub fn split_seq(disk_key: &[u8]) -> Option<(u64, &[u8])> {
    let (seq, n) = decode_uvarint(disk_key)?;
    Some((seq, &disk_key[n..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_seq_and_user_key() {
        let disk_key = with_seq(42, b"hello");
        let (seq, user_key) = split_seq(&disk_key).unwrap();
        assert_eq!(seq, 42);
        assert_eq!(user_key, b"hello");
    }

    #[test]
    fn non_transaction_uses_seq_zero() {
        let disk_key = non_transaction(b"k");
        let (seq, user_key) = split_seq(&disk_key).unwrap();
        assert_eq!(seq, NON_TRANSACTION_SEQ_NUM);
        assert_eq!(user_key, b"k");
    }
}
