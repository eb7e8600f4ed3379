//! The keydir contract (§4.4): three interchangeable implementations behind
//! one trait. The engine is parameterized by whichever variant
//! `Options::index_type` selects and never branches on which one it holds.

mod art;
mod bptree;
mod btree;
mod snapshot_iter;

pub use art::ArtIndex;
pub use bptree::BPlusTreeIndex;
pub use btree::BTreeIndex;

use caskdb_types::RecordPosition;

use crate::error::StorageError;

/// Map from user key to the latest record's on-disk position.
pub trait KeydirIndex: Send + Sync + std::fmt::Debug {
    /// Inserts or replaces `key`, returning the position it previously
    /// pointed at, if any.
    fn put(&self, key: &[u8], pos: RecordPosition) -> Option<RecordPosition>;

    fn get(&self, key: &[u8]) -> Option<RecordPosition>;

    /// Removes `key`, returning its prior position, if any.
    fn delete(&self, key: &[u8]) -> Option<RecordPosition>;

    fn size(&self) -> usize;

    /// Produces a cursor over (key, position) pairs in key-sorted order.
    /// Ascending when `reverse` is false, descending otherwise. The cursor
    /// is a stable snapshot: concurrent writes after creation are not
    /// observed by it.
    fn iter(&self, reverse: bool) -> Box<dyn KeydirIterator>;

    fn close(&self) -> Result<(), StorageError>;
}

/// A cursor produced by [`KeydirIndex::iter`].
pub trait KeydirIterator {
    fn rewind(&mut self);

    /// Moves to the first entry at or past `key` in the cursor's direction
    /// (first key ≥ `key` when ascending, first key ≤ `key` when
    /// descending).
    fn seek(&mut self, key: &[u8]);

    fn next(&mut self);
    fn valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> RecordPosition;

    /// Releases any resources the cursor holds. A no-op for a cursor backed
    /// by a materialized snapshot; present so implementations backed by
    /// something heavier (an open file handle, a pinned transaction) have
    /// somewhere to put that teardown.
    fn close(&mut self);
}

#[cfg(test)]
mod conformance {
    //! One shared test suite run against every `KeydirIndex` implementation,
    //! so the three variants are held to an identical contract.
    use caskdb_types::FileId;
    use test_case::test_case;

    use super::*;

    fn pos(offset: i64) -> RecordPosition {
        RecordPosition::new(FileId(0), offset, 1)
    }

    fn make(kind: &str) -> Box<dyn KeydirIndex> {
        match kind {
            "btree" => Box::new(BTreeIndex::new()),
            "art" => Box::new(ArtIndex::new()),
            "bptree" => Box::new(BPlusTreeIndex::new_in_memory()),
            _ => unreachable!(),
        }
    }

    #[test_case("btree")]
    #[test_case("art")]
    #[test_case("bptree")]
    fn put_get_delete(kind: &str) {
        let index = make(kind);
        assert_eq!(index.put(b"a", pos(1)), None);
        assert_eq!(index.get(b"a"), Some(pos(1)));
        assert_eq!(index.put(b"a", pos(2)), Some(pos(1)));
        assert_eq!(index.get(b"a"), Some(pos(2)));
        assert_eq!(index.delete(b"a"), Some(pos(2)));
        assert_eq!(index.get(b"a"), None);
        assert_eq!(index.delete(b"a"), None);
    }

    #[test_case("btree")]
    #[test_case("art")]
    #[test_case("bptree")]
    fn size_tracks_live_entries(kind: &str) {
        let index = make(kind);
        index.put(b"a", pos(1));
        index.put(b"b", pos(2));
        assert_eq!(index.size(), 2);
        index.put(b"a", pos(3));
        assert_eq!(index.size(), 2);
        index.delete(b"a");
        assert_eq!(index.size(), 1);
    }

    #[test_case("btree")]
    #[test_case("art")]
    #[test_case("bptree")]
    fn iteration_is_key_sorted(kind: &str) {
        let index = make(kind);
        for (i, key) in [b"bba".as_slice(), b"aaa", b"acb", b"aba"].into_iter().enumerate() {
            index.put(key, pos(i as i64));
        }

        let mut forward = index.iter(false);
        forward.rewind();
        let mut keys = Vec::new();
        while forward.valid() {
            keys.push(forward.key().to_vec());
            forward.next();
        }
        assert_eq!(keys, vec![b"aaa".to_vec(), b"aba".to_vec(), b"acb".to_vec(), b"bba".to_vec()]);

        let mut reverse = index.iter(true);
        reverse.rewind();
        let mut rkeys = Vec::new();
        while reverse.valid() {
            rkeys.push(reverse.key().to_vec());
            reverse.next();
        }
        assert_eq!(rkeys, vec![b"bba".to_vec(), b"acb".to_vec(), b"aba".to_vec(), b"aaa".to_vec()]);
    }

    #[test_case("btree")]
    #[test_case("art")]
    #[test_case("bptree")]
    fn seek_lands_on_first_match_in_direction(kind: &str) {
        let index = make(kind);
        for key in [b"aaa".as_slice(), b"bba", b"ccc"] {
            index.put(key, pos(0));
        }

        let mut forward = index.iter(false);
        forward.seek(b"abc");
        assert_eq!(forward.key(), b"bba");

        let mut reverse = index.iter(true);
        reverse.seek(b"bzz");
        assert_eq!(reverse.key(), b"bba");
    }

    #[test_case("btree")]
    #[test_case("art")]
    #[test_case("bptree")]
    fn iterator_is_a_stable_snapshot(kind: &str) {
        let index = make(kind);
        index.put(b"a", pos(1));
        let mut iter = index.iter(false);
        iter.rewind();
        index.put(b"b", pos(2));
        index.delete(b"a");

        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(keys, vec![b"a".to_vec()]);
    }
}
