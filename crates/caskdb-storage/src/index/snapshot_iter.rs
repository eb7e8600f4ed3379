use caskdb_types::RecordPosition;

use super::KeydirIterator;

/// A cursor over a materialized, already key-ordered snapshot. All three
/// keydir implementations build their iterator on top of this: it is what
/// gives the ART variant's "stable against concurrent writes" guarantee,
/// and it happens to be the simplest correct choice for the other two as
/// well.
pub struct SnapshotIterator {
    entries: Vec<(Vec<u8>, RecordPosition)>,
    reverse: bool,
    cursor: Option<usize>,
}

impl SnapshotIterator {
    /// `entries` must already be sorted ascending by key.
    pub fn new(mut entries: Vec<(Vec<u8>, RecordPosition)>, reverse: bool) -> Self {
        if reverse {
            entries.reverse();
        }
        let cursor = if entries.is_empty() { None } else { Some(0) };
        Self {
            entries,
            reverse,
            cursor,
        }
    }
}

impl KeydirIterator for SnapshotIterator {
    fn rewind(&mut self) {
        self.cursor = if self.entries.is_empty() { None } else { Some(0) };
    }

    fn seek(&mut self, key: &[u8]) {
        // `entries` is ascending if !reverse, descending if reverse. Find
        // the first entry satisfying the direction's "at or past key"
        // relation via a linear scan (snapshots are already materialized;
        // a binary search would need direction-aware comparator plumbing
        // that isn't worth it at this scale).
        let found = self.entries.iter().position(|(k, _)| {
            if self.reverse {
                k.as_slice() <= key
            } else {
                k.as_slice() >= key
            }
        });
        self.cursor = found;
    }

    fn next(&mut self) {
        if let Some(i) = self.cursor {
            let next = i + 1;
            self.cursor = if next < self.entries.len() { Some(next) } else { None };
        }
    }

    fn valid(&self) -> bool {
        self.cursor.is_some()
    }

    fn key(&self) -> &[u8] {
        let i = self.cursor.expect("key() called on an invalid iterator");
        &self.entries[i].0
    }

    fn value(&self) -> RecordPosition {
        let i = self.cursor.expect("value() called on an invalid iterator");
        self.entries[i].1
    }

    fn close(&mut self) {}
}
