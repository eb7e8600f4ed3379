//! Ordered in-memory keydir, grounded on Go's `index/btree.go` (which wraps
//! `google/btree`). `BTreeMap` is already a byte-ordered balanced tree, so
//! no external crate is needed to reproduce that contract in Rust.

use std::collections::BTreeMap;
use std::sync::RwLock;

use caskdb_types::RecordPosition;

use super::snapshot_iter::SnapshotIterator;
use super::{KeydirIndex, KeydirIterator};
use crate::error::StorageError;

#[derive(Debug, Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, RecordPosition>>,
}

impl BTreeIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeydirIndex for BTreeIndex {
    fn put(&self, key: &[u8], pos: RecordPosition) -> Option<RecordPosition> {
        self.tree.write().expect("btree lock poisoned").insert(key.to_vec(), pos)
    }

    fn get(&self, key: &[u8]) -> Option<RecordPosition> {
        self.tree.read().expect("btree lock poisoned").get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> Option<RecordPosition> {
        self.tree.write().expect("btree lock poisoned").remove(key)
    }

    fn size(&self) -> usize {
        self.tree.read().expect("btree lock poisoned").len()
    }

    fn iter(&self, reverse: bool) -> Box<dyn KeydirIterator> {
        let snapshot: Vec<_> = self
            .tree
            .read()
            .expect("btree lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Box::new(SnapshotIterator::new(snapshot, reverse))
    }

    fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
