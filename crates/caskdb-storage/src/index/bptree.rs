//! On-disk, persistent keydir.
//!
//! Grounded on Go's `index/bptree.go`, which backs this variant with
//! `bbolt`, a single-file embedded B+ tree. No embedded single-file KV
//! crate appears in the example pack's dependency stack, so this variant
//! is implemented as its own small append-only log (`bptree-index`): every
//! `put`/`delete` is appended as a fixed-layout entry, and the full log is
//! replayed into an in-memory `BTreeMap` once at open. This reproduces the
//! property the engine actually depends on — the keydir survives a
//! restart without replaying segment data — without pulling in a crate
//! the rest of the corpus never reaches for. See DESIGN.md.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use caskdb_types::{FileId, RecordPosition, BPTREE_INDEX_FILE_NAME};

use super::snapshot_iter::SnapshotIterator;
use super::{KeydirIndex, KeydirIterator};
use crate::error::StorageError;
use crate::varint::{decode_uvarint, encode_uvarint};

const OP_PUT: u8 = 0;
const OP_DELETE: u8 = 1;

struct Inner {
    map: BTreeMap<Vec<u8>, RecordPosition>,
    file: Option<File>,
}

#[derive(Debug)]
pub struct BPlusTreeIndex {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner").field("len", &self.map.len()).finish()
    }
}

impl BPlusTreeIndex {
    /// Opens (or creates) `<dir_path>/bptree-index`, replaying any existing
    /// entries into memory.
    pub fn open(dir_path: &Path) -> Result<Self, StorageError> {
        let path = dir_path.join(BPTREE_INDEX_FILE_NAME);
        let map = Self::replay(&path)?;
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        Ok(Self {
            inner: RwLock::new(Inner { map, file: Some(file) }),
        })
    }

    /// An index with no backing file, for tests and for the keydir
    /// conformance suite.
    #[must_use]
    pub fn new_in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                map: BTreeMap::new(),
                file: None,
            }),
        }
    }

    fn replay(path: &PathBuf) -> Result<BTreeMap<Vec<u8>, RecordPosition>, StorageError> {
        let mut map = BTreeMap::new();
        let Ok(file) = File::open(path) else {
            return Ok(map);
        };
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        let mut cursor = 0;
        while cursor < buf.len() {
            let Some(n) = Self::apply_entry(&buf[cursor..], &mut map) else {
                // A short trailing entry means the last append was cut off
                // by a crash; tolerate it as a clean stop, same as segment
                // replay tolerates a torn tail.
                tracing::warn!(path = %path.display(), "bptree-index has a truncated trailing entry, stopping replay");
                break;
            };
            cursor += n;
        }
        Ok(map)
    }

    /// Parses and applies one entry at the start of `buf`, returning its
    /// encoded length, or `None` if `buf` doesn't hold a complete entry.
    fn apply_entry(buf: &[u8], map: &mut BTreeMap<Vec<u8>, RecordPosition>) -> Option<usize> {
        let op = *buf.first()?;
        let (key_len, n1) = decode_uvarint(&buf[1..])?;
        let key_len = key_len as usize;
        let key_start = 1 + n1;
        let key_end = key_start + key_len;
        let key = buf.get(key_start..key_end)?.to_vec();

        match op {
            OP_PUT => {
                let pos_start = key_end;
                let pos_end = pos_start + 16;
                let pos_buf = buf.get(pos_start..pos_end)?;
                let file_id = u32::from_le_bytes(pos_buf[0..4].try_into().ok()?);
                let offset = i64::from_le_bytes(pos_buf[4..12].try_into().ok()?);
                let size = u32::from_le_bytes(pos_buf[12..16].try_into().ok()?);
                map.insert(key, RecordPosition::new(FileId(file_id), offset, size));
                Some(pos_end)
            }
            OP_DELETE => {
                map.remove(&key);
                Some(key_end)
            }
            _ => None,
        }
    }

    fn append_put(file: &mut File, key: &[u8], pos: RecordPosition) -> Result<(), StorageError> {
        let mut buf = vec![OP_PUT];
        encode_uvarint(key.len() as u64, &mut buf);
        buf.extend_from_slice(key);
        buf.extend_from_slice(&u32::from(pos.file_id).to_le_bytes());
        buf.extend_from_slice(&pos.offset.to_le_bytes());
        buf.extend_from_slice(&pos.size.to_le_bytes());
        file.write_all(&buf)?;
        Ok(())
    }

    fn append_delete(file: &mut File, key: &[u8]) -> Result<(), StorageError> {
        let mut buf = vec![OP_DELETE];
        encode_uvarint(key.len() as u64, &mut buf);
        buf.extend_from_slice(key);
        file.write_all(&buf)?;
        Ok(())
    }
}

impl KeydirIndex for BPlusTreeIndex {
    fn put(&self, key: &[u8], pos: RecordPosition) -> Option<RecordPosition> {
        let mut inner = self.inner.write().expect("bptree lock poisoned");
        if let Some(file) = inner.file.as_mut() {
            Self::append_put(file, key, pos).expect("bptree-index append failed");
        }
        inner.map.insert(key.to_vec(), pos)
    }

    fn get(&self, key: &[u8]) -> Option<RecordPosition> {
        self.inner.read().expect("bptree lock poisoned").map.get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> Option<RecordPosition> {
        let mut inner = self.inner.write().expect("bptree lock poisoned");
        let old = inner.map.remove(key);
        if old.is_some() {
            if let Some(file) = inner.file.as_mut() {
                Self::append_delete(file, key).expect("bptree-index append failed");
            }
        }
        old
    }

    fn size(&self) -> usize {
        self.inner.read().expect("bptree lock poisoned").map.len()
    }

    fn iter(&self, reverse: bool) -> Box<dyn KeydirIterator> {
        let snapshot: Vec<_> = self
            .inner
            .read()
            .expect("bptree lock poisoned")
            .map
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Box::new(SnapshotIterator::new(snapshot, reverse))
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write().expect("bptree lock poisoned");
        if let Some(file) = inner.file.as_mut() {
            file.sync_all()?;
        }
        Ok(())
    }
}
