//! Atomic multi-key writes (§4.7): stage Put/Delete operations under a
//! single sequence number, then commit them together terminated by a
//! `TxFinished` record so recovery either sees the whole batch or none of
//! it. Grounded on the original `batch.go`'s `WriteBatch`/`Commit`.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use caskdb_storage::Record;
use caskdb_types::{IndexType, TX_FINISHED_KEY};

use crate::append::append_record;
use crate::db::Engine;
use crate::error::{EngineError, Result};
use crate::keys;
use crate::options::BatchOptions;

enum PendingOp {
    Put(Vec<u8>),
    Delete,
}

/// A set of writes committed atomically under one sequence number.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: BatchOptions,
    pending: Mutex<HashMap<Vec<u8>, PendingOp>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(engine: &'a Engine, options: BatchOptions) -> Result<Self> {
        if engine.options.index_type == IndexType::BPlusTree && !engine.seq_num_file_exists && !engine.is_first_launch {
            return Err(EngineError::MissingSequenceSnapshot);
        }
        Ok(Self {
            engine,
            options,
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }
        self.pending_mut().insert(key.to_vec(), PendingOp::Put(value.to_vec()));
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(EngineError::EmptyKey);
        }
        self.pending_mut().insert(key.to_vec(), PendingOp::Delete);
        Ok(())
    }

    /// Writes every staged operation, then applies them all to the keydir.
    /// A crash partway through the append loop leaves an incomplete batch
    /// on disk that recovery discards for lack of a `TxFinished` record.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending_mut();
        if pending.len() as u32 > self.options.max_batch_size {
            return Err(EngineError::ExceedMaxBatchSize);
        }
        if pending.is_empty() {
            return Ok(());
        }

        let seq = self.engine.seq_num.fetch_add(1, Ordering::SeqCst) + 1;
        let mut applied = Vec::with_capacity(pending.len());

        {
            let mut state = self.engine.state_write();
            for (key, op) in pending.iter() {
                let disk_key = keys::with_seq(seq, key);
                let record = match op {
                    PendingOp::Put(value) => Record::normal(disk_key, value.clone()),
                    PendingOp::Delete => Record::deleted(disk_key),
                };
                let pos = append_record(&self.engine.options.dir_path, self.engine.options.data_file_size, &mut state.active, &mut state.sealed, &record)?;
                applied.push((key.clone(), matches!(op, PendingOp::Put(_)), pos));
            }

            let finish_key = keys::with_seq(seq, TX_FINISHED_KEY);
            append_record(
                &self.engine.options.dir_path,
                self.engine.options.data_file_size,
                &mut state.active,
                &mut state.sealed,
                &Record::tx_finished(finish_key),
            )?;

            if self.options.sync_writes {
                state.active.sync()?;
            }
        }

        for (key, is_put, pos) in applied {
            if is_put {
                if let Some(old) = self.engine.index.put(&key, pos) {
                    self.engine.reclaimable_space.fetch_add(u64::from(old.size), Ordering::SeqCst);
                }
            } else {
                if let Some(old) = self.engine.index.delete(&key) {
                    self.engine.reclaimable_space.fetch_add(u64::from(old.size), Ordering::SeqCst);
                }
                self.engine.reclaimable_space.fetch_add(u64::from(pos.size), Ordering::SeqCst);
            }
        }

        pending.clear();
        Ok(())
    }

    fn pending_mut(&self) -> std::sync::MutexGuard<'_, HashMap<Vec<u8>, PendingOp>> {
        self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn options_in(dir: &std::path::Path) -> Options {
        Options {
            dir_path: dir.to_path_buf(),
            data_file_size: 4096,
            ..Options::default()
        }
    }

    #[test]
    fn committed_batch_is_visible_and_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(options_in(dir.path())).unwrap();

        let batch = engine.new_write_batch(BatchOptions::default()).unwrap();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.delete(b"a").unwrap();

        assert!(matches!(engine.get(b"a"), Err(EngineError::NotFound)));
        assert!(matches!(engine.get(b"b"), Err(EngineError::NotFound)));

        batch.commit().unwrap();

        assert!(matches!(engine.get(b"a"), Err(EngineError::NotFound)));
        assert_eq!(engine.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn uncommitted_batch_does_not_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = Engine::open(options_in(dir.path())).unwrap();
            let batch = engine.new_write_batch(BatchOptions::default()).unwrap();
            batch.put(b"ghost", b"v").unwrap();
            engine.close().unwrap();
        }
        let engine = Engine::open(options_in(dir.path())).unwrap();
        assert!(matches!(engine.get(b"ghost"), Err(EngineError::NotFound)));
    }

    #[test]
    fn batch_exceeding_max_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(options_in(dir.path())).unwrap();
        let batch = engine
            .new_write_batch(BatchOptions {
                max_batch_size: 1,
                sync_writes: true,
            })
            .unwrap();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        assert!(matches!(batch.commit(), Err(EngineError::ExceedMaxBatchSize)));
    }
}
