use std::path::PathBuf;

use caskdb_types::IndexType;

use crate::error::EngineError;

/// Configuration for [`crate::Engine::open`] (§6).
#[derive(Debug, Clone)]
pub struct Options {
    /// Storage directory. Created if absent.
    pub dir_path: PathBuf,
    /// Segment size threshold that triggers rotation.
    pub data_file_size: u64,
    /// Fsync the active segment after every append.
    pub sync_writes: bool,
    /// Fsync after this many bytes have accumulated since the last sync.
    /// Zero disables byte-count-triggered syncs.
    pub bytes_per_sync: u64,
    /// Which keydir implementation backs this engine instance.
    pub index_type: IndexType,
    /// Use a memory-mapped reader while rebuilding the keydir at open, then
    /// switch every segment back to the standard file backend.
    pub mmap_at_start: bool,
    /// Minimum reclaimable fraction of total directory size required for
    /// `merge()` to proceed.
    pub merge_trigger_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("caskdb-data"),
            data_file_size: 256 * 1024 * 1024,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::default(),
            mmap_at_start: false,
            merge_trigger_ratio: 0.5,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(EngineError::InvalidOption("dir_path must not be empty".into()));
        }
        if self.data_file_size == 0 {
            return Err(EngineError::InvalidOption("data_file_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.merge_trigger_ratio) {
            return Err(EngineError::InvalidOption("merge_trigger_ratio must be in 0.0..=1.0".into()));
        }
        Ok(())
    }
}

/// Options controlling a single [`crate::iterator::KeyIterator`] (§6).
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    pub prefix: Vec<u8>,
    pub reverse: bool,
}

/// Options controlling a [`crate::batch::WriteBatch`] (§6).
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_batch_size: u32,
    pub sync_writes: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 10_000,
            sync_writes: true,
        }
    }
}
