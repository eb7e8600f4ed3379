#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] caskdb_storage::StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] caskdb_io::IoError),

    #[error("I/O error: {0}")]
    StdIo(#[from] std::io::Error),

    #[error("key must not be empty")]
    EmptyKey,

    #[error("key not found")]
    NotFound,

    #[error("data file {0} referenced by the keydir is missing")]
    MissingDataFile(caskdb_types::FileId),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("data directory is corrupted: {0}")]
    CorruptDirectory(String),

    #[error("the keydir rejected a put/delete it should have accepted")]
    IndexUpdateFailed,

    #[error("batch exceeds the configured max_batch_size")]
    ExceedMaxBatchSize,

    #[error("a merge is already in progress")]
    MergeInProgress,

    #[error("reclaimable space is below the configured merge_trigger_ratio")]
    MergeRatioUnmet,

    #[error("not enough free disk space to merge")]
    DiskSpaceInsufficient,

    #[error("the database directory is already in use by another engine instance")]
    AlreadyInUse,

    #[error("batches require a seq-num snapshot when using the persistent keydir on an existing directory")]
    MissingSequenceSnapshot,
}

pub type Result<T> = std::result::Result<T, EngineError>;
