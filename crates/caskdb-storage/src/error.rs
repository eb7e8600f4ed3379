#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] caskdb_io::IoError),

    #[error("crc mismatch, record may be corrupted")]
    CorruptRecord,

    #[error("data file is corrupted: {0}")]
    CorruptFile(String),
}
