use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid file handle: {handle}")]
    InvalidHandle { handle: u64 },

    #[error("backend is read-only (memory-mapped segments cannot be written to)")]
    ReadOnly,
}
