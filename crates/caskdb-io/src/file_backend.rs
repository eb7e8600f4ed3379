//! Standard file-descriptor backend using `std::fs`.
//!
//! This is the backend used for every write and for ordinary reads. Files
//! are always created with mode `0644` regardless of the platform default.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{FileHandle, IoBackend, OpenFlags};
use crate::{IoError, backend};

#[derive(Debug, Default)]
pub struct FileBackend {
    next_handle_id: AtomicU64,
}

impl FileBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_handle_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl IoBackend for FileBackend {
    fn open(&self, path: &Path, flags: OpenFlags) -> Result<FileHandle, IoError> {
        let mut opts = OpenOptions::new();
        opts.read(flags.read).write(flags.write).create(flags.create).append(flags.append);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o644);
        }

        let file = opts.open(path)?;
        Ok(FileHandle::File {
            id: self.next_id(),
            file: Some(file),
        })
    }

    fn read_at(&self, handle: &FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize, IoError> {
        backend::read_via_std(handle, offset, buf)
    }

    fn write(&self, handle: &mut FileHandle, buf: &[u8]) -> Result<usize, IoError> {
        backend::write_via_std(handle, buf)
    }

    fn fsync(&self, handle: &FileHandle) -> Result<(), IoError> {
        backend::fsync_via_std(handle)
    }

    fn close(&self, mut handle: FileHandle) -> Result<(), IoError> {
        if let FileHandle::File { file, .. } = &mut handle {
            *file = None;
        }
        Ok(())
    }

    fn file_size(&self, handle: &FileHandle) -> Result<u64, IoError> {
        backend::file_size_via_std(handle)
    }
}
