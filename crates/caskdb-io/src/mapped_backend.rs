//! Read-only memory-mapped backend, used only to accelerate cold-start
//! keydir reconstruction when `Options::mmap_at_start` is set. Writes and
//! syncs always fail; the engine switches every segment back to
//! [`crate::FileBackend`] once recovery finishes.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{FileHandle, IoBackend, OpenFlags};
use crate::{IoError, backend};

#[derive(Debug, Default)]
pub struct MappedBackend {
    next_handle_id: AtomicU64,
}

impl MappedBackend {
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

impl IoBackend for MappedBackend {
    fn open(&self, path: &Path, _flags: OpenFlags) -> Result<FileHandle, IoError> {
        let file = File::open(path)?;
        // mmap of a zero-length file is invalid on some platforms; treat it
        // as an empty in-memory slice by falling back to a zero-sized map
        // only when there is at least one byte to map.
        let len = file.metadata()?.len();
        let mmap = if len == 0 {
            memmap2::MmapOptions::new().len(1).map_anon()?.make_read_only().map_err(|(_, e)| e)?
        } else {
            // Safety: the file is not concurrently truncated by this
            // process (segments are append-only and mmap'd read-only copies
            // are discarded before any writer reopens the file).
            unsafe { memmap2::MmapOptions::new().map(&file)? }
        };
        Ok(FileHandle::Mapped {
            id: self.next_id(),
            mmap,
        })
    }

    fn read_at(&self, handle: &FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize, IoError> {
        backend::read_via_std(handle, offset, buf)
    }

    fn write(&self, _handle: &mut FileHandle, _buf: &[u8]) -> Result<usize, IoError> {
        Err(IoError::ReadOnly)
    }

    fn fsync(&self, _handle: &FileHandle) -> Result<(), IoError> {
        Err(IoError::ReadOnly)
    }

    fn close(&self, _handle: FileHandle) -> Result<(), IoError> {
        Ok(())
    }

    fn file_size(&self, handle: &FileHandle) -> Result<u64, IoError> {
        backend::file_size_via_std(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped.dat");
        std::fs::write(&path, b"mapped contents").unwrap();

        let backend = MappedBackend::new();
        let handle = backend.open(&path, OpenFlags::read_only()).unwrap();
        let mut buf = vec![0u8; 15];
        let n = backend.read_at(&handle, 0, &mut buf).unwrap();
        assert_eq!(n, 15);
        assert_eq!(&buf, b"mapped contents");
    }

    #[test]
    fn write_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped_ro.dat");
        std::fs::write(&path, b"x").unwrap();

        let backend = MappedBackend::new();
        let mut handle = backend.open(&path, OpenFlags::read_only()).unwrap();
        assert!(matches!(backend.write(&mut handle, b"y"), Err(IoError::ReadOnly)));
    }

    #[test]
    fn empty_file_maps_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        std::fs::write(&path, b"").unwrap();

        let backend = MappedBackend::new();
        let handle = backend.open(&path, OpenFlags::read_only()).unwrap();
        let mut buf = [0u8; 4];
        let n = backend.read_at(&handle, 0, &mut buf).unwrap();
        assert_eq!(n, 0);
    }
}
