use std::fs::File;
use std::path::Path;

use crate::IoError;

/// Flags controlling how [`IoBackend::open`] opens a path.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub append: bool,
}

impl OpenFlags {
    /// Read-only, does not create.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    /// Create-if-absent, append-write. This is how every active segment is
    /// opened.
    #[must_use]
    pub fn append_create() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            append: true,
        }
    }
}

/// A handle returned by [`IoBackend::open`]. Variants carry whatever state
/// the backend needs to service later calls.
#[derive(Debug)]
pub enum FileHandle {
    File { id: u64, file: Option<File> },
    Mapped { id: u64, mmap: memmap2::Mmap },
}

impl FileHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            FileHandle::File { id, .. } | FileHandle::Mapped { id, .. } => *id,
        }
    }

    fn file(&self) -> Result<&File, IoError> {
        match self {
            FileHandle::File { file: Some(f), .. } => Ok(f),
            FileHandle::File { file: None, id } => Err(IoError::InvalidHandle { handle: *id }),
            FileHandle::Mapped { .. } => Err(IoError::ReadOnly),
        }
    }

    fn file_mut(&mut self) -> Result<&mut File, IoError> {
        match self {
            FileHandle::File { file: Some(f), .. } => Ok(f),
            FileHandle::File { file: None, id } => Err(IoError::InvalidHandle { handle: *id }),
            FileHandle::Mapped { .. } => Err(IoError::ReadOnly),
        }
    }
}

/// Abstraction over segment file I/O. Segments never touch `std::fs`
/// directly; they go through this trait so that a memory-mapped read-only
/// backend can stand in during cold-start keydir reconstruction.
pub trait IoBackend: std::fmt::Debug + Send + Sync {
    fn open(&self, path: &Path, flags: OpenFlags) -> Result<FileHandle, IoError>;
    fn read_at(&self, handle: &FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize, IoError>;
    fn write(&self, handle: &mut FileHandle, buf: &[u8]) -> Result<usize, IoError>;
    fn fsync(&self, handle: &FileHandle) -> Result<(), IoError>;
    fn close(&self, handle: FileHandle) -> Result<(), IoError>;
    fn file_size(&self, handle: &FileHandle) -> Result<u64, IoError>;
}

pub(crate) fn read_via_std(handle: &FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize, IoError> {
    match handle {
        FileHandle::File { .. } => {
            let file = handle.file()?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::FileExt;
                Ok(file.read_at(buf, offset)?)
            }
            #[cfg(not(unix))]
            {
                use std::os::windows::fs::FileExt;
                Ok(file.seek_read(buf, offset)?)
            }
        }
        FileHandle::Mapped { mmap, .. } => {
            let offset = offset as usize;
            if offset >= mmap.len() {
                return Ok(0);
            }
            let end = (offset + buf.len()).min(mmap.len());
            let n = end - offset;
            buf[..n].copy_from_slice(&mmap[offset..end]);
            Ok(n)
        }
    }
}

pub(crate) fn write_via_std(handle: &mut FileHandle, buf: &[u8]) -> Result<usize, IoError> {
    use std::io::Write;
    let file = handle.file_mut()?;
    Ok(file.write(buf)?)
}

pub(crate) fn fsync_via_std(handle: &FileHandle) -> Result<(), IoError> {
    match handle {
        FileHandle::File { .. } => {
            handle.file()?.sync_all()?;
            Ok(())
        }
        FileHandle::Mapped { .. } => Ok(()),
    }
}

pub(crate) fn file_size_via_std(handle: &FileHandle) -> Result<u64, IoError> {
    match handle {
        FileHandle::File { .. } => Ok(handle.file()?.metadata()?.len()),
        FileHandle::Mapped { mmap, .. } => Ok(mmap.len() as u64),
    }
}
