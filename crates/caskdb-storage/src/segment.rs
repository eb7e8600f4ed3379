//! A segment wraps one numbered data file: it owns the I/O handle, tracks
//! its write offset, and knows how to read a record back out at a given
//! offset (§4.3).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use caskdb_io::{FileBackend, FileHandle, IoBackend, MappedBackend, OpenFlags};
use caskdb_types::FileId;

use crate::error::StorageError;
use crate::record::{self, HeaderOutcome, Record, MAX_HEADER_SIZE};

#[derive(Debug)]
pub struct Segment {
    pub file_id: FileId,
    pub write_offset: u64,
    path: PathBuf,
    backend: Arc<dyn IoBackend>,
    handle: FileHandle,
}

impl Segment {
    /// Opens (creating if absent) the data file for `file_id` under
    /// `dir_path` using the standard file backend.
    pub fn open(dir_path: &Path, file_id: FileId) -> Result<Self, StorageError> {
        let backend: Arc<dyn IoBackend> = Arc::new(FileBackend::new());
        Self::open_with_backend(dir_path.join(file_id.file_name()), file_id, backend)
    }

    /// Opens the data file for `file_id` read-only via a memory-mapped
    /// backend, for accelerated cold-start keydir reconstruction.
    pub fn open_mapped(dir_path: &Path, file_id: FileId) -> Result<Self, StorageError> {
        let backend: Arc<dyn IoBackend> = Arc::new(MappedBackend::new());
        Self::open_with_backend(dir_path.join(file_id.file_name()), file_id, backend)
    }

    /// Opens a single-record auxiliary log addressed directly by path
    /// (`hint-index`, `seq-num`, `merge-finished`) rather than by numeric
    /// segment id. `file_id` is a bookkeeping placeholder; these files are
    /// never looked up by id.
    pub fn open_named(path: PathBuf, file_id: FileId) -> Result<Self, StorageError> {
        let backend: Arc<dyn IoBackend> = Arc::new(FileBackend::new());
        Self::open_with_backend(path, file_id, backend)
    }

    fn open_with_backend(path: PathBuf, file_id: FileId, backend: Arc<dyn IoBackend>) -> Result<Self, StorageError> {
        let handle = backend.open(&path, OpenFlags::append_create())?;
        let write_offset = backend.file_size(&handle)?;
        Ok(Self {
            file_id,
            write_offset,
            path,
            backend,
            handle,
        })
    }

    /// Switches this segment back to the standard file backend after a
    /// memory-mapped cold-start read. No-op if already on the file backend.
    pub fn switch_to_file_backend(&mut self) -> Result<(), StorageError> {
        let backend: Arc<dyn IoBackend> = Arc::new(FileBackend::new());
        let handle = backend.open(&self.path, OpenFlags::append_create())?;
        self.backend = backend;
        self.handle = handle;
        Ok(())
    }

    /// Appends `record`, returning the byte offset it was written at and
    /// its encoded size.
    pub fn append(&mut self, record: &Record) -> Result<(u64, usize), StorageError> {
        let (bytes, size) = record.encode();
        self.append_encoded(&bytes, size)
    }

    /// Appends already-encoded record bytes, for callers that need to know
    /// the encoded size before deciding whether to rotate the segment first.
    pub fn append_encoded(&mut self, bytes: &[u8], size: usize) -> Result<(u64, usize), StorageError> {
        let offset = self.write_offset;
        let mut written = 0;
        while written < bytes.len() {
            written += self.backend.write(&mut self.handle, &bytes[written..])?;
        }
        self.write_offset += size as u64;
        Ok((offset, size))
    }

    pub fn sync(&self) -> Result<(), StorageError> {
        self.backend.fsync(&self.handle)?;
        Ok(())
    }

    pub fn close(self) -> Result<(), StorageError> {
        self.backend.close(self.handle)?;
        Ok(())
    }

    pub fn size(&self) -> Result<u64, StorageError> {
        Ok(self.backend.file_size(&self.handle)?)
    }

    /// Reads the record at `offset`. Returns `None` at clean end-of-file
    /// (either past the end of the file, or the canonical zero-filled
    /// hole).
    pub fn read_record(&self, offset: u64) -> Result<Option<(Record, usize)>, StorageError> {
        let file_size = self.backend.file_size(&self.handle)?;
        if offset >= file_size {
            return Ok(None);
        }

        let header_read_len = MAX_HEADER_SIZE.min((file_size - offset) as usize);
        let mut header_buf = vec![0u8; header_read_len];
        self.backend.read_at(&self.handle, offset, &mut header_buf)?;

        let header = match record::decode_header(&header_buf)? {
            HeaderOutcome::Header(h) => h,
            HeaderOutcome::Eof => return Ok(None),
        };

        if header.key_size <= 0 {
            return Err(StorageError::CorruptFile(format!(
                "key_size {} is not positive at offset {offset} in {}",
                header.key_size,
                self.path.display()
            )));
        }
        if header.value_size < 0 {
            return Err(StorageError::CorruptFile(format!(
                "value_size {} is negative at offset {offset} in {}",
                header.value_size,
                self.path.display()
            )));
        }

        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let total_size = header.header_size + key_size + value_size;

        let mut kv_buf = vec![0u8; key_size + value_size];
        self.backend.read_at(&self.handle, offset + header.header_size as u64, &mut kv_buf)?;

        let key = &kv_buf[..key_size];
        let value = &kv_buf[key_size..];
        if !record::verify_crc(&header, key, value, header.crc) {
            return Err(StorageError::CorruptRecord);
        }

        let record = Record {
            record_type: header.record_type,
            key: bytes::Bytes::copy_from_slice(key),
            value: bytes::Bytes::copy_from_slice(value),
        };

        Ok(Some((record, total_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), FileId(0)).unwrap();

        let record = Record::normal(&b"key"[..], &b"value"[..]);
        let (offset, size) = segment.append(&record).unwrap();
        assert_eq!(offset, 0);

        let (read_back, read_size) = segment.read_record(offset).unwrap().unwrap();
        assert_eq!(read_size, size);
        assert_eq!(read_back, record);
    }

    #[test]
    fn sequential_records_advance_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), FileId(0)).unwrap();

        let mut offsets = Vec::new();
        for i in 0..5 {
            let record = Record::normal(format!("k{i}").into_bytes(), format!("v{i}").into_bytes());
            offsets.push(segment.append(&record).unwrap().0);
        }

        for (i, offset) in offsets.into_iter().enumerate() {
            let (record, _) = segment.read_record(offset).unwrap().unwrap();
            assert_eq!(record.key, bytes::Bytes::from(format!("k{i}").into_bytes()));
        }
    }

    #[test]
    fn read_past_end_of_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let segment = Segment::open(dir.path(), FileId(0)).unwrap();
        assert!(segment.read_record(0).unwrap().is_none());
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FileId(0).file_name());
        {
            let mut segment = Segment::open(dir.path(), FileId(0)).unwrap();
            segment.append(&Record::normal(&b"k"[..], &b"v"[..])).unwrap();
            segment.sync().unwrap();
        }

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(&[0xff]).unwrap();

        let segment = Segment::open(dir.path(), FileId(0)).unwrap();
        assert!(matches!(segment.read_record(0), Err(StorageError::CorruptRecord)));
    }

    #[test]
    fn reopening_preserves_write_offset() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut segment = Segment::open(dir.path(), FileId(0)).unwrap();
            segment.append(&Record::normal(&b"k"[..], &b"v"[..])).unwrap();
        }
        let segment = Segment::open(dir.path(), FileId(0)).unwrap();
        assert!(segment.write_offset > 0);
    }
}
