//! The shared append path used by `put`/`delete`, batch commit, and merge
//! rewriting: encode, rotate if needed, write (§4.6).

use std::collections::BTreeMap;
use std::path::Path;

use caskdb_storage::Record;
use caskdb_storage::Segment;
use caskdb_types::{FileId, RecordPosition};

use crate::error::EngineError;

pub(crate) fn append_record(
    dir_path: &Path,
    data_file_size: u64,
    active: &mut Segment,
    sealed: &mut BTreeMap<FileId, Segment>,
    record: &Record,
) -> Result<RecordPosition, EngineError> {
    let (bytes, size) = record.encode();

    if active.write_offset + size as u64 > data_file_size {
        active.sync()?;
        let sealed_id = active.file_id;
        let new_id = sealed_id.next();
        let new_active = Segment::open(dir_path, new_id)?;
        let old_active = std::mem::replace(active, new_active);
        tracing::info!(sealed_segment = %sealed_id, new_segment = %new_id, "rotated segment");
        sealed.insert(sealed_id, old_active);
    }

    let (offset, written) = active.append_encoded(&bytes, size)?;
    Ok(RecordPosition::new(active.file_id, offset as i64, written as u32))
}
