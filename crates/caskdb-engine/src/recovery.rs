//! Segment discovery and replay at open (§4.5 step 5-7, §4.9). Grounded on
//! the original `loadDataFiles`/`loadIndexFromDataFiles` pair: list `*.data`
//! files, parse their ids, open oldest-to-newest, then replay records to
//! rebuild the keydir, buffering batched writes until their `TxFinished`
//! terminator is seen.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use caskdb_storage::{KeydirIndex, Record, Segment};
use caskdb_types::{FileId, RecordType, DATA_FILE_SUFFIX, MERGE_FINISHED_FILE_NAME, SEQ_NUM_FILE_NAME};

use crate::error::EngineError;
use crate::{hint, keys};

/// Lists, parses and opens every `*.data` file under `dir_path`. The
/// highest-numbered file becomes the active segment; the rest are sealed.
/// Returns an empty-directory engine as a single fresh segment 0.
pub(crate) fn load_data_files(dir_path: &Path, mmap_at_start: bool) -> Result<(Vec<FileId>, BTreeMap<FileId, Segment>, Segment), EngineError> {
    let mut file_ids = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) else { continue };
        let id: u32 = stem
            .parse()
            .map_err(|_| EngineError::CorruptDirectory(format!("unparseable data file name {name}")))?;
        file_ids.push(FileId(id));
    }
    file_ids.sort_unstable();

    if file_ids.is_empty() {
        let active = Segment::open(dir_path, FileId::ZERO)?;
        return Ok((vec![FileId::ZERO], BTreeMap::new(), active));
    }

    let mut sealed = BTreeMap::new();
    for &id in &file_ids[..file_ids.len() - 1] {
        let segment = open_for_recovery(dir_path, id, mmap_at_start)?;
        sealed.insert(id, segment);
    }
    let active_id = *file_ids.last().expect("checked non-empty");
    let active = open_for_recovery(dir_path, active_id, mmap_at_start)?;

    Ok((file_ids, sealed, active))
}

fn open_for_recovery(dir_path: &Path, id: FileId, mmap_at_start: bool) -> Result<Segment, EngineError> {
    if mmap_at_start {
        Ok(Segment::open_mapped(dir_path, id)?)
    } else {
        Ok(Segment::open(dir_path, id)?)
    }
}

/// Replays every sealed and active segment into `index`, honoring batch
/// atomicity (§4.9). Returns the maximum sequence number observed.
pub(crate) fn load_index_from_data_files(
    index: &dyn KeydirIndex,
    file_ids: &[FileId],
    sealed: &BTreeMap<FileId, Segment>,
    active: &mut Segment,
    frontier: Option<FileId>,
) -> Result<u64, EngineError> {
    let mut pending_tx: BTreeMap<u64, Vec<(Vec<u8>, RecordType, caskdb_types::RecordPosition)>> = BTreeMap::new();
    let mut max_seq = 0u64;

    for &file_id in file_ids {
        if let Some(frontier) = frontier {
            if file_id < frontier {
                continue;
            }
        }

        let mut offset = 0u64;
        loop {
            let read = if file_id == active.file_id {
                active.read_record(offset)?
            } else {
                let segment = sealed.get(&file_id).ok_or(EngineError::MissingDataFile(file_id))?;
                segment.read_record(offset)?
            };
            let Some((record, size)) = read else { break };

            let pos = caskdb_types::RecordPosition::new(file_id, offset as i64, size as u32);
            let Some((seq, user_key)) = keys::split_seq(&record.key) else {
                return Err(EngineError::CorruptDirectory(format!("disk key missing sequence prefix at offset {offset} in segment {file_id}")));
            };
            let user_key = user_key.to_vec();
            max_seq = max_seq.max(seq);

            if seq == caskdb_types::NON_TRANSACTION_SEQ_NUM {
                apply(index, &user_key, record.record_type, pos);
            } else if record.record_type == RecordType::TxFinished {
                if let Some(buffered) = pending_tx.remove(&seq) {
                    for (key, record_type, pos) in buffered {
                        apply(index, &key, record_type, pos);
                    }
                }
            } else {
                pending_tx.entry(seq).or_default().push((user_key, record.record_type, pos));
            }

            offset += size as u64;
        }

        if file_id == active.file_id {
            active.write_offset = offset;
        }
    }

    Ok(max_seq)
}

fn apply(index: &dyn KeydirIndex, key: &[u8], record_type: RecordType, pos: caskdb_types::RecordPosition) {
    match record_type {
        RecordType::Normal => {
            index.put(key, pos);
        }
        RecordType::Deleted => {
            index.delete(key);
        }
        RecordType::TxFinished => {
            tracing::warn!("ignoring a TxFinished record tagged with the non-transaction sequence number");
        }
    }
}

/// Reads the hint file, if present, populating `index` directly with the
/// positions merge already verified as live.
pub(crate) fn load_index_from_hint_file(dir_path: &Path, index: &dyn KeydirIndex) -> Result<(), EngineError> {
    let path = dir_path.join(caskdb_types::HINT_FILE_NAME);
    if !path.is_file() {
        return Ok(());
    }

    let segment = Segment::open_named(path, FileId::ZERO)?;
    let mut offset = 0u64;
    while let Some((record, size)) = segment.read_record(offset)? {
        if let Some(pos) = hint::decode_position(&record.value) {
            index.put(&record.key, pos);
        }
        offset += size as u64;
    }
    Ok(())
}

/// Reads `dir_path/seq-num`, if present, then removes it so the next close
/// can write a fresh one. Only used for the persistent keydir variant.
pub(crate) fn load_seq_num(dir_path: &Path) -> Result<(bool, u64), EngineError> {
    let path = dir_path.join(SEQ_NUM_FILE_NAME);
    let Some(value) = read_single_record_value(&path)? else {
        return Ok((false, 0));
    };
    let seq = std::str::from_utf8(&value)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| EngineError::CorruptDirectory("seq-num file does not contain a decimal sequence number".into()))?;
    fs::remove_file(&path)?;
    Ok((true, seq))
}

/// Reads `dir_path/merge-finished`, if present, returning the frontier file
/// id below which main-directory segments were already folded into the
/// merge output and should not be replayed again.
pub(crate) fn read_merge_finished_frontier(dir_path: &Path) -> Result<Option<FileId>, EngineError> {
    let path = dir_path.join(MERGE_FINISHED_FILE_NAME);
    let Some(value) = read_single_record_value(&path)? else {
        return Ok(None);
    };
    let id = std::str::from_utf8(&value)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| EngineError::CorruptDirectory("merge-finished file does not contain a decimal file id".into()))?;
    Ok(Some(FileId(id)))
}

/// Reads the single record stored in a bare one-record file such as
/// `seq-num` or `merge-finished`, addressed directly by path rather than by
/// numeric segment id.
fn read_single_record_value(path: &Path) -> Result<Option<Vec<u8>>, EngineError> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let header = match caskdb_storage::record::decode_header(&bytes) {
        Ok(h) => h,
        Err(_) => return Ok(None),
    };
    let caskdb_storage::record::HeaderOutcome::Header(header) = header else {
        return Ok(None);
    };
    let key_start = header.header_size;
    let value_start = key_start + header.key_size as usize;
    let value_end = value_start + header.value_size as usize;
    let value = bytes.get(value_start..value_end).map(<[u8]>::to_vec);
    Ok(value)
}

pub(crate) fn write_single_record_file(path: &Path, value: &[u8]) -> Result<(), EngineError> {
    let record = Record::normal(Vec::new(), value.to_vec());
    let (bytes, _) = record.encode();
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use caskdb_storage::BTreeIndex;

    use super::*;
    use crate::keys;

    fn append(segment: &mut Segment, record: &Record) {
        segment.append(record).unwrap();
    }

    #[test]
    fn completed_batch_is_replayed_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let mut active = Segment::open(dir.path(), FileId::ZERO).unwrap();
        append(&mut active, &Record::normal(keys::with_seq(1, b"a"), b"1".to_vec()));
        append(&mut active, &Record::normal(keys::with_seq(1, b"b"), b"2".to_vec()));
        append(&mut active, &Record::tx_finished(keys::with_seq(1, caskdb_types::TX_FINISHED_KEY)));

        let index = BTreeIndex::new();
        let file_ids = vec![FileId::ZERO];
        let sealed = BTreeMap::new();
        load_index_from_data_files(&index, &file_ids, &sealed, &mut active, None).unwrap();

        assert!(index.get(b"a").is_some());
        assert!(index.get(b"b").is_some());
    }

    #[test]
    fn batch_without_terminator_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut active = Segment::open(dir.path(), FileId::ZERO).unwrap();
        append(&mut active, &Record::normal(keys::with_seq(1, b"ghost"), b"v".to_vec()));
        // No TxFinished record: the batch never committed.

        let index = BTreeIndex::new();
        let file_ids = vec![FileId::ZERO];
        let sealed = BTreeMap::new();
        load_index_from_data_files(&index, &file_ids, &sealed, &mut active, None).unwrap();

        assert!(index.get(b"ghost").is_none());
    }

    #[test]
    fn segments_below_merge_frontier_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut seg0 = Segment::open(dir.path(), FileId::ZERO).unwrap();
        append(&mut seg0, &Record::normal(keys::non_transaction(b"stale"), b"old".to_vec()));

        let mut active = Segment::open(dir.path(), FileId(1)).unwrap();
        append(&mut active, &Record::normal(keys::non_transaction(b"fresh"), b"new".to_vec()));

        let index = BTreeIndex::new();
        let file_ids = vec![FileId::ZERO, FileId(1)];
        let mut sealed = BTreeMap::new();
        sealed.insert(FileId::ZERO, seg0);
        load_index_from_data_files(&index, &file_ids, &sealed, &mut active, Some(FileId(1))).unwrap();

        assert!(index.get(b"stale").is_none());
        assert!(index.get(b"fresh").is_some());
    }
}
