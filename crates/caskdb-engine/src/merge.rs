//! Compaction (§4.8): rewrite only the live records from sealed segments
//! into a sibling `<dir>-merge` directory, alongside a hint file recording
//! their new positions, then promote that directory into place the next
//! time the database is opened. Grounded on the original `merge.go`'s
//! `Merge`/`loadMergeFiles` pair and on `flash-kv`'s equivalent compaction
//! path for the promote-on-open handshake.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use caskdb_storage::{Record, Segment};
use caskdb_types::{FileId, DATA_FILE_SUFFIX, HINT_FILE_NAME, LOCK_FILE_NAME, MERGE_DIR_SUFFIX, MERGE_FINISHED_FILE_NAME, SEQ_NUM_FILE_NAME};

use crate::append::append_record;
use crate::db::Engine;
use crate::error::{EngineError, Result};
use crate::{keys, recovery};

fn merge_dir_path(dir_path: &Path) -> PathBuf {
    let name = dir_path.file_name().unwrap_or_default().to_string_lossy().into_owned();
    dir_path.with_file_name(format!("{name}{MERGE_DIR_SUFFIX}"))
}

impl Engine {
    /// Compacts the database: rewrites every live record into fresh
    /// segments and discards the rest. Blocks concurrent merges; refuses to
    /// run if reclaimable space is below `options.merge_trigger_ratio`.
    pub fn merge(&self) -> Result<()> {
        if self.is_merging.swap(true, Ordering::SeqCst) {
            return Err(EngineError::MergeInProgress);
        }
        let result = self.do_merge();
        self.is_merging.store(false, Ordering::SeqCst);
        result
    }

    /// Rewrites live records into `<dir>-merge` using file ids starting
    /// fresh from zero. Those ids collide with the main directory's own
    /// numbering, so the merge output only becomes valid once promoted at
    /// the next open: the live engine keeps serving reads from the
    /// original segments, untouched, until then. The writer lock is held
    /// only long enough to seal the active segment and snapshot which file
    /// ids need merging; the rewrite scan itself runs unlocked so ordinary
    /// puts/deletes/batch commits are not blocked for the duration of a
    /// merge. Concurrent writes during the scan are reconciled by the
    /// hint-file-then-replay-from-frontier promotion at the next open, not
    /// by serializing against the writer lock here.
    fn do_merge(&self) -> Result<()> {
        let stat = self.stat()?;
        if stat.disk_size_bytes > 0 {
            let ratio = stat.reclaimable_bytes as f32 / stat.disk_size_bytes as f32;
            if ratio < self.options.merge_trigger_ratio {
                return Err(EngineError::MergeRatioUnmet);
            }
        }

        let merge_dir = merge_dir_path(&self.options.dir_path);
        if let Ok(available) = fs2::available_space(&self.options.dir_path) {
            if available <= stat.disk_size_bytes - stat.reclaimable_bytes {
                return Err(EngineError::DiskSpaceInsufficient);
            }
        }

        let merge_ids = {
            let mut state = self.state_write();
            state.active.sync()?;
            let sealed_id = state.active.file_id;
            let non_merge_file_id = sealed_id.next();
            let new_active = Segment::open(&self.options.dir_path, non_merge_file_id)?;
            let old_active = std::mem::replace(&mut state.active, new_active);
            state.sealed.insert(sealed_id, old_active);
            state.file_ids.push(non_merge_file_id);

            let ids: Vec<FileId> = state.sealed.keys().copied().filter(|id| *id < non_merge_file_id).collect();
            (ids, non_merge_file_id)
        };
        let (merge_ids, non_merge_file_id) = merge_ids;

        if merge_dir.is_dir() {
            fs::remove_dir_all(&merge_dir)?;
        }
        fs::create_dir_all(&merge_dir)?;

        let mut merge_active = Segment::open(&merge_dir, FileId::ZERO)?;
        let mut merge_sealed = std::collections::BTreeMap::new();
        let mut hint_segment = Segment::open_named(merge_dir.join(HINT_FILE_NAME), FileId::ZERO)?;

        // Sealed segments are never written again once rotated out, so
        // reading them back here needs no lock at all: the writer lock
        // above has already released by the time this loop runs.
        for file_id in merge_ids.iter().copied() {
            let segment = Segment::open(&self.options.dir_path, file_id)?;
            self.rewrite_live_records(&segment, &merge_dir, &mut merge_active, &mut merge_sealed, &mut hint_segment)?;
        }

        for segment in merge_sealed.values() {
            segment.sync()?;
        }
        merge_active.sync()?;
        hint_segment.sync()?;
        recovery::write_single_record_file(&merge_dir.join(MERGE_FINISHED_FILE_NAME), non_merge_file_id.to_string().as_bytes())?;

        tracing::info!(non_merge_file_id = %non_merge_file_id, segments_merged = merge_ids.len(), "merge completed, awaiting promotion at next open");
        Ok(())
    }

    fn rewrite_live_records(
        &self,
        segment: &Segment,
        merge_dir: &Path,
        merge_active: &mut Segment,
        merge_sealed: &mut std::collections::BTreeMap<FileId, Segment>,
        hint_segment: &mut Segment,
    ) -> Result<()> {
        let mut offset = 0u64;
        while let Some((record, size)) = segment.read_record(offset)? {
            let pos = caskdb_types::RecordPosition::new(segment.file_id, offset as i64, size as u32);
            offset += size as u64;

            let Some((_, user_key)) = keys::split_seq(&record.key) else {
                continue;
            };
            if self.index.get(user_key) != Some(pos) {
                continue;
            }

            let rewritten = Record::normal(keys::non_transaction(user_key), record.value.clone());
            let new_pos = append_record(merge_dir, self.options.data_file_size, merge_active, merge_sealed, &rewritten)?;
            hint_segment.append(&Record::normal(user_key.to_vec(), crate::hint::encode_position(new_pos)))?;
        }
        Ok(())
    }
}

/// Promotes a completed merge directory into the main directory, or
/// discards a crashed one, at open time (§4.8 recovery). A merge directory
/// lacking its own `merge-finished` marker means the process crashed mid
/// merge and its contents are incomplete; it is simply deleted.
pub(crate) fn load_merge_files(dir_path: &Path) -> Result<()> {
    let merge_dir = merge_dir_path(dir_path);
    if !merge_dir.is_dir() {
        return Ok(());
    }

    let marker = merge_dir.join(MERGE_FINISHED_FILE_NAME);
    if !marker.is_file() {
        tracing::warn!(dir = %merge_dir.display(), "discarding merge directory left behind by a crashed merge");
        fs::remove_dir_all(&merge_dir)?;
        return Ok(());
    }

    let frontier = recovery::read_merge_finished_frontier(&merge_dir)?.ok_or_else(|| EngineError::CorruptDirectory("merge-finished marker unreadable".into()))?;

    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) else { continue };
        if let Ok(id) = stem.parse::<u32>() {
            if FileId(id) < frontier {
                fs::remove_file(entry.path())?;
            }
        }
    }

    for entry in fs::read_dir(&merge_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == SEQ_NUM_FILE_NAME || name == LOCK_FILE_NAME {
            continue;
        }
        fs::rename(entry.path(), dir_path.join(&name))?;
    }

    fs::remove_dir_all(&merge_dir)?;
    tracing::info!(dir = %dir_path.display(), frontier = %frontier, "promoted merge output");
    Ok(())
}
