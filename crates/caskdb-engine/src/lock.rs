//! Directory-level exclusion (§5): an OS advisory lock on a sentinel
//! `flock` file, held for the engine's lifetime. Grounded on the `fs2`-based
//! lock used by comparable embedded Bitcask ports; the original Go source
//! uses the same sentinel-file discipline, just via `flock(2)` directly.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use caskdb_types::LOCK_FILE_NAME;

use crate::error::EngineError;

#[derive(Debug)]
pub struct DirLock {
    file: File,
}

impl DirLock {
    pub fn acquire(dir_path: &Path) -> Result<Self, EngineError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir_path.join(LOCK_FILE_NAME))?;
        file.try_lock_exclusive().map_err(|_| EngineError::AlreadyInUse)?;
        Ok(Self { file })
    }

    pub fn release(&self) -> Result<(), EngineError> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = DirLock::acquire(dir.path()).unwrap();
        assert!(matches!(DirLock::acquire(dir.path()), Err(EngineError::AlreadyInUse)));
        first.release().unwrap();
        assert!(DirLock::acquire(dir.path()).is_ok());
    }
}
