pub mod delete;
pub mod get;
pub mod keys;
pub mod merge;
pub mod put;
pub mod stat;

use std::path::Path;

use anyhow::Result;
use caskdb_engine::{Engine, IndexType, Options};

pub(crate) fn open(dir: &Path, index_type: IndexType) -> Result<Engine> {
    let options = Options {
        dir_path: dir.to_path_buf(),
        index_type,
        ..Options::default()
    };
    Ok(Engine::open(options)?)
}
