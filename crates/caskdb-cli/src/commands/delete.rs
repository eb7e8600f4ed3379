//! Delete command - remove a key.

use std::path::Path;

use anyhow::{Context, Result};
use caskdb_engine::IndexType;

pub fn run(dir: &Path, index_type: IndexType, key: &str) -> Result<()> {
    let engine = super::open(dir, index_type)?;
    engine.delete(key.as_bytes()).with_context(|| format!("failed to delete key {key:?}"))?;
    engine.close()?;
    println!("OK");
    Ok(())
}
