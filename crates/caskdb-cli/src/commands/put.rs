//! Put command - store a key/value pair.

use std::path::Path;

use anyhow::{Context, Result};
use caskdb_engine::IndexType;

pub fn run(dir: &Path, index_type: IndexType, key: &str, value: &str) -> Result<()> {
    let engine = super::open(dir, index_type)?;
    engine.put(key.as_bytes(), value.as_bytes()).with_context(|| format!("failed to put key {key:?}"))?;
    engine.close()?;
    println!("OK");
    Ok(())
}
