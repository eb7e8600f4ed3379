//! Get command - fetch the value stored for a key.

use std::path::Path;

use anyhow::{Context, Result};
use caskdb_engine::IndexType;

pub fn run(dir: &Path, index_type: IndexType, key: &str) -> Result<()> {
    let engine = super::open(dir, index_type)?;
    let value = engine.get(key.as_bytes()).with_context(|| format!("failed to get key {key:?}"))?;
    engine.close()?;
    println!("{}", String::from_utf8_lossy(&value));
    Ok(())
}
