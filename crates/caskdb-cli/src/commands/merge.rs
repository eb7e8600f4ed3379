//! Merge command - compact the database.

use std::path::Path;

use anyhow::{Context, Result};
use caskdb_engine::IndexType;

pub fn run(dir: &Path, index_type: IndexType) -> Result<()> {
    let engine = super::open(dir, index_type)?;
    engine.merge().context("merge failed")?;
    engine.close()?;
    println!("merge complete; compacted segments take effect on the next open");
    Ok(())
}
