//! Keys command - list every live key in sorted order.

use std::path::Path;

use anyhow::Result;
use caskdb_engine::IndexType;

pub fn run(dir: &Path, index_type: IndexType) -> Result<()> {
    let engine = super::open(dir, index_type)?;
    for key in engine.list_keys() {
        println!("{}", String::from_utf8_lossy(&key));
    }
    engine.close()?;
    Ok(())
}
