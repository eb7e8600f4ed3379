//! Stat command - print key count, segment count and reclaimable space.

use std::path::Path;

use anyhow::Result;
use caskdb_engine::IndexType;

pub fn run(dir: &Path, index_type: IndexType) -> Result<()> {
    let engine = super::open(dir, index_type)?;
    let stat = engine.stat()?;
    engine.close()?;

    println!("keys:               {}", stat.key_count);
    println!("segments:           {}", stat.segment_count);
    println!("disk size (bytes):  {}", stat.disk_size_bytes);
    println!("reclaimable (bytes):{}", stat.reclaimable_bytes);
    Ok(())
}
