//! # caskdb-engine
//!
//! The embedded key-value store built on `caskdb-storage`'s record codec
//! and keydir implementations: `Engine::open`/`put`/`get`/`delete`, atomic
//! batches, a key iterator, and merge (compaction).

mod append;
mod batch;
mod db;
mod error;
mod hint;
mod iterator;
mod keys;
mod lock;
mod merge;
mod options;
mod recovery;

pub use batch::WriteBatch;
pub use db::{Engine, Stats};
pub use error::{EngineError, Result};
pub use iterator::KeyIterator;
pub use options::{BatchOptions, IteratorOptions, Options};

pub use caskdb_types::IndexType;
