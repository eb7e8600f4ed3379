//! # caskdb-io
//!
//! Trait-based abstraction over segment file I/O. The storage layer never
//! calls `std::fs` directly; it goes through [`IoBackend`] so that a
//! read-only memory-mapped backend can stand in for the standard
//! file-descriptor backend during cold-start recovery.

mod backend;
mod error;
mod file_backend;
mod mapped_backend;

pub use backend::{FileHandle, IoBackend, OpenFlags};
pub use error::IoError;
pub use file_backend::FileBackend;
pub use mapped_backend::MappedBackend;
