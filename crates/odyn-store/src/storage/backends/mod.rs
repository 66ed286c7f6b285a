//! Storage backends.
//!
//! Backends implement [`StorageEngine`](super::StorageEngine) and
//! [`Connection`](super::Connection).

mod fs;
mod memory;

pub use fs::FsEngine;
pub use memory::MemoryEngine;
