//! Storage abstraction.
//!
//! - [`StorageEngine`] - Owns durable state; erase, prep, migrate, connect
//! - [`Connection`] - Load, save and delete resources by path
//! - [`FsEngine`] - Filesystem engine with UUID indirection
//! - [`MemoryEngine`] - In-process engine for tests and ephemeral use
//!
//! ## Design Decisions
//!
//! - **Paths map to identifiers**: the filesystem engine never stores a
//!   document under its path. A path resolves to a generated identifier,
//!   and the document lives under that identifier.
//! - **Whole-document writes**: saves replace the full document atomically.
//!   Concurrent writers to one path are last-writer-wins.

pub mod backends;
mod ops;

pub use backends::{FsEngine, MemoryEngine};
pub use ops::{Connection, StorageEngine};
