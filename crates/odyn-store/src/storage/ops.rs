//! Storage engine and connection traits.

use std::sync::Arc;

use async_trait::async_trait;
use odyn_types::ResourcePath;

use crate::error::StoreResult;
use crate::resource::ResourceData;

/// A storage engine: owns the durable state and hands out connections.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Short engine name for logs (`fs`, `memory`).
    fn name(&self) -> &'static str;

    /// Open a connection. Cheap and repeatable.
    async fn connect(&self) -> StoreResult<Arc<dyn Connection>>;

    /// Remove everything this engine owns, and nothing else.
    ///
    /// Erasing an engine with no data is not an error.
    async fn erase(&self) -> StoreResult<()>;

    /// Prepare the engine for use. Idempotent.
    async fn prep(&self) -> StoreResult<()>;

    /// Migrate stored data between schema versions.
    ///
    /// Engines without schema versioning return `Unsupported`.
    async fn migrate(&self, from: &str, to: &str) -> StoreResult<()>;
}

/// A connection to a storage engine.
///
/// Every operation on a closed connection fails with `Closed`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Close the connection. Idempotent.
    async fn close(&self) -> StoreResult<()>;

    fn is_closed(&self) -> bool;

    // ========================================================================
    // Resources
    // ========================================================================

    /// Delete the resource at `path`. `NotFound` if absent.
    ///
    /// Resources nested beneath `path` are untouched.
    async fn delete_resource(&self, path: &ResourcePath) -> StoreResult<()>;

    /// Load the resource at `path`.
    ///
    /// `NotFound` if absent, `Corrupt` if the stored form is malformed.
    async fn load_resource(&self, path: &ResourcePath) -> StoreResult<ResourceData>;

    /// Create or replace the resource at `path`.
    ///
    /// If the resource cannot be encoded nothing is written.
    async fn save_resource(&self, path: &ResourcePath, data: &ResourceData) -> StoreResult<()>;

    /// Whether a resource is stored at `path`.
    async fn resource_exists(&self, path: &ResourcePath) -> StoreResult<bool>;
}
