//! In-memory storage engine.
//!
//! Used for testing and ephemeral deployments. All data is lost when the
//! engine is dropped. Documents are kept in encoded form so loads go
//! through the same decoder as the filesystem engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use odyn_types::ResourcePath;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::resource::{ResourceData, codec};
use crate::storage::ops::{Connection, StorageEngine};

type Documents = Arc<RwLock<BTreeMap<ResourcePath, Value>>>;

/// In-memory storage engine.
///
/// Thread-safe via an internal `RwLock`; connections share the engine's map.
#[derive(Debug, Default, Clone)]
pub struct MemoryEngine {
    docs: Documents,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> StoreResult<Arc<dyn Connection>> {
        Ok(Arc::new(MemoryConnection {
            docs: Arc::clone(&self.docs),
            closed: AtomicBool::new(false),
        }))
    }

    async fn erase(&self) -> StoreResult<()> {
        self.docs.write().clear();
        Ok(())
    }

    async fn prep(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn migrate(&self, from: &str, to: &str) -> StoreResult<()> {
        Err(StoreError::unsupported(format!(
            "memory engine has no schema versions (asked {from} -> {to})"
        )))
    }
}

/// Connection to a [`MemoryEngine`].
#[derive(Debug)]
pub struct MemoryConnection {
    docs: Documents,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn delete_resource(&self, path: &ResourcePath) -> StoreResult<()> {
        self.check_open()?;
        match self.docs.write().remove(path) {
            Some(_) => {
                debug!(%path, "deleted resource");
                Ok(())
            }
            None => Err(StoreError::not_found(format!("resource {path}"))),
        }
    }

    async fn load_resource(&self, path: &ResourcePath) -> StoreResult<ResourceData> {
        self.check_open()?;
        let doc = self
            .docs
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("resource {path}")))?;
        codec::decode(&doc).map_err(|e| StoreError::corrupt(format!("{path}: {e}")))
    }

    async fn save_resource(&self, path: &ResourcePath, data: &ResourceData) -> StoreResult<()> {
        self.check_open()?;
        let doc = codec::encode(data)?;
        self.docs.write().insert(path.clone(), doc);
        debug!(%path, "saved resource");
        Ok(())
    }

    async fn resource_exists(&self, path: &ResourcePath) -> StoreResult<bool> {
        self.check_open()?;
        Ok(self.docs.read().contains_key(path))
    }
}

// ============================================================================
// Tests
// ============================================================================
