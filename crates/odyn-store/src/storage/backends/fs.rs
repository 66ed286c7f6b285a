//! Filesystem storage engine.
//!
//! Layout under the configured root:
//!
//! ```text
//! <root>/data/<path segments>/__uuid    identifier, 36 chars, no newline
//! <root>/data/res/<uuid>/__doc          JSON document
//! ```
//!
//! A path resolves to its identifier through `__uuid`; the document lives
//! under the identifier. Identifiers are created atomically: the new id is
//! written to a private temp file and hard-linked into place, so two racing
//! creators end up agreeing on whichever link landed first.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use odyn_types::{ResourceId, ResourcePath};
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::resource::{ResourceData, codec};
use crate::storage::ops::{Connection, StorageEngine};

/// Subdirectory of the root owned by the engine.
pub const DATA_DIR: &str = "data";
/// Subdirectory of the data dir holding documents by identifier.
const RES_DIR: &str = "res";
const UUID_FILE: &str = "__uuid";
const DOC_FILE: &str = "__doc";

/// Attempts at writing a new identifier while a concurrent delete prunes
/// the directories above it.
const CREATE_ATTEMPTS: usize = 5;

type PathLocks = Arc<DashMap<ResourcePath, Arc<Mutex<()>>>>;

/// Held while saving or deleting one path.
///
/// On drop the table entry is removed unless another task is waiting on it,
/// so the table only holds paths with work in flight.
struct PathGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: PathLocks,
    path: ResourcePath,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Filesystem storage engine.
///
/// Connections from one engine share a table of per-path locks, so saves
/// and deletes of the same path within a process never interleave.
#[derive(Debug, Clone)]
pub struct FsEngine {
    root: PathBuf,
    locks: PathLocks,
}

impl FsEngine {
    /// Create an engine rooted at `root`. Nothing is touched until `prep`
    /// or the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: PathLocks::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory this engine owns.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }
}

#[async_trait]
impl StorageEngine for FsEngine {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn connect(&self) -> StoreResult<Arc<dyn Connection>> {
        debug!(root = %self.root.display(), "fs connect");
        Ok(Arc::new(FsConnection {
            data_dir: self.data_dir(),
            locks: Arc::clone(&self.locks),
            closed: AtomicBool::new(false),
        }))
    }

    async fn erase(&self) -> StoreResult<()> {
        let data_dir = self.data_dir();
        match fs::remove_dir_all(&data_dir).await {
            Ok(()) => {
                info!(dir = %data_dir.display(), "erased storage");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn prep(&self) -> StoreResult<()> {
        let res_dir = self.data_dir().join(RES_DIR);
        fs::create_dir_all(&res_dir).await?;
        info!(dir = %res_dir.display(), "storage ready");
        Ok(())
    }

    async fn migrate(&self, from: &str, to: &str) -> StoreResult<()> {
        Err(StoreError::unsupported(format!(
            "fs engine has no schema versions (asked {from} -> {to})"
        )))
    }
}

/// Connection to an [`FsEngine`].
#[derive(Debug)]
pub struct FsConnection {
    data_dir: PathBuf,
    locks: PathLocks,
    closed: AtomicBool,
}

/// Map "missing" I/O errors to `NotFound`, everything else to `Io`.
fn missing_as_not_found(err: io::Error, what: impl FnOnce() -> String) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => StoreError::not_found(what()),
        _ => StoreError::Io(err),
    }
}

impl FsConnection {
    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    async fn lock(&self, path: &ResourcePath) -> PathGuard {
        let mutex = Arc::clone(self.locks.entry(path.clone()).or_default().value());
        PathGuard {
            guard: Some(mutex.lock_owned().await),
            locks: Arc::clone(&self.locks),
            path: path.clone(),
        }
    }

    fn path_dir(&self, path: &ResourcePath) -> PathBuf {
        path.segments()
            .fold(self.data_dir.clone(), |dir, segment| dir.join(segment))
    }

    fn uuid_file(&self, path: &ResourcePath) -> PathBuf {
        self.path_dir(path).join(UUID_FILE)
    }

    fn doc_dir(&self, id: &ResourceId) -> PathBuf {
        self.data_dir.join(RES_DIR).join(id.to_string())
    }

    /// Read the identifier for `path`.
    async fn lookup_id(&self, path: &ResourcePath) -> StoreResult<ResourceId> {
        let file = self.uuid_file(path);
        let bytes = fs::read(&file)
            .await
            .map_err(|e| missing_as_not_found(e, || format!("resource {path}")))?;
        let text = String::from_utf8(bytes).map_err(|_| {
            StoreError::corrupt(format!("{}: identifier is not UTF-8", file.display()))
        })?;
        ResourceId::parse(&text)
            .map_err(|e| StoreError::corrupt(format!("{}: {e}", file.display())))
    }

    /// Create an identifier for `path`, or adopt one that got there first.
    async fn create_id(&self, path: &ResourcePath) -> StoreResult<ResourceId> {
        let dir = self.path_dir(path);
        let id = ResourceId::new();
        let tmp = dir.join(format!("{UUID_FILE}.{id}.tmp"));

        // A delete below this path may prune the fresh directories before the
        // temp file lands in them.
        let mut attempt = 1;
        loop {
            let written = match fs::create_dir_all(&dir).await {
                Ok(()) => fs::write(&tmp, id.to_string()).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < CREATE_ATTEMPTS => {
                    debug!(%path, attempt, "directory pruned under identifier write, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let linked = fs::hard_link(&tmp, dir.join(UUID_FILE)).await;
        if let Err(e) = fs::remove_file(&tmp).await {
            warn!(file = %tmp.display(), error = %e, "failed to remove identifier temp file");
        }

        match linked {
            Ok(()) => {
                debug!(%path, id = %id.short(), "created identifier");
                Ok(id)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(%path, "lost identifier race, adopting existing");
                self.lookup_id(path).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up the identifier, creating one only when none exists.
    async fn lookup_or_create_id(&self, path: &ResourcePath) -> StoreResult<ResourceId> {
        match self.lookup_id(path).await {
            Err(e) if e.is_not_found() => self.create_id(path).await,
            other => other,
        }
    }

    /// Remove empty directories from `path` upward, stopping below the data dir.
    async fn prune_dirs(&self, path: &ResourcePath) {
        let mut current = Some(path.clone());
        while let Some(p) = current {
            if fs::remove_dir(self.path_dir(&p)).await.is_err() {
                break;
            }
            current = p.parent();
        }
    }
}

#[async_trait]
impl Connection for FsConnection {
    async fn close(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(dir = %self.data_dir.display(), "fs connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn delete_resource(&self, path: &ResourcePath) -> StoreResult<()> {
        self.check_open()?;
        let _guard = self.lock(path).await;

        let id = self.lookup_id(path).await?;
        match fs::remove_dir_all(self.doc_dir(&id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(%path, id = %id, "deleting resource with no document");
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = fs::remove_file(self.uuid_file(path)).await {
            return Err(StoreError::partial_failure(format!(
                "document of {path} removed but identifier {id} remains: {e}"
            )));
        }

        self.prune_dirs(path).await;
        debug!(%path, id = %id.short(), "deleted resource");
        Ok(())
    }

    async fn load_resource(&self, path: &ResourcePath) -> StoreResult<ResourceData> {
        self.check_open()?;
        let id = self.lookup_id(path).await?;

        let doc_file = self.doc_dir(&id).join(DOC_FILE);
        let bytes = match fs::read(&doc_file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(%path, id = %id, "identifier has no document");
                return Err(StoreError::not_found(format!(
                    "resource {path}: identifier {id} has no document"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let doc: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::corrupt(format!("{}: {e}", doc_file.display())))?;
        let data = codec::decode(&doc)
            .map_err(|e| StoreError::corrupt(format!("{path}: {e}")))?;
        debug!(%path, id = %id.short(), bytes = bytes.len(), "loaded resource");
        Ok(data)
    }

    async fn save_resource(&self, path: &ResourcePath, data: &ResourceData) -> StoreResult<()> {
        self.check_open()?;
        let bytes = codec::to_pretty_bytes(&codec::encode(data)?)?;

        let _guard = self.lock(path).await;
        let id = self.lookup_or_create_id(path).await?;

        let doc_dir = self.doc_dir(&id);
        fs::create_dir_all(&doc_dir).await?;
        let tmp = doc_dir.join(format!("{DOC_FILE}.{}.tmp", ResourceId::new().short()));
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, doc_dir.join(DOC_FILE)).await?;

        debug!(%path, id = %id.short(), bytes = bytes.len(), "saved resource");
        Ok(())
    }

    async fn resource_exists(&self, path: &ResourcePath) -> StoreResult<bool> {
        self.check_open()?;
        let id = match self.lookup_id(path).await {
            Ok(id) => id,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(fs::try_exists(self.doc_dir(&id).join(DOC_FILE)).await?)
    }
}

// ============================================================================
// Tests
// ============================================================================
