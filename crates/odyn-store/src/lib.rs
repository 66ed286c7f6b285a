//! Odyn resource store.
//!
//! Resources (devices, users, organizations, teams, policies) live at
//! slash paths and hold trees of typed properties, each governed by an
//! access-control list.
//!
//! ## Layers
//!
//! - [`storage`] - engine and connection traits, filesystem and memory engines
//! - [`resource`] - [`Resource`] and [`Property`] handles over a loaded document
//! - [`policy`] - permission grammar, ACLs, app policies, [`PolicyEngine`]
//! - [`config`] - TOML configuration
//!
//! ```ignore
//! let engine = FsEngine::new("/var/lib/odyn");
//! engine.prep().await?;
//! let conn = engine.connect().await?;
//!
//! let res = Resource::load(conn.clone(), "device/Leela/Toaster".parse()?).await?;
//! let temp = res.property("temperature")?;
//! let policy = PolicyEngine::new(conn);
//! policy.authorize(&actor, &res, Some(temp), Right::Get, Utc::now()).await?;
//! ```

pub mod config;
pub mod error;
pub mod policy;
pub mod resource;
pub mod storage;

pub use config::{ConfigError, EngineKind, LogConfig, OdynConfig, StorageConfig};
pub use error::{StoreError, StoreResult};
pub use policy::{Acl, AppPolicy, Decision, DenyReason, PolicyEngine, Right, RightSet};
pub use resource::{Property, Resource, ResourceData};
pub use storage::{Connection, FsEngine, MemoryEngine, StorageEngine};

pub use odyn_types::{Actor, Datatype, PropValue, ResourceId, ResourcePath, ResourceType};
