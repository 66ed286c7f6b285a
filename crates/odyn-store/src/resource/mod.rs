//! Resources and properties.
//!
//! A [`Resource`] is a loaded document bound to the connection it came
//! from. It owns its property tree; callers navigate it with [`Property`]
//! handles, which are plain tokens valid until the next [`Resource::refresh`].
//!
//! ```ignore
//! let mut res = Resource::load_or_create(conn, path).await?;
//! let temp = res.add_property("temperature", Datatype::Float32)?;
//! res.set_value(temp, PropValue::Float(180.5))?;
//! res.save().await?;
//! ```

pub mod codec;
mod data;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use odyn_types::{Datatype, PropValue, ResourcePath, ResourceType};
use tracing::debug;

pub use data::{
    ACL_KEY, APP_PERMS_KEY, DATATYPE_ATTR, NodeId, PropertyNode, ResourceData, SCOPE_ATTR,
    VALUE_KEY, validate_attribute_name, validate_property_name,
};

use crate::error::{StoreError, StoreResult};
use crate::policy::{Acl, AppPolicy};
use crate::storage::Connection;

/// Source of generation numbers. Global so a handle from one resource is
/// also stale against any other.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a property of a [`Resource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Property {
    node: NodeId,
    generation: u64,
}

/// A resource loaded through a connection.
pub struct Resource {
    conn: Arc<dyn Connection>,
    path: ResourcePath,
    data: ResourceData,
    generation: u64,
    meta_modified: bool,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("generation", &self.generation)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl Resource {
    fn from_parts(conn: Arc<dyn Connection>, path: ResourcePath, data: ResourceData) -> Self {
        Self {
            conn,
            path,
            data,
            generation: next_generation(),
            meta_modified: false,
        }
    }

    /// Load the resource at `path`. `NotFound` if absent.
    pub async fn load(conn: Arc<dyn Connection>, path: ResourcePath) -> StoreResult<Self> {
        let data = conn.load_resource(&path).await?;
        Ok(Self::from_parts(conn, path, data))
    }

    /// A new, empty resource at `path`. Nothing is stored until `save`.
    pub fn create(conn: Arc<dyn Connection>, path: ResourcePath) -> Self {
        let mut res = Self::from_parts(conn, path, ResourceData::new());
        res.meta_modified = true;
        res
    }

    /// Load the resource at `path`, or start an empty one if none exists.
    pub async fn load_or_create(
        conn: Arc<dyn Connection>,
        path: ResourcePath,
    ) -> StoreResult<Self> {
        match conn.load_resource(&path).await {
            Ok(data) => Ok(Self::from_parts(conn, path, data)),
            Err(e) if e.is_not_found() => {
                debug!(%path, "creating resource");
                Ok(Self::create(conn, path))
            }
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// The explicit `:type` tag if present, else the path-derived type.
    pub fn resource_type(&self) -> ResourceType {
        self.data.resource_type(&self.path)
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// The underlying stored form.
    pub fn data(&self) -> &ResourceData {
        &self.data
    }

    /// True if anything changed since load, save or refresh.
    pub fn is_dirty(&self) -> bool {
        self.meta_modified || self.data.is_dirty()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Reload from storage, discarding unsaved edits.
    ///
    /// Every handle issued before the refresh becomes stale.
    pub async fn refresh(&mut self) -> StoreResult<()> {
        self.data = self.conn.load_resource(&self.path).await?;
        self.generation = next_generation();
        self.meta_modified = false;
        Ok(())
    }

    /// Write the whole resource through the connection.
    pub async fn save(&mut self) -> StoreResult<()> {
        self.conn.save_resource(&self.path, &self.data).await?;
        self.data.clear_modified();
        self.meta_modified = false;
        Ok(())
    }

    /// Delete the resource from storage.
    pub async fn delete(self) -> StoreResult<()> {
        self.conn.delete_resource(&self.path).await
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    fn handle(&self, node: NodeId) -> Property {
        Property {
            node,
            generation: self.generation,
        }
    }

    /// Resolve a handle, failing if it predates a refresh or was removed.
    pub fn node_of(&self, prop: Property) -> StoreResult<NodeId> {
        if prop.generation != self.generation {
            return Err(StoreError::stale_property(format!(
                "handle predates last refresh of {}",
                self.path
            )));
        }
        if !self.data.contains(prop.node) {
            return Err(StoreError::stale_property(format!(
                "property was removed from {}",
                self.path
            )));
        }
        Ok(prop.node)
    }

    fn node(&self, prop: Property) -> StoreResult<&PropertyNode> {
        self.node_of(prop).map(|id| self.data.node(id))
    }

    /// Top-level property by name. Never creates.
    pub fn property(&self, name: &str) -> StoreResult<Property> {
        self.data
            .root(name)
            .map(|id| self.handle(id))
            .ok_or_else(|| StoreError::not_found(format!("property {name} of {}", self.path)))
    }

    /// Property by dotted name path, e.g. `system.password`.
    pub fn property_at(&self, dotted: &str) -> StoreResult<Property> {
        self.data
            .find(dotted.split('.'))
            .map(|id| self.handle(id))
            .ok_or_else(|| StoreError::not_found(format!("property {dotted} of {}", self.path)))
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.data.roots().keys().map(String::as_str)
    }

    /// Named child of `prop`. Never creates.
    pub fn child(&self, prop: Property, name: &str) -> StoreResult<Property> {
        let id = self.node_of(prop)?;
        self.data.child(id, name).map(|c| self.handle(c)).ok_or_else(|| {
            StoreError::not_found(format!(
                "property {}.{name} of {}",
                self.data.dotted_name(id),
                self.path
            ))
        })
    }

    pub fn child_names(&self, prop: Property) -> StoreResult<Vec<&str>> {
        Ok(self.node(prop)?.children().keys().map(String::as_str).collect())
    }

    // ========================================================================
    // Property access
    // ========================================================================

    pub fn datatype(&self, prop: Property) -> StoreResult<Datatype> {
        Ok(self.node(prop)?.datatype())
    }

    pub fn value(&self, prop: Property) -> StoreResult<&PropValue> {
        Ok(self.node(prop)?.value())
    }

    /// Read an attribute. `:datatype` is always present.
    pub fn attribute(&self, prop: Property, name: &str) -> StoreResult<PropValue> {
        let node = self.node(prop)?;
        node.attribute(name).ok_or_else(|| {
            StoreError::not_found(format!(
                "attribute {name} of {}",
                self.data.dotted_name(prop.node)
            ))
        })
    }

    pub fn is_modified(&self, prop: Property) -> StoreResult<bool> {
        Ok(self.node(prop)?.is_modified())
    }

    /// Store a value; `TypeMismatch` if the datatype rejects it.
    pub fn set_value(&mut self, prop: Property, value: impl Into<PropValue>) -> StoreResult<()> {
        let id = self.node_of(prop)?;
        self.data.set_value(id, value.into())
    }

    pub fn set_attribute(
        &mut self,
        prop: Property,
        name: &str,
        value: impl Into<PropValue>,
    ) -> StoreResult<()> {
        let id = self.node_of(prop)?;
        self.data.set_attribute(id, name, value.into())
    }

    /// Replace (or with `None`, drop) the property's ACL.
    pub fn set_acl(&mut self, prop: Property, acl: impl Into<Option<Acl>>) -> StoreResult<()> {
        let id = self.node_of(prop)?;
        self.data.set_acl(id, acl.into());
        Ok(())
    }

    // ========================================================================
    // Structure
    // ========================================================================

    pub fn add_property(&mut self, name: &str, datatype: Datatype) -> StoreResult<Property> {
        let id = self.data.insert_root(name, datatype)?;
        self.meta_modified = true;
        Ok(self.handle(id))
    }

    pub fn add_child(
        &mut self,
        prop: Property,
        name: &str,
        datatype: Datatype,
    ) -> StoreResult<Property> {
        let parent = self.node_of(prop)?;
        let id = self.data.insert_child(parent, name, datatype)?;
        self.meta_modified = true;
        Ok(self.handle(id))
    }

    /// Remove a top-level property. Handles into it become stale.
    pub fn remove_property(&mut self, name: &str) -> StoreResult<()> {
        self.data
            .remove_root(name)
            .ok_or_else(|| StoreError::not_found(format!("property {name} of {}", self.path)))?;
        self.meta_modified = true;
        Ok(())
    }

    // ========================================================================
    // Resource metadata
    // ========================================================================

    pub fn set_resource_acl(&mut self, acl: impl Into<Option<Acl>>) {
        self.data.acl = acl.into();
        self.meta_modified = true;
    }

    pub fn set_type_tag(&mut self, tag: Option<ResourceType>) {
        self.data.type_tag = tag;
        self.meta_modified = true;
    }

    pub fn set_owners(&mut self, owners: Vec<ResourcePath>) {
        self.data.owners = owners;
        self.meta_modified = true;
    }

    pub fn set_admins(&mut self, admins: Vec<ResourcePath>) {
        self.data.admins = admins;
        self.meta_modified = true;
    }

    pub fn set_app_policy(&mut self, policy: impl Into<Option<AppPolicy>>) {
        self.data.app_perms = policy.into();
        self.meta_modified = true;
    }
}

// ============================================================================
// Tests
// ============================================================================
