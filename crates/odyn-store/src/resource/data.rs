//! Storage-level resource representation.
//!
//! `ResourceData` is what connections load and save: resource metadata plus
//! the property tree. Properties live in an arena so handles can be plain
//! indices; removed subtrees stay in the arena marked detached.

use std::collections::BTreeMap;

use odyn_types::{Datatype, PropValue, ResourcePath, ResourceType};

use crate::error::{StoreError, StoreResult};
use crate::policy::{Acl, AppPolicy};

/// Reserved attribute mirroring the property's datatype.
pub const DATATYPE_ATTR: &str = ":datatype";

/// Attribute naming the application scope a property belongs to.
pub const SCOPE_ATTR: &str = ":scope";

/// Document key holding a property's value.
pub const VALUE_KEY: &str = "value";

/// Document key holding an ACL.
pub const ACL_KEY: &str = "acl";

/// Top-level document key holding the app policy.
pub const APP_PERMS_KEY: &str = "app_perms";

/// Index of a property node within its `ResourceData`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// One property in the arena.
#[derive(Clone, Debug)]
pub struct PropertyNode {
    name: String,
    parent: Option<NodeId>,
    datatype: Datatype,
    value: PropValue,
    attributes: BTreeMap<String, PropValue>,
    acl: Option<Acl>,
    children: BTreeMap<String, NodeId>,
    modified: bool,
    detached: bool,
}

impl PropertyNode {
    fn new(name: String, parent: Option<NodeId>, datatype: Datatype) -> Self {
        Self {
            name,
            parent,
            datatype,
            value: PropValue::Null,
            attributes: BTreeMap::new(),
            acl: None,
            children: BTreeMap::new(),
            modified: false,
            detached: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn value(&self) -> &PropValue {
        &self.value
    }

    /// User attributes (never includes `:datatype`).
    pub fn attributes(&self) -> &BTreeMap<String, PropValue> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<PropValue> {
        if name == DATATYPE_ATTR {
            return Some(PropValue::String(self.datatype.as_str().to_string()));
        }
        self.attributes.get(name).cloned()
    }

    pub fn acl(&self) -> Option<&Acl> {
        self.acl.as_ref()
    }

    pub fn children(&self) -> &BTreeMap<String, NodeId> {
        &self.children
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

/// Check a property name.
///
/// Dots are rejected so every property is reachable by its dotted path.
pub fn validate_property_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::invalid_name("property name is empty"));
    }
    if name.starts_with(':') || name == VALUE_KEY || name == ACL_KEY {
        return Err(StoreError::invalid_name(format!(
            "'{name}' is reserved for document structure"
        )));
    }
    if name.contains('.') {
        return Err(StoreError::invalid_name(format!(
            "property name '{name}' contains '.'"
        )));
    }
    Ok(())
}

/// Check an attribute name: `:` followed by at least one character.
pub fn validate_attribute_name(name: &str) -> StoreResult<()> {
    match name.strip_prefix(':') {
        Some(rest) if !rest.is_empty() => Ok(()),
        _ => Err(StoreError::invalid_name(format!(
            "attribute '{name}' must start with ':'"
        ))),
    }
}

/// A resource as stored: metadata plus property tree.
#[derive(Clone, Debug, Default)]
pub struct ResourceData {
    /// Explicit `:type` tag; overrides the path-derived type.
    pub type_tag: Option<ResourceType>,
    /// `:owners`.
    pub owners: Vec<ResourcePath>,
    /// `:admins`.
    pub admins: Vec<ResourcePath>,
    /// Resource-level ACL, the default for every property.
    pub acl: Option<Acl>,
    /// App policy (user resources).
    pub app_perms: Option<AppPolicy>,
    nodes: Vec<PropertyNode>,
    roots: BTreeMap<String, NodeId>,
}

impl ResourceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type for a resource at `path`: the explicit tag, else derived.
    pub fn resource_type(&self, path: &ResourcePath) -> ResourceType {
        self.type_tag.unwrap_or_else(|| path.resource_type())
    }

    /// Top-level properties by name.
    pub fn roots(&self) -> &BTreeMap<String, NodeId> {
        &self.roots
    }

    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> &PropertyNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut PropertyNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len() && !self.nodes[id.0].detached
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent).children.get(name).copied()
    }

    /// Resolve a property by its name path, e.g. `["system", "password"]`.
    pub fn find<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Option<NodeId> {
        let mut names = names.into_iter();
        let first = self.root(names.next()?)?;
        names.try_fold(first, |id, name| self.child(id, name))
    }

    /// The node followed by each of its ancestors, innermost first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &PropertyNode> + '_ {
        std::iter::successors(Some(id), move |id| self.node(*id).parent)
            .map(move |id| self.node(id))
    }

    /// Dotted name path of a node, e.g. `system.password`.
    pub fn dotted_name(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = self.ancestors(id).map(|n| n.name.as_str()).collect();
        names.reverse();
        names.join(".")
    }

    /// Add a top-level property.
    pub fn insert_root(&mut self, name: &str, datatype: Datatype) -> StoreResult<NodeId> {
        validate_property_name(name)?;
        if name == APP_PERMS_KEY {
            return Err(StoreError::invalid_name(format!(
                "'{name}' is reserved at the top level"
            )));
        }
        if self.roots.contains_key(name) {
            return Err(StoreError::already_exists(format!("property '{name}'")));
        }
        let id = self.push(PropertyNode::new(name.to_string(), None, datatype));
        self.roots.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add a child property under `parent`.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        name: &str,
        datatype: Datatype,
    ) -> StoreResult<NodeId> {
        validate_property_name(name)?;
        if self.node(parent).children.contains_key(name) {
            return Err(StoreError::already_exists(format!(
                "property '{}.{name}'",
                self.dotted_name(parent)
            )));
        }
        let id = self.push(PropertyNode::new(name.to_string(), Some(parent), datatype));
        self.node_mut(parent).children.insert(name.to_string(), id);
        Ok(id)
    }

    /// Detach a top-level property and its subtree.
    pub fn remove_root(&mut self, name: &str) -> Option<NodeId> {
        let id = self.roots.remove(name)?;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let node = self.node_mut(next);
            node.detached = true;
            stack.extend(node.children.values().copied());
        }
        Some(id)
    }

    /// Store a value after checking it against the datatype.
    pub fn set_value(&mut self, id: NodeId, value: PropValue) -> StoreResult<()> {
        let node = self.node(id);
        if !node.datatype.accepts(&value) {
            return Err(StoreError::type_mismatch(format!(
                "{} is {}, got {}",
                self.dotted_name(id),
                node.datatype,
                value.kind_name()
            )));
        }
        let node = self.node_mut(id);
        node.value = value;
        node.modified = true;
        Ok(())
    }

    /// Set a user attribute. `:datatype` is read-only.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: PropValue) -> StoreResult<()> {
        if name == DATATYPE_ATTR {
            return Err(StoreError::ReadOnlyAttribute(name.to_string()));
        }
        validate_attribute_name(name)?;
        let node = self.node_mut(id);
        node.attributes.insert(name.to_string(), value);
        node.modified = true;
        Ok(())
    }

    pub fn set_acl(&mut self, id: NodeId, acl: Option<Acl>) {
        let node = self.node_mut(id);
        node.acl = acl;
        node.modified = true;
    }

    /// Nearest `:scope` walking up from `id`.
    pub fn scope_of(&self, id: NodeId) -> Option<&PropValue> {
        self.ancestors(id).find_map(|n| n.attributes.get(SCOPE_ATTR))
    }

    /// The property's own ACL, else the resource ACL.
    ///
    /// Parent properties' ACLs are not consulted.
    pub fn effective_acl(&self, id: Option<NodeId>) -> Option<&Acl> {
        id.and_then(|id| self.node(id).acl.as_ref())
            .or(self.acl.as_ref())
    }

    pub fn is_dirty(&self) -> bool {
        self.live_nodes().any(|n| n.modified)
    }

    pub(crate) fn clear_modified(&mut self) {
        for node in &mut self.nodes {
            node.modified = false;
        }
    }

    fn live_nodes(&self) -> impl Iterator<Item = &PropertyNode> {
        self.nodes.iter().filter(|n| !n.detached)
    }

    fn push(&mut self, node: PropertyNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn subtree_eq(&self, a: NodeId, other: &ResourceData, b: NodeId) -> bool {
        let (x, y) = (self.node(a), other.node(b));
        x.datatype == y.datatype
            && x.value == y.value
            && x.attributes == y.attributes
            && x.acl == y.acl
            && children_eq(self, &x.children, other, &y.children)
    }
}

fn children_eq(
    left: &ResourceData,
    a: &BTreeMap<String, NodeId>,
    right: &ResourceData,
    b: &BTreeMap<String, NodeId>,
) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|((na, ia), (nb, ib))| {
            na == nb && left.subtree_eq(*ia, right, *ib)
        })
}

/// Trees compare by content; arena layout and modification flags are ignored.
impl PartialEq for ResourceData {
    fn eq(&self, other: &Self) -> bool {
        self.type_tag == other.type_tag
            && self.owners == other.owners
            && self.admins == other.admins
            && self.acl == other.acl
            && self.app_perms == other.app_perms
            && children_eq(self, &self.roots, other, &other.roots)
    }
}

// ============================================================================
// Tests
// ============================================================================
