//! ACL and app-policy documents.
//!
//! An ACL maps actor keys to permission specs:
//!
//! ```json
//! {
//!     "@self" : "*",
//!     "@owner" : "*",
//!     "user/Leela" : "gsmcd",
//!     "team/PlanetExpress/Execs" : "G",
//!     "user/doorman" : "20150803202208:gs",
//!     "user/doorman2" : ["g", "20150803202208-20150804235959:smcd"]
//! }
//! ```
//!
//! An app policy lives on a user resource and says which applications may
//! act for that user, on what, and within which scopes:
//!
//! ```json
//! {
//!     "@all" : "location,diagnostics",
//!     "device/PlanetExpress/Refrigerator" : "*",
//!     "app/Slurm" : { "device/Leela/Toaster" : "diagnostics" }
//! }
//! ```
//!
//! String values apply to every application; an object value keyed by an
//! application path applies to that application only.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use odyn_types::ResourcePath;
use serde_json::{Map, Value};

use super::grammar::{AclError, PermissionSpec, RightSet};

/// Left-hand side of an ACL entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActorKey {
    /// `@self`: the resource itself (a device acting on its own record).
    SelfResource,
    /// `@owner`: any actor listed in the resource's `:owners`.
    Owner,
    /// `@admin`: any actor listed in the resource's `:admins`.
    Admin,
    /// `@all`: every actor.
    All,
    /// An explicit actor path.
    Path(ResourcePath),
}

impl ActorKey {
    pub fn as_wildcard(&self) -> Option<&'static str> {
        match self {
            ActorKey::SelfResource => Some("@self"),
            ActorKey::Owner => Some("@owner"),
            ActorKey::Admin => Some("@admin"),
            ActorKey::All => Some("@all"),
            ActorKey::Path(_) => None,
        }
    }

    /// Does this key select the actor described by `ctx`?
    pub fn matches(&self, ctx: &MatchContext<'_>) -> bool {
        match self {
            ActorKey::SelfResource => ctx.actor == ctx.resource,
            ActorKey::Owner => ctx.owners.contains(ctx.actor),
            ActorKey::Admin => ctx.admins.contains(ctx.actor),
            ActorKey::All => true,
            ActorKey::Path(p) => p == ctx.actor,
        }
    }
}

impl FromStr for ActorKey {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "@self" => Ok(ActorKey::SelfResource),
            "@owner" => Ok(ActorKey::Owner),
            "@admin" => Ok(ActorKey::Admin),
            "@all" => Ok(ActorKey::All),
            _ if s.starts_with('@') => Err(AclError::BadActorKey(s.to_string())),
            _ => ResourcePath::parse(s)
                .map(ActorKey::Path)
                .map_err(|_| AclError::BadActorKey(s.to_string())),
        }
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKey::Path(p) => write!(f, "{p}"),
            wildcard => f.write_str(wildcard.as_wildcard().unwrap_or_default()),
        }
    }
}

/// Everything needed to decide whether an actor key matches.
#[derive(Clone, Copy, Debug)]
pub struct MatchContext<'a> {
    pub actor: &'a ResourcePath,
    pub resource: &'a ResourcePath,
    pub owners: &'a [ResourcePath],
    pub admins: &'a [ResourcePath],
}

/// Access-control list attached to a property or a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Acl {
    entries: BTreeMap<ActorKey, PermissionSpec>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_entry(mut self, key: ActorKey, spec: PermissionSpec) -> Self {
        self.insert(key, spec);
        self
    }

    pub fn insert(&mut self, key: ActorKey, spec: PermissionSpec) -> Option<PermissionSpec> {
        self.entries.insert(key, spec)
    }

    pub fn remove(&mut self, key: &ActorKey) -> Option<PermissionSpec> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &ActorKey) -> Option<&PermissionSpec> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ActorKey, &PermissionSpec)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_json(value: &Value) -> Result<Self, AclError> {
        let Value::Object(map) = value else {
            return Err(AclError::wrong_shape("ACL object", value));
        };
        let mut acl = Acl::new();
        for (key, spec) in map {
            acl.insert(key.parse()?, PermissionSpec::from_json(spec)?);
        }
        Ok(acl)
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, spec)| (k.to_string(), spec.to_json()))
            .collect();
        Value::Object(map)
    }

    /// Union of the active rights of every entry matching `ctx`.
    ///
    /// Returns `None` when no entry matches at all, so callers can tell
    /// "not mentioned" from "mentioned, but nothing active right now".
    pub fn rights_for(&self, ctx: &MatchContext<'_>, now: DateTime<Utc>) -> Option<RightSet> {
        self.entries
            .iter()
            .filter(|(key, _)| key.matches(ctx))
            .map(|(_, spec)| spec.active_rights(now))
            .reduce(RightSet::union)
    }
}

/// What an app-policy entry applies to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AppTarget {
    /// `@all`: every resource.
    All,
    Resource(ResourcePath),
}

impl AppTarget {
    fn parse(s: &str) -> Result<Self, AclError> {
        match s {
            "@all" => return Ok(AppTarget::All),
            _ if s.starts_with('@') => return Err(AclError::BadAppTarget(s.to_string())),
            _ => {}
        }
        ResourcePath::parse(s)
            .map(AppTarget::Resource)
            .map_err(|_| AclError::BadAppTarget(s.to_string()))
    }

    fn applies_to(&self, resource: &ResourcePath) -> bool {
        match self {
            AppTarget::All => true,
            AppTarget::Resource(p) => p == resource,
        }
    }
}

impl fmt::Display for AppTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppTarget::All => f.write_str("@all"),
            AppTarget::Resource(p) => write!(f, "{p}"),
        }
    }
}

/// Scopes granted to applications by an app-policy entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppGrant {
    /// `"*"`: every scope.
    AllScopes,
    /// Comma-separated scope list.
    Scopes(BTreeSet<String>),
}

impl AppGrant {
    pub fn parse(s: &str) -> Self {
        if s.trim() == "*" {
            return AppGrant::AllScopes;
        }
        AppGrant::Scopes(
            s.split(',')
                .map(str::trim)
                .filter(|scope| !scope.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn to_json(&self) -> Value {
        match self {
            AppGrant::AllScopes => Value::String("*".into()),
            AppGrant::Scopes(scopes) => {
                Value::String(scopes.iter().map(String::as_str).collect::<Vec<_>>().join(","))
            }
        }
    }
}

type AppEntries = BTreeMap<AppTarget, AppGrant>;

/// Per-user policy for applications acting on the user's behalf.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppPolicy {
    /// Entries that apply to every application.
    shared: AppEntries,
    /// Entries that apply to one application.
    per_app: BTreeMap<ResourcePath, AppEntries>,
}

impl AppPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant scopes on `target` to every application.
    ///
    /// Shared targets and application paths share one document key space,
    /// so a target already used as an application key is rejected.
    pub fn grant(&mut self, target: AppTarget, grant: AppGrant) -> Result<(), AclError> {
        if let AppTarget::Resource(p) = &target {
            if self.per_app.contains_key(p) {
                return Err(AclError::AppKeyCollision(p.to_string()));
            }
        }
        self.shared.insert(target, grant);
        Ok(())
    }

    /// Grant scopes on `target` to one application.
    ///
    /// Fails if `app` is already a shared target or looks like a wildcard.
    pub fn grant_app(
        &mut self,
        app: ResourcePath,
        target: AppTarget,
        grant: AppGrant,
    ) -> Result<(), AclError> {
        if app.as_str().starts_with('@') {
            return Err(AclError::BadAppTarget(app.to_string()));
        }
        if self.shared.contains_key(&AppTarget::Resource(app.clone())) {
            return Err(AclError::AppKeyCollision(app.to_string()));
        }
        self.per_app.entry(app).or_default().insert(target, grant);
        Ok(())
    }

    /// All grants that let `app` reach `resource`.
    pub fn grants_for<'a>(
        &'a self,
        app: &'a ResourcePath,
        resource: &'a ResourcePath,
    ) -> impl Iterator<Item = &'a AppGrant> + 'a {
        self.shared
            .iter()
            .chain(self.per_app.get(app).into_iter().flatten())
            .filter(move |(target, _)| target.applies_to(resource))
            .map(|(_, grant)| grant)
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty() && self.per_app.is_empty()
    }

    pub fn from_json(value: &Value) -> Result<Self, AclError> {
        let Value::Object(map) = value else {
            return Err(AclError::wrong_shape("app policy object", value));
        };
        let mut policy = AppPolicy::new();
        for (key, entry) in map {
            match entry {
                Value::String(scopes) => {
                    policy.grant(AppTarget::parse(key)?, AppGrant::parse(scopes))?;
                }
                Value::Object(inner) => {
                    let app = ResourcePath::parse(key)
                        .map_err(|_| AclError::BadAppTarget(key.clone()))?;
                    for (target, scopes) in inner {
                        let Value::String(scopes) = scopes else {
                            return Err(AclError::wrong_shape("scope list", scopes));
                        };
                        policy.grant_app(
                            app.clone(),
                            AppTarget::parse(target)?,
                            AppGrant::parse(scopes),
                        )?;
                    }
                }
                other => return Err(AclError::wrong_shape("scope list or object", other)),
            }
        }
        Ok(policy)
    }

    pub fn to_json(&self) -> Value {
        fn entries_json(entries: &AppEntries) -> Map<String, Value> {
            entries
                .iter()
                .map(|(target, grant)| (target.to_string(), grant.to_json()))
                .collect()
        }

        let mut map = entries_json(&self.shared);
        for (app, entries) in &self.per_app {
            map.insert(app.to_string(), Value::Object(entries_json(entries)));
        }
        Value::Object(map)
    }
}

// ============================================================================
// Tests
// ============================================================================
