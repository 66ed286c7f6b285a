//! Permission evaluation.
//!
//! A request is (actor, resource, property, right, time). The governing ACL
//! is the nearest one walking up from the property, falling back to the
//! resource ACL. Rights from every matching, active entry are unioned.
//! Anything not explicitly granted is denied.
//!
//! When an application acts for a user, the user's own rights must allow
//! the request, and the user's app policy must let that application reach
//! the resource within the property's scope.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use odyn_types::{Actor, ResourcePath};
use tracing::debug;

use super::acl::{AppGrant, MatchContext};
use super::grammar::{Right, RightSet};
use crate::error::{StoreError, StoreResult};
use crate::resource::{NodeId, Property, Resource, ResourceData};
use crate::storage::Connection;

/// Why a request was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// Neither the property, its ancestors nor the resource carry an ACL.
    NoAcl,
    /// An ACL applies but no entry matches the actor.
    NoMatchingEntry,
    /// Entries match but none grants the right right now.
    RightNotGranted,
    /// The delegating user has no app policy.
    NoAppPolicy,
    /// The app policy has no entry covering this resource.
    AppNotGranted,
    /// The app's scopes do not include the property's scope.
    ScopeNotGranted,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoAcl => "no_acl",
            DenyReason::NoMatchingEntry => "no_matching_entry",
            DenyReason::RightNotGranted => "right_not_granted",
            DenyReason::NoAppPolicy => "no_app_policy",
            DenyReason::AppNotGranted => "app_not_granted",
            DenyReason::ScopeNotGranted => "scope_not_granted",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a permission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Allowed; `rights` is everything the actor holds on the target.
    Allow { rights: RightSet },
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow { .. } => None,
            Decision::Deny(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow { rights } => write!(f, "allow ({rights})"),
            Decision::Deny(reason) => write!(f, "deny ({reason})"),
        }
    }
}

/// Evaluates permissions against ACLs and app policies.
///
/// The connection is used to load delegating users' app policies.
pub struct PolicyEngine {
    conn: Arc<dyn Connection>,
}

impl PolicyEngine {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    /// Decide whether `actor` may exercise `right` on `prop` of `resource`
    /// (or on the resource as a whole when `prop` is `None`).
    ///
    /// Storage errors while loading a delegating user propagate; they are
    /// not denials.
    pub async fn evaluate(
        &self,
        actor: &Actor,
        resource: &Resource,
        prop: Option<Property>,
        right: Right,
        now: DateTime<Utc>,
    ) -> StoreResult<Decision> {
        let node = prop.map(|p| resource.node_of(p)).transpose()?;

        let decision = match direct_rights(&actor.path, resource, node, now) {
            Err(reason) => Decision::Deny(reason),
            Ok(rights) if !rights.contains(right) => Decision::Deny(DenyReason::RightNotGranted),
            Ok(rights) => match &actor.app {
                None => Decision::Allow { rights },
                Some(app) => match self.app_check(&actor.path, app, resource, node).await? {
                    Ok(()) => Decision::Allow { rights },
                    Err(reason) => Decision::Deny(reason),
                },
            },
        };

        debug!(
            %actor,
            resource = %resource.path(),
            property = %node.map(|n| resource.data().dotted_name(n)).unwrap_or_default(),
            %right,
            %decision,
            "policy decision"
        );
        Ok(decision)
    }

    /// Like [`evaluate`](Self::evaluate), but a denial is
    /// `StoreError::PermissionDenied`.
    pub async fn authorize(
        &self,
        actor: &Actor,
        resource: &Resource,
        prop: Option<Property>,
        right: Right,
        now: DateTime<Utc>,
    ) -> StoreResult<RightSet> {
        match self.evaluate(actor, resource, prop, right, now).await? {
            Decision::Allow { rights } => Ok(rights),
            Decision::Deny(reason) => Err(StoreError::permission_denied(format!(
                "{actor} may not {right} on {}: {reason}",
                resource.path()
            ))),
        }
    }

    /// Every right `actor` holds on the target at `now`.
    ///
    /// For a delegated actor this is empty unless the app policy admits the
    /// application to the target.
    pub async fn effective_rights(
        &self,
        actor: &Actor,
        resource: &Resource,
        prop: Option<Property>,
        now: DateTime<Utc>,
    ) -> StoreResult<RightSet> {
        let node = prop.map(|p| resource.node_of(p)).transpose()?;
        let Ok(rights) = direct_rights(&actor.path, resource, node, now) else {
            return Ok(RightSet::EMPTY);
        };
        if let Some(app) = &actor.app {
            if self.app_check(&actor.path, app, resource, node).await?.is_err() {
                return Ok(RightSet::EMPTY);
            }
        }
        Ok(rights)
    }

    /// Check the delegating user's app policy.
    async fn app_check(
        &self,
        user: &ResourcePath,
        app: &ResourcePath,
        resource: &Resource,
        node: Option<NodeId>,
    ) -> StoreResult<Result<(), DenyReason>> {
        let user_data = self.conn.load_resource(user).await?;
        let Some(policy) = &user_data.app_perms else {
            return Ok(Err(DenyReason::NoAppPolicy));
        };

        let mut granted = BTreeSet::new();
        let mut any = false;
        for grant in policy.grants_for(app, resource.path()) {
            any = true;
            match grant {
                AppGrant::AllScopes => return Ok(Ok(())),
                AppGrant::Scopes(scopes) => granted.extend(scopes.iter().map(String::as_str)),
            }
        }
        if !any {
            return Ok(Err(DenyReason::AppNotGranted));
        }

        let scoped = node
            .and_then(|n| scopes_of(resource.data(), n))
            .is_some_and(|scopes| scopes.iter().any(|s| granted.contains(s)));
        Ok(if scoped {
            Ok(())
        } else {
            Err(DenyReason::ScopeNotGranted)
        })
    }
}

/// Rights the actor holds directly through the governing ACL.
fn direct_rights(
    actor: &ResourcePath,
    resource: &Resource,
    node: Option<NodeId>,
    now: DateTime<Utc>,
) -> Result<RightSet, DenyReason> {
    let data = resource.data();
    let acl = data.effective_acl(node).ok_or(DenyReason::NoAcl)?;
    let ctx = MatchContext {
        actor,
        resource: resource.path(),
        owners: &data.owners,
        admins: &data.admins,
    };
    acl.rights_for(&ctx, now).ok_or(DenyReason::NoMatchingEntry)
}

/// Scopes named by the nearest `:scope` attribute (comma-separated).
fn scopes_of(data: &ResourceData, node: NodeId) -> Option<Vec<&str>> {
    let scope = data.scope_of(node)?.as_str()?;
    Some(
        scope
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::grammar::parse_timestamp;
    use crate::policy::{Acl, AppPolicy};
    use crate::storage::{MemoryEngine, StorageEngine};
    use odyn_types::{Datatype, PropValue};
    use serde_json::json;

    fn path(s: &str) -> ResourcePath {
        ResourcePath::parse(s).unwrap()
    }

    fn at(ts: &str) -> DateTime<Utc> {
        parse_timestamp(ts).unwrap()
    }

    fn acl(v: serde_json::Value) -> Acl {
        Acl::from_json(&v).unwrap()
    }

    async fn setup() -> (Arc<dyn Connection>, PolicyEngine) {
        let conn = MemoryEngine::new().connect().await.unwrap();
        (Arc::clone(&conn), PolicyEngine::new(conn))
    }

    /// A toaster with a resource ACL, a property ACL and a scoped property.
    async fn toaster(conn: &Arc<dyn Connection>) -> Resource {
        let mut res = Resource::create(Arc::clone(conn), path("device/Leela/Toaster"));
        res.set_owners(vec![path("user/Leela")]);
        res.set_admins(vec![path("user/Hermes")]);
        res.set_resource_acl(acl(json!({
            "@self": "*",
            "@owner": "gs",
            "@admin": "gsmcd",
            "user/doorman": "20150803202208:gs",
            "user/temp": "20150803202208-20150804235959:g",
        })));

        let system = res.add_property("system", Datatype::Void).unwrap();
        let pw = res.add_child(system, "password", Datatype::Password).unwrap();
        res.set_acl(pw, acl(json!({ "@self": "s" }))).unwrap();

        let heat = res.add_property("heat", Datatype::Int32).unwrap();
        res.set_attribute(heat, ":scope", "diagnostics").unwrap();
        res.set_value(heat, 3).unwrap();
        res
    }

    #[tokio::test]
    async fn test_doorman_open_ended_grant() {
        let (conn, engine) = setup().await;
        let res = toaster(&conn).await;
        let doorman = Actor::new(path("user/doorman"));
        let heat = Some(res.property("heat").unwrap());

        let before = engine
            .evaluate(&doorman, &res, heat, Right::Get, at("20150803202207"))
            .await
            .unwrap();
        assert_eq!(before, Decision::Deny(DenyReason::RightNotGranted));

        for ts in ["20150803202208", "20250101000000"] {
            let d = engine
                .evaluate(&doorman, &res, heat, Right::Set, at(ts))
                .await
                .unwrap();
            assert!(d.is_allowed(), "{ts}");
        }
        let d = engine
            .evaluate(&doorman, &res, heat, Right::Delete, at("20250101000000"))
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::RightNotGranted));
    }

    #[tokio::test]
    async fn test_ranged_grant_closes() {
        let (conn, engine) = setup().await;
        let res = toaster(&conn).await;
        let temp = Actor::new(path("user/temp"));

        let inside = engine
            .evaluate(&temp, &res, None, Right::Get, at("20150804235959"))
            .await
            .unwrap();
        assert!(inside.is_allowed());
        let after = engine
            .evaluate(&temp, &res, None, Right::Get, at("20150805000000"))
            .await
            .unwrap();
        assert!(!after.is_allowed());
    }

    #[tokio::test]
    async fn test_wildcards() {
        let (conn, engine) = setup().await;
        let res = toaster(&conn).await;
        let now = at("20200101000000");

        let me = Actor::new(path("device/Leela/Toaster"));
        let rights = engine.effective_rights(&me, &res, None, now).await.unwrap();
        assert!(rights.is_all());

        let owner = Actor::new(path("user/Leela"));
        let rights = engine.effective_rights(&owner, &res, None, now).await.unwrap();
        assert_eq!(rights.to_string(), "gs");

        let admin = Actor::new(path("user/Hermes"));
        let rights = engine.effective_rights(&admin, &res, None, now).await.unwrap();
        assert_eq!(rights.to_string(), "gsmcd");
    }

    #[tokio::test]
    async fn test_property_acl_overrides_resource_acl() {
        let (conn, engine) = setup().await;
        let res = toaster(&conn).await;
        let now = at("20200101000000");
        let pw = Some(res.property_at("system.password").unwrap());

        let me = Actor::new(path("device/Leela/Toaster"));
        assert!(
            engine
                .evaluate(&me, &res, pw, Right::Set, now)
                .await
                .unwrap()
                .is_allowed()
        );
        assert!(
            !engine
                .evaluate(&me, &res, pw, Right::Get, now)
                .await
                .unwrap()
                .is_allowed()
        );

        let owner = Actor::new(path("user/Leela"));
        let d = engine
            .evaluate(&owner, &res, pw, Right::Get, now)
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::NoMatchingEntry));
    }

    #[tokio::test]
    async fn test_fail_closed_without_acl() {
        let (conn, engine) = setup().await;
        let mut res = Resource::create(conn, path("device/Bender"));
        let p = res.add_property("name", Datatype::String).unwrap();
        let bender = Actor::new(path("device/Bender"));
        let d = engine
            .evaluate(&bender, &res, Some(p), Right::Get, at("20200101000000"))
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::NoAcl));

        let err = engine
            .authorize(&bender, &res, Some(p), Right::Get, at("20200101000000"))
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn test_aggregate_is_not_get() {
        let (conn, engine) = setup().await;
        let mut res = Resource::create(conn, path("device/Bender"));
        res.set_resource_acl(acl(json!({ "@all": "G" })));
        let anyone = Actor::new(path("user/Zoidberg"));
        let now = at("20200101000000");
        assert!(
            engine
                .evaluate(&anyone, &res, None, Right::GetAggregate, now)
                .await
                .unwrap()
                .is_allowed()
        );
        assert!(
            !engine
                .evaluate(&anyone, &res, None, Right::Get, now)
                .await
                .unwrap()
                .is_allowed()
        );
    }

    async fn save_user(conn: &Arc<dyn Connection>, policy: Option<serde_json::Value>) {
        let mut user = Resource::create(Arc::clone(conn), path("user/Leela"));
        user.set_app_policy(policy.map(|p| AppPolicy::from_json(&p).unwrap()));
        user.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_delegated_scope_granted() {
        let (conn, engine) = setup().await;
        save_user(&conn, Some(json!({ "@all": "location,diagnostics" }))).await;
        let res = toaster(&conn).await;
        let via_app = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        let heat = Some(res.property("heat").unwrap());

        let d = engine
            .evaluate(&via_app, &res, heat, Right::Get, at("20200101000000"))
            .await
            .unwrap();
        assert!(d.is_allowed());
    }

    #[tokio::test]
    async fn test_delegated_needs_direct_rights() {
        let (conn, engine) = setup().await;
        save_user(&conn, Some(json!({ "@all": "*" }))).await;
        let res = toaster(&conn).await;
        let via_app = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        let heat = Some(res.property("heat").unwrap());

        let d = engine
            .evaluate(&via_app, &res, heat, Right::Delete, at("20200101000000"))
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::RightNotGranted));
    }

    #[tokio::test]
    async fn test_delegated_scope_denials() {
        let (conn, engine) = setup().await;
        let via_app = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        let now = at("20200101000000");

        save_user(&conn, None).await;
        let res = toaster(&conn).await;
        let heat = Some(res.property("heat").unwrap());
        let d = engine
            .evaluate(&via_app, &res, heat, Right::Get, now)
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::NoAppPolicy));

        save_user(&conn, Some(json!({ "device/Bender": "*" }))).await;
        let d = engine
            .evaluate(&via_app, &res, heat, Right::Get, now)
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::AppNotGranted));

        save_user(&conn, Some(json!({ "@all": "location" }))).await;
        let d = engine
            .evaluate(&via_app, &res, heat, Right::Get, now)
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::ScopeNotGranted));

        let unscoped = Some(res.property("system").unwrap());
        let d = engine
            .evaluate(&via_app, &res, unscoped, Right::Get, now)
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::ScopeNotGranted));
    }

    #[tokio::test]
    async fn test_delegated_per_resource_wildcard() {
        let (conn, engine) = setup().await;
        save_user(&conn, Some(json!({ "device/Leela/Toaster": "*" }))).await;
        let res = toaster(&conn).await;
        let via_app = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        let unscoped = Some(res.property("system").unwrap());
        let d = engine
            .evaluate(&via_app, &res, unscoped, Right::Set, at("20200101000000"))
            .await
            .unwrap();
        assert!(d.is_allowed());
    }

    #[tokio::test]
    async fn test_delegated_per_app_entry() {
        let (conn, engine) = setup().await;
        save_user(&conn, Some(json!({ "app/Slurm": { "@all": "diagnostics" } }))).await;
        let res = toaster(&conn).await;
        let heat = Some(res.property("heat").unwrap());
        let now = at("20200101000000");

        let slurm = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        assert!(
            engine
                .evaluate(&slurm, &res, heat, Right::Get, now)
                .await
                .unwrap()
                .is_allowed()
        );

        let other = Actor::on_behalf_of(path("user/Leela"), path("app/Popplers"));
        let d = engine
            .evaluate(&other, &res, heat, Right::Get, now)
            .await
            .unwrap();
        assert_eq!(d, Decision::Deny(DenyReason::AppNotGranted));
    }

    #[tokio::test]
    async fn test_delegated_missing_user_is_error() {
        let (conn, engine) = setup().await;
        let res = toaster(&conn).await;
        let via_app = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        let err = engine
            .evaluate(&via_app, &res, None, Right::Get, at("20200101000000"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stale_handle_is_error() {
        let (conn, engine) = setup().await;
        let mut res = toaster(&conn).await;
        res.save().await.unwrap();
        let heat = res.property("heat").unwrap();
        res.refresh().await.unwrap();
        res.set_value(res.property("heat").unwrap(), PropValue::Int(4)).unwrap();

        let me = Actor::new(path("device/Leela/Toaster"));
        let err = engine
            .evaluate(&me, &res, Some(heat), Right::Get, at("20200101000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleProperty(_)));
    }
}
