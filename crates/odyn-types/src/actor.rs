//! Actors: who is asking.
//!
//! An `Actor` is any resource that can request access (a user, a device,
//! a team or an organization), identified by its resource path. When an
//! application acts on a user's behalf, the application's path rides along
//! so the policy engine can apply the user's app policy on top of the
//! user's own rights.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path::ResourcePath;

/// The entity requesting access, optionally through a delegating app.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Path of the acting resource, e.g. `user/Leela`.
    pub path: ResourcePath,
    /// Application acting on behalf of `path`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<ResourcePath>,
}

impl Actor {
    /// An actor acting directly.
    pub fn new(path: ResourcePath) -> Self {
        Self { path, app: None }
    }

    /// An application acting on behalf of `user`.
    pub fn on_behalf_of(user: ResourcePath, app: ResourcePath) -> Self {
        Self {
            path: user,
            app: Some(app),
        }
    }

    /// True when an application is acting for this actor.
    pub fn is_delegated(&self) -> bool {
        self.app.is_some()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.app {
            Some(app) => write!(f, "{} (via {})", self.path, app),
            None => write!(f, "{}", self.path),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ResourcePath {
        ResourcePath::parse(s).unwrap()
    }

    #[test]
    fn test_direct_actor() {
        let a = Actor::new(path("user/Leela"));
        assert!(!a.is_delegated());
        assert_eq!(a.to_string(), "user/Leela");
    }

    #[test]
    fn test_delegated_actor() {
        let a = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        assert!(a.is_delegated());
        assert_eq!(a.to_string(), "user/Leela (via app/Slurm)");
    }

    #[test]
    fn test_serde_json_roundtrip() {
        let a = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        let json = serde_json::to_string(&a).unwrap();
        let parsed: Actor = serde_json::from_str(&json).unwrap();
        assert_eq!(a, parsed);

        let direct = Actor::new(path("user/Fry"));
        assert_eq!(serde_json::to_string(&direct).unwrap(), r#"{"path":"user/Fry"}"#);
    }
}
