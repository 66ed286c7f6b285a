//! Access control: permission grammar, ACL documents and evaluation.
//!
//! - [`grammar`] - rights letters, time windows, permission specs
//! - [`acl`] - ACL and app-policy documents
//! - [`engine`] - [`PolicyEngine`], which turns both into a [`Decision`]

pub mod acl;
pub mod engine;
pub mod grammar;

pub use acl::{Acl, ActorKey, AppGrant, AppPolicy, AppTarget, MatchContext};
pub use engine::{Decision, DenyReason, PolicyEngine};
pub use grammar::{
    AclError, Grant, PermissionSpec, Right, RightSet, Window, format_timestamp, parse_timestamp,
};
