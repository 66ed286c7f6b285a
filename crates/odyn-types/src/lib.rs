//! Shared path, identity and value types for Odyn.
//!
//! This crate is the vocabulary every other crate speaks. It has **no
//! internal odyn dependencies**.
//!
//! # Key Types
//!
//! |------------------|-----------------------------------------------------|
//! | Type             | Purpose                                             |
//! |------------------|-----------------------------------------------------|
//! | [`ResourcePath`] | Validated slash path, e.g. `device/Leela/Toaster`   |
//! | [`ResourceType`] | Device, organization, policy, team, user, unknown   |
//! | [`ResourceId`]   | Backend-private UUIDv4 key behind a path            |
//! | [`Actor`]        | Who is asking (plus optional delegating app)        |
//! | [`Datatype`]     | Declared property type (`float32`, `password`, ...) |
//! | [`PropValue`]    | Scalar property / attribute value                   |
//! |------------------|-----------------------------------------------------|

pub mod actor;
pub mod ids;
pub mod path;
pub mod value;

pub use actor::Actor;
pub use ids::{RESOURCE_ID_LEN, ResourceId, ResourceIdError};
pub use path::{PathError, ResourcePath, ResourceType};
pub use value::{Datatype, PropValue};
