//! Typed identifiers.
//!
//! A `ResourceId` is the backend-private key a storage engine assigns to a
//! resource path the first time that path is written. It wraps a random
//! UUIDv4, so the logical path hierarchy can be reorganized without touching
//! the stored documents. The canonical text form is the 36-character
//! hyphenated UUID, which is exactly what the filesystem engine keeps in its
//! `__uuid` files.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of the canonical hyphenated text form.
pub const RESOURCE_ID_LEN: usize = 36;

/// Internal identifier for a stored resource (UUIDv4).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(uuid::Uuid);

/// Error from parsing a stored identifier.
#[derive(Debug, thiserror::Error)]
pub enum ResourceIdError {
    #[error("identifier must be 36 characters, found {0}")]
    BadLength(usize),
    #[error("malformed identifier: {0}")]
    Malformed(#[from] uuid::Error),
}

impl ResourceId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse the canonical 36-character form.
    ///
    /// Braced, URN and simple (no hyphen) forms are rejected even though
    /// `uuid` would accept them: a stored identifier is only ever written
    /// hyphenated, so anything else means the file was tampered with.
    pub fn parse(s: &str) -> Result<Self, ResourceIdError> {
        if s.len() != RESOURCE_ID_LEN {
            return Err(ResourceIdError::BadLength(s.len()));
        }
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }

    /// First 8 hex characters, for display only.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// A nil / zero ID.
    pub fn nil() -> Self {
        Self(uuid::Uuid::nil())
    }

    /// Check if this is the nil ID.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<uuid::Uuid> for ResourceId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.short())
    }
}

// ============================================================================
// Tests
// ============================================================================
