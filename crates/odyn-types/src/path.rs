//! Resource paths and resource types.
//!
//! Every resource lives at a slash-delimited path such as
//! `device/Leela/Toaster`. The leading segment names the kind of resource;
//! the rest is free-form. Paths double as directory names in the filesystem
//! engine, so the parser rejects anything that could escape or collide with
//! backend-owned files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// First segment reserved for the filesystem engine's document subtree.
const RESERVED_ROOT_SEGMENT: &str = "res";

/// Prefix reserved for backend bookkeeping files (`__uuid`, `__doc`).
const RESERVED_SEGMENT_PREFIX: &str = "__";

/// Why a string is not a valid resource path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("resource path is empty")]
    Empty,
    #[error("empty segment in resource path '{0}'")]
    EmptySegment(String),
    #[error("relative segment '{segment}' in resource path '{path}'")]
    Relative { path: String, segment: String },
    #[error("reserved segment '{segment}' in resource path '{path}'")]
    Reserved { path: String, segment: String },
    #[error("invalid character in resource path '{0}'")]
    InvalidChar(String),
}

/// A validated, canonical resource path (no leading or trailing slash).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Parse and canonicalize a path.
    ///
    /// Leading and trailing slashes are dropped, so `/user/Leela/` and
    /// `user/Leela` name the same resource.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        if trimmed.contains(['\\', '\0']) {
            return Err(PathError::InvalidChar(s.to_string()));
        }

        for (i, segment) in trimmed.split('/').enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(s.to_string()));
            }
            if segment == "." || segment == ".." {
                return Err(PathError::Relative {
                    path: s.to_string(),
                    segment: segment.to_string(),
                });
            }
            if segment.starts_with(RESERVED_SEGMENT_PREFIX)
                || (i == 0 && segment == RESERVED_ROOT_SEGMENT)
            {
                return Err(PathError::Reserved {
                    path: s.to_string(),
                    segment: segment.to_string(),
                });
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path's segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Resource type implied by the leading segment.
    pub fn resource_type(&self) -> ResourceType {
        self.segments()
            .next()
            .map(ResourceType::from_segment)
            .unwrap_or_default()
    }

    /// The enclosing path, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<ResourcePath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| ResourcePath(parent.to_string()))
    }

    /// Append one or more segments.
    pub fn join(&self, tail: &str) -> Result<ResourcePath, PathError> {
        Self::parse(&format!("{}/{}", self.0, tail.trim_matches('/')))
    }

    /// True if `self` is `other` or lies beneath it.
    pub fn starts_with(&self, other: &ResourcePath) -> bool {
        self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'/'))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourcePath({})", self.0)
    }
}

impl FromStr for ResourcePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ResourcePath> for String {
    fn from(p: ResourcePath) -> String {
        p.0
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ResourceType {
    #[default]
    Unknown,
    Device,
    #[serde(alias = "org")]
    #[strum(serialize = "organization", serialize = "org")]
    Organization,
    Policy,
    Team,
    User,
}

impl ResourceType {
    /// Map a leading path segment to a type. Unrecognized segments are
    /// `Unknown` rather than an error: the path grammar is open-ended.
    pub fn from_segment(segment: &str) -> Self {
        <Self as FromStr>::from_str(segment).unwrap_or_default()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Unknown => "unknown",
            ResourceType::Device => "device",
            ResourceType::Organization => "organization",
            ResourceType::Policy => "policy",
            ResourceType::Team => "team",
            ResourceType::User => "user",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
