//! Store error types.

use std::io;

use odyn_types::PathError;
use thiserror::Error;

/// Store error type.
///
/// Storage errors travel unchanged from the engine through the resource
/// layer to the policy layer. A denial is its own variant so callers can
/// answer with 403-style semantics without inspecting storage internals.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No resource, identifier or document at the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored identifier or document fails structural validation.
    #[error("corrupt: {0}")]
    Corrupt(String),

    /// Value does not match the property's declared datatype.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Operation not available on this engine.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Policy evaluation denied the requested action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A multi-step operation stopped halfway.
    #[error("partial failure: {0}")]
    PartialFailure(String),

    /// Property handle issued before a refresh (or removal).
    #[error("stale property handle: {0}")]
    StaleProperty(String),

    /// Property or attribute name is reserved or malformed.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Attribute cannot be written directly.
    #[error("attribute is read-only: {0}")]
    ReadOnlyAttribute(String),

    /// Property already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Connection was closed.
    #[error("connection is closed")]
    Closed,

    /// Invalid resource path.
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a Corrupt error.
    pub fn corrupt(what: impl Into<String>) -> Self {
        Self::Corrupt(what.into())
    }

    /// Create a TypeMismatch error.
    pub fn type_mismatch(what: impl Into<String>) -> Self {
        Self::TypeMismatch(what.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// Create a PartialFailure error.
    pub fn partial_failure(what: impl Into<String>) -> Self {
        Self::PartialFailure(what.into())
    }

    /// Create a StaleProperty error.
    pub fn stale_property(what: impl Into<String>) -> Self {
        Self::StaleProperty(what.into())
    }

    /// Create an InvalidName error.
    pub fn invalid_name(what: impl Into<String>) -> Self {
        Self::InvalidName(what.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// True for `NotFound`; callers may respond by creating the resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for `Corrupt`.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }

    /// True for `PermissionDenied`.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;
