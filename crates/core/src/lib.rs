//! Shared primitives for all Rust crates in Grantry.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Grantry crates.
pub type AppResult<T> = Result<T, AppError>;

/// Namespace-scoped address of one cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Creates an object key from namespace and name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Returns the object name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl Display for ObjectKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.namespace, self.name)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The cluster API refused the operation for the controller identity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A dependency exists but is not usable yet.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
