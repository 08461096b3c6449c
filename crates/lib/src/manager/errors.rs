//! Error types for tree manager operations.

use thiserror::Error;

use super::DocumentKey;

/// Structured error types for tree manager operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ManagerError {
    /// No document is bound under the given key
    #[error("No document bound for {key}")]
    UnknownDocument { key: DocumentKey },

    /// A document is already bound under the given key
    #[error("A document is already bound for {key}")]
    AlreadyBound { key: DocumentKey },
}

impl ManagerError {
    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, ManagerError::UnknownDocument { .. })
    }

    /// Check if this error indicates a conflict with an existing binding
    pub fn is_already_bound(&self) -> bool {
        matches!(self, ManagerError::AlreadyBound { .. })
    }
}

// Conversion from ManagerError to the main Error type
impl From<ManagerError> for crate::Error {
    fn from(err: ManagerError) -> Self {
        crate::Error::Manager(err)
    }
}
