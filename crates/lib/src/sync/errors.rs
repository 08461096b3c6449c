//! Error types for tree synchronization operations.

use thiserror::Error;

use crate::node::NodeId;

/// Structured error types for tree synchronization operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remove needed the computed tree to re-parent children, but the
    /// document is transiently inconsistent. No mutation was attempted.
    /// Callers should not retry within the same tick; the next change
    /// notification is expected to resolve the state.
    #[error("Remove of {node} aborted: tree cannot be computed while the document is mid-move")]
    TreeUnavailable { node: NodeId },
}

impl SyncError {
    /// Check if this error reflects a transient document state.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TreeUnavailable { .. })
    }
}

// Conversion from SyncError to the main Error type
impl From<SyncError> for crate::Error {
    fn from(err: SyncError) -> Self {
        crate::Error::Sync(err)
    }
}
