//! Error types for replicated document operations.

use thiserror::Error;

use crate::node::NodeId;

/// Structured error types for replicated document operations.
///
/// The in-memory service resolves op conflicts by skipping mismatched ops, so
/// it never returns these; implementations backed by a real replication
/// service use them to surface submission failures.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DocumentError {
    /// A submitted batch was rejected outright by the document service
    #[error("Batch rejected by document service: {reason}")]
    SubmitRejected { reason: String },

    /// An op referenced a node the service has no record for
    #[error("Unknown node in submitted op: {node}")]
    UnknownNode { node: NodeId },

    /// The document handle is no longer connected to its service
    #[error("Document is closed")]
    Closed,
}

impl DocumentError {
    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentError::UnknownNode { .. })
    }

    /// Check if this error indicates the batch was rejected
    pub fn is_rejected(&self) -> bool {
        matches!(self, DocumentError::SubmitRejected { .. })
    }
}

// Conversion from DocumentError to the main Error type
impl From<DocumentError> for crate::Error {
    fn from(err: DocumentError) -> Self {
        crate::Error::Document(err)
    }
}
