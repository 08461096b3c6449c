//!
//! Navtree: a replicated ordered-tree synchronization engine.
//! This library keeps the navigation/outline trees of a multi-user application
//! (world list, trash, channel list) converged across replicas and continuously
//! re-projected into a UI-consumable shape.
//!
//! ## Core Concepts
//!
//! * **Node records (`node::NodeRecord`)**: The unit of replication. Each record references
//!   a domain object (an "atom") and encodes its tree position as a backward-linked sibling
//!   chain (`back`) plus a `parent` pointer.
//! * **Replicated document (`document::TreeDocument`)**: The authoritative keyed store of
//!   node records. The engine only reads snapshots and submits batches of field-level edit
//!   operations with expected-previous-value checks; convergence and conflict handling
//!   belong to the document service.
//! * **TreeSync (`sync::TreeSync`)**: One projection of the document. Translates UI
//!   move/insert/remove commands into document operations and rebuilds a nested tree or
//!   flat list on every change notification, tolerating the transient inconsistency of
//!   multi-op moves still in flight.
//! * **TreeManager (`manager::TreeManager`)**: Composes several `TreeSync` instances over
//!   shared documents and coordinates expansion-state changes across them.
//! * **ExpandedNodeSet (`expanded::ExpandedNodeSet`)**: Persisted local UI state recording
//!   which nodes are expanded; backs the nested projection's visibility decisions.
//! * **Atom registry (`metadata::AtomRegistry`)**: Resolves display metadata for item ids
//!   and notifies subscribers, so that a metadata change that could affect filtering
//!   triggers a targeted rebuild instead of a full poll.

pub mod document;
pub mod expanded;
pub mod manager;
pub mod metadata;
pub mod node;
pub mod storage;
pub mod sync;

/// Re-export the `TreeSync` struct for easier access.
pub use sync::TreeSync;

/// Result type used throughout the Navtree library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Navtree library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured document errors from the document module
    #[error(transparent)]
    Document(document::DocumentError),

    /// Structured tree synchronization errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),

    /// Structured manager errors from the manager module
    #[error(transparent)]
    Manager(manager::ManagerError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
            Error::Document(_) => "document",
            Error::Sync(_) => "sync",
            Error::Manager(_) => "manager",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Document(document_err) => document_err.is_not_found(),
            Error::Manager(manager_err) => manager_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error reflects a transient document state that the next
    /// change notification is expected to resolve.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_transient(),
            _ => false,
        }
    }

    /// Check if this error is related to persisted local state.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Serialize(_))
    }
}
