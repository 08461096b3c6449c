//! The replicated document contract and its in-memory implementation.
//!
//! The `TreeDocument` trait is the engine's only seam to the replication
//! service: read a full snapshot, submit an ordered batch of field ops, and
//! hear about applied batches. Keeping the core free of any concrete
//! synchronization-library dependency is what makes the inconsistency-handling
//! paths deterministically testable against `InMemoryDocument`.

pub mod errors;
mod in_memory;
mod ops;

pub use errors::DocumentError;
pub use in_memory::InMemoryDocument;
pub use ops::FieldOp;

use std::collections::HashMap;
use std::sync::Arc;

use crate::Result;
use crate::node::{NodeId, NodeRecord};

/// Observer notified after a batch of ops has been durably applied.
///
/// The notification fires for every applied batch, **including batches the
/// observer's own replica submitted**. The engine never assumes a submitted op
/// is visible until this fires, and relies on the self-notification to
/// re-project after its own edits.
pub trait DocumentObserver: Send + Sync {
    /// Called once per applied batch, after the document state is updated.
    fn on_batch_applied(&self);
}

/// Handle to the authoritative keyed store of node records.
///
/// The record map is read-only from the engine's side except through the
/// `FieldOp` vocabulary; no other mutation path is permitted. Submission does
/// not block on application: a caller must not assume the document reflects a
/// just-submitted batch until the next `DocumentObserver` notification.
pub trait TreeDocument: Send + Sync {
    /// Returns an owned snapshot of every node record currently in the document.
    fn snapshot(&self) -> HashMap<NodeId, NodeRecord>;

    /// Submits an ordered batch of field ops.
    ///
    /// The service applies each op only if its expected previous value still
    /// matches, and is responsible for conflict handling. A batch may be
    /// applied out of the order issued, or partially, relative to concurrent
    /// remote edits.
    fn submit(&self, ops: Vec<FieldOp>) -> Result<()>;

    /// Registers an observer for batch-applied notifications.
    fn subscribe(&self, observer: Arc<dyn DocumentObserver>);

    /// Removes a previously registered observer (matched by identity).
    fn unsubscribe(&self, observer: &Arc<dyn DocumentObserver>);
}
