//! Atom metadata registry contract.
//!
//! Given a set of item identifiers, the registry resolves display metadata and
//! notifies subscribers when metadata for those identifiers changes. The
//! engine uses it for exactly one decision: whether a filtered/subscribed
//! item's visibility might need recomputation (for example an item becoming
//! inaccessible). Metadata contents themselves never flow through the engine.

pub mod registry;

pub use registry::InMemoryRegistry;

use std::collections::HashSet;
use std::sync::Arc;

use crate::node::ItemId;

/// Observer notified when metadata for subscribed item ids changes.
///
/// One call per change batch, carrying every changed id, even when several
/// ids changed at once — never one call per id.
pub trait MetadataObserver: Send + Sync {
    /// Called with the ids whose metadata changed.
    fn on_metadata_changed(&self, ids: &[ItemId]);
}

/// Handle to the atom metadata registry.
pub trait AtomRegistry: Send + Sync {
    /// Starts (or refreshes) metadata resolution for the given ids.
    ///
    /// Idempotent; safe to call repeatedly with overlapping sets.
    fn ensure_metadata_for_ids(&self, ids: &[ItemId]);

    /// Subscribes `observer` to changes for exactly `ids`.
    ///
    /// Subscriptions are keyed on observer identity (`Arc::ptr_eq`): calling
    /// again with the same observer atomically replaces its id set, so a
    /// refresh never opens a window with no subscription for ids that remain
    /// present across the rebuild.
    fn subscribe(&self, ids: HashSet<ItemId>, observer: Arc<dyn MetadataObserver>);

    /// Removes any subscription held by `observer` (matched by identity).
    fn unsubscribe(&self, observer: &Arc<dyn MetadataObserver>);

    /// Synchronous predicate: should the item currently be filtered out of
    /// projections? Used by the incremental-refresh shortcut.
    fn is_filtered(&self, id: &ItemId) -> bool;
}

#[cfg(test)]
mod tests;
