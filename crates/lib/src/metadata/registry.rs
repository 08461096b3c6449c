//! In-memory atom metadata registry.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use super::{AtomRegistry, MetadataObserver};
use crate::node::ItemId;

/// A registry implementation holding metadata state in memory.
///
/// Suitable for tests and single-process use. `set_filtered` flips an item's
/// visibility verdict and notifies exactly the subscribers whose id set
/// intersects the change; `notify_changed` announces a metadata change that
/// does not affect filtering, which is the common no-op tick the incremental
/// refresh shortcut exists for.
#[derive(Default)]
pub struct InMemoryRegistry {
    /// Items currently resolved (or being resolved) by `ensure_metadata_for_ids`
    known: RwLock<HashSet<ItemId>>,
    /// Items whose metadata says they should be filtered out of projections
    filtered: RwLock<HashSet<ItemId>>,
    /// Subscriptions keyed by observer identity
    subscriptions: RwLock<Vec<(HashSet<ItemId>, Arc<dyn MetadataObserver>)>>,
}

impl InMemoryRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ids metadata has been requested for.
    pub fn known_ids(&self) -> HashSet<ItemId> {
        self.known.read().unwrap().clone()
    }

    /// Marks an item as filtered (or not) and notifies intersecting subscribers.
    pub fn set_filtered(&self, id: impl Into<ItemId>, filtered: bool) {
        let id = id.into();
        {
            let mut set = self.filtered.write().unwrap();
            if filtered {
                set.insert(id.clone());
            } else {
                set.remove(&id);
            }
        }
        self.notify_changed(&[id]);
    }

    /// Announces a metadata change for `ids` without touching filtering state.
    pub fn notify_changed(&self, ids: &[ItemId]) {
        // Clone the subscriber list out of the lock: handlers re-subscribe
        // from inside the callback when a rebuild changes the visible set.
        let subscriptions: Vec<_> = self.subscriptions.read().unwrap().clone();
        for (subscribed, observer) in subscriptions {
            let relevant: Vec<ItemId> = ids
                .iter()
                .filter(|id| subscribed.contains(*id))
                .cloned()
                .collect();
            if !relevant.is_empty() {
                observer.on_metadata_changed(&relevant);
            }
        }
    }
}

impl AtomRegistry for InMemoryRegistry {
    fn ensure_metadata_for_ids(&self, ids: &[ItemId]) {
        let mut known = self.known.write().unwrap();
        known.extend(ids.iter().cloned());
    }

    fn subscribe(&self, ids: HashSet<ItemId>, observer: Arc<dyn MetadataObserver>) {
        let mut subscriptions = self.subscriptions.write().unwrap();
        for (subscribed, existing) in subscriptions.iter_mut() {
            if Arc::ptr_eq(existing, &observer) {
                *subscribed = ids;
                return;
            }
        }
        subscriptions.push((ids, observer));
    }

    fn unsubscribe(&self, observer: &Arc<dyn MetadataObserver>) {
        self.subscriptions
            .write()
            .unwrap()
            .retain(|(_, existing)| !Arc::ptr_eq(existing, observer));
    }

    fn is_filtered(&self, id: &ItemId) -> bool {
        self.filtered.read().unwrap().contains(id)
    }
}
