//! Persisted set of expanded node identifiers.
//!
//! Backs the nested projection's visibility decisions: a node's children are
//! rendered only while the node is in this set. The set is process-local UI
//! convenience state — it is never synchronized across clients and has no
//! relation to document node lifecycle, so stale entries referencing deleted
//! nodes are harmless and simply never match.
//!
//! Persisted format: a single JSON object mapping node id (string) to `true`,
//! stored under one well-known key. An absent key is an empty set on first
//! use; a present but unparseable value is an error (see `storage`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::Result;
use crate::node::NodeId;
use crate::storage::SettingsStore;

/// Well-known storage key for the expansion-state map.
pub const EXPANDED_NODES_KEY: &str = "navtree.expanded_nodes";

/// Decoded expansion state plus its derived key array.
///
/// Both are invalidated together on every mutation and lazily rebuilt on the
/// next read. This is a simple cache-coherence rule, not a performance path.
struct ExpandedCache {
    map: HashMap<String, bool>,
    ids: Vec<NodeId>,
}

/// Persisted set of node ids currently expanded in the UI.
pub struct ExpandedNodeSet {
    store: Arc<dyn SettingsStore>,
    key: String,
    cache: RwLock<Option<ExpandedCache>>,
}

impl ExpandedNodeSet {
    /// Creates a set persisted under the well-known key.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self::with_key(store, EXPANDED_NODES_KEY)
    }

    /// Creates a set persisted under a caller-chosen key.
    pub fn with_key(store: Arc<dyn SettingsStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            cache: RwLock::new(None),
        }
    }

    /// True if `id` is currently expanded.
    pub fn is_expanded(&self, id: &NodeId) -> Result<bool> {
        self.ensure_cache()?;
        let cache = self.cache.read().unwrap();
        Ok(cache
            .as_ref()
            .is_some_and(|c| c.map.get(id.as_str()).copied().unwrap_or(false)))
    }

    /// Returns an ordered snapshot of every expanded id.
    pub fn expanded_ids(&self) -> Result<Vec<NodeId>> {
        self.ensure_cache()?;
        let cache = self.cache.read().unwrap();
        Ok(cache.as_ref().map(|c| c.ids.clone()).unwrap_or_default())
    }

    /// Marks `id` expanded.
    pub fn set(&self, id: &NodeId) -> Result<()> {
        self.mutate(|map| {
            map.insert(id.as_str().to_string(), true);
        })
    }

    /// Marks `id` collapsed.
    pub fn unset(&self, id: &NodeId) -> Result<()> {
        self.mutate(|map| {
            map.remove(id.as_str());
        })
    }

    /// Loads the persisted map, applies `edit`, writes it back, and
    /// invalidates the cache.
    fn mutate(&self, edit: impl FnOnce(&mut HashMap<String, bool>)) -> Result<()> {
        let mut map = self.load()?;
        edit(&mut map);
        self.store.put(&self.key, serde_json::to_string(&map)?)?;
        *self.cache.write().unwrap() = None;
        Ok(())
    }

    /// Reads and decodes the persisted map. A parse failure propagates: it is
    /// the one condition that should raise out of the bootstrap path.
    fn load(&self) -> Result<HashMap<String, bool>> {
        match self.store.get(&self.key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    /// Rebuilds the cache from storage if it was invalidated.
    fn ensure_cache(&self) -> Result<()> {
        {
            if self.cache.read().unwrap().is_some() {
                return Ok(());
            }
        }
        let map = self.load()?;
        let mut ids: Vec<NodeId> = map
            .iter()
            .filter(|(_, expanded)| **expanded)
            .map(|(id, _)| NodeId::from(id.as_str()))
            .collect();
        ids.sort();
        *self.cache.write().unwrap() = Some(ExpandedCache { map, ids });
        Ok(())
    }
}
