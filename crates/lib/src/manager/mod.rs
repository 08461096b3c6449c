//! TreeManager: composition of several TreeSync projections.
//!
//! A manager owns the document bindings (keyed by path/collection), shares one
//! `ExpandedNodeSet` across every projection, and coordinates expansion-state
//! changes: expanding a deep node marks its whole ancestor chain expanded so a
//! reveal is always fully visible, and each change fires a single pass that
//! rebuilds every projection bound to the document. Expansion affects nested
//! visibility directly, so those rebuilds are unconditional — the metadata
//! shortcut does not apply.

pub mod errors;

pub use errors::ManagerError;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::Result;
use crate::document::TreeDocument;
use crate::expanded::ExpandedNodeSet;
use crate::node::NodeId;
use crate::storage::SettingsStore;
use crate::sync::TreeSync;

/// Identifies one replicated document: a storage path plus a collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub path: String,
    pub collection: String,
}

impl DocumentKey {
    /// Creates a new key.
    pub fn new(path: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path, self.collection)
    }
}

/// Per-tree-kind document lifecycle hooks.
///
/// Used only for bootstrap/finalization concerns (seeding a fresh document,
/// flushing derived state before a save); the synchronization algorithm never
/// calls these itself.
pub trait TreeLifecycle: Send + Sync {
    /// Called once when the document is bound.
    fn initialize(&self, _document: &dyn TreeDocument) -> Result<()> {
        Ok(())
    }

    /// Called before the document is persisted/finalized.
    fn before_save(&self, _document: &dyn TreeDocument) -> Result<()> {
        Ok(())
    }
}

/// Default lifecycle with no bootstrap or finalization behavior.
pub struct NoLifecycle;

impl TreeLifecycle for NoLifecycle {}

struct Binding {
    document: Arc<dyn TreeDocument>,
    lifecycle: Arc<dyn TreeLifecycle>,
    syncs: Vec<Arc<TreeSync>>,
}

/// Composes TreeSync instances over shared documents and expansion state.
pub struct TreeManager {
    expanded: Arc<ExpandedNodeSet>,
    bindings: RwLock<HashMap<DocumentKey, Binding>>,
}

impl TreeManager {
    /// Creates a manager whose expansion state persists in `store` under the
    /// well-known key.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            expanded: Arc::new(ExpandedNodeSet::new(store)),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// The shared expansion-state set, for wiring into nested projections.
    pub fn expanded(&self) -> Arc<ExpandedNodeSet> {
        self.expanded.clone()
    }

    /// Binds a document under `key`, running the lifecycle's `initialize`
    /// hook.
    pub fn bind_document(
        &self,
        key: DocumentKey,
        document: Arc<dyn TreeDocument>,
        lifecycle: Arc<dyn TreeLifecycle>,
    ) -> Result<()> {
        let mut bindings = self.bindings.write().unwrap();
        if bindings.contains_key(&key) {
            return Err(ManagerError::AlreadyBound { key }.into());
        }
        lifecycle.initialize(document.as_ref())?;
        bindings.insert(
            key,
            Binding {
                document,
                lifecycle,
                syncs: Vec::new(),
            },
        );
        Ok(())
    }

    /// Registers an attached TreeSync under `key` so expansion changes reach
    /// it.
    pub fn register_sync(&self, key: &DocumentKey, sync: Arc<TreeSync>) -> Result<()> {
        let mut bindings = self.bindings.write().unwrap();
        let binding = bindings
            .get_mut(key)
            .ok_or_else(|| ManagerError::UnknownDocument { key: key.clone() })?;
        binding.syncs.push(sync);
        Ok(())
    }

    /// Runs the `before_save` lifecycle hook for `key`'s document.
    pub fn before_save(&self, key: &DocumentKey) -> Result<()> {
        let bindings = self.bindings.read().unwrap();
        let binding = bindings
            .get(key)
            .ok_or_else(|| ManagerError::UnknownDocument { key: key.clone() })?;
        binding.lifecycle.before_save(binding.document.as_ref())
    }

    /// Expands or collapses `node` in the tree bound under `key`.
    ///
    /// On expand, every ancestor is marked expanded too, so a deep reveal is
    /// always fully visible; on collapse only the target node is unmarked.
    /// Either way a single expansion-changed pass triggers an unconditional
    /// rebuild on every projection bound to the document.
    pub fn set_node_is_expanded(
        &self,
        key: &DocumentKey,
        node: &NodeId,
        expanded: bool,
    ) -> Result<()> {
        let bindings = self.bindings.read().unwrap();
        let binding = bindings
            .get(key)
            .ok_or_else(|| ManagerError::UnknownDocument { key: key.clone() })?;

        if expanded {
            let records = binding.document.snapshot();
            let mut current = Some(node.clone());
            let mut hops = 0;
            while let Some(id) = current {
                self.expanded.set(&id)?;
                hops += 1;
                if hops > records.len() {
                    break;
                }
                current = records.get(&id).and_then(|r| r.parent.clone());
            }
        } else {
            self.expanded.unset(node)?;
        }

        for sync in &binding.syncs {
            sync.rebuild(None);
        }
        Ok(())
    }
}
