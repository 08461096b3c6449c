//! TreeSync: one projection of a replicated ordered-tree document.
//!
//! A `TreeSync` owns a nested or flat projection of the document, translates
//! UI move/insert/remove commands into document field-op batches, and rebuilds
//! the projection wholesale on every change notification. It never awaits its
//! own submissions: a command returns once the batch is handed to the
//! document, and the projection only reflects it after the batch-applied
//! notification fires — callers wanting synchronous-feeling feedback should
//! locally echo the change and let the authoritative rebuild reconcile.
//!
//! Multi-field moves are not atomic with respect to concurrent remote edits.
//! `compute_tree` detects the torn window (two nodes claiming the same
//! predecessor slot) and degrades to "no update yet"; convergence arrives via
//! the next natural change notification, which fires for every batch including
//! the local replica's own.

pub mod errors;
mod projection;

pub use errors::SyncError;
pub use projection::{ProjectionEntry, ProjectionMode};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, warn};

use crate::Result;
use crate::document::{DocumentObserver, FieldOp, TreeDocument};
use crate::expanded::ExpandedNodeSet;
use crate::metadata::{AtomRegistry, MetadataObserver};
use crate::node::{ItemId, NodeId, NodeRecord};

/// Predicate deciding whether an item's node is included in the projection.
/// Returns true to accept. The default consults the atom registry's
/// `is_filtered` verdict.
pub type NodeFilter = Box<dyn Fn(&ItemId) -> bool + Send + Sync>;

/// Derived projection state. Rebuilt wholesale, never patched incrementally.
struct ProjectionState {
    /// Last successfully computed projection.
    entries: Vec<ProjectionEntry>,
    /// Reverse index from item id to its node; last-write-wins per item id.
    item_index: HashMap<ItemId, NodeId>,
    /// Bumped on every visible-set change, not on every rebuild call.
    version: u64,
}

/// Observer notified when a `TreeSync`'s visible set changes.
pub trait ProjectionObserver: Send + Sync {
    /// Called with the new projection version after each visible-set change.
    fn on_projection_changed(&self, version: u64);
}

/// One projection of the replicated tree document.
pub struct TreeSync {
    document: Arc<dyn TreeDocument>,
    registry: Arc<dyn AtomRegistry>,
    /// Expansion state backing nested visibility; flat/unfiltered projections
    /// carry none.
    expanded: Option<Arc<ExpandedNodeSet>>,
    filter: NodeFilter,
    mode: ProjectionMode,
    state: RwLock<ProjectionState>,
    observers: RwLock<Vec<Arc<dyn ProjectionObserver>>>,
    /// Self-handle for registering with the document and metadata registry.
    weak_self: Weak<TreeSync>,
}

impl TreeSync {
    /// Creates a new projection over `document`.
    ///
    /// # Arguments
    /// * `document` - Handle to the replicated tree document.
    /// * `registry` - Atom metadata registry used for refresh decisions.
    /// * `expanded` - Expansion state for nested visibility, or `None` for
    ///   projections that ignore expansion entirely.
    /// * `filter` - Node filter predicate; `None` accepts every item the
    ///   registry does not report as filtered.
    /// * `mode` - Nested tree or flat list.
    ///
    /// The returned instance is not yet receiving notifications; call
    /// [`TreeSync::attach`] to wire it to the document and build the initial
    /// projection.
    pub fn new(
        document: Arc<dyn TreeDocument>,
        registry: Arc<dyn AtomRegistry>,
        expanded: Option<Arc<ExpandedNodeSet>>,
        filter: Option<NodeFilter>,
        mode: ProjectionMode,
    ) -> Arc<Self> {
        let filter = filter.unwrap_or_else(|| {
            let registry = registry.clone();
            Box::new(move |item: &ItemId| !registry.is_filtered(item))
        });
        Arc::new_cyclic(|weak_self| Self {
            document,
            registry,
            expanded,
            filter,
            mode,
            state: RwLock::new(ProjectionState {
                entries: Vec::new(),
                item_index: HashMap::new(),
                version: 0,
            }),
            observers: RwLock::new(Vec::new()),
            weak_self: weak_self.clone(),
        })
    }

    /// Subscribes to document notifications and builds the initial projection.
    pub fn attach(self: &Arc<Self>) {
        self.document
            .subscribe(self.clone() as Arc<dyn DocumentObserver>);
        self.rebuild(None);
    }

    /// Unsubscribes from the document and the metadata registry.
    pub fn detach(self: &Arc<Self>) {
        let as_doc_observer: Arc<dyn DocumentObserver> = self.clone();
        self.document.unsubscribe(&as_doc_observer);
        let as_meta_observer: Arc<dyn MetadataObserver> = self.clone();
        self.registry.unsubscribe(&as_meta_observer);
    }

    /// Registers an observer for projection-changed notifications.
    pub fn observe(&self, observer: Arc<dyn ProjectionObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Returns the current projection version.
    pub fn version(&self) -> u64 {
        self.state.read().unwrap().version
    }

    /// Returns a copy of the current projection entries.
    pub fn entries(&self) -> Vec<ProjectionEntry> {
        self.state.read().unwrap().entries.clone()
    }

    /// Fast item-to-node lookup over the rendered projection.
    pub fn node_for_item(&self, item: &ItemId) -> Option<NodeId> {
        self.state.read().unwrap().item_index.get(item).cloned()
    }

    /// True if the item should currently be excluded from this projection.
    pub fn is_item_filtered(&self, item: &ItemId) -> bool {
        !(self.filter)(item)
    }

    // === Mutation commands ===
    //
    // Every command reads a fresh snapshot, derives a batch of field ops, and
    // submits it. None of them touch the projection directly; the rebuild
    // happens when the document's batch-applied notification comes back.

    /// Appends a new node referencing `item` at the end of the root level,
    /// creating the very first node if the document is empty.
    pub fn add_to_root(&self, item: impl Into<ItemId>) -> Result<NodeId> {
        let item = item.into();
        let records = self.document.snapshot();
        if records.is_empty() {
            let node = NodeId::generate();
            self.document.submit(vec![FieldOp::create(
                node.clone(),
                NodeRecord::first_under(item, None),
            )])?;
            return Ok(node);
        }
        match find_tail_under(&records, None) {
            Some(tail) => self.insert_below(item, &tail),
            None => {
                // Root chain unreadable mid-move: start a fresh root chain
                // rather than guessing at a predecessor. Converges once the
                // in-flight move lands.
                debug!("no root tail found; creating detached root node");
                let node = NodeId::generate();
                self.document.submit(vec![FieldOp::create(
                    node.clone(),
                    NodeRecord::first_under(item, None),
                )])?;
                Ok(node)
            }
        }
    }

    /// Creates a new first child of `parent` and relinks the previous first
    /// child (if any) behind it. Returns the new node id so callers can
    /// immediately mark it expanded.
    ///
    /// If `parent` no longer exists the node falls back to root placement.
    pub fn insert_under(&self, item: impl Into<ItemId>, parent: &NodeId) -> Result<NodeId> {
        let item = item.into();
        let records = self.document.snapshot();
        if !records.contains_key(parent) {
            debug!(parent = %parent, "insert target parent missing; falling back to root");
            return self.add_to_root(item);
        }
        let node = NodeId::generate();
        let mut ops = vec![FieldOp::create(
            node.clone(),
            NodeRecord::first_under(item, Some(parent.clone())),
        )];
        if let Some(first) = chain_head_under(&records, Some(parent)) {
            ops.push(FieldOp::set_back(first, None, Some(node.clone())));
        }
        self.document.submit(ops)?;
        Ok(node)
    }

    /// Creates a new node as the immediate next sibling after `below`.
    ///
    /// Only the new record is written: siblings point backward, so the node
    /// that used to follow `below` keeps its pointer and no relinking is
    /// needed. If `below` no longer exists the node falls back to the root
    /// tail.
    pub fn insert_below(&self, item: impl Into<ItemId>, below: &NodeId) -> Result<NodeId> {
        let item = item.into();
        let records = self.document.snapshot();
        let Some(below_record) = records.get(below) else {
            debug!(below = %below, "insert predecessor missing; falling back to root tail");
            return self.add_to_root(item);
        };
        let node = NodeId::generate();
        self.document.submit(vec![FieldOp::create(
            node.clone(),
            NodeRecord::after(item, below.clone(), below_record.parent.clone()),
        )])?;
        Ok(node)
    }

    /// Moves `node` to sit immediately above `above` (same parent).
    ///
    /// No-op if already there. Three field ops submitted together but not
    /// guaranteed atomic from the document's perspective.
    pub fn move_above(&self, node: &NodeId, above: &NodeId) -> Result<()> {
        if node == above {
            return Ok(());
        }
        let records = self.document.snapshot();
        let Some(node_record) = records.get(node) else {
            debug!(node = %node, "move source missing; nothing to do");
            return Ok(());
        };
        let Some(above_record) = records.get(above) else {
            debug!(above = %above, "move target missing; falling back to root tail");
            return self.move_to_root_tail(node);
        };
        if above_record.back.as_ref() == Some(node) {
            return Ok(());
        }

        let mut ops = Vec::new();
        // (a) detach: whoever pointed at the node now points at its old back.
        if let Some(follower) = follower_of(&records, node) {
            ops.push(FieldOp::set_back(
                follower,
                Some(node.clone()),
                node_record.back.clone(),
            ));
        }
        // (b) the node takes the target's old predecessor and parent.
        ops.push(FieldOp::replace(
            node.clone(),
            node_record.clone(),
            NodeRecord {
                item: node_record.item.clone(),
                back: above_record.back.clone(),
                parent: above_record.parent.clone(),
            },
        ));
        // (c) the target now points at the node.
        ops.push(FieldOp::set_back(
            above.clone(),
            above_record.back.clone(),
            Some(node.clone()),
        ));
        self.document.submit(ops)
    }

    /// Moves `node` to sit immediately below `below` (same parent).
    ///
    /// Symmetric to [`TreeSync::move_above`]: detach, point `node` at
    /// `below`, and repoint whoever previously followed `below`.
    pub fn move_below(&self, node: &NodeId, below: &NodeId) -> Result<()> {
        if node == below {
            return Ok(());
        }
        let records = self.document.snapshot();
        let Some(node_record) = records.get(node) else {
            debug!(node = %node, "move source missing; nothing to do");
            return Ok(());
        };
        let Some(below_record) = records.get(below) else {
            debug!(below = %below, "move target missing; falling back to root tail");
            return self.move_to_root_tail(node);
        };
        if node_record.back.as_ref() == Some(below) && node_record.parent == below_record.parent {
            return Ok(());
        }

        let mut ops = Vec::new();
        if let Some(follower) = follower_of(&records, node) {
            ops.push(FieldOp::set_back(
                follower,
                Some(node.clone()),
                node_record.back.clone(),
            ));
        }
        ops.push(FieldOp::replace(
            node.clone(),
            node_record.clone(),
            NodeRecord {
                item: node_record.item.clone(),
                back: Some(below.clone()),
                parent: below_record.parent.clone(),
            },
        ));
        if let Some(follower) = follower_of(&records, below) {
            if &follower != node {
                ops.push(FieldOp::set_back(
                    follower,
                    Some(below.clone()),
                    Some(node.clone()),
                ));
            }
        }
        self.document.submit(ops)
    }

    /// Moves `node` to become a child of `parent`, appended after the current
    /// last child.
    ///
    /// No-op if already a direct child. If `parent` no longer exists the node
    /// falls back to root placement.
    pub fn move_into(&self, node: &NodeId, parent: &NodeId) -> Result<()> {
        if node == parent {
            return Ok(());
        }
        let records = self.document.snapshot();
        let Some(node_record) = records.get(node) else {
            debug!(node = %node, "move source missing; nothing to do");
            return Ok(());
        };
        if node_record.parent.as_ref() == Some(parent) {
            return Ok(());
        }
        if !records.contains_key(parent) {
            debug!(parent = %parent, "move target parent missing; falling back to root");
            return self.move_to_root_tail(node);
        }
        if let Some(tail) = find_tail_under(&records, Some(parent)) {
            return self.move_below(node, &tail);
        }

        // The parent has no children: the node becomes its first child. Same
        // relinking shape as insert_under, applied to an existing node.
        let mut ops = Vec::new();
        if let Some(follower) = follower_of(&records, node) {
            ops.push(FieldOp::set_back(
                follower,
                Some(node.clone()),
                node_record.back.clone(),
            ));
        }
        ops.push(FieldOp::replace(
            node.clone(),
            node_record.clone(),
            NodeRecord {
                item: node_record.item.clone(),
                back: None,
                parent: Some(parent.clone()),
            },
        ));
        if let Some(first) = chain_head_under(&records, Some(parent)) {
            if &first != node {
                ops.push(FieldOp::set_back(first, None, Some(node.clone())));
            }
        }
        self.document.submit(ops)
    }

    /// Moves `node` to the very front of the root level.
    pub fn move_below_root(&self, node: &NodeId) -> Result<()> {
        let records = self.document.snapshot();
        let Some(node_record) = records.get(node) else {
            debug!(node = %node, "move source missing; nothing to do");
            return Ok(());
        };
        if node_record.is_root_level() && node_record.is_chain_head() {
            return Ok(());
        }

        let mut ops = Vec::new();
        if let Some(follower) = follower_of(&records, node) {
            ops.push(FieldOp::set_back(
                follower,
                Some(node.clone()),
                node_record.back.clone(),
            ));
        }
        // Whichever node was the root head now follows the moved node.
        if let Some(head) = chain_head_under(&records, None) {
            if &head != node {
                ops.push(FieldOp::set_back(head, None, Some(node.clone())));
            }
        }
        ops.push(FieldOp::replace(
            node.clone(),
            node_record.clone(),
            NodeRecord {
                item: node_record.item.clone(),
                back: None,
                parent: None,
            },
        ));
        self.document.submit(ops)
    }

    /// Removes `node`, splicing its children (in order) to its former parent
    /// at the position the node used to occupy.
    ///
    /// Requires a successfully computed tree to know how to re-parent the
    /// children; on a transiently inconsistent document the remove is aborted
    /// with a logged warning and no document mutation.
    pub fn remove(&self, node: &NodeId) -> Result<()> {
        let records = self.document.snapshot();
        let Some(_) = records.get(node) else {
            debug!(node = %node, "remove target missing; nothing to do");
            return Ok(());
        };
        let full_tree = projection::compute_tree(
            &records,
            ProjectionMode::Nested,
            &|_: &NodeId, _: &NodeRecord| true,
            &|_: &NodeId| true,
        );
        let Some(tree) = full_tree else {
            warn!(node = %node, "remove aborted: document is mid-move");
            return Err(SyncError::TreeUnavailable { node: node.clone() }.into());
        };

        // Splice the children out first: each direct child moves below the
        // node being removed (landing under its former parent), anchored so
        // relative order is preserved.
        let children: Vec<NodeId> = find_entry(&tree, node)
            .map(|entry| entry.children.iter().map(|c| c.key.clone()).collect())
            .unwrap_or_default();
        let mut anchor = node.clone();
        for child in children {
            self.move_below(&child, &anchor)?;
            anchor = child;
        }

        // Relocations above were separate batches; re-read before detaching.
        let records = self.document.snapshot();
        let Some(node_record) = records.get(node) else {
            return Ok(());
        };
        let mut ops = Vec::new();
        if let Some(follower) = follower_of(&records, node) {
            ops.push(FieldOp::set_back(
                follower,
                Some(node.clone()),
                node_record.back.clone(),
            ));
        }
        ops.push(FieldOp::delete(node.clone(), node_record.clone()));
        self.document.submit(ops)
    }

    // === Reads ===

    /// Returns the last sibling under `parent` (or under the root when
    /// `None`), if the chain currently has an unambiguous tail.
    pub fn find_tail_node_id_under(&self, parent: Option<&NodeId>) -> Option<NodeId> {
        find_tail_under(&self.document.snapshot(), parent)
    }

    /// Hop count from `node` to the root. Root-level nodes have depth 0.
    pub fn node_depth(&self, node: &NodeId) -> usize {
        projection::node_depth(&self.document.snapshot(), node)
    }

    // === Refresh ===

    /// Rebuilds the projection from the live document.
    ///
    /// `changed` carries the item ids a metadata notification named, enabling
    /// the incremental shortcut: when every changed id is already rendered
    /// and none of them now evaluates as filtered, nothing can have changed
    /// and the recompute is skipped. A `None` or partially-unknown id list
    /// recomputes unconditionally.
    ///
    /// When the document is transiently inconsistent the last good projection
    /// stays in place; the next change notification triggers another rebuild.
    pub fn rebuild(&self, changed: Option<&[ItemId]>) {
        if let Some(ids) = changed {
            if !ids.is_empty() && self.can_skip_rebuild(ids) {
                return;
            }
        }

        let records = self.document.snapshot();
        let expanded = self.expanded_snapshot();
        let filter = &self.filter;
        let node_filter = move |_: &NodeId, record: &NodeRecord| filter(&record.item);
        let parent_visible = |id: &NodeId| match &expanded {
            Some(set) => set.contains(id),
            None => true,
        };
        let Some(entries) =
            projection::compute_tree(&records, self.mode, &node_filter, &parent_visible)
        else {
            debug!("projection left in place: document is mid-move");
            return;
        };

        let mut update: Option<(u64, Vec<ItemId>)> = None;
        {
            let mut state = self.state.write().unwrap();
            if state.entries != entries {
                let mut item_index = HashMap::new();
                index_items(&entries, &mut item_index);
                let items: Vec<ItemId> = item_index.keys().cloned().collect();
                state.item_index = item_index;
                state.entries = entries;
                state.version += 1;
                update = Some((state.version, items));
            }
        }

        if let Some((version, items)) = update {
            self.refresh_subscription(&items);
            let observers: Vec<_> = self.observers.read().unwrap().clone();
            for observer in observers {
                observer.on_projection_changed(version);
            }
        }
    }

    /// Shortcut check: every changed id is already rendered and still passes
    /// the filter against the live document.
    fn can_skip_rebuild(&self, ids: &[ItemId]) -> bool {
        let state = self.state.read().unwrap();
        let all_rendered = ids.iter().all(|id| state.item_index.contains_key(id));
        all_rendered && !ids.iter().any(|id| self.is_item_filtered(id))
    }

    /// Re-points the metadata subscription at exactly the rendered item set.
    /// Subscribing is keyed on observer identity, so the replacement is
    /// atomic: ids that remain present never see a window with no
    /// subscription.
    fn refresh_subscription(&self, items: &[ItemId]) {
        self.registry.ensure_metadata_for_ids(items);
        if let Some(me) = self.weak_self.upgrade() {
            let set: HashSet<ItemId> = items.iter().cloned().collect();
            self.registry.subscribe(set, me as Arc<dyn MetadataObserver>);
        }
    }

    /// Reads the expanded-id set once per rebuild. A storage failure here
    /// must not take down the notification path, so it degrades to an empty
    /// set after a logged warning; mutation paths still propagate the error.
    fn expanded_snapshot(&self) -> Option<HashSet<NodeId>> {
        let expanded = self.expanded.as_ref()?;
        match expanded.expanded_ids() {
            Ok(ids) => Some(ids.into_iter().collect()),
            Err(err) => {
                warn!("failed to read expansion state: {err}");
                Some(HashSet::new())
            }
        }
    }

    /// Fallback placement when a move target has vanished: append at the
    /// root-level tail.
    fn move_to_root_tail(&self, node: &NodeId) -> Result<()> {
        let records = self.document.snapshot();
        match find_tail_under(&records, None) {
            Some(tail) if &tail == node => Ok(()),
            Some(tail) => self.move_below(node, &tail),
            None => self.move_below_root(node),
        }
    }
}

impl DocumentObserver for TreeSync {
    fn on_batch_applied(&self) {
        self.rebuild(None);
    }
}

impl MetadataObserver for TreeSync {
    fn on_metadata_changed(&self, ids: &[ItemId]) {
        self.rebuild(Some(ids));
    }
}

/// Returns the child of `parent` that no other node names via `back` — the
/// last sibling — or `None` if `parent` has no children. Ties (possible only
/// mid-move) break on the smallest id so behavior is deterministic.
fn find_tail_under(
    records: &HashMap<NodeId, NodeRecord>,
    parent: Option<&NodeId>,
) -> Option<NodeId> {
    let referenced: HashSet<&NodeId> = records.values().filter_map(|r| r.back.as_ref()).collect();
    records
        .iter()
        .filter(|(id, record)| record.parent.as_ref() == parent && !referenced.contains(*id))
        .map(|(id, _)| id)
        .min()
        .cloned()
}

/// Returns the child of `parent` with `back = None` — the first sibling.
fn chain_head_under(
    records: &HashMap<NodeId, NodeRecord>,
    parent: Option<&NodeId>,
) -> Option<NodeId> {
    records
        .iter()
        .filter(|(_, record)| record.parent.as_ref() == parent && record.back.is_none())
        .map(|(id, _)| id)
        .min()
        .cloned()
}

/// Returns the node whose `back` names `node`, if any.
fn follower_of(records: &HashMap<NodeId, NodeRecord>, node: &NodeId) -> Option<NodeId> {
    records
        .iter()
        .filter(|(_, record)| record.back.as_ref() == Some(node))
        .map(|(id, _)| id)
        .min()
        .cloned()
}

/// Depth-first search for an entry by node id.
fn find_entry<'a>(entries: &'a [ProjectionEntry], key: &NodeId) -> Option<&'a ProjectionEntry> {
    let mut stack: Vec<&ProjectionEntry> = entries.iter().collect();
    while let Some(entry) = stack.pop() {
        if &entry.key == key {
            return Some(entry);
        }
        stack.extend(entry.children.iter());
    }
    None
}

/// Rebuilds the item-to-node index from a projection, last write wins.
fn index_items(entries: &[ProjectionEntry], index: &mut HashMap<ItemId, NodeId>) {
    for entry in entries {
        index.insert(entry.item.clone(), entry.key.clone());
        index_items(&entry.children, index);
    }
}

#[cfg(test)]
mod tests;
