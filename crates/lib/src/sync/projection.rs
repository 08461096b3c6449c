//! Tree projection: turning the flat record map into a UI-consumable shape.
//!
//! The record map encodes sibling order as backward-linked chains, so the
//! projection walks each chain from its tail to its head, prepending as it
//! goes, which yields the forward (oldest-first) order the UI expects.
//! Processing is organized by depth layer so nested assembly is deterministic;
//! correctness does not depend on discovery order.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::node::{ItemId, NodeId, NodeRecord};

/// How a `TreeSync` projects the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    /// Children embedded under their parents; used for browsable trees.
    /// Collapsed or filtered ancestors hide whole subtrees.
    Nested,
    /// Every visible node emitted as a top-level entry, deepest last; used
    /// for trash-style lists. Ancestor expansion and filter inheritance are
    /// ignored by design: each node's visibility depends only on itself.
    Flat,
}

/// One entry of a projected tree or list.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionEntry {
    /// The node id; stable key for the UI layer.
    pub key: NodeId,
    /// The referenced domain object.
    pub item: ItemId,
    /// False if some node's `parent` names this node in the raw document,
    /// regardless of whether those children are currently rendered.
    pub is_leaf: bool,
    /// Rendered children, populated only in `Nested` mode.
    pub children: Vec<ProjectionEntry>,
}

/// Accepts or rejects a node for projection.
pub(crate) trait NodePredicate {
    fn accept(&self, id: &NodeId, record: &NodeRecord) -> bool;
}

impl<F: Fn(&NodeId, &NodeRecord) -> bool> NodePredicate for F {
    fn accept(&self, id: &NodeId, record: &NodeRecord) -> bool {
        self(id, record)
    }
}

/// Hop count from `id` to the root, following `parent` links.
///
/// Root-level nodes have depth 0. Used to seed breadth-first layering during
/// projection; the hop cap only guards against a malformed document that
/// contains a parent cycle.
pub(crate) fn node_depth(records: &HashMap<NodeId, NodeRecord>, id: &NodeId) -> usize {
    let mut depth = 0;
    let mut current = records.get(id).and_then(|r| r.parent.clone());
    while let Some(parent) = current {
        depth += 1;
        if depth > records.len() {
            break;
        }
        current = records.get(&parent).and_then(|r| r.parent.clone());
    }
    depth
}

/// Computes the projection, or `None` when the document is transiently
/// inconsistent.
///
/// The inconsistency signal is two distinct nodes claiming the same `back`
/// target — the observable shape of a multi-op move that has not fully
/// arrived. Callers must treat `None` as "try again after the next change
/// notification", never as an empty tree, and must leave the last good
/// projection in place.
pub(crate) fn compute_tree(
    records: &HashMap<NodeId, NodeRecord>,
    mode: ProjectionMode,
    node_filter: &dyn NodePredicate,
    parent_visible: &dyn Fn(&NodeId) -> bool,
) -> Option<Vec<ProjectionEntry>> {
    // Single scan: duplicate-back detection, internal-node marking, depth map.
    let mut seen_as_back: HashSet<&NodeId> = HashSet::new();
    let mut has_children: HashSet<&NodeId> = HashSet::new();
    for record in records.values() {
        if let Some(back) = &record.back {
            if !seen_as_back.insert(back) {
                debug!(node = %back, "two children claim the same predecessor slot");
                return None;
            }
        }
        if let Some(parent) = &record.parent {
            has_children.insert(parent);
        }
    }

    let mut depths: HashMap<&NodeId, usize> = HashMap::new();
    for id in records.keys() {
        depths.insert(id, node_depth(records, id));
    }

    // A node is a tail (the last sibling under its parent) when no other node
    // names it via `back`. Group tails by depth layer.
    let mut tails_by_depth: HashMap<usize, Vec<&NodeId>> = HashMap::new();
    for id in records.keys() {
        if !seen_as_back.contains(id) {
            tails_by_depth.entry(depths[id]).or_default().push(id);
        }
    }
    for layer in tails_by_depth.values_mut() {
        layer.sort();
    }

    // Nodes excluded from the nested projection, either by failing the filter
    // themselves or by inheriting a filtered parent. Parents are processed
    // before children because layers go shallow to deep.
    let mut filtered: HashSet<&NodeId> = HashSet::new();
    // Ordered sibling groups per layer: (parent, members oldest-first).
    let mut layers: Vec<Vec<(Option<NodeId>, Vec<&NodeId>)>> = Vec::new();

    let mut depth = 0;
    while let Some(layer_tails) = tails_by_depth.get(&depth) {
        let mut layer: Vec<(Option<NodeId>, Vec<&NodeId>)> = Vec::new();
        for tail in layer_tails {
            let parent = records[*tail].parent.clone();
            if mode == ProjectionMode::Nested
                && !ancestors_visible(records, parent.as_ref(), parent_visible, &filtered)
            {
                continue;
            }

            // Walk backward from the tail to the chain head, prepending, so
            // the head (`back = None`) lands first.
            let mut chain: Vec<&NodeId> = Vec::new();
            let mut current: Option<&NodeId> = Some(tail);
            let mut hops = 0;
            while let Some(id) = current {
                chain.insert(0, id);
                hops += 1;
                if hops > records.len() {
                    break;
                }
                current = records[id].back.as_ref().filter(|b| records.contains_key(*b));
            }

            let mut visible: Vec<&NodeId> = Vec::new();
            for id in chain {
                let passes = node_filter.accept(id, &records[id]);
                match mode {
                    ProjectionMode::Nested => {
                        if passes {
                            visible.push(id);
                        } else {
                            // Filtering is inherited down the tree.
                            filtered.insert(id);
                        }
                    }
                    ProjectionMode::Flat => {
                        if passes {
                            visible.push(id);
                        }
                    }
                }
            }
            if !visible.is_empty() {
                layer.push((parent, visible));
            }
        }
        layers.push(layer);
        depth += 1;
    }

    Some(match mode {
        ProjectionMode::Flat => assemble_flat(records, &has_children, &layers),
        ProjectionMode::Nested => assemble_nested(records, &has_children, &layers),
    })
}

/// True when every ancestor from `parent` up to the root is expanded and not
/// filtered. The node itself is not checked: a collapsed node still renders,
/// only its children disappear.
fn ancestors_visible(
    records: &HashMap<NodeId, NodeRecord>,
    parent: Option<&NodeId>,
    parent_visible: &dyn Fn(&NodeId) -> bool,
    filtered: &HashSet<&NodeId>,
) -> bool {
    let mut current = parent;
    let mut hops = 0;
    while let Some(id) = current {
        if filtered.contains(id) || !parent_visible(id) {
            return false;
        }
        hops += 1;
        if hops > records.len() {
            break;
        }
        current = records.get(id).and_then(|r| r.parent.as_ref());
    }
    true
}

/// Flat assembly: layers ascending, so the output is deepest last.
fn assemble_flat(
    records: &HashMap<NodeId, NodeRecord>,
    has_children: &HashSet<&NodeId>,
    layers: &[Vec<(Option<NodeId>, Vec<&NodeId>)>],
) -> Vec<ProjectionEntry> {
    let mut out = Vec::new();
    for layer in layers {
        for (_, members) in layer {
            for id in members {
                out.push(ProjectionEntry {
                    key: (*id).clone(),
                    item: records[*id].item.clone(),
                    is_leaf: !has_children.contains(*id),
                    children: Vec::new(),
                });
            }
        }
    }
    out
}

/// Nested assembly, deepest layer first, attaching each finished child list to
/// its parent as the walk moves up. Iterative on purpose: the projection is
/// rebuilt wholesale on every relevant change and must not alias prior trees.
fn assemble_nested(
    records: &HashMap<NodeId, NodeRecord>,
    has_children: &HashSet<&NodeId>,
    layers: &[Vec<(Option<NodeId>, Vec<&NodeId>)>],
) -> Vec<ProjectionEntry> {
    let mut child_entries: HashMap<NodeId, Vec<ProjectionEntry>> = HashMap::new();
    let mut roots = Vec::new();
    for layer in layers.iter().rev() {
        for (parent, members) in layer {
            for id in members {
                let entry = ProjectionEntry {
                    key: (*id).clone(),
                    item: records[*id].item.clone(),
                    is_leaf: !has_children.contains(*id),
                    children: child_entries.remove(*id).unwrap_or_default(),
                };
                match parent {
                    Some(parent) => child_entries.entry(parent.clone()).or_default().push(entry),
                    None => roots.push(entry),
                }
            }
        }
    }
    roots
}
