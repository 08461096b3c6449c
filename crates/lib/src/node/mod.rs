//! Node records: the unit of replication for ordered trees.
//!
//! Sibling order is encoded as a backward-linked chain: each node points at the
//! sibling immediately *preceding* it via `back`. Appending after a node
//! therefore never requires relinking anyone else, which is what keeps
//! concurrent inserts cheap.
//!
//! Steady-state invariants the replicated document is expected to satisfy:
//!
//! * For a fixed `parent`, the `back` pointers of its children form a single
//!   chain ending in `None` — exactly one child per parent has `back = None`,
//!   and no two nodes claim the same `back` target.
//! * No node is its own ancestor. This is a documented assumption, not
//!   something the engine enforces; only a malformed document violates it.
//! * `item` may be duplicated across node ids. Within one projection the
//!   item-to-entry index is last-write-wins per item id.
//!
//! In the window while a multi-op move is still being applied the chain
//! invariant can be transiently violated; see `sync::compute_tree`.

mod id;

pub use id::{ItemId, NodeId};

use serde::{Deserialize, Serialize};

/// One replicated node record: a position in one ordered tree.
///
/// Records are created whole by an insert, rewritten whole (or field-by-field)
/// by moves, and deleted whole by a remove. The replicated document owns them;
/// the engine only ever holds derived, disposable projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// The domain object this position references.
    pub item: ItemId,
    /// The sibling immediately preceding this node under the same parent,
    /// or `None` if this node is the first child.
    pub back: Option<NodeId>,
    /// The containing node, or `None` at the root level.
    pub parent: Option<NodeId>,
}

impl NodeRecord {
    /// Creates a record for a first child of `parent` (or a root head when
    /// `parent` is `None`).
    pub fn first_under(item: impl Into<ItemId>, parent: Option<NodeId>) -> Self {
        Self {
            item: item.into(),
            back: None,
            parent,
        }
    }

    /// Creates a record placed immediately after `back` under `parent`.
    pub fn after(item: impl Into<ItemId>, back: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            item: item.into(),
            back: Some(back),
            parent,
        }
    }

    /// True if this record sits at the root level.
    pub fn is_root_level(&self) -> bool {
        self.parent.is_none()
    }

    /// True if this record is the first sibling in its chain.
    pub fn is_chain_head(&self) -> bool {
        self.back.is_none()
    }
}

#[cfg(test)]
mod tests;
