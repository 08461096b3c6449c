//! Field-level edit operations submitted to the replicated document.
//!
//! Every op names a node, the value the submitter last observed for the
//! touched field (or whole record), and the new value. The document service
//! applies an op only if the expected previous value still matches at apply
//! time; on mismatch the op is the service's to resolve or drop. Batches are
//! ordered lists but the contract does not make them atomic with respect to
//! remote readers — a multi-op move can be observed half-applied.

use crate::node::{NodeId, NodeRecord};

/// One field-level edit with an optimistic-concurrency check.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Create a whole record. Expected previous value: absent.
    Create { node: NodeId, record: NodeRecord },
    /// Delete a whole record, expecting its current contents.
    Delete { node: NodeId, expected: NodeRecord },
    /// Rewrite a record's `back` field.
    SetBack {
        node: NodeId,
        expected: Option<NodeId>,
        value: Option<NodeId>,
    },
    /// Rewrite a record's `parent` field.
    SetParent {
        node: NodeId,
        expected: Option<NodeId>,
        value: Option<NodeId>,
    },
    /// Rewrite a whole record in place (moves replace `back` and `parent`
    /// together, never partially).
    Replace {
        node: NodeId,
        expected: NodeRecord,
        record: NodeRecord,
    },
}

impl FieldOp {
    /// Convenience constructor for a create op.
    pub fn create(node: NodeId, record: NodeRecord) -> Self {
        FieldOp::Create { node, record }
    }

    /// Convenience constructor for a delete op.
    pub fn delete(node: NodeId, expected: NodeRecord) -> Self {
        FieldOp::Delete { node, expected }
    }

    /// Convenience constructor for a `back` rewrite.
    pub fn set_back(node: NodeId, expected: Option<NodeId>, value: Option<NodeId>) -> Self {
        FieldOp::SetBack {
            node,
            expected,
            value,
        }
    }

    /// Convenience constructor for a `parent` rewrite.
    pub fn set_parent(node: NodeId, expected: Option<NodeId>, value: Option<NodeId>) -> Self {
        FieldOp::SetParent {
            node,
            expected,
            value,
        }
    }

    /// Convenience constructor for a whole-record rewrite.
    pub fn replace(node: NodeId, expected: NodeRecord, record: NodeRecord) -> Self {
        FieldOp::Replace {
            node,
            expected,
            record,
        }
    }

    /// The node this op touches.
    pub fn node(&self) -> &NodeId {
        match self {
            FieldOp::Create { node, .. }
            | FieldOp::Delete { node, .. }
            | FieldOp::SetBack { node, .. }
            | FieldOp::SetParent { node, .. }
            | FieldOp::Replace { node, .. } => node,
        }
    }
}
