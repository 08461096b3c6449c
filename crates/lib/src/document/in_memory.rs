//! In-memory replicated document implementation.
//!
//! Applies submitted batches synchronously against a `HashMap` arena and fires
//! the batch-applied notification before `submit` returns. Suitable for tests
//! and single-process use; a real deployment substitutes a handle to the
//! replication service behind the same `TreeDocument` trait.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{DocumentObserver, FieldOp, TreeDocument};
use crate::Result;
use crate::node::{NodeId, NodeRecord};

/// A simple in-memory document using a `HashMap` for record storage.
///
/// Each op's expected-previous-value check is evaluated independently: a
/// mismatched op is skipped (logged at debug) while the rest of the batch
/// still applies. This mirrors the replication service's per-field optimistic
/// concurrency and is what lets tests place the document into the torn,
/// mid-move state by submitting a prefix of a move's ops as its own batch.
#[derive(Default)]
pub struct InMemoryDocument {
    /// Record storage with read-write lock for concurrent access
    records: RwLock<HashMap<NodeId, NodeRecord>>,
    /// Observers notified after every applied batch, including the submitter's own
    observers: RwLock<Vec<Arc<dyn DocumentObserver>>>,
}

impl InMemoryDocument {
    /// Creates a new, empty `InMemoryDocument`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Returns true if the document holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Returns the ids of all records currently stored.
    pub fn all_ids(&self) -> Vec<NodeId> {
        let records = self.records.read().unwrap();
        records.keys().cloned().collect()
    }

    /// Applies one op against the arena, honoring its expected-previous check.
    /// Returns false if the op was skipped.
    fn apply(records: &mut HashMap<NodeId, NodeRecord>, op: &FieldOp) -> bool {
        match op {
            FieldOp::Create { node, record } => {
                if records.contains_key(node) {
                    return false;
                }
                records.insert(node.clone(), record.clone());
                true
            }
            FieldOp::Delete { node, expected } => match records.get(node) {
                Some(current) if current == expected => {
                    records.remove(node);
                    true
                }
                _ => false,
            },
            FieldOp::SetBack {
                node,
                expected,
                value,
            } => match records.get_mut(node) {
                Some(current) if &current.back == expected => {
                    current.back = value.clone();
                    true
                }
                _ => false,
            },
            FieldOp::SetParent {
                node,
                expected,
                value,
            } => match records.get_mut(node) {
                Some(current) if &current.parent == expected => {
                    current.parent = value.clone();
                    true
                }
                _ => false,
            },
            FieldOp::Replace {
                node,
                expected,
                record,
            } => match records.get_mut(node) {
                Some(current) if current == expected => {
                    *current = record.clone();
                    true
                }
                _ => false,
            },
        }
    }

    /// Notifies every observer of an applied batch. The observer list is
    /// cloned out of the lock first so callbacks may subscribe, submit, or
    /// read snapshots re-entrantly.
    fn notify(&self) {
        let observers: Vec<_> = self.observers.read().unwrap().clone();
        for observer in observers {
            observer.on_batch_applied();
        }
    }
}

impl TreeDocument for InMemoryDocument {
    fn snapshot(&self) -> HashMap<NodeId, NodeRecord> {
        self.records.read().unwrap().clone()
    }

    fn submit(&self, ops: Vec<FieldOp>) -> Result<()> {
        {
            let mut records = self.records.write().unwrap();
            for op in &ops {
                if !Self::apply(&mut records, op) {
                    debug!(node = %op.node(), "skipping op with stale expected value");
                }
            }
        }
        self.notify();
        Ok(())
    }

    fn subscribe(&self, observer: Arc<dyn DocumentObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    fn unsubscribe(&self, observer: &Arc<dyn DocumentObserver>) {
        self.observers
            .write()
            .unwrap()
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }
}
