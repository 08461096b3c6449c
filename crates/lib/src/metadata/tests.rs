//! Tests for the in-memory atom metadata registry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::*;

struct RecordingObserver {
    seen: Mutex<Vec<Vec<ItemId>>>,
}

impl RecordingObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    fn batches(&self) -> Vec<Vec<ItemId>> {
        self.seen.lock().unwrap().clone()
    }
}

impl MetadataObserver for RecordingObserver {
    fn on_metadata_changed(&self, ids: &[ItemId]) {
        self.seen.lock().unwrap().push(ids.to_vec());
    }
}

fn ids(names: &[&str]) -> HashSet<ItemId> {
    names.iter().map(|n| ItemId::from(*n)).collect()
}

#[test]
fn test_notify_reaches_only_intersecting_subscribers() {
    let registry = InMemoryRegistry::new();
    let subscribed = RecordingObserver::new();
    let unrelated = RecordingObserver::new();
    registry.subscribe(ids(&["a", "b"]), subscribed.clone());
    registry.subscribe(ids(&["z"]), unrelated.clone());

    registry.notify_changed(&[ItemId::from("a"), ItemId::from("b"), ItemId::from("c")]);

    let batches = subscribed.batches();
    assert_eq!(batches.len(), 1, "one call per change batch");
    assert_eq!(batches[0], vec![ItemId::from("a"), ItemId::from("b")]);
    assert!(unrelated.batches().is_empty());
}

#[test]
fn test_subscribe_replaces_by_identity() {
    let registry = InMemoryRegistry::new();
    let observer = RecordingObserver::new();
    registry.subscribe(ids(&["a"]), observer.clone());
    registry.subscribe(ids(&["b"]), observer.clone());

    registry.notify_changed(&[ItemId::from("a")]);
    assert!(observer.batches().is_empty(), "old id set must be replaced");

    registry.notify_changed(&[ItemId::from("b")]);
    assert_eq!(observer.batches().len(), 1);
}

#[test]
fn test_unsubscribe_by_identity() {
    let registry = InMemoryRegistry::new();
    let observer = RecordingObserver::new();
    let as_dyn: Arc<dyn MetadataObserver> = observer.clone();
    registry.subscribe(ids(&["a"]), as_dyn.clone());
    registry.unsubscribe(&as_dyn);

    registry.set_filtered("a", true);
    assert!(observer.batches().is_empty());
}

#[test]
fn test_set_filtered_updates_predicate_and_notifies() {
    let registry = InMemoryRegistry::new();
    let observer = RecordingObserver::new();
    registry.subscribe(ids(&["a"]), observer.clone());

    assert!(!registry.is_filtered(&ItemId::from("a")));
    registry.set_filtered("a", true);
    assert!(registry.is_filtered(&ItemId::from("a")));
    assert_eq!(observer.batches().len(), 1);

    registry.set_filtered("a", false);
    assert!(!registry.is_filtered(&ItemId::from("a")));
}

#[test]
fn test_ensure_metadata_is_idempotent() {
    let registry = InMemoryRegistry::new();
    registry.ensure_metadata_for_ids(&[ItemId::from("a"), ItemId::from("b")]);
    registry.ensure_metadata_for_ids(&[ItemId::from("b")]);
    assert_eq!(registry.known_ids(), ids(&["a", "b"]));
}
