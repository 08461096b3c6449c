//! Tests for TreeSync projection and mutation behavior.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::*;
use crate::document::InMemoryDocument;
use crate::metadata::InMemoryRegistry;
use crate::node::NodeRecord;
use crate::storage::InMemoryStore;

fn flat_sync(doc: &Arc<InMemoryDocument>, registry: &Arc<InMemoryRegistry>) -> Arc<TreeSync> {
    let sync = TreeSync::new(
        doc.clone(),
        registry.clone(),
        None,
        None,
        ProjectionMode::Flat,
    );
    sync.attach();
    sync
}

fn nested_sync(
    doc: &Arc<InMemoryDocument>,
    registry: &Arc<InMemoryRegistry>,
    expanded: Option<Arc<ExpandedNodeSet>>,
) -> Arc<TreeSync> {
    let sync = TreeSync::new(
        doc.clone(),
        registry.clone(),
        expanded,
        None,
        ProjectionMode::Nested,
    );
    sync.attach();
    sync
}

fn expanded_set() -> Arc<ExpandedNodeSet> {
    Arc::new(ExpandedNodeSet::new(Arc::new(InMemoryStore::new())))
}

fn items(entries: &[ProjectionEntry]) -> Vec<String> {
    entries.iter().map(|e| e.item.to_string()).collect()
}

/// Chain integrity: under every parent, exactly one child has `back = None`
/// and following the chain forward reaches every sibling exactly once.
fn assert_chain_integrity(records: &HashMap<NodeId, NodeRecord>) {
    let parents: HashSet<Option<NodeId>> = records.values().map(|r| r.parent.clone()).collect();
    for parent in parents {
        let children: Vec<&NodeId> = records
            .iter()
            .filter(|(_, r)| r.parent == parent)
            .map(|(id, _)| id)
            .collect();
        let heads: Vec<&&NodeId> = children
            .iter()
            .filter(|id| records[*id].back.is_none())
            .collect();
        assert_eq!(heads.len(), 1, "one chain head expected under {parent:?}");

        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut current = Some((**heads[0]).clone());
        while let Some(id) = current {
            assert!(seen.insert(id.clone()), "back chain revisits {id}");
            current = records
                .iter()
                .find(|(_, r)| r.back.as_ref() == Some(&id))
                .map(|(follower, _)| follower.clone());
        }
        assert_eq!(
            seen.len(),
            children.len(),
            "back chain must cover every child of {parent:?}"
        );
    }
}

struct VersionObserver {
    versions: Mutex<Vec<u64>>,
}

impl VersionObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            versions: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<u64> {
        self.versions.lock().unwrap().clone()
    }
}

impl ProjectionObserver for VersionObserver {
    fn on_projection_changed(&self, version: u64) {
        self.versions.lock().unwrap().push(version);
    }
}

// === Scenario tests ===

#[test]
fn test_build_then_reorder() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    let a = sync.add_to_root("A")?;
    let _b = sync.add_to_root("B")?;
    let c = sync.add_to_root("C")?;
    assert_eq!(items(&sync.entries()), ["A", "B", "C"]);

    sync.move_above(&c, &a)?;
    assert_eq!(items(&sync.entries()), ["C", "A", "B"]);
    assert_chain_integrity(&doc.snapshot());
    Ok(())
}

#[test]
fn test_nest_then_expand() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let expanded = expanded_set();
    let sync = nested_sync(&doc, &registry, Some(expanded.clone()));

    let a = sync.add_to_root("A")?;
    let _b = sync.insert_under("B", &a)?;

    // A collapsed: the entry renders, its children do not.
    let entries = sync.entries();
    assert_eq!(items(&entries), ["A"]);
    assert!(!entries[0].is_leaf);
    assert!(entries[0].children.is_empty());

    expanded.set(&a)?;
    sync.rebuild(None);
    let entries = sync.entries();
    assert_eq!(items(&entries[0].children), ["B"]);
    assert!(entries[0].children[0].is_leaf);

    // An unfiltered projection ignores expansion entirely.
    let unfiltered = nested_sync(&doc, &registry, None);
    assert_eq!(items(&unfiltered.entries()[0].children), ["B"]);
    Ok(())
}

#[test]
fn test_remove_internal_node_splices_children() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = nested_sync(&doc, &registry, None);

    let r = sync.add_to_root("R")?;
    let m = sync.insert_under("M", &r)?;
    let _s = sync.insert_below("S", &m)?;
    let _l = sync.insert_under("L", &m)?;

    let entries = sync.entries();
    assert_eq!(items(&entries[0].children), ["M", "S"]);
    assert_eq!(items(&entries[0].children[0].children), ["L"]);

    sync.remove(&m)?;
    let entries = sync.entries();
    // L takes M's former position relative to S.
    assert_eq!(items(&entries[0].children), ["L", "S"]);
    assert!(sync.node_for_item(&ItemId::from("M")).is_none());
    assert_chain_integrity(&doc.snapshot());
    Ok(())
}

// === Property tests ===

#[test]
fn test_chain_integrity_across_mutations() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    let a = sync.add_to_root("A")?;
    let b = sync.add_to_root("B")?;
    let c = sync.add_to_root("C")?;
    assert_chain_integrity(&doc.snapshot());

    let d = sync.insert_under("D", &b)?;
    assert_chain_integrity(&doc.snapshot());

    sync.move_into(&c, &b)?;
    assert_chain_integrity(&doc.snapshot());

    sync.move_above(&d, &a)?;
    assert_chain_integrity(&doc.snapshot());

    sync.move_below_root(&c)?;
    assert_chain_integrity(&doc.snapshot());

    sync.remove(&b)?;
    assert_chain_integrity(&doc.snapshot());
    Ok(())
}

#[test]
fn test_depth_parent_consistency() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = nested_sync(&doc, &registry, None);

    let r = sync.add_to_root("R")?;
    let m = sync.insert_under("M", &r)?;
    let l = sync.insert_under("L", &m)?;
    let _s = sync.add_to_root("S")?;

    let records = doc.snapshot();
    assert_eq!(sync.node_depth(&r), 0);
    assert_eq!(sync.node_depth(&m), 1);
    assert_eq!(sync.node_depth(&l), 2);
    for (id, record) in &records {
        match &record.parent {
            Some(parent) => assert_eq!(sync.node_depth(id), sync.node_depth(parent) + 1),
            None => assert_eq!(sync.node_depth(id), 0),
        }
    }
    Ok(())
}

#[test]
fn test_move_above_is_idempotent() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    let a = sync.add_to_root("A")?;
    let _b = sync.add_to_root("B")?;
    let c = sync.add_to_root("C")?;

    sync.move_above(&c, &a)?;
    let after_first = doc.snapshot();
    sync.move_above(&c, &a)?;
    assert_eq!(doc.snapshot(), after_first);
    Ok(())
}

#[test]
fn test_insert_remove_round_trip() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    let a = sync.add_to_root("A")?;
    let _b = sync.insert_under("B", &a)?;
    let before = doc.snapshot();

    let x = sync.insert_under("X", &a)?;
    sync.remove(&x)?;
    assert_eq!(doc.snapshot(), before);
    Ok(())
}

#[test]
fn test_filter_inheritance_nested_but_not_flat() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let nested = nested_sync(&doc, &registry, None);
    let flat = flat_sync(&doc, &registry);

    let r = nested.add_to_root("R")?;
    let m = nested.insert_under("M", &r)?;
    let _l = nested.insert_under("L", &m)?;
    assert_eq!(items(&flat.entries()), ["R", "M", "L"]);

    // M becomes inaccessible: nested mode hides its whole subtree, flat mode
    // keeps L because each node's visibility depends only on itself.
    registry.set_filtered("M", true);

    let entries = nested.entries();
    assert_eq!(items(&entries), ["R"]);
    assert!(entries[0].children.is_empty());

    assert_eq!(items(&flat.entries()), ["R", "L"]);
    Ok(())
}

// === Transient inconsistency ===

#[test]
fn test_duplicate_back_claim_yields_no_tree() -> crate::Result<()> {
    use crate::document::{FieldOp, TreeDocument};

    let doc = InMemoryDocument::new();
    let x = NodeId::from("x");
    doc.submit(vec![
        FieldOp::create(x.clone(), NodeRecord::first_under("X", None)),
        FieldOp::create(
            NodeId::from("n1"),
            NodeRecord::after("one", x.clone(), None),
        ),
        FieldOp::create(
            NodeId::from("n2"),
            NodeRecord::after("two", x.clone(), None),
        ),
    ])?;

    let tree = projection::compute_tree(
        &doc.snapshot(),
        ProjectionMode::Nested,
        &|_: &NodeId, _: &NodeRecord| true,
        &|_: &NodeId| true,
    );
    assert!(tree.is_none(), "duplicate predecessor claim must abort");
    Ok(())
}

#[test]
fn test_torn_move_keeps_last_projection_until_convergence() -> crate::Result<()> {
    use crate::document::{FieldOp, TreeDocument};

    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);
    let observer = VersionObserver::new();
    sync.observe(observer.clone());

    let a = sync.add_to_root("A")?;
    let b = sync.add_to_root("B")?;
    let c = sync.add_to_root("C")?;
    let version = sync.version();

    // First two ops of move_above(C, B) arrive alone: B and C now both claim
    // A as predecessor.
    let c_record = doc.snapshot()[&c].clone();
    doc.submit(vec![FieldOp::replace(
        c.clone(),
        c_record.clone(),
        NodeRecord::after(c_record.item.clone(), a.clone(), None),
    )])?;
    assert_eq!(items(&sync.entries()), ["A", "B", "C"], "last good projection");
    assert_eq!(sync.version(), version, "no visible-set change published");

    // The final op lands; the projection converges on the next notification.
    doc.submit(vec![FieldOp::set_back(b.clone(), Some(a.clone()), Some(c.clone()))])?;
    assert_eq!(items(&sync.entries()), ["A", "C", "B"]);
    assert_eq!(sync.version(), version + 1);
    assert_eq!(observer.seen().last(), Some(&(version + 1)));
    Ok(())
}

#[test]
fn test_remove_aborts_on_inconsistent_document() -> crate::Result<()> {
    use crate::document::{FieldOp, TreeDocument};

    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    let a = sync.add_to_root("A")?;
    let b = sync.add_to_root("B")?;
    let c = sync.add_to_root("C")?;

    let c_record = doc.snapshot()[&c].clone();
    doc.submit(vec![FieldOp::replace(
        c.clone(),
        c_record.clone(),
        NodeRecord::after(c_record.item.clone(), a.clone(), None),
    )])?;
    let torn = doc.snapshot();

    let err = sync.remove(&b).unwrap_err();
    assert!(err.is_transient());
    assert_eq!(doc.snapshot(), torn, "no mutation on aborted remove");
    Ok(())
}

// === Incremental refresh ===

#[test]
fn test_metadata_tick_skips_recompute_for_rendered_items() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let filter_calls = Arc::new(AtomicUsize::new(0));
    let calls = filter_calls.clone();
    let sync = TreeSync::new(
        doc.clone(),
        registry.clone(),
        None,
        Some(Box::new(move |_: &ItemId| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        })),
        ProjectionMode::Flat,
    );
    sync.attach();

    sync.add_to_root("A")?;
    sync.add_to_root("B")?;
    let version = sync.version();

    // Rendered id, still unfiltered: only the shortcut check runs.
    let before = filter_calls.load(Ordering::SeqCst);
    registry.notify_changed(&[ItemId::from("A")]);
    assert_eq!(filter_calls.load(Ordering::SeqCst), before + 1);
    assert_eq!(sync.version(), version);

    // Unknown id: recompute unconditionally (once per projected node).
    let before = filter_calls.load(Ordering::SeqCst);
    sync.rebuild(Some(&[ItemId::from("never-rendered")]));
    assert_eq!(filter_calls.load(Ordering::SeqCst), before + 2);
    assert_eq!(sync.version(), version, "identical projection: no bump");
    Ok(())
}

#[test]
fn test_item_becoming_filtered_is_removed() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    sync.add_to_root("A")?;
    let b = sync.add_to_root("B")?;
    let version = sync.version();
    assert_eq!(sync.node_for_item(&ItemId::from("B")), Some(b));

    registry.set_filtered("B", true);
    assert_eq!(items(&sync.entries()), ["A"]);
    assert_eq!(sync.version(), version + 1);
    assert!(sync.node_for_item(&ItemId::from("B")).is_none());

    // The subscription now covers exactly the rendered set.
    assert!(registry.known_ids().contains(&ItemId::from("A")));
    Ok(())
}

// === Dangling-reference repair ===

#[test]
fn test_insert_under_missing_parent_falls_back_to_root() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    sync.add_to_root("A")?;
    let x = sync.insert_under("X", &NodeId::from("gone"))?;

    assert_eq!(items(&sync.entries()), ["A", "X"]);
    assert!(doc.snapshot()[&x].parent.is_none());
    Ok(())
}

#[test]
fn test_move_above_missing_target_falls_back_to_root_tail() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    let a = sync.add_to_root("A")?;
    let _b = sync.add_to_root("B")?;

    sync.move_above(&a, &NodeId::from("gone"))?;
    assert_eq!(items(&sync.entries()), ["B", "A"]);
    assert_chain_integrity(&doc.snapshot());
    Ok(())
}

// === Ordering and structure ===

#[test]
fn test_insert_under_relinks_previous_first_child() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = nested_sync(&doc, &registry, None);

    let a = sync.add_to_root("A")?;
    let _b = sync.insert_under("B", &a)?;
    let _c = sync.insert_under("C", &a)?;

    assert_eq!(items(&sync.entries()[0].children), ["C", "B"]);
    assert_chain_integrity(&doc.snapshot());
    Ok(())
}

#[test]
fn test_insert_below_tail_appends() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = flat_sync(&doc, &registry);

    sync.add_to_root("A")?;
    let b = sync.add_to_root("B")?;
    sync.insert_below("X", &b)?;

    assert_eq!(items(&sync.entries()), ["A", "B", "X"]);
    assert_eq!(
        sync.find_tail_node_id_under(None),
        sync.node_for_item(&ItemId::from("X"))
    );
    Ok(())
}

#[test]
fn test_move_into_appends_and_short_circuits() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = nested_sync(&doc, &registry, None);

    let a = sync.add_to_root("A")?;
    let b = sync.add_to_root("B")?;
    let c = sync.add_to_root("C")?;

    sync.move_into(&b, &a)?;
    sync.move_into(&c, &a)?;
    let entries = sync.entries();
    assert_eq!(items(&entries), ["A"]);
    assert_eq!(items(&entries[0].children), ["B", "C"]);

    // Already a direct child: no-op.
    let before = doc.snapshot();
    sync.move_into(&c, &a)?;
    assert_eq!(doc.snapshot(), before);
    assert_chain_integrity(&doc.snapshot());
    Ok(())
}

#[test]
fn test_move_below_root_moves_to_front() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let sync = nested_sync(&doc, &registry, None);

    let a = sync.add_to_root("A")?;
    let b = sync.insert_under("B", &a)?;

    sync.move_below_root(&b)?;
    assert_eq!(items(&sync.entries()), ["B", "A"]);
    assert!(sync.entries()[0].children.is_empty());
    assert_chain_integrity(&doc.snapshot());
    Ok(())
}

#[test]
fn test_flat_projection_emits_deepest_last() -> crate::Result<()> {
    let doc = Arc::new(InMemoryDocument::new());
    let registry = Arc::new(InMemoryRegistry::new());
    let flat = flat_sync(&doc, &registry);

    let a = flat.add_to_root("A")?;
    let b = flat.insert_under("B", &a)?;
    let _c = flat.insert_under("C", &b)?;
    flat.add_to_root("D")?;

    let entries = flat.entries();
    assert_eq!(items(&entries), ["A", "D", "B", "C"]);
    assert!(entries.iter().all(|e| e.children.is_empty()));
    let leaf_flags: Vec<bool> = entries.iter().map(|e| e.is_leaf).collect();
    assert_eq!(leaf_flags, [false, true, false, true]);
    Ok(())
}
