//! Tests for node identifiers and records.

use super::*;

#[test]
fn test_generated_node_ids_are_unique() {
    let a = NodeId::generate();
    let b = NodeId::generate();
    assert_ne!(a, b);
    assert!(!a.is_empty());
}

#[test]
fn test_id_conversions_and_display() {
    let id = NodeId::from("abc");
    assert_eq!(id.as_str(), "abc");
    assert_eq!(id.to_string(), "abc");
    assert_eq!(NodeId::new(String::from("abc")), id);

    let item = ItemId::from("world-1");
    assert_eq!(item.as_ref(), "world-1");
}

#[test]
fn test_record_serde_round_trip() {
    let record = NodeRecord::after("world-1", NodeId::from("n1"), Some(NodeId::from("p")));
    let json = serde_json::to_string(&record).unwrap();
    let back: NodeRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn test_record_position_helpers() {
    let head = NodeRecord::first_under("a", None);
    assert!(head.is_root_level());
    assert!(head.is_chain_head());

    let nested = NodeRecord::after("b", NodeId::from("n1"), Some(NodeId::from("p")));
    assert!(!nested.is_root_level());
    assert!(!nested.is_chain_head());
}
