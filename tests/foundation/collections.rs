//! Integration tests for heap containers
//!
//! Tests Array, ArraySet, ArrayMultiSet and Object, including copy-on-write
//! sharing and collation-aware membership.

use std::sync::Arc;

use docvm_foundation::{
    Array, ArrayMultiSet, ArraySet, CaseInsensitiveCollator, Collator, Object, Value,
};

// =============================================================================
// Array
// =============================================================================

#[test]
fn array_push_and_pop() {
    let mut a = Array::new();
    assert!(a.is_empty());
    a.push_back(Value::Int32(1));
    a.push_back(Value::Int32(2));
    assert_eq!(a.len(), 2);
    assert_eq!(a.first(), Some(&Value::Int32(1)));
    assert_eq!(a.pop_front(), Some(Value::Int32(1)));
    assert_eq!(a.last(), Some(&Value::Int32(2)));
}

#[test]
fn array_clones_are_independent() {
    let original: Array = (0..3).map(Value::Int32).collect();
    let mut copy = original.clone();
    copy.set(0, Value::from("changed"));
    assert_eq!(original.get(0), Some(&Value::Int32(0)));
    assert_eq!(copy.get(0), Some(&Value::from("changed")));
}

// =============================================================================
// ArraySet
// =============================================================================

#[test]
fn set_deduplicates_equal_numbers() {
    let mut set = ArraySet::new();
    assert!(set.insert(Value::Int32(1)));
    assert!(!set.insert(Value::Double(1.0)));
    assert!(!set.insert(Value::Nothing));
    assert_eq!(set.len(), 1);
    assert!(set.contains(&Value::Int64(1)));
}

#[test]
fn set_membership_follows_the_collator() {
    let ci: Arc<dyn Collator> = Arc::new(CaseInsensitiveCollator);
    let mut set = ArraySet::with_collator(Some(ci));
    assert!(set.insert(Value::from("Apple")));
    assert!(!set.insert(Value::from("APPLE")));
    assert!(set.remove(&Value::from("apple")));
    assert!(set.is_empty());
}

#[test]
fn set_keeps_insertion_order() {
    let set: ArraySet = [Value::Int32(3), Value::Int32(1), Value::Int32(2)]
        .into_iter()
        .collect();
    let members: Vec<Value> = set.iter().cloned().collect();
    assert_eq!(members, [Value::Int32(3), Value::Int32(1), Value::Int32(2)]);
}

// =============================================================================
// ArrayMultiSet
// =============================================================================

#[test]
fn multiset_counts_duplicates() {
    let mut bag = ArrayMultiSet::new();
    bag.insert(Value::from("a"));
    bag.insert(Value::from("a"));
    bag.insert(Value::from("b"));
    assert_eq!(bag.len(), 3);
    assert_eq!(bag.distinct_len(), 2);
    assert_eq!(bag.count(&Value::from("a")), 2);

    assert!(bag.remove(&Value::from("a")));
    assert_eq!(bag.count(&Value::from("a")), 1);
    assert!(!bag.remove(&Value::from("z")));
}

// =============================================================================
// Object
// =============================================================================

#[test]
fn object_insert_replaces_in_place() {
    let mut obj = Object::new();
    assert_eq!(obj.insert("a", Value::Int32(1)), None);
    obj.insert("b", Value::Int32(2));
    assert_eq!(obj.insert("a", Value::Int32(3)), Some(Value::Int32(1)));
    let keys: Vec<&String> = obj.keys().collect();
    assert_eq!(keys, ["a", "b"]);
    assert_eq!(obj.get("a"), Some(&Value::Int32(3)));
}

#[test]
fn object_remove_and_retain() {
    let mut obj: Object = [("a", 1), ("b", 2), ("c", 3)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::Int32(v)))
        .collect();
    assert_eq!(obj.remove("b"), Some(Value::Int32(2)));
    obj.retain(|name| name != "c");
    assert_eq!(obj.len(), 1);
    assert!(obj.contains_key("a"));
}

#[test]
fn object_clones_are_copy_on_write() {
    let original: Object = [("a".to_string(), Value::Int32(1))].into_iter().collect();
    let mut copy = original.clone();
    copy.insert("b", Value::Null);
    assert_eq!(original.len(), 1);
    assert_eq!(copy.len(), 2);
}
