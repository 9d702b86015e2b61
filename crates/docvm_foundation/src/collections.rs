//! Heap containers for arrays, sets, multisets and objects.
//!
//! Every container is cheap to clone. Arrays are persistent `im` vectors;
//! the map-backed containers share an `Arc` and copy on first write, so a
//! clone handed out as a view is never affected by later mutation of the
//! original holder's copy.

use std::cmp::Ordering;
use std::fmt;
use std::iter::FromIterator;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::collation::Collator;
use crate::compare::CanonicalKey;
use crate::value::Value;

/// Heap array of values.
#[derive(Clone, Default, PartialEq)]
pub struct Array(im::Vector<Value>);

impl Array {
    /// Creates an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self(im::Vector::new())
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the array is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gets an element by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Appends an element.
    pub fn push_back(&mut self, value: Value) {
        self.0.push_back(value);
    }

    /// Removes and returns the first element.
    pub fn pop_front(&mut self) -> Option<Value> {
        self.0.pop_front()
    }

    /// Removes and returns the last element.
    pub fn pop_back(&mut self) -> Option<Value> {
        self.0.pop_back()
    }

    /// Replaces the element at `index`, returning the previous one.
    ///
    /// Returns `None` and leaves the array untouched when out of bounds.
    pub fn set(&mut self, index: usize, value: Value) -> Option<Value> {
        if index >= self.0.len() {
            return None;
        }
        Some(self.0.set(index, value))
    }

    /// Inserts an element at `index`, shifting later elements.
    pub fn insert(&mut self, index: usize, value: Value) {
        self.0.insert(index, value);
    }

    /// Removes the element at `index`.
    pub fn remove(&mut self, index: usize) -> Value {
        self.0.remove(index)
    }

    /// Swaps two elements.
    pub fn swap(&mut self, a: usize, b: usize) {
        self.0.swap(a, b);
    }

    /// Returns an iterator over the elements.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Value> + ExactSizeIterator {
        self.0.iter()
    }

    /// Returns the first element.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.0.front()
    }

    /// Returns the last element.
    #[must_use]
    pub fn last(&self) -> Option<&Value> {
        self.0.back()
    }

    /// Index of the first element for which `pred` is false.
    ///
    /// The array must be partitioned: every element satisfying `pred` comes
    /// before every element that does not.
    pub fn partition_point(&self, mut pred: impl FnMut(&Value) -> bool) -> usize {
        self.0
            .binary_search_by(|x| if pred(x) { Ordering::Less } else { Ordering::Greater })
            .unwrap_or_else(|at| at)
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Value>> for Array {
    fn from(values: Vec<Value>) -> Self {
        Self(values.into_iter().collect())
    }
}

impl IntoIterator for Array {
    type Item = Value;
    type IntoIter = im::vector::ConsumingIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Insertion-ordered set of values, deduplicated by canonical equality.
///
/// With a collator, strings that collate equal are the same member.
#[derive(Clone, Default)]
pub struct ArraySet {
    items: Arc<IndexMap<CanonicalKey, Value>>,
    collator: Option<Arc<dyn Collator>>,
}

impl ArraySet {
    /// Creates an empty set using binary string comparison.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set whose string members are compared by `collator`.
    #[must_use]
    pub fn with_collator(collator: Option<Arc<dyn Collator>>) -> Self {
        Self {
            items: Arc::default(),
            collator,
        }
    }

    /// Returns the collator used for membership.
    #[must_use]
    pub fn collator(&self) -> Option<&Arc<dyn Collator>> {
        self.collator.as_ref()
    }

    fn key(&self, value: &Value) -> CanonicalKey {
        CanonicalKey::of(value, self.collator.as_deref())
    }

    /// Inserts a value. Returns false if an equal member was already present.
    ///
    /// `Nothing` is never a member.
    pub fn insert(&mut self, value: Value) -> bool {
        if value.is_nothing() {
            return false;
        }
        let key = self.key(&value);
        if self.items.contains_key(&key) {
            return false;
        }
        Arc::make_mut(&mut self.items).insert(key, value);
        true
    }

    /// Removes an equal member. Returns false if none was present.
    pub fn remove(&mut self, value: &Value) -> bool {
        let key = self.key(value);
        if !self.items.contains_key(&key) {
            return false;
        }
        Arc::make_mut(&mut self.items).shift_remove(&key).is_some()
    }

    /// Returns true if an equal member is present.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains_key(&self.key(value))
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Gets a member by insertion position.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.items.get_index(index).map(|(_, v)| v)
    }

    /// Iterates members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.values()
    }
}

impl PartialEq for ArraySet {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self.items.keys().all(|k| other.items.contains_key(k))
    }
}

impl FromIterator<Value> for ArraySet {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl fmt::Debug for ArraySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.values()).finish()
    }
}

/// Insertion-ordered bag of values with per-member counts.
#[derive(Clone, Default)]
pub struct ArrayMultiSet {
    items: Arc<IndexMap<CanonicalKey, (Value, usize)>>,
    collator: Option<Arc<dyn Collator>>,
    len: usize,
}

impl ArrayMultiSet {
    /// Creates an empty multiset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty multiset whose string members are compared by `collator`.
    #[must_use]
    pub fn with_collator(collator: Option<Arc<dyn Collator>>) -> Self {
        Self {
            items: Arc::default(),
            collator,
            len: 0,
        }
    }

    /// Returns the collator used for membership.
    #[must_use]
    pub fn collator(&self) -> Option<&Arc<dyn Collator>> {
        self.collator.as_ref()
    }

    /// Adds one occurrence of `value`. `Nothing` is ignored.
    pub fn insert(&mut self, value: Value) {
        if value.is_nothing() {
            return;
        }
        let key = CanonicalKey::of(&value, self.collator.as_deref());
        Arc::make_mut(&mut self.items)
            .entry(key)
            .and_modify(|(_, count)| *count += 1)
            .or_insert((value, 1));
        self.len += 1;
    }

    /// Removes one occurrence of an equal member. Returns false if absent.
    pub fn remove(&mut self, value: &Value) -> bool {
        let key = CanonicalKey::of(value, self.collator.as_deref());
        let Some(count) = self.items.get(&key).map(|(_, count)| *count) else {
            return false;
        };
        let items = Arc::make_mut(&mut self.items);
        if count == 1 {
            // Keeps the insertion order that `distinct` reports
            items.shift_remove(&key);
        } else if let Some((_, count)) = items.get_mut(&key) {
            *count -= 1;
        }
        self.len -= 1;
        true
    }

    /// Number of occurrences of an equal member.
    #[must_use]
    pub fn count(&self, value: &Value) -> usize {
        self.items
            .get(&CanonicalKey::of(value, self.collator.as_deref()))
            .map_or(0, |(_, count)| *count)
    }

    /// Total number of occurrences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the multiset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct members.
    #[must_use]
    pub fn distinct_len(&self) -> usize {
        self.items.len()
    }

    /// Iterates distinct members in insertion order.
    pub fn distinct(&self) -> impl Iterator<Item = &Value> {
        self.items.values().map(|(v, _)| v)
    }

    /// Iterates every occurrence, grouped by member.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items
            .values()
            .flat_map(|(v, count)| std::iter::repeat_n(v, *count))
    }
}

impl PartialEq for ArrayMultiSet {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .all(|(k, (_, n))| other.items.get(k).is_some_and(|(_, m)| n == m))
    }
}

impl fmt::Debug for ArrayMultiSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Insertion-ordered object of named fields.
#[derive(Clone, Default)]
pub struct Object(Arc<IndexMap<String, Value>>);

impl Object {
    /// Creates an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the object has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gets a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Sets a field. An existing field keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        Arc::make_mut(&mut self.0).insert(name.into(), value)
    }

    /// Removes a field, preserving the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        if !self.0.contains_key(name) {
            return None;
        }
        Arc::make_mut(&mut self.0).shift_remove(name)
    }

    /// Keeps only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        if self.0.keys().all(|k| keep(k)) {
            return;
        }
        Arc::make_mut(&mut self.0).retain(|k, _| keep(k));
    }

    /// Iterates fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Iterates field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
    }
}

impl FromIterator<(String, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::CaseInsensitiveCollator;

    #[test]
    fn array_push_and_set() {
        let mut arr = Array::new();
        arr.push_back(Value::Int32(1));
        arr.push_back(Value::Int32(2));
        assert_eq!(arr.set(1, Value::Int32(5)), Some(Value::Int32(2)));
        assert_eq!(arr.set(7, Value::Int32(5)), None);
        assert_eq!(arr.get(1), Some(&Value::Int32(5)));
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn array_clone_is_copy_on_write() {
        let mut a: Array = vec![Value::Int32(1)].into();
        let b = a.clone();
        a.push_back(Value::Int32(2));
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn set_dedupes_across_numeric_types() {
        let mut set = ArraySet::new();
        assert!(set.insert(Value::Int32(1)));
        assert!(!set.insert(Value::Int64(1)));
        assert!(!set.insert(Value::Double(1.0)));
        assert!(set.insert(Value::Double(1.5)));
        assert!(!set.insert(Value::Nothing));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Value::Int64(1)));
    }

    #[test]
    fn set_with_collator() {
        let mut set = ArraySet::with_collator(Some(Arc::new(CaseInsensitiveCollator)));
        assert!(set.insert(Value::from("Abc")));
        assert!(!set.insert(Value::from("aBC")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get_index(0), Some(&Value::from("Abc")));
    }

    #[test]
    fn set_equality_ignores_order() {
        let a: ArraySet = [Value::Int32(1), Value::Int32(2)].into_iter().collect();
        let b: ArraySet = [Value::Int32(2), Value::Int32(1)].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn multiset_counts() {
        let mut bag = ArrayMultiSet::new();
        bag.insert(Value::from("x"));
        bag.insert(Value::from("x"));
        bag.insert(Value::from("y"));
        assert_eq!(bag.len(), 3);
        assert_eq!(bag.distinct_len(), 2);
        assert_eq!(bag.count(&Value::from("x")), 2);

        assert!(bag.remove(&Value::from("x")));
        assert_eq!(bag.count(&Value::from("x")), 1);
        assert!(bag.remove(&Value::from("x")));
        assert!(!bag.remove(&Value::from("x")));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn multiset_remove_keeps_distinct_order() {
        let mut bag = ArrayMultiSet::new();
        for s in ["a", "b", "c", "b"] {
            bag.insert(Value::from(s));
        }
        let shared = bag.clone();
        assert!(bag.remove(&Value::from("a")));
        assert!(bag.remove(&Value::from("b")));
        let distinct: Vec<_> = bag.distinct().cloned().collect();
        assert_eq!(distinct, [Value::from("b"), Value::from("c")]);
        // The clone taken before removal is untouched
        assert_eq!(shared.len(), 4);
        assert_eq!(shared.count(&Value::from("a")), 1);
    }

    #[test]
    fn multiset_with_collator_removes_to_zero() {
        let mut bag = ArrayMultiSet::with_collator(Some(Arc::new(CaseInsensitiveCollator)));
        bag.insert(Value::from("Red"));
        bag.insert(Value::from("RED"));
        assert_eq!(bag.distinct_len(), 1);
        assert_eq!(bag.count(&Value::from("red")), 2);

        assert!(bag.remove(&Value::from("red")));
        assert!(bag.remove(&Value::from("rEd")));
        assert!(bag.is_empty());
        assert_eq!(bag.distinct_len(), 0);
        assert!(!bag.remove(&Value::from("red")));
    }

    #[test]
    fn array_partition_point() {
        let arr: Array = [1, 3, 3, 7].into_iter().map(Value::Int32).collect();
        let less_eq = |n: i32| move |v: &Value| matches!(v, Value::Int32(x) if *x <= n);
        assert_eq!(arr.partition_point(less_eq(0)), 0);
        assert_eq!(arr.partition_point(less_eq(3)), 3);
        assert_eq!(arr.partition_point(less_eq(9)), 4);
    }

    #[test]
    fn object_insert_keeps_position() {
        let mut obj: Object = [
            ("a".to_string(), Value::Int32(1)),
            ("b".to_string(), Value::Int32(2)),
        ]
        .into_iter()
        .collect();
        obj.insert("a", Value::Int32(3));
        obj.insert("c", Value::Int32(4));
        let keys: Vec<_> = obj.keys().cloned().collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(obj.get("a"), Some(&Value::Int32(3)));

        obj.remove("b");
        let keys: Vec<_> = obj.keys().cloned().collect();
        assert_eq!(keys, ["a", "c"]);
    }

    #[test]
    fn object_equality_is_ordered() {
        let ab = Value::object([("a", Value::Int32(1)), ("b", Value::Int32(2))]);
        let ba = Value::object([("b", Value::Int32(2)), ("a", Value::Int32(1))]);
        assert_ne!(ab, ba);
    }
}
