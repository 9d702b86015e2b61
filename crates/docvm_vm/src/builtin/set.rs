//! Set algebra over arrays.
//!
//! Every argument must be an array, otherwise the result is Nothing. Results
//! are `ArraySet`s; the coll* variants take a collator first and compare
//! strings through it.

use std::sync::Arc;

use docvm_foundation::{ArraySet, Collator, Operand, Result, Value};

use super::{Args, collator_arg, nothing, owned};

fn to_set(value: &Value, collator: Option<&Arc<dyn Collator>>) -> ArraySet {
    let mut set = ArraySet::with_collator(collator.cloned());
    for element in value.array_iter() {
        set.insert(element);
    }
    set
}

/// Splits off the leading collator of a coll* call.
///
/// Returns `None` when the collator argument is missing or has another type.
fn with_collator(args: &Args, collated: bool) -> Option<(Option<Arc<dyn Collator>>, Vec<&Value>)> {
    if collated {
        let collator = collator_arg(args.get(0))?;
        Some((Some(collator), args.iter().skip(1).collect()))
    } else {
        Some((None, args.iter().collect()))
    }
}

fn union(args: &Args, collated: bool) -> Value {
    let Some((collator, inputs)) = with_collator(args, collated) else {
        return Value::Nothing;
    };
    if !inputs.iter().all(|v| v.is_array()) {
        return Value::Nothing;
    }
    let mut result = ArraySet::with_collator(collator);
    for input in inputs {
        for element in input.array_iter() {
            result.insert(element);
        }
    }
    Value::ArraySet(result)
}

fn intersection(args: &Args, collated: bool) -> Value {
    let Some((collator, inputs)) = with_collator(args, collated) else {
        return Value::Nothing;
    };
    if !inputs.iter().all(|v| v.is_array()) {
        return Value::Nothing;
    }
    let Some((first, rest)) = inputs.split_first() else {
        return Value::ArraySet(ArraySet::with_collator(collator));
    };
    let others: Vec<ArraySet> = rest.iter().map(|v| to_set(v, collator.as_ref())).collect();
    let mut result = ArraySet::with_collator(collator);
    for element in first.array_iter() {
        if others.iter().all(|s| s.contains(&element)) {
            result.insert(element);
        }
    }
    Value::ArraySet(result)
}

fn difference(args: &Args, collated: bool) -> Value {
    let Some((collator, inputs)) = with_collator(args, collated) else {
        return Value::Nothing;
    };
    let [lhs, rhs] = inputs.as_slice() else {
        return Value::Nothing;
    };
    if !lhs.is_array() || !rhs.is_array() {
        return Value::Nothing;
    }
    let excluded = to_set(rhs, collator.as_ref());
    let mut result = ArraySet::with_collator(collator);
    for element in lhs.array_iter() {
        if !excluded.contains(&element) {
            result.insert(element);
        }
    }
    Value::ArraySet(result)
}

fn equals(args: &Args, collated: bool) -> Value {
    let Some((collator, inputs)) = with_collator(args, collated) else {
        return Value::Nothing;
    };
    if inputs.len() < 2 || !inputs.iter().all(|v| v.is_array()) {
        return Value::Nothing;
    }
    let first = to_set(inputs[0], collator.as_ref());
    Value::Bool(
        inputs[1..]
            .iter()
            .all(|v| to_set(v, collator.as_ref()) == first),
    )
}

fn is_subset(args: &Args, collated: bool) -> Value {
    let Some((collator, inputs)) = with_collator(args, collated) else {
        return Value::Nothing;
    };
    let [lhs, rhs] = inputs.as_slice() else {
        return Value::Nothing;
    };
    if !lhs.is_array() || !rhs.is_array() {
        return Value::Nothing;
    }
    let superset = to_set(rhs, collator.as_ref());
    Value::Bool(lhs.array_iter().all(|e| superset.contains(&e)))
}

/// Set: setUnion
pub(super) fn set_union(args: &mut Args) -> Result<Operand> {
    owned(union(args, false))
}

/// Set: setIntersection - empty with no arguments
pub(super) fn set_intersection(args: &mut Args) -> Result<Operand> {
    owned(intersection(args, false))
}

/// Set: setDifference(a, b) - members of `a` not in `b`
pub(super) fn set_difference(args: &mut Args) -> Result<Operand> {
    owned(difference(args, false))
}

/// Set: setEquals
pub(super) fn set_equals(args: &mut Args) -> Result<Operand> {
    owned(equals(args, false))
}

/// Set: setIsSubset(a, b)
pub(super) fn set_is_subset(args: &mut Args) -> Result<Operand> {
    owned(is_subset(args, false))
}

/// Set: collSetUnion(collator, arrays...)
pub(super) fn coll_set_union(args: &mut Args) -> Result<Operand> {
    owned(union(args, true))
}

/// Set: collSetIntersection(collator, arrays...)
pub(super) fn coll_set_intersection(args: &mut Args) -> Result<Operand> {
    owned(intersection(args, true))
}

/// Set: collSetDifference(collator, a, b)
pub(super) fn coll_set_difference(args: &mut Args) -> Result<Operand> {
    owned(difference(args, true))
}

/// Set: collSetEquals(collator, arrays...)
pub(super) fn coll_set_equals(args: &mut Args) -> Result<Operand> {
    if args.len() < 3 {
        return nothing();
    }
    owned(equals(args, true))
}

/// Set: collSetIsSubset(collator, a, b)
pub(super) fn coll_set_is_subset(args: &mut Args) -> Result<Operand> {
    owned(is_subset(args, true))
}
