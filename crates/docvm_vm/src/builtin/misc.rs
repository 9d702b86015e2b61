//! Type matching, hashing and sort keys.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use docvm_foundation::compare::CanonicalKey;
use docvm_foundation::numeric::exact_i64;
use docvm_foundation::{Operand, Result, TypeMask, Value};

use super::{Args, collator_arg, nothing, owned};

/// Misc: typeMatch(value, mask) - Boolean; Nothing in, Nothing out
pub(super) fn type_match(args: &mut Args) -> Result<Operand> {
    let value = args.get(0);
    if value.is_nothing() {
        return nothing();
    }
    let Some(mask) = exact_i64(args.get(1)).and_then(|m| u32::try_from(m).ok()) else {
        return nothing();
    };
    owned(Value::Bool(TypeMask(mask).contains(value.tag())))
}

/// Misc: hash(values...) - Int64 combining every argument
///
/// Values equal under canonical comparison hash alike, so `1` and `1.0`
/// collide on purpose.
#[allow(clippy::cast_possible_wrap)]
pub(super) fn hash(args: &mut Args) -> Result<Operand> {
    let mut hasher = DefaultHasher::new();
    for value in args.iter() {
        CanonicalKey::of(value, None).hash(&mut hasher);
    }
    owned(Value::Int64(hasher.finish() as i64))
}

/// Misc: generateSortKey(sortSpec, object, [collator])
pub(super) fn generate_sort_key(args: &mut Args) -> Result<Operand> {
    let Value::SortSpec(spec) = args.get(0) else {
        return nothing();
    };
    let doc = args.get(1);
    if !doc.is_object() {
        return nothing();
    }
    let collator = collator_arg(args.get(2));
    let key = spec.generate_key(doc, collator.as_deref());
    owned(Value::SortKey(Arc::new(key)))
}

/// Misc: sortKeyComponentVectorGetElement(key, index)
pub(super) fn sort_key_component_vector_get_element(args: &mut Args) -> Result<Operand> {
    let Value::SortKey(key) = args.get(0) else {
        return nothing();
    };
    let component = exact_i64(args.get(1))
        .and_then(|i| usize::try_from(i).ok())
        .and_then(|i| key.components().get(i));
    owned(component.cloned().unwrap_or_default())
}

/// Misc: sortKeyComponentVectorToArray
pub(super) fn sort_key_component_vector_to_array(args: &mut Args) -> Result<Operand> {
    let Value::SortKey(key) = args.get(0) else {
        return nothing();
    };
    owned(Value::array(key.components().iter().cloned()))
}
