//! Array and object builtins.

use docvm_foundation::numeric::{exact_i64, narrow_integer};
use docvm_foundation::{
    Array, Collator, Error, Object, Operand, Result, SortSpec, Value, compare_values, values_equal,
};

use super::{Args, collator_arg, nothing, owned};

// =============================================================================
// Construction
// =============================================================================

/// Array: newArray - Nothing arguments are left out
pub(super) fn new_array(args: &mut Args) -> Result<Operand> {
    let values: Array = (0..args.len())
        .map(|i| args.take_value(i))
        .filter(|v| !v.is_nothing())
        .collect();
    owned(Value::Array(values))
}

/// Array: newArrayFromRange(start, end, step) - end exclusive
pub(super) fn new_array_from_range(args: &mut Args) -> Result<Operand> {
    const MAX_ELEMENTS: i64 = 10_000_000;
    let (Some(start), Some(end), Some(step)) = (
        exact_i64(args.get(0)),
        exact_i64(args.get(1)),
        exact_i64(args.get(2)),
    ) else {
        return nothing();
    };
    if step == 0 {
        return nothing();
    }
    let span = end.saturating_sub(start);
    let len = (span / step).saturating_add(i64::from(span % step != 0));
    if len > MAX_ELEMENTS {
        return Err(Error::invalid_argument(format!(
            "range would produce {len} elements, limit is {MAX_ELEMENTS}"
        )));
    }
    let mut values = Array::new();
    let mut n = start;
    while (step > 0 && n < end) || (step < 0 && n > end) {
        values.push_back(narrow_integer(n));
        let Some(next) = n.checked_add(step) else {
            break;
        };
        n = next;
    }
    owned(Value::Array(values))
}

/// Object: newObj(name, value, ...) - Nothing values are left out
pub(super) fn new_obj(args: &mut Args) -> Result<Operand> {
    if args.len() % 2 != 0 {
        return Err(Error::internal("newObj expects name/value pairs"));
    }
    let mut object = Object::new();
    for i in (0..args.len()).step_by(2) {
        let Some(name) = args.get(i).as_str().map(str::to_string) else {
            return Err(Error::internal(format!(
                "newObj field name must be a string, got {}",
                args.get(i).tag()
            )));
        };
        let value = args.take_value(i + 1);
        if !value.is_nothing() {
            object.insert(name, value);
        }
    }
    owned(Value::Object(object))
}

/// Object: keepFields(obj, names...)
pub(super) fn keep_fields(args: &mut Args) -> Result<Operand> {
    project_fields(args, true)
}

/// Object: dropFields(obj, names...)
pub(super) fn drop_fields(args: &mut Args) -> Result<Operand> {
    project_fields(args, false)
}

fn project_fields(args: &mut Args, keep: bool) -> Result<Operand> {
    if !args.get(0).is_object() {
        return nothing();
    }
    let names: Vec<String> = args
        .iter()
        .skip(1)
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let object: Object = args
        .get(0)
        .object_iter()
        .filter(|(k, _)| names.contains(k) == keep)
        .collect();
    owned(Value::Object(object))
}

// =============================================================================
// Conversion
// =============================================================================

/// Object: objectToArray - `[{k, v}, ...]`
pub(super) fn object_to_array(args: &mut Args) -> Result<Operand> {
    let input = args.get(0);
    if !input.is_object() {
        return nothing();
    }
    let pairs = input
        .object_iter()
        .map(|(k, v)| Value::object([("k", Value::from(k)), ("v", v)]));
    owned(Value::array(pairs))
}

/// Array: arrayToObject - accepts `[k, v]` pairs or `{k, v}` documents
pub(super) fn array_to_object(args: &mut Args) -> Result<Operand> {
    let input = args.get(0);
    if !input.is_array() {
        return nothing();
    }
    let mut object = Object::new();
    for element in input.array_iter() {
        let (key, value) = if element.is_array() {
            if element.array_len() != Some(2) {
                return Err(Error::invalid_argument(
                    "arrayToObject requires pairs of exactly two elements",
                ));
            }
            (element.element(0), element.element(1))
        } else if element.is_object() {
            if element.object_iter().count() != 2 {
                return Err(Error::invalid_argument(
                    "arrayToObject requires documents with exactly the fields k and v",
                ));
            }
            (element.field("k"), element.field("v"))
        } else {
            return Err(Error::invalid_argument(format!(
                "arrayToObject requires arrays or documents, got {}",
                element.tag()
            )));
        };
        let (Some(Value::String(key)), Some(value)) = (key, value) else {
            return Err(Error::invalid_argument("arrayToObject keys must be strings"));
        };
        if key.contains('\0') {
            return Err(Error::invalid_argument("arrayToObject keys cannot contain a null byte"));
        }
        object.insert(key.to_string(), value);
    }
    owned(Value::Object(object))
}

// =============================================================================
// Array Operations
// =============================================================================

/// Array: concatArrays - Nothing unless every argument is an array
pub(super) fn concat_arrays(args: &mut Args) -> Result<Operand> {
    if !args.iter().all(Value::is_array) {
        return nothing();
    }
    let values: Array = args.iter().flat_map(Value::array_iter).collect();
    owned(Value::Array(values))
}

/// Array: extractSubArray(array, limit, [start])
///
/// Without a start, a positive limit takes from the front and a negative one
/// from the back. A negative start counts from the end.
pub(super) fn extract_sub_array(args: &mut Args) -> Result<Operand> {
    let input = args.get(0);
    let Some(len) = input.array_len() else {
        return nothing();
    };
    let Some(limit) = exact_i64(args.get(1)) else {
        return nothing();
    };
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let (start, count) = if args.len() == 2 {
        if limit >= 0 {
            (0, limit.min(len))
        } else {
            let count = limit.saturating_neg().min(len);
            (len - count, count)
        }
    } else {
        let Some(start) = exact_i64(args.get(2)) else {
            return nothing();
        };
        if limit < 0 {
            return nothing();
        }
        let start = if start < 0 {
            (len + start).max(0)
        } else {
            start.min(len)
        };
        (start, limit.min(len - start))
    };
    let (start, count) = (
        usize::try_from(start).unwrap_or(0),
        usize::try_from(count).unwrap_or(0),
    );
    owned(Value::array(input.array_iter().skip(start).take(count)))
}

/// Array: isArrayEmpty
pub(super) fn is_array_empty(args: &mut Args) -> Result<Operand> {
    owned(
        args.get(0)
            .array_len()
            .map_or(Value::Nothing, |n| Value::Bool(n == 0)),
    )
}

/// Array: reverseArray
pub(super) fn reverse_array(args: &mut Args) -> Result<Operand> {
    let input = args.get(0);
    if !input.is_array() {
        return nothing();
    }
    let mut values: Vec<Value> = input.array_iter().collect();
    values.reverse();
    owned(Value::array(values))
}

/// Key under which `doc` sorts for `spec`.
pub(super) fn spec_key(spec: &SortSpec, doc: &Value, collator: Option<&dyn Collator>) -> Value {
    let key = spec.generate_key(doc, collator);
    match key.components() {
        [single] => single.clone(),
        components => Value::array(components.iter().cloned()),
    }
}

/// Array: sortArray(array, order, [collator])
///
/// `order` is 1 or -1 to sort by whole value, or a sort specification applied
/// to each element.
pub(super) fn sort_array(args: &mut Args) -> Result<Operand> {
    let input = args.get(0);
    if !input.is_array() {
        return nothing();
    }
    let collator = collator_arg(args.get(2));
    let collator = collator.as_deref();
    let mut values: Vec<Value> = input.array_iter().collect();
    match args.get(1) {
        Value::SortSpec(spec) => {
            let mut keyed: Vec<(Value, Value)> = values
                .into_iter()
                .map(|v| (spec_key(spec, &v, collator), v))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| spec.compare_keys(a, b, collator));
            values = keyed.into_iter().map(|(_, v)| v).collect();
        }
        order => {
            let ascending = match exact_i64(order) {
                Some(1) => true,
                Some(-1) => false,
                _ => return nothing(),
            };
            values.sort_by(|a, b| {
                let ord = compare_values(a, b, collator);
                if ascending { ord } else { ord.reverse() }
            });
        }
    }
    owned(Value::array(values))
}

fn member_of(value: &Value, container: &Value, collator: Option<&dyn Collator>) -> Value {
    if value.is_nothing() || !container.is_array() {
        return Value::Nothing;
    }
    let found = match container {
        Value::ArraySet(set) if collator.is_none() && set.collator().is_none() => {
            set.contains(value)
        }
        _ => container
            .array_iter()
            .any(|e| values_equal(&e, value, collator)),
    };
    Value::Bool(found)
}

/// Array: isMember(value, array)
pub(super) fn is_member(args: &mut Args) -> Result<Operand> {
    owned(member_of(args.get(0), args.get(1), None))
}

/// Array: collIsMember(collator, value, array)
pub(super) fn coll_is_member(args: &mut Args) -> Result<Operand> {
    let Some(collator) = collator_arg(args.get(0)) else {
        return nothing();
    };
    owned(member_of(args.get(1), args.get(2), Some(collator.as_ref())))
}
