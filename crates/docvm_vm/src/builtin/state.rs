//! Decoding and encoding of accumulator state.
//!
//! Accumulators keep their state in a heap array with a fixed slot layout so
//! that it can travel through the operand stack like any other value. Each
//! accumulator decodes that array into a typed struct on entry and encodes it
//! back on exit. A state whose slot count or slot types differ from the
//! layout is a broken program, reported as an internal error.

use docvm_foundation::numeric;
use docvm_foundation::{Array, Error, Result, Value};

/// Error for a state array that does not match its layout.
pub(super) fn shape_error(accumulator: &str, detail: impl std::fmt::Display) -> Error {
    Error::internal(format!("{accumulator}: malformed accumulator state: {detail}"))
}

/// Splits a state array into exactly `N` slots.
pub(super) fn unpack<const N: usize>(state: Value, accumulator: &str) -> Result<[Value; N]> {
    let Value::Array(array) = state else {
        return Err(shape_error(accumulator, format!("expected an array, got {}", state.tag())));
    };
    let len = array.len();
    let slots: Vec<Value> = array.into_iter().collect();
    slots
        .try_into()
        .map_err(|_| shape_error(accumulator, format!("expected {N} slots, got {len}")))
}

/// Builds a state array from its slots.
pub(super) fn pack<const N: usize>(slots: [Value; N]) -> Value {
    Value::Array(Array::from(Vec::from(slots)))
}

/// Reads an integral slot.
pub(super) fn int(slot: &Value, accumulator: &str) -> Result<i64> {
    match slot {
        Value::Int32(_) | Value::Int64(_) => numeric::exact_i64(slot)
            .ok_or_else(|| shape_error(accumulator, "integer slot out of range")),
        other => Err(shape_error(accumulator, format!("expected an integer, got {}", other.tag()))),
    }
}

/// Reads a non-negative count or size slot.
pub(super) fn count(slot: &Value, accumulator: &str) -> Result<usize> {
    let n = int(slot, accumulator)?;
    usize::try_from(n).map_err(|_| shape_error(accumulator, format!("negative count {n}")))
}

/// Reads a Double slot.
pub(super) fn double(slot: &Value, accumulator: &str) -> Result<f64> {
    match slot {
        Value::Double(f) => Ok(*f),
        other => Err(shape_error(accumulator, format!("expected a double, got {}", other.tag()))),
    }
}

/// Reads a Boolean slot.
pub(super) fn boolean(slot: &Value, accumulator: &str) -> Result<bool> {
    slot.as_bool()
        .ok_or_else(|| shape_error(accumulator, format!("expected a boolean, got {}", slot.tag())))
}

/// Takes an array slot.
pub(super) fn array(slot: Value, accumulator: &str) -> Result<Array> {
    match slot {
        Value::Array(a) => Ok(a),
        other => Err(shape_error(accumulator, format!("expected an array, got {}", other.tag()))),
    }
}

/// Encodes a count.
pub(super) fn count_value(n: usize) -> Value {
    Value::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Reads a memory limit argument: a positive integer, defaulting to unlimited.
pub(super) fn memory_limit(value: &Value, accumulator: &str) -> Result<i64> {
    match value {
        Value::Nothing => Ok(i64::MAX),
        v => match numeric::exact_i64(v) {
            Some(n) if n > 0 => Ok(n),
            _ => Err(Error::invalid_argument(format!(
                "{accumulator}: memory limit must be a positive integer, got {v}"
            ))),
        },
    }
}

/// Approximate size of a value as a signed byte count.
pub(super) fn size_of(value: &Value) -> i64 {
    i64::try_from(value.approx_size()).unwrap_or(i64::MAX)
}
