//! Generic arithmetic and comparison over tagged values.
//!
//! These helpers dispatch on the operand tags and never fail: operands of the
//! wrong type produce [`Value::Nothing`].

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use docvm_foundation::compare::canonical_type_order;
use docvm_foundation::numeric::{self, exact_i64, to_decimal, to_f64};
use docvm_foundation::{Collator, NumericWidth, TypeTag, Value, compare_values};

// =============================================================================
// Arithmetic
// =============================================================================

/// Applies a binary numeric operation after widening both operands.
///
/// Int32 results that overflow are promoted to Int64, Int64 results that
/// overflow are computed in Double.
fn numeric_binary(
    a: &Value,
    b: &Value,
    int: fn(i64, i64) -> Option<i64>,
    dbl: fn(f64, f64) -> Option<f64>,
    dec: fn(Decimal, Decimal) -> Option<Decimal>,
) -> Value {
    let Some(width) = NumericWidth::common(a, b) else {
        return Value::Nothing;
    };
    let result = match width {
        NumericWidth::Int32 | NumericWidth::Int64 => {
            let (Some(x), Some(y)) = (exact_i64(a), exact_i64(b)) else {
                return Value::Nothing;
            };
            match int(x, y) {
                Some(n) if width == NumericWidth::Int32 => Some(numeric::narrow_integer(n)),
                Some(n) => Some(Value::Int64(n)),
                None => dbl(x as f64, y as f64).map(Value::Double),
            }
        }
        NumericWidth::Double => match (to_f64(a), to_f64(b)) {
            (Some(x), Some(y)) => dbl(x, y).map(Value::Double),
            _ => None,
        },
        NumericWidth::Decimal => match (to_decimal(a), to_decimal(b)) {
            (Some(x), Some(y)) => dec(x, y).map(Value::Decimal),
            _ => None,
        },
    };
    result.unwrap_or_default()
}

/// Milliseconds represented by a number, rounding fractional values.
fn millis(value: &Value) -> Option<i64> {
    match value {
        Value::Double(f) => numeric::f64_to_i64_exact(f.round()),
        Value::Decimal(d) => d.round().to_i64(),
        _ => exact_i64(value),
    }
}

pub(crate) fn add(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Date(d), n) | (n, Value::Date(d)) if n.is_number() => millis(n)
            .and_then(|ms| d.checked_add(ms))
            .map_or(Value::Nothing, Value::Date),
        _ => numeric_binary(
            a,
            b,
            i64::checked_add,
            |x, y| Some(x + y),
            Decimal::checked_add,
        ),
    }
}

pub(crate) fn sub(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Date(x), Value::Date(y)) => x.checked_sub(*y).map_or(Value::Nothing, Value::Int64),
        (Value::Date(d), n) if n.is_number() => millis(n)
            .and_then(|ms| d.checked_sub(ms))
            .map_or(Value::Nothing, Value::Date),
        _ => numeric_binary(
            a,
            b,
            i64::checked_sub,
            |x, y| Some(x - y),
            Decimal::checked_sub,
        ),
    }
}

pub(crate) fn mul(a: &Value, b: &Value) -> Value {
    numeric_binary(
        a,
        b,
        i64::checked_mul,
        |x, y| Some(x * y),
        Decimal::checked_mul,
    )
}

/// Division. Integers divide in Double; a zero divisor yields Nothing.
pub(crate) fn div(a: &Value, b: &Value) -> Value {
    let Some(width) = NumericWidth::common(a, b) else {
        return Value::Nothing;
    };
    if width == NumericWidth::Decimal {
        return match (to_decimal(a), to_decimal(b)) {
            (Some(x), Some(y)) => x.checked_div(y).map_or(Value::Nothing, Value::Decimal),
            _ => Value::Nothing,
        };
    }
    match (to_f64(a), to_f64(b)) {
        (Some(_), Some(y)) if y == 0.0 => Value::Nothing,
        (Some(x), Some(y)) => Value::Double(x / y),
        _ => Value::Nothing,
    }
}

/// Truncating integer division.
pub(crate) fn idiv(a: &Value, b: &Value) -> Value {
    numeric_binary(
        a,
        b,
        i64::checked_div,
        |x, y| (y != 0.0).then(|| (x / y).trunc()),
        |x, y| x.checked_div(y).map(|q| q.trunc()),
    )
}

pub(crate) fn modulo(a: &Value, b: &Value) -> Value {
    numeric_binary(
        a,
        b,
        i64::checked_rem,
        |x, y| (y != 0.0).then(|| x % y),
        Decimal::checked_rem,
    )
}

pub(crate) fn negate(value: &Value) -> Value {
    match value {
        Value::Int32(n) => n
            .checked_neg()
            .map_or(Value::Int64(-i64::from(*n)), Value::Int32),
        Value::Int64(n) => n
            .checked_neg()
            .map_or(Value::Double(-(*n as f64)), Value::Int64),
        Value::Double(f) => Value::Double(-f),
        Value::Decimal(d) => Value::Decimal(-d),
        _ => Value::Nothing,
    }
}

/// Lossless conversion to another numeric tag.
pub(crate) fn num_convert(value: &Value, target: TypeTag) -> Value {
    NumericWidth::from_tag(target).map_or(Value::Nothing, |width| {
        numeric::convert_exact(value, width)
    })
}

// =============================================================================
// Comparison
// =============================================================================

/// The six ordering predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    Neq,
}

impl CompareOp {
    const fn test(self, ord: Ordering) -> bool {
        match self {
            Self::Less => ord.is_lt(),
            Self::LessEq => ord.is_le(),
            Self::Greater => ord.is_gt(),
            Self::GreaterEq => ord.is_ge(),
            Self::Eq => ord.is_eq(),
            Self::Neq => ord.is_ne(),
        }
    }
}

/// Compares two values of the same type family.
///
/// Returns Nothing when either side is Nothing, when the families differ, or
/// for opaque handles, which have no order.
pub(crate) fn generic_compare(
    op: CompareOp,
    a: &Value,
    b: &Value,
    collator: Option<&dyn Collator>,
) -> Value {
    if a.is_nothing() || b.is_nothing() {
        return Value::Nothing;
    }
    let family = canonical_type_order(a);
    if family != canonical_type_order(b) || family == canonical_type_order(&Value::LocalLambda(0)) {
        return Value::Nothing;
    }
    Value::Bool(op.test(compare_values(a, b, collator)))
}

/// Maps strings to their collation keys, recursively through containers.
pub(crate) fn comparison_key(value: &Value, collator: &dyn Collator) -> Value {
    match value {
        Value::String(s) => Value::from(collator.comparison_key(s)),
        v if v.is_array() => Value::array(v.array_iter().map(|e| comparison_key(&e, collator))),
        v if v.is_object() => Value::object(
            v.object_iter()
                .map(|(k, e)| (k, comparison_key(&e, collator))),
        ),
        other => other.clone(),
    }
}

// =============================================================================
// Group Aggregates
// =============================================================================

/// Running sum; non-numeric inputs leave the accumulator unchanged.
pub(crate) fn agg_sum(acc: Value, value: &Value) -> Value {
    let acc = if acc.is_nothing() { Value::Int32(0) } else { acc };
    if !value.is_number() {
        return acc;
    }
    add(&acc, value)
}

pub(crate) fn agg_min(acc: Value, value: Value, collator: Option<&dyn Collator>) -> Value {
    agg_select(acc, value, collator, Ordering::Less)
}

pub(crate) fn agg_max(acc: Value, value: Value, collator: Option<&dyn Collator>) -> Value {
    agg_select(acc, value, collator, Ordering::Greater)
}

fn agg_select(acc: Value, value: Value, collator: Option<&dyn Collator>, keep: Ordering) -> Value {
    if value.is_nothing() {
        return acc;
    }
    if acc.is_nothing() || compare_values(&value, &acc, collator) == keep {
        value
    } else {
        acc
    }
}

pub(crate) fn agg_first(acc: Value, value: Value) -> Value {
    if acc.is_nothing() { value } else { acc }
}

pub(crate) fn agg_last(acc: Value, value: Value) -> Value {
    if value.is_nothing() { acc } else { value }
}
