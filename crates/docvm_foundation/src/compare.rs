//! Value comparison.
//!
//! [`compare_values`] is the total order used for sorting, grouping and set
//! membership. [`CanonicalKey`] is a hashable normal form that agrees with it
//! on equality.

use std::cmp::Ordering;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::collation::Collator;
use crate::numeric;
use crate::value::Value;

/// Position of a value's type in the canonical cross-type order.
///
/// Numbers share one bracket, as do every array and every object
/// representation.
#[must_use]
pub fn canonical_type_order(value: &Value) -> u8 {
    match value {
        Value::MinKey => 0,
        Value::Nothing | Value::Null => 5,
        Value::Int32(_) | Value::Int64(_) | Value::Double(_) | Value::Decimal(_) => 10,
        Value::String(_) => 15,
        Value::Object(_) | Value::BsonObject(_) => 20,
        Value::Array(_) | Value::ArraySet(_) | Value::ArrayMultiSet(_) | Value::BsonArray(_) => 25,
        Value::Bool(_) => 40,
        Value::Date(_) => 45,
        Value::Timestamp(_) => 47,
        Value::Regex(_) => 50,
        Value::SortKey(_) => 60,
        Value::LocalLambda(_)
        | Value::SortSpec(_)
        | Value::Collator(_)
        | Value::TimeZoneDb(_)
        | Value::CsiCell(_) => 100,
        Value::MaxKey => 127,
    }
}

/// Total order over values.
///
/// Numbers compare by value regardless of numeric tag, with NaN below every
/// other number and equal to itself. Strings use `collator` when given.
/// Arrays compare element-wise and objects field by field (name, then value).
#[must_use]
pub fn compare_values(a: &Value, b: &Value, collator: Option<&dyn Collator>) -> Ordering {
    let (ta, tb) = (canonical_type_order(a), canonical_type_order(b));
    if ta != tb {
        return ta.cmp(&tb);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => compare_strings(x, y, collator),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        (Value::Regex(x), Value::Regex(y)) => x
            .pattern()
            .cmp(y.pattern())
            .then_with(|| x.flags().cmp(y.flags())),
        (Value::SortKey(x), Value::SortKey(y)) => compare_sequences(
            x.components().iter().cloned(),
            y.components().iter().cloned(),
            collator,
        ),
        (Value::LocalLambda(x), Value::LocalLambda(y)) => x.cmp(y),
        _ if a.is_number() => compare_numbers(a, b),
        _ if a.is_array() => compare_sequences(a.array_iter(), b.array_iter(), collator),
        _ if a.is_object() => compare_objects(a, b, collator),
        _ => Ordering::Equal,
    }
}

/// Three-way comparison returning -1, 0 or 1 as Int32, or Nothing when either
/// side is Nothing.
#[must_use]
pub fn compare_3way(a: &Value, b: &Value, collator: Option<&dyn Collator>) -> Value {
    if a.is_nothing() || b.is_nothing() {
        return Value::Nothing;
    }
    Value::Int32(match compare_values(a, b, collator) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

/// Returns true if `a` and `b` are equal under [`compare_values`].
#[must_use]
pub fn values_equal(a: &Value, b: &Value, collator: Option<&dyn Collator>) -> bool {
    compare_values(a, b, collator) == Ordering::Equal
}

fn compare_strings(a: &str, b: &str, collator: Option<&dyn Collator>) -> Ordering {
    match collator {
        Some(c) => c.compare(a, b),
        None => a.cmp(b),
    }
}

fn compare_sequences(
    mut a: impl Iterator<Item = Value>,
    mut b: impl Iterator<Item = Value>,
    collator: Option<&dyn Collator>,
) -> Ordering {
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match compare_values(&x, &y, collator) {
                Ordering::Equal => {}
                other => return other,
            },
        }
    }
}

fn compare_objects(a: &Value, b: &Value, collator: Option<&dyn Collator>) -> Ordering {
    let mut a = a.object_iter();
    let mut b = b.object_iter();
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((ka, va)), Some((kb, vb))) => {
                let ord = canonical_type_order(&va)
                    .cmp(&canonical_type_order(&vb))
                    .then_with(|| ka.cmp(&kb))
                    .then_with(|| compare_values(&va, &vb, collator));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Compares two numeric values of any numeric tags.
///
/// Non-numbers compare equal; callers are expected to check tags first.
#[must_use]
pub fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int32(x), Value::Int32(y)) => x.cmp(y),
        (Value::Decimal(x), _) => match b {
            Value::Decimal(y) => x.cmp(y),
            Value::Double(y) => compare_decimal_f64(*x, *y),
            _ => numeric::exact_i64(b).map_or(Ordering::Equal, |y| x.cmp(&Decimal::from(y))),
        },
        (_, Value::Decimal(_)) => compare_numbers(b, a).reverse(),
        (Value::Double(x), Value::Double(y)) => compare_f64(*x, *y),
        (Value::Double(x), _) => integral(b).map_or(Ordering::Equal, |y| compare_i64_f64(y, *x).reverse()),
        (_, Value::Double(y)) => integral(a).map_or(Ordering::Equal, |x| compare_i64_f64(x, *y)),
        _ => match (integral(a), integral(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => Ordering::Equal,
        },
    }
}

fn integral(v: &Value) -> Option<i64> {
    match v {
        Value::Int32(n) => Some(i64::from(*n)),
        Value::Int64(n) => Some(*n),
        _ => None,
    }
}

/// Total order on doubles: NaN first, -0.0 equal to 0.0.
#[must_use]
pub fn compare_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn compare_i64_f64(i: i64, f: f64) -> Ordering {
    const TWO_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return Ordering::Greater;
    }
    if f >= TWO_63 {
        return Ordering::Less;
    }
    if f < -TWO_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc() as i64;
    match i.cmp(&whole) {
        Ordering::Equal => 0.0_f64.partial_cmp(&f.fract()).unwrap_or(Ordering::Equal),
        other => other,
    }
}

fn compare_decimal_f64(d: Decimal, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Greater;
    }
    if f.is_infinite() {
        return if f > 0.0 { Ordering::Less } else { Ordering::Greater };
    }
    match Decimal::from_f64_retain(f) {
        Some(fd) => d.cmp(&fd),
        // Outside the decimal range: the double dominates by magnitude
        None if f > 0.0 => Ordering::Less,
        None => Ordering::Greater,
    }
}

/// Hashable normal form of a value.
///
/// Two values have equal keys exactly when [`compare_values`] (with the same
/// collator) reports them equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CanonicalKey {
    /// MinKey.
    MinKey,
    /// Null and Nothing.
    Null,
    /// Integral number.
    Int(i64),
    /// Non-integral finite double, by bits.
    Double(u64),
    /// Non-integral decimal not exactly representable as a double.
    Decimal(String),
    /// NaN of either numeric type.
    NaN,
    /// Positive or negative infinity.
    Infinity(bool),
    /// String or collation key.
    String(String),
    /// Any object representation.
    Object(Vec<(String, CanonicalKey)>),
    /// Any array representation.
    Array(Vec<CanonicalKey>),
    /// Boolean.
    Bool(bool),
    /// Date.
    Date(i64),
    /// Timestamp.
    Timestamp(u64),
    /// Regex pattern and flags.
    Regex(String, String),
    /// Handles and other opaque values, by identity.
    Opaque(u8, usize),
    /// MaxKey.
    MaxKey,
}

impl CanonicalKey {
    /// Computes the key of `value`.
    #[must_use]
    pub fn of(value: &Value, collator: Option<&dyn Collator>) -> Self {
        match value {
            Value::MinKey => Self::MinKey,
            Value::MaxKey => Self::MaxKey,
            Value::Nothing | Value::Null => Self::Null,
            Value::Int32(n) => Self::Int(i64::from(*n)),
            Value::Int64(n) => Self::Int(*n),
            Value::Double(f) => Self::of_f64(*f),
            Value::Decimal(d) => Self::of_decimal(*d),
            Value::String(s) => Self::String(match collator {
                Some(c) => c.comparison_key(s),
                None => s.to_string(),
            }),
            Value::Bool(b) => Self::Bool(*b),
            Value::Date(ms) => Self::Date(*ms),
            Value::Timestamp(ts) => Self::Timestamp(*ts),
            Value::Regex(re) => Self::Regex(re.pattern().to_string(), re.flags().to_string()),
            Value::Object(_) | Value::BsonObject(_) => Self::Object(
                value
                    .object_iter()
                    .map(|(k, v)| (k, Self::of(&v, collator)))
                    .collect(),
            ),
            Value::Array(_) | Value::ArraySet(_) | Value::ArrayMultiSet(_) | Value::BsonArray(_) => {
                Self::Array(value.array_iter().map(|v| Self::of(&v, collator)).collect())
            }
            Value::SortKey(key) => Self::Array(
                key.components()
                    .iter()
                    .map(|v| Self::of(v, collator))
                    .collect(),
            ),
            Value::LocalLambda(pos) => Self::Opaque(value.tag() as u8, *pos),
            Value::SortSpec(h) => Self::Opaque(value.tag() as u8, Arc::as_ptr(h) as usize),
            Value::Collator(h) => Self::Opaque(value.tag() as u8, Arc::as_ptr(h).cast::<u8>() as usize),
            Value::TimeZoneDb(h) => Self::Opaque(value.tag() as u8, Arc::as_ptr(h) as usize),
            Value::CsiCell(h) => Self::Opaque(value.tag() as u8, Arc::as_ptr(h) as usize),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn of_f64(f: f64) -> Self {
        if f.is_nan() {
            Self::NaN
        } else if f.is_infinite() {
            Self::Infinity(f > 0.0)
        } else if f.fract() == 0.0 && f >= -9.223_372_036_854_775_808e18 && f < 9.223_372_036_854_775_808e18 {
            Self::Int(f as i64)
        } else {
            Self::Double(f.to_bits())
        }
    }

    fn of_decimal(d: Decimal) -> Self {
        if d.fract().is_zero() {
            if let Some(n) = d.to_i64() {
                return Self::Int(n);
            }
        }
        if let Some(f) = d.to_f64() {
            if Decimal::from_f64_retain(f) == Some(d) {
                return Self::of_f64(f);
            }
        }
        Self::Decimal(d.normalize().to_string())
    }
}
