//! Numeric conversions shared by the interpreter and the builtins.

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::types::TypeTag;
use crate::value::Value;

const TWO_63: f64 = 9_223_372_036_854_775_808.0;

/// The numeric tags ordered by width. Mixed arithmetic widens to the larger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NumericWidth {
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// Double.
    Double,
    /// Decimal.
    Decimal,
}

impl NumericWidth {
    /// Width of a numeric value, `None` for non-numbers.
    #[must_use]
    pub const fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int32(_) => Some(Self::Int32),
            Value::Int64(_) => Some(Self::Int64),
            Value::Double(_) => Some(Self::Double),
            Value::Decimal(_) => Some(Self::Decimal),
            _ => None,
        }
    }

    /// Width of the result of combining two numbers.
    #[must_use]
    pub fn common(a: &Value, b: &Value) -> Option<Self> {
        Some(Self::of(a)?.max(Self::of(b)?))
    }

    /// The corresponding type tag.
    #[must_use]
    pub const fn tag(self) -> TypeTag {
        match self {
            Self::Int32 => TypeTag::NumberInt32,
            Self::Int64 => TypeTag::NumberInt64,
            Self::Double => TypeTag::NumberDouble,
            Self::Decimal => TypeTag::NumberDecimal,
        }
    }

    /// Inverse of [`NumericWidth::tag`].
    #[must_use]
    pub const fn from_tag(tag: TypeTag) -> Option<Self> {
        match tag {
            TypeTag::NumberInt32 => Some(Self::Int32),
            TypeTag::NumberInt64 => Some(Self::Int64),
            TypeTag::NumberDouble => Some(Self::Double),
            TypeTag::NumberDecimal => Some(Self::Decimal),
            _ => None,
        }
    }
}

/// Returns the value as `i64` if it holds an exactly representable integer.
#[must_use]
pub fn exact_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int32(n) => Some(i64::from(*n)),
        Value::Int64(n) => Some(*n),
        Value::Double(f) => f64_to_i64_exact(*f),
        Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
        _ => None,
    }
}

/// Returns the value as `i32` if it holds an exactly representable integer.
#[must_use]
pub fn exact_i32(value: &Value) -> Option<i32> {
    exact_i64(value).and_then(|n| i32::try_from(n).ok())
}

/// Converts a double to `i64` when it is integral and in range.
#[must_use]
pub fn f64_to_i64_exact(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && (-TWO_63..TWO_63).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

/// Converts any number to `f64` (possibly losing precision).
#[must_use]
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int32(n) => Some(f64::from(*n)),
        Value::Int64(n) => Some(*n as f64),
        Value::Double(f) => Some(*f),
        Value::Decimal(d) => d.to_f64(),
        _ => None,
    }
}

/// Converts any number to a decimal.
///
/// Doubles are converted to their shortest round-tripping decimal form.
/// NaN, infinities and out-of-range doubles have no decimal equivalent.
#[must_use]
pub fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Int32(n) => Some(Decimal::from(*n)),
        Value::Int64(n) => Some(Decimal::from(*n)),
        Value::Double(f) => Decimal::from_f64(*f),
        Value::Decimal(d) => Some(*d),
        _ => None,
    }
}

/// Returns true for a NaN double. Decimals have no NaN.
#[must_use]
pub fn is_nan(value: &Value) -> bool {
    matches!(value, Value::Double(f) if f.is_nan())
}

/// Returns true for an infinite double.
#[must_use]
pub fn is_infinity(value: &Value) -> bool {
    matches!(value, Value::Double(f) if f.is_infinite())
}

/// Narrowest integer value holding `n`: Int32 when it fits, else Int64.
#[must_use]
pub fn narrow_integer(n: i64) -> Value {
    i32::try_from(n).map_or(Value::Int64(n), Value::Int32)
}

/// Converts `value` to the numeric type `target` without loss.
///
/// Returns Nothing when the value is not a number or does not fit.
#[must_use]
pub fn convert_exact(value: &Value, target: NumericWidth) -> Value {
    if !value.is_number() {
        return Value::Nothing;
    }
    match target {
        NumericWidth::Int32 => exact_i32(value).map_or(Value::Nothing, Value::Int32),
        NumericWidth::Int64 => exact_i64(value).map_or(Value::Nothing, Value::Int64),
        NumericWidth::Double => match value {
            Value::Double(f) => Value::Double(*f),
            Value::Int32(n) => Value::Double(f64::from(*n)),
            Value::Int64(n) => {
                let f = *n as f64;
                if f64_to_i64_exact(f) == Some(*n) {
                    Value::Double(f)
                } else {
                    Value::Nothing
                }
            }
            Value::Decimal(d) => match d.to_f64() {
                Some(f) if Decimal::from_f64(f) == Some(*d) => Value::Double(f),
                _ => Value::Nothing,
            },
            _ => Value::Nothing,
        },
        NumericWidth::Decimal => to_decimal(value).map_or(Value::Nothing, Value::Decimal),
    }
}
