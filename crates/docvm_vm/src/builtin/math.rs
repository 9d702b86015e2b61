//! Mathematical functions.
//!
//! Non-numeric arguments and arguments outside a function's domain produce
//! Nothing. Decimal inputs produce Decimal results; transcendental functions
//! are evaluated in double precision.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use docvm_foundation::numeric::{exact_i64, narrow_integer, to_f64};
use docvm_foundation::{Operand, Result, Value};

use super::{Args, owned};

// =============================================================================
// Basic Math Functions
// =============================================================================

/// Math: abs
pub(super) fn abs(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        Value::Int32(n) => n
            .checked_abs()
            .map_or(Value::Int64(i64::from(*n).abs()), Value::Int32),
        Value::Int64(n) => n
            .checked_abs()
            .map_or(Value::Double((*n as f64).abs()), Value::Int64),
        Value::Double(f) => Value::Double(f.abs()),
        Value::Decimal(d) => Value::Decimal(d.abs()),
        _ => Value::Nothing,
    })
}

/// Math: ceil
pub(super) fn ceil(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        v @ (Value::Int32(_) | Value::Int64(_)) => v.clone(),
        Value::Double(f) => Value::Double(f.ceil()),
        Value::Decimal(d) => Value::Decimal(d.ceil()),
        _ => Value::Nothing,
    })
}

/// Math: floor
pub(super) fn floor(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        v @ (Value::Int32(_) | Value::Int64(_)) => v.clone(),
        Value::Double(f) => Value::Double(f.floor()),
        Value::Decimal(d) => Value::Decimal(d.floor()),
        _ => Value::Nothing,
    })
}

// =============================================================================
// Rounding
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Rounding {
    HalfEven,
    Truncate,
}

impl Rounding {
    const fn strategy(self) -> RoundingStrategy {
        match self {
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
            Self::Truncate => RoundingStrategy::ToZero,
        }
    }
}

/// Rounds `n` to a multiple of `unit`.
fn round_integer(n: i64, unit: i64, mode: Rounding) -> Option<i64> {
    let (q, r) = (n / unit, n % unit);
    let away = match mode {
        Rounding::Truncate => false,
        Rounding::HalfEven => {
            let twice = r.unsigned_abs().saturating_mul(2);
            twice > unit.unsigned_abs() || (twice == unit.unsigned_abs() && q % 2 != 0)
        }
    };
    let q = if away { q + n.signum() } else { q };
    q.checked_mul(unit)
}

fn round_double(f: f64, place: i64, mode: Rounding) -> f64 {
    let apply = |x: f64| match mode {
        Rounding::HalfEven => x.round_ties_even(),
        Rounding::Truncate => x.trunc(),
    };
    let factor = 10f64.powi(place as i32);
    let scaled = f * factor;
    if !scaled.is_finite() || !f.is_finite() {
        return f;
    }
    apply(scaled) / factor
}

fn round_decimal(d: Decimal, place: i64, mode: Rounding) -> Option<Decimal> {
    if place >= 0 {
        return Some(d.round_dp_with_strategy(u32::try_from(place).ok()?, mode.strategy()));
    }
    let factor = Decimal::from_i64(10i64.checked_pow(u32::try_from(-place).ok()?)?)?;
    let scaled = d.checked_div(factor)?;
    scaled
        .round_dp_with_strategy(0, mode.strategy())
        .checked_mul(factor)
}

fn round_to_place(args: &Args, mode: Rounding) -> Value {
    let place = match args.get_opt(1) {
        None => 0,
        Some(v) => match exact_i64(v) {
            Some(p) if (-20..=100).contains(&p) => p,
            _ => return Value::Nothing,
        },
    };
    match args.get(0) {
        v @ (Value::Int32(_) | Value::Int64(_)) if place >= 0 => v.clone(),
        Value::Int32(n) => {
            let Some(unit) = 10i64.checked_pow(place.unsigned_abs() as u32) else {
                return Value::Int32(0);
            };
            round_integer(i64::from(*n), unit, mode).map_or(Value::Nothing, narrow_integer)
        }
        Value::Int64(n) => {
            let Some(unit) = 10i64.checked_pow(place.unsigned_abs() as u32) else {
                return Value::Int64(0);
            };
            round_integer(*n, unit, mode).map_or(Value::Nothing, Value::Int64)
        }
        Value::Double(f) => Value::Double(round_double(*f, place, mode)),
        Value::Decimal(d) => round_decimal(*d, place, mode).map_or(Value::Nothing, Value::Decimal),
        _ => Value::Nothing,
    }
}

/// Math: round(x, [place]) - half to even
pub(super) fn round(args: &mut Args) -> Result<Operand> {
    owned(round_to_place(args, Rounding::HalfEven))
}

/// Math: trunc(x, [place])
pub(super) fn trunc(args: &mut Args) -> Result<Operand> {
    owned(round_to_place(args, Rounding::Truncate))
}

// =============================================================================
// Transcendental Functions
// =============================================================================

/// Applies `f` in double precision when `domain` admits the argument.
fn unary(value: &Value, f: fn(f64) -> f64, domain: fn(f64) -> bool) -> Value {
    let Some(x) = to_f64(value) else {
        return Value::Nothing;
    };
    if !x.is_nan() && !domain(x) {
        return Value::Nothing;
    }
    let y = f(x);
    match value {
        Value::Decimal(_) => Decimal::from_f64(y).map_or(Value::Double(y), Value::Decimal),
        _ => Value::Double(y),
    }
}

fn any(_: f64) -> bool {
    true
}

macro_rules! unary_builtins {
    ($($(#[$doc:meta])* $name:ident => $f:expr, $domain:expr;)*) => {
        $(
            $(#[$doc])*
            pub(super) fn $name(args: &mut Args) -> Result<Operand> {
                owned(unary(args.get(0), $f, $domain))
            }
        )*
    };
}

unary_builtins! {
    /// Math: exp
    exp => f64::exp, any;
    /// Math: ln - positive arguments only
    ln => f64::ln, |x| x > 0.0;
    /// Math: log10 - positive arguments only
    log10 => f64::log10, |x| x > 0.0;
    /// Math: sqrt - non-negative arguments only
    sqrt => f64::sqrt, |x| x >= 0.0;
    /// Trig: acos
    acos => f64::acos, |x| (-1.0..=1.0).contains(&x);
    /// Trig: acosh
    acosh => f64::acosh, |x| x >= 1.0;
    /// Trig: asin
    asin => f64::asin, |x| (-1.0..=1.0).contains(&x);
    /// Trig: asinh
    asinh => f64::asinh, any;
    /// Trig: atan
    atan => f64::atan, any;
    /// Trig: atanh
    atanh => f64::atanh, |x| (-1.0..=1.0).contains(&x);
    /// Trig: cos
    cos => f64::cos, |x| x.is_finite();
    /// Trig: cosh
    cosh => f64::cosh, any;
    /// Trig: sin
    sin => f64::sin, |x| x.is_finite();
    /// Trig: sinh
    sinh => f64::sinh, any;
    /// Trig: tan
    tan => f64::tan, |x| x.is_finite();
    /// Trig: tanh
    tanh => f64::tanh, any;
    /// Trig: degreesToRadians
    degrees_to_radians => f64::to_radians, any;
    /// Trig: radiansToDegrees
    radians_to_degrees => f64::to_degrees, any;
}

/// Trig: atan2(y, x)
pub(super) fn atan2(args: &mut Args) -> Result<Operand> {
    let (Some(y), Some(x)) = (to_f64(args.get(0)), to_f64(args.get(1))) else {
        return owned(Value::Nothing);
    };
    let r = y.atan2(x);
    owned(
        if matches!(args.get(0), Value::Decimal(_)) || matches!(args.get(1), Value::Decimal(_)) {
            Decimal::from_f64(r).map_or(Value::Double(r), Value::Decimal)
        } else {
            Value::Double(r)
        },
    )
}

/// Math: pow(base, exponent)
///
/// Integer powers stay integral while they fit. A zero base with a negative
/// exponent has no value.
pub(super) fn pow(args: &mut Args) -> Result<Operand> {
    let (base, exponent) = (args.get(0), args.get(1));
    if !base.is_number() || !exponent.is_number() {
        return owned(Value::Nothing);
    }
    let integral = |v: &Value| matches!(v, Value::Int32(_) | Value::Int64(_));
    if integral(base) && integral(exponent) {
        let (Some(b), Some(e)) = (exact_i64(base), exact_i64(exponent)) else {
            return owned(Value::Nothing);
        };
        if e < 0 {
            return owned(match b {
                0 => Value::Nothing,
                1 => Value::Int32(1),
                -1 => Value::Int32(if e % 2 == 0 { 1 } else { -1 }),
                _ => Value::Double((b as f64).powf(e as f64)),
            });
        }
        let both_int32 = matches!(base, Value::Int32(_)) && matches!(exponent, Value::Int32(_));
        let result = u32::try_from(e).ok().and_then(|e| b.checked_pow(e));
        return owned(match result {
            Some(n) if both_int32 => narrow_integer(n),
            Some(n) => Value::Int64(n),
            None => Value::Double((b as f64).powf(e as f64)),
        });
    }
    let (Some(b), Some(e)) = (to_f64(base), to_f64(exponent)) else {
        return owned(Value::Nothing);
    };
    if b == 0.0 && e < 0.0 {
        return owned(Value::Nothing);
    }
    let r = b.powf(e);
    owned(if matches!(base, Value::Decimal(_)) || matches!(exponent, Value::Decimal(_)) {
        Decimal::from_f64(r).map_or(Value::Double(r), Value::Decimal)
    } else {
        Value::Double(r)
    })
}

// =============================================================================
// Bit Tests
// =============================================================================

fn bits(value: &Value) -> Option<u64> {
    match value {
        Value::Int32(n) => Some(i64::from(*n) as u64),
        Value::Int64(n) => Some(*n as u64),
        Value::Double(_) | Value::Decimal(_) => exact_i64(value).map(|n| n as u64),
        _ => None,
    }
}

fn bit_test(args: &Args, test: fn(u64, u64) -> bool) -> Value {
    match (bits(args.get(0)), bits(args.get(1))) {
        (Some(mask), Some(value)) => Value::Bool(test(mask, value)),
        _ => Value::Nothing,
    }
}

/// Bits: bitTestZero(mask, value) - every masked bit clear
pub(super) fn bit_test_zero(args: &mut Args) -> Result<Operand> {
    owned(bit_test(args, |mask, value| value & mask == 0))
}

/// Bits: bitTestMask(mask, value) - every masked bit set
pub(super) fn bit_test_mask(args: &mut Args) -> Result<Operand> {
    owned(bit_test(args, |mask, value| value & mask == mask))
}

/// Bits: bitTestPosition(positions, value) - every listed bit set
///
/// Positions past bit 63 test the sign extension of the value.
pub(super) fn bit_test_position(args: &mut Args) -> Result<Operand> {
    let positions = args.get(0);
    let Some(value) = bits(args.get(1)) else {
        return owned(Value::Nothing);
    };
    if !positions.is_array() {
        return owned(Value::Nothing);
    }
    let mut all_set = true;
    for position in positions.array_iter() {
        let Some(p) = exact_i64(&position).filter(|p| *p >= 0) else {
            return owned(Value::Nothing);
        };
        let set = if p >= 64 {
            value >> 63 == 1
        } else {
            value >> p & 1 == 1
        };
        all_set &= set;
    }
    owned(Value::Bool(all_set))
}
