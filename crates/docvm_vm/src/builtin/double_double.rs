//! Compensated summation.
//!
//! Sums are kept as an unevaluated pair of doubles (`sum + addend`) so that
//! rounding error does not accumulate, plus a separate decimal total once a
//! decimal input has been seen. The widest numeric type seen decides the type
//! of the result.
//!
//! State: `[widestTag: Int32, sum: Double, addend: Double]`, with a fourth
//! `decimalTotal: Decimal` slot once a decimal has been added.

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use docvm_foundation::numeric::{self, NumericWidth};
use docvm_foundation::{Array, Operand, Result, TypeTag, Value};

use super::state::{self, shape_error};
use super::{Args, nothing, owned};

/// A double-double accumulator.
///
/// Each addition is exact up to the combined 106-bit precision of the pair.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DoubleDouble {
    sum: f64,
    addend: f64,
}

impl DoubleDouble {
    /// Creates an accumulator from its two components.
    #[must_use]
    pub const fn new(sum: f64, addend: f64) -> Self {
        Self { sum, addend }
    }

    /// The leading component.
    #[must_use]
    pub const fn sum(&self) -> f64 {
        self.sum
    }

    /// The rounding error carried alongside [`DoubleDouble::sum`].
    #[must_use]
    pub const fn addend(&self) -> f64 {
        self.addend
    }

    /// Adds a double.
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() || !self.sum.is_finite() {
            self.sum += x;
            self.addend = 0.0;
            return;
        }
        // Two-sum: `s + err` equals `sum + x` exactly
        let s = self.sum + x;
        let bp = s - self.sum;
        let err = (self.sum - (s - bp)) + (x - bp);
        self.sum = s;
        self.addend += err;
    }

    /// Adds a 64-bit integer without losing its low bits.
    pub fn add_i64(&mut self, n: i64) {
        let high = (n >> 32) << 32;
        let low = n - high;
        self.add(high as f64);
        self.add(low as f64);
    }

    /// Subtracts a 64-bit integer exactly.
    pub fn sub_i64(&mut self, n: i64) {
        let high = (n >> 32) << 32;
        let low = n - high;
        self.add(-(high as f64));
        self.add(-(low as f64));
    }

    /// Adds another accumulator.
    pub fn merge(&mut self, other: Self) {
        self.add(other.sum);
        self.add(other.addend);
    }

    /// The rounded total.
    #[must_use]
    pub fn value(&self) -> f64 {
        if self.sum.is_finite() {
            self.sum + self.addend
        } else {
            self.sum
        }
    }

    /// The total as an exact integer, when it is one and fits in `i64`.
    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        const LIMIT: f64 = 1e30;
        if !self.sum.is_finite()
            || self.sum.fract() != 0.0
            || self.addend.fract() != 0.0
            || self.sum.abs() > LIMIT
        {
            return None;
        }
        let total = self.sum as i128 + self.addend as i128;
        i64::try_from(total).ok()
    }

    /// The total as a decimal.
    #[must_use]
    pub fn to_decimal(&self) -> Option<Decimal> {
        let sum = Decimal::from_f64(self.sum)?;
        let addend = Decimal::from_f64(self.addend)?;
        sum.checked_add(addend)
    }
}

/// Decoded state of a compensated sum.
#[derive(Clone, Debug)]
pub(super) struct SumState {
    pub(super) widest: NumericWidth,
    pub(super) dd: DoubleDouble,
    pub(super) decimal: Option<Decimal>,
}

impl Default for SumState {
    fn default() -> Self {
        Self {
            widest: NumericWidth::Int32,
            dd: DoubleDouble::default(),
            decimal: None,
        }
    }
}

impl SumState {
    pub(super) fn decode(value: Value, accumulator: &str) -> Result<Self> {
        let array = state::array(value, accumulator)?;
        if !(3..=4).contains(&array.len()) {
            return Err(shape_error(
                accumulator,
                format!("expected 3 or 4 slots, got {}", array.len()),
            ));
        }
        let mut slots = array.into_iter();
        let mut next = || slots.next().unwrap_or_default();
        let widest = state::int(&next(), accumulator)?;
        let widest = u8::try_from(widest)
            .ok()
            .and_then(TypeTag::from_u8)
            .and_then(NumericWidth::from_tag)
            .ok_or_else(|| shape_error(accumulator, format!("bad numeric tag {widest}")))?;
        let sum = state::double(&next(), accumulator)?;
        let addend = state::double(&next(), accumulator)?;
        let decimal = match next() {
            Value::Nothing => None,
            Value::Decimal(d) => Some(d),
            other => {
                return Err(shape_error(
                    accumulator,
                    format!("expected a decimal, got {}", other.tag()),
                ));
            }
        };
        Ok(Self {
            widest,
            dd: DoubleDouble::new(sum, addend),
            decimal,
        })
    }

    pub(super) fn encode(&self) -> Value {
        let mut slots = vec![
            Value::Int32(i32::from(self.widest.tag() as u8)),
            Value::Double(self.dd.sum()),
            Value::Double(self.dd.addend()),
        ];
        if let Some(d) = self.decimal {
            slots.push(Value::Decimal(d));
        }
        Value::Array(Array::from(slots))
    }

    /// Adds a number. Returns false, leaving the state unchanged, otherwise.
    pub(super) fn add(&mut self, value: &Value) -> bool {
        let Some(width) = NumericWidth::of(value) else {
            return false;
        };
        self.widest = self.widest.max(width);
        match value {
            Value::Int32(n) => self.dd.add(f64::from(*n)),
            Value::Int64(n) => self.dd.add_i64(*n),
            Value::Double(f) => self.dd.add(*f),
            Value::Decimal(d) => {
                let total = self.decimal.unwrap_or_default();
                self.decimal = Some(total.saturating_add(*d));
            }
            _ => {}
        }
        true
    }

    /// Undoes an earlier [`SumState::add`].
    pub(super) fn remove(&mut self, value: &Value) {
        match value {
            Value::Int32(n) => self.dd.add(-f64::from(*n)),
            Value::Int64(n) => self.dd.sub_i64(*n),
            Value::Double(f) => self.dd.add(-f),
            Value::Decimal(d) => {
                let total = self.decimal.unwrap_or_default();
                self.decimal = Some(total.saturating_sub(*d));
            }
            _ => {}
        }
    }

    pub(super) fn merge(&mut self, other: &Self) {
        self.widest = self.widest.max(other.widest);
        self.dd.merge(other.dd);
        if let Some(d) = other.decimal {
            let total = self.decimal.unwrap_or_default();
            self.decimal = Some(total.saturating_add(d));
        }
    }

    /// The decimal total including the double-double part.
    fn decimal_total(&self) -> Value {
        let base = self.decimal.unwrap_or_default();
        match self.dd.to_decimal() {
            Some(d) => Value::Decimal(base.saturating_add(d)),
            // A non-finite double part dominates
            None => Value::Double(self.dd.value()),
        }
    }

    /// The sum, typed by the widest input.
    pub(super) fn finalize(&self) -> Value {
        match self.widest {
            NumericWidth::Int32 => self
                .dd
                .to_i64()
                .map_or(Value::Double(self.dd.value()), numeric::narrow_integer),
            NumericWidth::Int64 => self
                .dd
                .to_i64()
                .map_or(Value::Double(self.dd.value()), Value::Int64),
            NumericWidth::Double => Value::Double(self.dd.value()),
            NumericWidth::Decimal => self.decimal_total(),
        }
    }

    /// `[total, error]` for merging partial sums elsewhere.
    fn partial(&self) -> Value {
        let total = if self.widest == NumericWidth::Decimal {
            self.decimal_total()
        } else {
            Value::Double(self.dd.sum())
        };
        let error = if self.widest == NumericWidth::Decimal {
            Value::Double(0.0)
        } else {
            Value::Double(self.dd.addend())
        };
        Value::array([total, error])
    }
}

// =============================================================================
// Builtins
// =============================================================================

/// Sum: doubleDoubleSum - exact sum of every argument
pub(super) fn double_double_sum(args: &mut Args) -> Result<Operand> {
    let mut sum = SumState::default();
    for value in args.iter() {
        if !sum.add(value) {
            return nothing();
        }
    }
    owned(sum.finalize())
}

/// Sum: aggDoubleDoubleSum - fold one value into the state
pub(super) fn agg_double_double_sum(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggDoubleDoubleSum";
    let mut sum = match args.take_value(0) {
        Value::Nothing => SumState::default(),
        state => SumState::decode(state, NAME)?,
    };
    sum.add(args.get(1));
    owned(sum.encode())
}

/// Sum: doubleDoubleSumFinalize
pub(super) fn double_double_sum_finalize(args: &mut Args) -> Result<Operand> {
    match args.take_value(0) {
        Value::Nothing => nothing(),
        state => owned(SumState::decode(state, "doubleDoubleSumFinalize")?.finalize()),
    }
}

/// Sum: doubleDoublePartialSumFinalize
pub(super) fn double_double_partial_sum_finalize(args: &mut Args) -> Result<Operand> {
    match args.take_value(0) {
        Value::Nothing => nothing(),
        state => owned(SumState::decode(state, "doubleDoublePartialSumFinalize")?.partial()),
    }
}

/// Sum: aggMergeDoubleDoubleSums - combine with another state
pub(super) fn agg_merge_double_double_sums(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggMergeDoubleDoubleSums";
    let mut sum = match args.take_value(0) {
        Value::Nothing => SumState::default(),
        state => SumState::decode(state, NAME)?,
    };
    match args.take_value(1) {
        Value::Nothing => {}
        other => sum.merge(&SumState::decode(other, NAME)?),
    }
    owned(sum.encode())
}
