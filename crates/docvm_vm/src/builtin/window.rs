//! Window accumulators.
//!
//! Removable accumulators support `add`, `remove` and `finalize` over a
//! sliding window. Values must be removed in the order they were added;
//! states are encoded arrays with a fixed slot layout per accumulator.

use std::cmp::Ordering;
use std::sync::Arc;

use rust_decimal::Decimal;

use docvm_foundation::numeric::{self, NumericWidth};
use docvm_foundation::{
    Array, ArrayMultiSet, ArraySet, Collator, Error, Operand, Result, Value, compare_values,
};

use super::double_double::SumState;
use super::state::{self, pack, shape_error, size_of, unpack};
use super::{Args, collator_arg, nothing, owned};

// =============================================================================
// Rank
// =============================================================================

/// `[lastValue, lastRank, sameRankCount]`.
fn rank_step(args: &mut Args, dense: bool, collated: bool, name: &str) -> Result<Operand> {
    let collator = if collated { collator_arg(args.get(1)) } else { None };
    let value = match args.take_value(1 + usize::from(collated)) {
        Value::Nothing => Value::Null,
        v => v.to_heap(),
    };
    let state = args.take_value(0);
    if state.is_nothing() {
        return owned(pack([value, Value::Int64(1), Value::Int64(1)]));
    }
    let [last, rank, same] = unpack(state, name)?;
    let (rank, same) = (state::int(&rank, name)?, state::int(&same, name)?);
    let next = if compare_values(&last, &value, collator.as_deref()) == Ordering::Equal {
        [last, Value::Int64(rank), Value::Int64(same + 1)]
    } else if dense {
        [value, Value::Int64(rank + 1), Value::Int64(1)]
    } else {
        [value, Value::Int64(rank + same), Value::Int64(1)]
    };
    owned(pack(next))
}

/// Window: aggRank(state, value) - ties share a rank, gaps follow ties
pub(super) fn agg_rank(args: &mut Args) -> Result<Operand> {
    rank_step(args, false, false, "aggRank")
}

/// Window: aggRankColl(state, collator, value)
pub(super) fn agg_rank_coll(args: &mut Args) -> Result<Operand> {
    rank_step(args, false, true, "aggRankColl")
}

/// Window: aggDenseRank(state, value) - ties share a rank, no gaps
pub(super) fn agg_dense_rank(args: &mut Args) -> Result<Operand> {
    rank_step(args, true, false, "aggDenseRank")
}

/// Window: aggDenseRankColl(state, collator, value)
pub(super) fn agg_dense_rank_coll(args: &mut Args) -> Result<Operand> {
    rank_step(args, true, true, "aggDenseRankColl")
}

/// Window: aggRankFinalize(state) - the current rank
pub(super) fn agg_rank_finalize(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggRankFinalize";
    let state = args.take_value(0);
    if state.is_nothing() {
        return nothing();
    }
    let [_, rank, _] = unpack(state, NAME)?;
    owned(numeric::narrow_integer(state::int(&rank, NAME)?))
}

// =============================================================================
// Exponential Moving Average
// =============================================================================

/// Window: aggExpMovingAvgInit(alpha) - `[result, alpha, isDecimal]`
///
/// # Errors
///
/// `InvalidArgument` unless alpha is a number strictly between 0 and 1.
pub(super) fn agg_exp_moving_avg_init(args: &mut Args) -> Result<Operand> {
    let alpha = args.get(0);
    let valid = numeric::to_f64(alpha).is_some_and(|a| a > 0.0 && a < 1.0);
    if !valid {
        return Err(Error::invalid_argument(format!(
            "expMovingAvg: alpha must be a number between 0 and 1 exclusive, got {alpha}"
        )));
    }
    let alpha = match alpha {
        Value::Decimal(d) => Value::Decimal(*d),
        other => Value::Double(numeric::to_f64(other).unwrap_or_default()),
    };
    owned(pack([Value::Null, alpha, Value::Bool(false)]))
}

/// Window: aggExpMovingAvg(state, value) - non-numbers are skipped
pub(super) fn agg_exp_moving_avg(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggExpMovingAvg";
    let [result, alpha, is_decimal] = unpack(args.take_value(0), NAME)?;
    let mut is_decimal = state::boolean(&is_decimal, NAME)?;
    let value = args.get(1);
    if !value.is_number() {
        return owned(pack([result, alpha, Value::Bool(is_decimal)]));
    }
    is_decimal |= matches!(value, Value::Decimal(_));
    let next = if is_decimal {
        let (Some(x), Some(a)) = (numeric::to_decimal(value), numeric::to_decimal(&alpha)) else {
            return Err(shape_error(NAME, "alpha is not numeric"));
        };
        match numeric::to_decimal(&result) {
            None => Value::Decimal(x),
            Some(prev) => Value::Decimal(x * a + prev * (Decimal::ONE - a)),
        }
    } else {
        let (Some(x), Some(a)) = (numeric::to_f64(value), numeric::to_f64(&alpha)) else {
            return Err(shape_error(NAME, "alpha is not numeric"));
        };
        match numeric::to_f64(&result) {
            None => Value::Double(x),
            Some(prev) => Value::Double(x * a + prev * (1.0 - a)),
        }
    };
    owned(pack([next, alpha, Value::Bool(is_decimal)]))
}

/// Window: aggExpMovingAvgFinalize(state) - Null before the first number
pub(super) fn agg_exp_moving_avg_finalize(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggExpMovingAvgFinalize";
    let [result, _, is_decimal] = unpack(args.take_value(0), NAME)?;
    if !result.is_number() {
        return owned(Value::Null);
    }
    let result = if state::boolean(&is_decimal, NAME)? {
        numeric::convert_exact(&result, NumericWidth::Decimal)
    } else {
        numeric::to_f64(&result).map_or(Value::Null, Value::Double)
    };
    owned(result)
}

// =============================================================================
// Removable Sum
// =============================================================================

/// Decoded `[sumAcc, nanCount, posInfinityCount, negInfinityCount, doubleCount, decimalCount]`.
#[derive(Default)]
struct RemovableSum {
    sum: SumState,
    nan: i64,
    pos_inf: i64,
    neg_inf: i64,
    doubles: i64,
    decimals: i64,
}

impl RemovableSum {
    fn decode(value: Value, name: &str) -> Result<Self> {
        let [sum, nan, pos_inf, neg_inf, doubles, decimals] = unpack(value, name)?;
        Ok(Self {
            sum: SumState::decode(sum, name)?,
            nan: state::int(&nan, name)?,
            pos_inf: state::int(&pos_inf, name)?,
            neg_inf: state::int(&neg_inf, name)?,
            doubles: state::int(&doubles, name)?,
            decimals: state::int(&decimals, name)?,
        })
    }

    fn encode(&self) -> Value {
        pack([
            self.sum.encode(),
            Value::Int64(self.nan),
            Value::Int64(self.pos_inf),
            Value::Int64(self.neg_inf),
            Value::Int64(self.doubles),
            Value::Int64(self.decimals),
        ])
    }

    /// Applies `value` with `sign` +1 (add) or -1 (remove).
    fn apply(&mut self, value: &Value, sign: i64) {
        match value {
            Value::Double(f) => {
                self.doubles += sign;
                if f.is_nan() {
                    self.nan += sign;
                } else if *f == f64::INFINITY {
                    self.pos_inf += sign;
                } else if *f == f64::NEG_INFINITY {
                    self.neg_inf += sign;
                } else if sign > 0 {
                    self.sum.add(value);
                } else {
                    self.sum.remove(value);
                }
            }
            Value::Int32(_) | Value::Int64(_) | Value::Decimal(_) => {
                if matches!(value, Value::Decimal(_)) {
                    self.decimals += sign;
                }
                if sign > 0 {
                    self.sum.add(value);
                } else {
                    self.sum.remove(value);
                }
            }
            _ => {}
        }
    }

    fn finalize(&self) -> Value {
        if self.nan > 0 || (self.pos_inf > 0 && self.neg_inf > 0) {
            return Value::Double(f64::NAN);
        }
        if self.pos_inf > 0 {
            return Value::Double(f64::INFINITY);
        }
        if self.neg_inf > 0 {
            return Value::Double(f64::NEG_INFINITY);
        }
        let mut sum = self.sum.clone();
        sum.widest = if self.decimals > 0 {
            NumericWidth::Decimal
        } else if self.doubles > 0 {
            NumericWidth::Double
        } else {
            NumericWidth::Int32
        };
        sum.finalize()
    }
}

/// Window: aggRemovableSumInit()
pub(super) fn agg_removable_sum_init(_: &mut Args) -> Result<Operand> {
    owned(RemovableSum::default().encode())
}

/// Window: aggRemovableSumAdd(state, value)
pub(super) fn agg_removable_sum_add(args: &mut Args) -> Result<Operand> {
    let mut sum = RemovableSum::decode(args.take_value(0), "aggRemovableSumAdd")?;
    sum.apply(args.get(1), 1);
    owned(sum.encode())
}

/// Window: aggRemovableSumRemove(state, value)
pub(super) fn agg_removable_sum_remove(args: &mut Args) -> Result<Operand> {
    let mut sum = RemovableSum::decode(args.take_value(0), "aggRemovableSumRemove")?;
    sum.apply(args.get(1), -1);
    owned(sum.encode())
}

/// Window: aggRemovableSumFinalize(state) - typed by the numbers still in the window
pub(super) fn agg_removable_sum_finalize(args: &mut Args) -> Result<Operand> {
    let sum = RemovableSum::decode(args.take_value(0), "aggRemovableSumFinalize")?;
    owned(sum.finalize())
}

// =============================================================================
// Removable Standard Deviation
// =============================================================================

/// Decoded `[sum, sumSquares, count, nonFiniteCount]`, sums compensated.
#[derive(Default)]
struct RemovableStdDev {
    sum: SumState,
    squares: SumState,
    count: i64,
    non_finite: i64,
}

impl RemovableStdDev {
    fn decode(value: Value, name: &str) -> Result<Self> {
        let [sum, squares, count, non_finite] = unpack(value, name)?;
        Ok(Self {
            sum: SumState::decode(sum, name)?,
            squares: SumState::decode(squares, name)?,
            count: state::int(&count, name)?,
            non_finite: state::int(&non_finite, name)?,
        })
    }

    fn encode(&self) -> Value {
        pack([
            self.sum.encode(),
            self.squares.encode(),
            Value::Int64(self.count),
            Value::Int64(self.non_finite),
        ])
    }

    fn apply(&mut self, value: &Value, sign: i64) {
        if !value.is_number() {
            return;
        }
        let Some(x) = numeric::to_f64(value) else {
            return;
        };
        self.count += sign;
        if !x.is_finite() {
            self.non_finite += sign;
            return;
        }
        let (x, square) = (Value::Double(x), Value::Double(x * x));
        if sign > 0 {
            self.sum.add(&x);
            self.squares.add(&square);
        } else {
            self.sum.remove(&x);
            self.squares.remove(&square);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finalize(&self, sample: bool) -> Value {
        if self.non_finite > 0 {
            return Value::Null;
        }
        let divisor = if sample { self.count - 1 } else { self.count };
        if divisor <= 0 {
            return Value::Null;
        }
        let n = self.count as f64;
        let (sum, squares) = (self.sum.dd.value(), self.squares.dd.value());
        let variance = (squares - sum * sum / n) / divisor as f64;
        Value::Double(variance.max(0.0).sqrt())
    }
}

/// Window: aggRemovableStdDevInit()
pub(super) fn agg_removable_std_dev_init(_: &mut Args) -> Result<Operand> {
    owned(RemovableStdDev::default().encode())
}

/// Window: aggRemovableStdDevAdd(state, value)
pub(super) fn agg_removable_std_dev_add(args: &mut Args) -> Result<Operand> {
    let mut acc = RemovableStdDev::decode(args.take_value(0), "aggRemovableStdDevAdd")?;
    acc.apply(args.get(1), 1);
    owned(acc.encode())
}

/// Window: aggRemovableStdDevRemove(state, value)
pub(super) fn agg_removable_std_dev_remove(args: &mut Args) -> Result<Operand> {
    let mut acc = RemovableStdDev::decode(args.take_value(0), "aggRemovableStdDevRemove")?;
    acc.apply(args.get(1), -1);
    owned(acc.encode())
}

/// Window: aggRemovableStdDevSampFinalize(state)
pub(super) fn agg_removable_std_dev_samp_finalize(args: &mut Args) -> Result<Operand> {
    let acc = RemovableStdDev::decode(args.take_value(0), "aggRemovableStdDevSampFinalize")?;
    owned(acc.finalize(true))
}

/// Window: aggRemovableStdDevPopFinalize(state)
pub(super) fn agg_removable_std_dev_pop_finalize(args: &mut Args) -> Result<Operand> {
    let acc = RemovableStdDev::decode(args.take_value(0), "aggRemovableStdDevPopFinalize")?;
    owned(acc.finalize(false))
}

// =============================================================================
// Covariance
// =============================================================================

/// Decoded `[meanX, meanY, cXY, count]`.
#[derive(Clone, Copy, Default)]
struct Covariance {
    mean_x: f64,
    mean_y: f64,
    c_xy: f64,
    count: i64,
}

impl Covariance {
    fn decode(value: Value, name: &str) -> Result<Self> {
        let [mean_x, mean_y, c_xy, count] = unpack(value, name)?;
        Ok(Self {
            mean_x: state::double(&mean_x, name)?,
            mean_y: state::double(&mean_y, name)?,
            c_xy: state::double(&c_xy, name)?,
            count: state::int(&count, name)?,
        })
    }

    fn encode(self) -> Value {
        pack([
            Value::Double(self.mean_x),
            Value::Double(self.mean_y),
            Value::Double(self.c_xy),
            Value::Int64(self.count),
        ])
    }

    fn point(x: &Value, y: &Value) -> Option<(f64, f64)> {
        if !x.is_number() || !y.is_number() {
            return None;
        }
        Some((numeric::to_f64(x)?, numeric::to_f64(y)?))
    }

    #[allow(clippy::cast_precision_loss)]
    fn add(&mut self, x: f64, y: f64) {
        self.count += 1;
        let n = self.count as f64;
        let dx = x - self.mean_x;
        self.mean_x += dx / n;
        self.mean_y += (y - self.mean_y) / n;
        self.c_xy += dx * (y - self.mean_y);
    }

    #[allow(clippy::cast_precision_loss)]
    fn remove(&mut self, x: f64, y: f64) {
        if self.count <= 1 {
            *self = Self::default();
            return;
        }
        let n = self.count as f64;
        let rest = n - 1.0;
        let mean_x = (n * self.mean_x - x) / rest;
        let mean_y = (n * self.mean_y - y) / rest;
        self.c_xy -= (x - mean_x) * (y - self.mean_y);
        self.mean_x = mean_x;
        self.mean_y = mean_y;
        self.count -= 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn finalize(self, sample: bool) -> Value {
        let divisor = if sample { self.count - 1 } else { self.count };
        if divisor <= 0 {
            return Value::Null;
        }
        Value::Double(self.c_xy / divisor as f64)
    }
}

/// Window: aggCovarianceInit()
pub(super) fn agg_covariance_init(_: &mut Args) -> Result<Operand> {
    owned(Covariance::default().encode())
}

/// Window: aggCovarianceAdd(state, x, y) - pairs with a non-number are skipped
pub(super) fn agg_covariance_add(args: &mut Args) -> Result<Operand> {
    let mut acc = Covariance::decode(args.take_value(0), "aggCovarianceAdd")?;
    if let Some((x, y)) = Covariance::point(args.get(1), args.get(2)) {
        acc.add(x, y);
    }
    owned(acc.encode())
}

/// Window: aggCovarianceRemove(state, x, y)
pub(super) fn agg_covariance_remove(args: &mut Args) -> Result<Operand> {
    let mut acc = Covariance::decode(args.take_value(0), "aggCovarianceRemove")?;
    if let Some((x, y)) = Covariance::point(args.get(1), args.get(2)) {
        acc.remove(x, y);
    }
    owned(acc.encode())
}

/// Window: aggCovarianceSampFinalize(state)
pub(super) fn agg_covariance_samp_finalize(args: &mut Args) -> Result<Operand> {
    let acc = Covariance::decode(args.take_value(0), "aggCovarianceSampFinalize")?;
    owned(acc.finalize(true))
}

/// Window: aggCovariancePopFinalize(state)
pub(super) fn agg_covariance_pop_finalize(args: &mut Args) -> Result<Operand> {
    let acc = Covariance::decode(args.take_value(0), "aggCovariancePopFinalize")?;
    owned(acc.finalize(false))
}

// =============================================================================
// Removable Push and AddToSet
// =============================================================================

/// Window: aggRemovablePushInit() - the state is the array itself
pub(super) fn agg_removable_push_init(_: &mut Args) -> Result<Operand> {
    owned(Value::Array(Array::new()))
}

/// Window: aggRemovablePushAdd(state, value) - Nothing is skipped
pub(super) fn agg_removable_push_add(args: &mut Args) -> Result<Operand> {
    let mut values = state::array(args.take_value(0), "aggRemovablePushAdd")?;
    let value = args.take_value(1);
    if !value.is_nothing() {
        values.push_back(value.to_heap());
    }
    owned(Value::Array(values))
}

/// Window: aggRemovablePushRemove(state) - drops the oldest value
///
/// # Errors
///
/// `Internal` on an empty window.
pub(super) fn agg_removable_push_remove(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggRemovablePushRemove";
    let mut values = state::array(args.take_value(0), NAME)?;
    if values.pop_front().is_none() {
        return Err(Error::internal(format!("{NAME}: removed from an empty window")));
    }
    owned(Value::Array(values))
}

/// Window: aggRemovablePushFinalize(state)
pub(super) fn agg_removable_push_finalize(args: &mut Args) -> Result<Operand> {
    let values = state::array(args.take_value(0), "aggRemovablePushFinalize")?;
    owned(Value::Array(values))
}

/// Decoded `[multiset, memUsage, memLimit]`.
struct RemovableSet {
    values: ArrayMultiSet,
    mem_usage: i64,
    mem_limit: i64,
}

impl RemovableSet {
    fn decode(value: Value, name: &str) -> Result<Self> {
        let [values, mem_usage, mem_limit] = unpack(value, name)?;
        let Value::ArrayMultiSet(values) = values else {
            return Err(shape_error(name, format!("expected a multiset, got {}", values.tag())));
        };
        Ok(Self {
            values,
            mem_usage: state::int(&mem_usage, name)?,
            mem_limit: state::int(&mem_limit, name)?,
        })
    }

    fn encode(self) -> Value {
        pack([
            Value::ArrayMultiSet(self.values),
            Value::Int64(self.mem_usage),
            Value::Int64(self.mem_limit),
        ])
    }
}

/// Window: aggRemovableAddToSetInit([collator], [memLimit])
///
/// # Errors
///
/// `InvalidArgument` for a non-positive memory limit.
pub(super) fn agg_removable_add_to_set_init(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggRemovableAddToSetInit";
    let collator: Option<Arc<dyn Collator>> = args.iter().find_map(collator_arg);
    let limit = args.iter().find(|v| v.is_number()).cloned().unwrap_or_default();
    let set = RemovableSet {
        values: ArrayMultiSet::with_collator(collator),
        mem_usage: 0,
        mem_limit: state::memory_limit(&limit, NAME)?,
    };
    owned(set.encode())
}

/// Window: aggRemovableAddToSetAdd(state, value)
///
/// # Errors
///
/// `MemoryLimitExceeded` past the memory limit.
pub(super) fn agg_removable_add_to_set_add(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggRemovableAddToSetAdd";
    let mut set = RemovableSet::decode(args.take_value(0), NAME)?;
    let value = args.take_value(1);
    if !value.is_nothing() {
        set.mem_usage = set.mem_usage.saturating_add(size_of(&value));
        if set.mem_usage > set.mem_limit {
            return Err(Error::memory_limit(NAME, set.mem_usage, set.mem_limit));
        }
        set.values.insert(value.to_heap());
    }
    owned(set.encode())
}

/// Window: aggRemovableAddToSetRemove(state, value)
///
/// # Errors
///
/// `Internal` when the value is not in the window.
pub(super) fn agg_removable_add_to_set_remove(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggRemovableAddToSetRemove";
    let mut set = RemovableSet::decode(args.take_value(0), NAME)?;
    let value = args.get(1);
    if !value.is_nothing() {
        if !set.values.remove(value) {
            return Err(Error::internal(format!(
                "{NAME}: removed a value that is not in the window"
            )));
        }
        set.mem_usage = set.mem_usage.saturating_sub(size_of(value));
    }
    owned(set.encode())
}

/// Window: aggRemovableAddToSetFinalize(state) - distinct values
pub(super) fn agg_removable_add_to_set_finalize(args: &mut Args) -> Result<Operand> {
    let set = RemovableSet::decode(args.take_value(0), "aggRemovableAddToSetFinalize")?;
    let mut result = ArraySet::with_collator(set.values.collator().cloned());
    for value in set.values.distinct() {
        result.insert(value.clone());
    }
    owned(Value::ArraySet(result))
}
