//! Time series window accumulators: integral, derivative and linear fill.
//!
//! Points are `(sortBy, input)` pairs. With a time unit the sort values must
//! be dates and distances are measured in that unit; without one they must be
//! numbers. Window queues are plain arrays with the oldest point first.

use std::cmp::Ordering;

use docvm_foundation::numeric;
use docvm_foundation::{Array, Error, Operand, Result, Value, compare_values};

use super::double_double::SumState;
use super::state::{self, pack, shape_error, unpack};
use super::{Args, owned};
use crate::datetime::TimeUnit;

/// Milliseconds in `unit`, Null without a unit.
///
/// # Errors
///
/// `InvalidArgument` for an unknown unit or one of variable length.
fn unit_millis(unit: &Value, name: &str) -> Result<Value> {
    if unit.is_nullish() {
        return Ok(Value::Null);
    }
    unit.as_str()
        .and_then(TimeUnit::parse)
        .and_then(TimeUnit::fixed_millis)
        .map(Value::Int64)
        .ok_or_else(|| {
            Error::invalid_argument(format!(
                "{name}: unit must be one of week, day, hour, minute, second or millisecond, got {unit}"
            ))
        })
}

/// The sort position of a point as a number.
///
/// # Errors
///
/// `InvalidArgument` when the sort value does not suit the unit.
#[allow(clippy::cast_precision_loss)]
fn position(sort_by: &Value, unit: &Value, name: &str) -> Result<f64> {
    let x = match (sort_by, unit.is_nullish()) {
        (Value::Date(ms), false) => Some(*ms as f64),
        (v, true) if v.is_number() => numeric::to_f64(v),
        _ => None,
    };
    x.ok_or_else(|| {
        let expected = if unit.is_nullish() { "a number" } else { "a date" };
        Error::invalid_argument(format!("{name}: sortBy must be {expected}, got {sort_by}"))
    })
}

fn number(input: &Value) -> Option<f64> {
    if input.is_number() {
        numeric::to_f64(input)
    } else {
        None
    }
}

/// Area under the segment between two points by the trapezoidal rule.
fn trapezoid((x1, y1): (f64, f64), (x2, y2): (f64, f64)) -> f64 {
    (x2 - x1) * (y1 + y2) / 2.0
}

/// The input and sort queues of a window.
struct Queues {
    inputs: Array,
    sort_by: Array,
}

impl Queues {
    fn decode(inputs: Value, sort_by: Value, name: &str) -> Result<Self> {
        let queues = Self {
            inputs: state::array(inputs, name)?,
            sort_by: state::array(sort_by, name)?,
        };
        if queues.inputs.len() != queues.sort_by.len() {
            return Err(shape_error(name, "queues differ in length"));
        }
        Ok(queues)
    }

    fn len(&self) -> usize {
        self.inputs.len()
    }

    /// The point at `i` as numbers.
    fn point(&self, i: usize, unit: &Value, name: &str) -> Result<Option<(f64, f64)>> {
        let (Some(input), Some(sort_by)) = (self.inputs.get(i), self.sort_by.get(i)) else {
            return Ok(None);
        };
        let x = position(sort_by, unit, name)?;
        Ok(number(input).map(|y| (x, y)))
    }

    fn last_point(&self, unit: &Value, name: &str) -> Result<Option<(f64, f64)>> {
        match self.len() {
            0 => Ok(None),
            n => self.point(n - 1, unit, name),
        }
    }

    fn push(&mut self, input: Value, sort_by: Value) {
        self.inputs.push_back(input);
        self.sort_by.push_back(sort_by);
    }

    /// Pops the oldest point, checking it is the one being removed.
    ///
    /// # Errors
    ///
    /// `Internal` when the window is empty or its oldest point differs.
    fn pop_front(&mut self, input: &Value, sort_by: &Value, name: &str) -> Result<()> {
        let matches = |queue: &Array, value: &Value| {
            queue
                .first()
                .is_some_and(|v| compare_values(v, value, None) == Ordering::Equal)
        };
        if !matches(&self.inputs, input) || !matches(&self.sort_by, sort_by) {
            return Err(Error::internal(format!(
                "{name}: removed point is not the oldest in the window"
            )));
        }
        self.inputs.pop_front();
        self.sort_by.pop_front();
        Ok(())
    }

    fn encode(self) -> [Value; 2] {
        [Value::Array(self.inputs), Value::Array(self.sort_by)]
    }
}

// =============================================================================
// Integral
// =============================================================================

/// Decoded `[inputQueue, sortByQueue, integral, nanCount, unitMillis]`.
struct Integral {
    queues: Queues,
    integral: SumState,
    nan_count: i64,
    unit: Value,
}

impl Integral {
    fn decode(value: Value, name: &str) -> Result<Self> {
        let [inputs, sort_by, integral, nan_count, unit] = unpack(value, name)?;
        Ok(Self {
            queues: Queues::decode(inputs, sort_by, name)?,
            integral: SumState::decode(integral, name)?,
            nan_count: state::int(&nan_count, name)?,
            unit,
        })
    }

    fn encode(self) -> Value {
        let [inputs, sort_by] = self.queues.encode();
        pack([
            inputs,
            sort_by,
            self.integral.encode(),
            Value::Int64(self.nan_count),
            self.unit,
        ])
    }

    /// Adds (`sign` 1) or removes (`sign` -1) the area of one segment.
    fn apply(&mut self, area: f64, sign: i64) {
        if area.is_finite() {
            let area = Value::Double(area);
            if sign > 0 {
                self.integral.add(&area);
            } else {
                self.integral.remove(&area);
            }
        } else {
            self.nan_count += sign;
        }
    }
}

/// Window: aggIntegralInit(unit) - unit may be Null
///
/// # Errors
///
/// `InvalidArgument` for a unit of variable length.
pub(super) fn agg_integral_init(args: &mut Args) -> Result<Operand> {
    let unit = unit_millis(args.get(0), "aggIntegralInit")?;
    let integral = SumState {
        widest: numeric::NumericWidth::Double,
        ..SumState::default()
    };
    owned(
        Integral {
            queues: Queues {
                inputs: Array::new(),
                sort_by: Array::new(),
            },
            integral,
            nan_count: 0,
            unit,
        }
        .encode(),
    )
}

/// Window: aggIntegralAdd(state, input, sortBy) - non-numeric inputs are skipped
///
/// # Errors
///
/// `InvalidArgument` when the sort value does not suit the unit.
pub(super) fn agg_integral_add(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggIntegralAdd";
    let mut acc = Integral::decode(args.take_value(0), NAME)?;
    let (input, sort_by) = (args.take_value(1), args.take_value(2));
    let Some(y) = number(&input) else {
        return owned(acc.encode());
    };
    let x = position(&sort_by, &acc.unit, NAME)?;
    if let Some(prev) = acc.queues.last_point(&acc.unit, NAME)? {
        acc.apply(trapezoid(prev, (x, y)), 1);
    }
    acc.queues.push(input.to_heap(), sort_by.to_heap());
    owned(acc.encode())
}

/// Window: aggIntegralRemove(state, input, sortBy) - drops the oldest point
///
/// # Errors
///
/// `Internal` when the point is not the oldest one in the window.
pub(super) fn agg_integral_remove(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggIntegralRemove";
    let mut acc = Integral::decode(args.take_value(0), NAME)?;
    let (input, sort_by) = (args.get(1), args.get(2));
    if number(input).is_none() {
        return owned(acc.encode());
    }
    if let (Some(first), Some(second)) = (
        acc.queues.point(0, &acc.unit, NAME)?,
        acc.queues.point(1, &acc.unit, NAME)?,
    ) {
        acc.apply(trapezoid(first, second), -1);
    }
    acc.queues.pop_front(input, sort_by, NAME)?;
    if acc.queues.len() < 2 {
        acc.integral = SumState {
            widest: numeric::NumericWidth::Double,
            ..SumState::default()
        };
        acc.nan_count = 0;
    }
    owned(acc.encode())
}

/// Window: aggIntegralFinalize(state) - Null for an empty window
#[allow(clippy::cast_precision_loss)]
pub(super) fn agg_integral_finalize(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggIntegralFinalize";
    let acc = Integral::decode(args.take_value(0), NAME)?;
    if acc.queues.inputs.is_empty() {
        return owned(Value::Null);
    }
    if acc.nan_count > 0 {
        return owned(Value::Double(f64::NAN));
    }
    let area = acc.integral.dd.value();
    let result = match acc.unit {
        Value::Int64(ms) if ms > 0 => area / ms as f64,
        _ => area,
    };
    owned(Value::Double(result))
}

// =============================================================================
// Derivative
// =============================================================================

/// Decoded `[inputQueue, sortByQueue, unitMillis]`.
struct Derivative {
    queues: Queues,
    unit: Value,
}

impl Derivative {
    fn decode(value: Value, name: &str) -> Result<Self> {
        let [inputs, sort_by, unit] = unpack(value, name)?;
        Ok(Self {
            queues: Queues::decode(inputs, sort_by, name)?,
            unit,
        })
    }

    fn encode(self) -> Value {
        let [inputs, sort_by] = self.queues.encode();
        pack([inputs, sort_by, self.unit])
    }
}

/// Window: aggDerivativeInit(unit) - unit may be Null
pub(super) fn agg_derivative_init(args: &mut Args) -> Result<Operand> {
    let unit = unit_millis(args.get(0), "aggDerivativeInit")?;
    let queues = Queues {
        inputs: Array::new(),
        sort_by: Array::new(),
    };
    owned(Derivative { queues, unit }.encode())
}

/// Window: aggDerivativeAdd(state, input, sortBy) - non-numeric inputs are skipped
pub(super) fn agg_derivative_add(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggDerivativeAdd";
    let mut acc = Derivative::decode(args.take_value(0), NAME)?;
    let (input, sort_by) = (args.take_value(1), args.take_value(2));
    if number(&input).is_some() {
        position(&sort_by, &acc.unit, NAME)?;
        acc.queues.push(input.to_heap(), sort_by.to_heap());
    }
    owned(acc.encode())
}

/// Window: aggDerivativeRemove(state, input, sortBy)
pub(super) fn agg_derivative_remove(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggDerivativeRemove";
    let mut acc = Derivative::decode(args.take_value(0), NAME)?;
    let (input, sort_by) = (args.get(1), args.get(2));
    if number(input).is_some() {
        acc.queues.pop_front(input, sort_by, NAME)?;
    }
    owned(acc.encode())
}

/// Window: aggDerivativeFinalize(state) - slope between the oldest and newest points
///
/// Null with fewer than two points or when both share a sort position.
#[allow(clippy::cast_precision_loss)]
pub(super) fn agg_derivative_finalize(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggDerivativeFinalize";
    let acc = Derivative::decode(args.take_value(0), NAME)?;
    if acc.queues.len() < 2 {
        return owned(Value::Null);
    }
    let (Some((x1, y1)), Some((x2, y2))) = (
        acc.queues.point(0, &acc.unit, NAME)?,
        acc.queues.last_point(&acc.unit, NAME)?,
    ) else {
        return owned(Value::Null);
    };
    let mut run = x2 - x1;
    if let Value::Int64(ms) = acc.unit {
        run /= ms as f64;
    }
    if run == 0.0 {
        return owned(Value::Null);
    }
    owned(Value::Double((y2 - y1) / run))
}

// =============================================================================
// Linear Fill
// =============================================================================

/// Decoded `[x1, y1, x2, y2, prevX, count]`.
///
/// `(x1, y1)` and `(x2, y2)` are the two most recent points with a non-null
/// input; `prevX` is the sort value added last.
struct LinearFill {
    x1: Value,
    y1: Value,
    x2: Value,
    y2: Value,
    prev_x: Value,
    count: i64,
}

impl LinearFill {
    fn decode(value: Value, name: &str) -> Result<Self> {
        let [x1, y1, x2, y2, prev_x, count] = unpack(value, name)?;
        Ok(Self {
            x1,
            y1,
            x2,
            y2,
            prev_x,
            count: state::int(&count, name)?,
        })
    }

    fn encode(self) -> Value {
        pack([
            self.x1,
            self.y1,
            self.x2,
            self.y2,
            self.prev_x,
            Value::Int64(self.count),
        ])
    }
}

fn same_position(a: &Value, b: &Value) -> bool {
    compare_values(a, b, None) == Ordering::Equal
}

/// Window: aggLinearFillInit()
pub(super) fn agg_linear_fill_init(_: &mut Args) -> Result<Operand> {
    owned(pack([
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Int64(0),
    ]))
}

/// Window: aggLinearFillCanAdd(state) - false once the last point added has an input
pub(super) fn agg_linear_fill_can_add(args: &mut Args) -> Result<Operand> {
    let fill = LinearFill::decode(args.take_value(0), "aggLinearFillCanAdd")?;
    let can_add = fill.count == 0 || !same_position(&fill.prev_x, &fill.x2);
    owned(Value::Bool(can_add))
}

/// Window: aggLinearFillAdd(state, input, sortBy)
///
/// # Errors
///
/// `InvalidArgument` for a repeated sort value, a sort value that is neither
/// a number nor a date, or an input that is neither a number nor null.
pub(super) fn agg_linear_fill_add(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggLinearFillAdd";
    let mut fill = LinearFill::decode(args.take_value(0), NAME)?;
    let (input, sort_by) = (args.take_value(1), args.take_value(2));
    if !(sort_by.is_number() || matches!(sort_by, Value::Date(_))) {
        return Err(Error::invalid_argument(format!(
            "{NAME}: sortBy must be a number or a date, got {sort_by}"
        )));
    }
    if !(input.is_number() || input.is_nullish()) {
        return Err(Error::invalid_argument(format!(
            "{NAME}: linear fill input must be a number or null, got {input}"
        )));
    }
    if fill.count > 0 && same_position(&fill.prev_x, &sort_by) {
        return Err(Error::invalid_argument(format!(
            "{NAME}: there can be no repeated values in the sort field, found {sort_by} twice"
        )));
    }
    let sort_by = sort_by.to_heap();
    fill.prev_x = sort_by.clone();
    fill.count += 1;
    if !input.is_nullish() {
        if !fill.y2.is_nullish() {
            fill.x1 = std::mem::take(&mut fill.x2);
            fill.y1 = std::mem::take(&mut fill.y2);
        }
        fill.x2 = sort_by;
        fill.y2 = input.to_heap();
    }
    owned(fill.encode())
}

/// Window: aggLinearFillFinalize(state, sortBy) - the input interpolated at sortBy
///
/// Null when sortBy is not between two points with an input.
#[allow(clippy::cast_precision_loss)]
pub(super) fn agg_linear_fill_finalize(args: &mut Args) -> Result<Operand> {
    let fill = LinearFill::decode(args.take_value(0), "aggLinearFillFinalize")?;
    let x = args.get(1);
    if !fill.x2.is_nullish() && same_position(x, &fill.x2) {
        return owned(fill.y2);
    }
    if !fill.x1.is_nullish() && same_position(x, &fill.x1) {
        return owned(fill.y1);
    }
    let coordinate = |v: &Value| match v {
        Value::Date(ms) => Some(*ms as f64),
        v => number(v),
    };
    let points = (
        coordinate(&fill.x1),
        number(&fill.y1),
        coordinate(&fill.x2),
        number(&fill.y2),
        coordinate(x),
    );
    let (Some(x1), Some(y1), Some(x2), Some(y2), Some(x)) = points else {
        return owned(Value::Null);
    };
    if !(x1 < x && x < x2) {
        return owned(Value::Null);
    }
    owned(Value::Double(y1 + (y2 - y1) * (x - x1) / (x2 - x1)))
}

#[cfg(test)]
mod tests {
    use docvm_foundation::ErrorKind;

    use super::*;

    type Routine = fn(&mut Args) -> Result<Operand>;

    fn call(f: Routine, args: Vec<Value>) -> Value {
        f(&mut Args::from(args)).unwrap().into_owned()
    }

    fn add_points(f: Routine, mut state: Value, points: &[(i32, i32)]) -> Value {
        for (x, y) in points {
            state = call(f, vec![state, Value::Int32(*y), Value::Int32(*x)]);
        }
        state
    }

    #[test]
    fn integral_by_trapezoids() {
        let init = call(agg_integral_init, vec![Value::Null]);
        assert_eq!(call(agg_integral_finalize, vec![init.clone()]), Value::Null);
        let state = add_points(agg_integral_add, init, &[(0, 0), (2, 2), (4, 0)]);
        assert_eq!(call(agg_integral_finalize, vec![state.clone()]), Value::Double(4.0));
        let state = call(agg_integral_remove, vec![state, Value::Int32(0), Value::Int32(0)]);
        assert_eq!(call(agg_integral_finalize, vec![state]), Value::Double(2.0));
    }

    #[test]
    fn integral_with_unit() {
        let init = call(agg_integral_init, vec!["second".into()]);
        let mut state = init;
        for (ms, y) in [(0, 1), (2000, 1)] {
            state = call(agg_integral_add, vec![state, Value::Int32(y), Value::Date(ms)]);
        }
        assert_eq!(call(agg_integral_finalize, vec![state.clone()]), Value::Double(2.0));

        let err = agg_integral_add(&mut Args::from(vec![state, Value::Int32(1), Value::Int32(5)]))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)));
        assert!(agg_integral_init(&mut Args::from(vec!["month".into()])).is_err());
    }

    #[test]
    fn integral_nan_and_removal_order() {
        let init = call(agg_integral_init, vec![Value::Null]);
        let state = add_points(agg_integral_add, init, &[(0, 1), (1, 1)]);
        let nan = call(
            agg_integral_add,
            vec![state.clone(), Value::Double(f64::NAN), Value::Int32(2)],
        );
        assert!(matches!(
            call(agg_integral_finalize, vec![nan]),
            Value::Double(f) if f.is_nan()
        ));
        let err = agg_integral_remove(&mut Args::from(vec![state, Value::Int32(1), Value::Int32(1)]))
            .unwrap_err();
        assert!(!err.is_user_facing());
    }

    #[test]
    fn derivative_slope() {
        let init = call(agg_derivative_init, vec![Value::Null]);
        let one = add_points(agg_derivative_add, init, &[(1, 10)]);
        assert_eq!(call(agg_derivative_finalize, vec![one.clone()]), Value::Null);
        let state = add_points(agg_derivative_add, one, &[(3, 14), (5, 30)]);
        assert_eq!(call(agg_derivative_finalize, vec![state.clone()]), Value::Double(5.0));
        let state = call(agg_derivative_remove, vec![state, Value::Int32(10), Value::Int32(1)]);
        assert_eq!(call(agg_derivative_finalize, vec![state]), Value::Double(8.0));
    }

    #[test]
    fn derivative_per_hour() {
        let mut state = call(agg_derivative_init, vec!["hour".into()]);
        for (ms, y) in [(0, 0), (1_800_000, 5)] {
            state = call(agg_derivative_add, vec![state, Value::Int32(y), Value::Date(ms)]);
        }
        assert_eq!(call(agg_derivative_finalize, vec![state]), Value::Double(10.0));
    }

    #[test]
    fn linear_fill_interpolates() {
        let mut state = call(agg_linear_fill_init, vec![]);
        assert_eq!(call(agg_linear_fill_can_add, vec![state.clone()]), Value::Bool(true));
        state = add_points(agg_linear_fill_add, state, &[(0, 10)]);
        assert_eq!(call(agg_linear_fill_can_add, vec![state.clone()]), Value::Bool(false));
        state = call(agg_linear_fill_add, vec![state, Value::Null, Value::Int32(1)]);
        assert_eq!(call(agg_linear_fill_can_add, vec![state.clone()]), Value::Bool(true));
        state = add_points(agg_linear_fill_add, state, &[(4, 30)]);

        let at = |state: &Value, x: i32| call(agg_linear_fill_finalize, vec![state.clone(), Value::Int32(x)]);
        assert_eq!(at(&state, 0), Value::Int32(10));
        assert_eq!(at(&state, 1), Value::Double(15.0));
        assert_eq!(at(&state, 4), Value::Int32(30));
        assert_eq!(at(&state, 5), Value::Null);
    }

    #[test]
    fn linear_fill_rejects_bad_input() {
        let state = add_points(agg_linear_fill_add, call(agg_linear_fill_init, vec![]), &[(1, 1)]);
        let repeated = agg_linear_fill_add(&mut Args::from(vec![
            state.clone(),
            Value::Int32(2),
            Value::Int32(1),
        ]));
        assert!(matches!(repeated.unwrap_err().kind, ErrorKind::InvalidArgument(_)));
        let text = agg_linear_fill_add(&mut Args::from(vec![state, "x".into(), Value::Int32(2)]));
        assert!(matches!(text.unwrap_err().kind, ErrorKind::InvalidArgument(_)));
    }
}
