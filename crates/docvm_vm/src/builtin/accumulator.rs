//! Group accumulators.
//!
//! Each routine takes the accumulator state as its first argument and
//! returns the new state. A Nothing state is a fresh accumulator. Capped
//! accumulators keep `[values, size]` and fail with `MemoryLimitExceeded`
//! once the approximate size of the collected values passes the cap.

use std::sync::Arc;

use docvm_foundation::{Array, ArraySet, Collator, Error, Object, Operand, Result, Value};

use super::state::{self, pack, shape_error, size_of, unpack};
use super::{Args, collator_arg, nothing, owned};

// =============================================================================
// Objects
// =============================================================================

/// Accumulator: mergeObjects(acc, object) - later fields win
///
/// # Errors
///
/// `InvalidArgument` when the input is neither an object nor nullish.
pub(super) fn merge_objects(args: &mut Args) -> Result<Operand> {
    let mut acc = match args.take_value(0) {
        Value::Nothing => Object::new(),
        Value::Object(o) => o,
        other => return Err(shape_error("mergeObjects", format!("got {}", other.tag()))),
    };
    let input = args.get(1);
    if input.is_nullish() {
        return owned(Value::Object(acc));
    }
    if !input.is_object() {
        return Err(Error::invalid_argument(format!(
            "mergeObjects: expected an object, got {}",
            input.tag()
        )));
    }
    for (name, value) in input.object_iter() {
        acc.insert(name, value);
    }
    owned(Value::Object(acc))
}

// =============================================================================
// Standard Deviation
// =============================================================================

/// Welford running moments.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Moments {
    count: i64,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn decode(value: Value, accumulator: &str) -> Result<Self> {
        if value.is_nothing() {
            return Ok(Self::default());
        }
        let [count, mean, m2] = unpack(value, accumulator)?;
        Ok(Self {
            count: state::int(&count, accumulator)?,
            mean: state::double(&mean, accumulator)?,
            m2: state::double(&m2, accumulator)?,
        })
    }

    fn encode(self) -> Value {
        pack([
            Value::Int64(self.count),
            Value::Double(self.mean),
            Value::Double(self.m2),
        ])
    }

    #[allow(clippy::cast_precision_loss)]
    fn add(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    #[allow(clippy::cast_precision_loss)]
    fn merge(&mut self, other: Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }
        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        let delta = other.mean - self.mean;
        self.mean += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.count += other.count;
    }

    #[allow(clippy::cast_precision_loss)]
    fn std_dev(self, sample: bool) -> Value {
        let divisor = if sample { self.count - 1 } else { self.count };
        if divisor <= 0 {
            return Value::Null;
        }
        Value::Double((self.m2 / divisor as f64).max(0.0).sqrt())
    }
}

/// Accumulator: aggStdDev(state, value) - non-numbers are skipped
pub(super) fn agg_std_dev(args: &mut Args) -> Result<Operand> {
    let mut moments = Moments::decode(args.take_value(0), "aggStdDev")?;
    let value = args.get(1);
    if value.is_number() {
        if let Some(x) = value.as_f64() {
            moments.add(x);
        }
    }
    owned(moments.encode())
}

/// Accumulator: aggMergeStdDevs(state, other)
pub(super) fn agg_merge_std_devs(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggMergeStdDevs";
    let mut moments = Moments::decode(args.take_value(0), NAME)?;
    moments.merge(Moments::decode(args.take_value(1), NAME)?);
    owned(moments.encode())
}

/// Accumulator: stdDevPopFinalize - Null when empty
pub(super) fn std_dev_pop_finalize(args: &mut Args) -> Result<Operand> {
    let moments = Moments::decode(args.take_value(0), "stdDevPopFinalize")?;
    owned(moments.std_dev(false))
}

/// Accumulator: stdDevSampFinalize - Null below two values
pub(super) fn std_dev_samp_finalize(args: &mut Args) -> Result<Operand> {
    let moments = Moments::decode(args.take_value(0), "stdDevSampFinalize")?;
    owned(moments.std_dev(true))
}

// =============================================================================
// Collections
// =============================================================================

/// Values collected by a capped accumulator.
struct Capped<T> {
    values: T,
    size: i64,
    limit: i64,
    name: &'static str,
}

impl<T> Capped<T> {
    fn decode(
        value: Value,
        limit: &Value,
        name: &'static str,
        empty: impl FnOnce() -> T,
        slot: impl FnOnce(Value) -> Option<T>,
    ) -> Result<Self> {
        let limit = state::memory_limit(limit, name)?;
        if value.is_nothing() {
            return Ok(Self {
                values: empty(),
                size: 0,
                limit,
                name,
            });
        }
        let [values, size] = unpack(value, name)?;
        let tag = values.tag();
        let values =
            slot(values).ok_or_else(|| shape_error(name, format!("unexpected values {tag}")))?;
        Ok(Self {
            values,
            size: state::int(&size, name)?,
            limit,
            name,
        })
    }

    /// Accounts for `bytes` more, failing past the cap.
    fn grow(&mut self, bytes: i64) -> Result<()> {
        self.size = self.size.saturating_add(bytes);
        if self.size > self.limit {
            return Err(Error::memory_limit(self.name, self.size, self.limit));
        }
        Ok(())
    }

    fn encode(self, wrap: impl FnOnce(T) -> Value) -> Value {
        pack([wrap(self.values), Value::Int64(self.size)])
    }
}

fn array_slot(value: Value) -> Option<Array> {
    match value {
        Value::Array(a) => Some(a),
        _ => None,
    }
}

fn set_slot(value: Value) -> Option<ArraySet> {
    match value {
        Value::ArraySet(s) => Some(s),
        _ => None,
    }
}

fn capped_array(args: &mut Args, limit_arg: usize, name: &'static str) -> Result<Capped<Array>> {
    let limit = args.get(limit_arg).clone();
    Capped::decode(args.take_value(0), &limit, name, Array::new, array_slot)
}

fn capped_set(
    args: &mut Args,
    limit_arg: usize,
    collator: Option<Arc<dyn Collator>>,
    name: &'static str,
) -> Result<Capped<ArraySet>> {
    let limit = args.get(limit_arg).clone();
    Capped::decode(
        args.take_value(0),
        &limit,
        name,
        || ArraySet::with_collator(collator),
        set_slot,
    )
}

fn plain_set(state: Value, collator: Option<Arc<dyn Collator>>, name: &str) -> Result<ArraySet> {
    match state {
        Value::Nothing => Ok(ArraySet::with_collator(collator)),
        Value::ArraySet(set) => Ok(set),
        other => Err(shape_error(name, format!("expected a set, got {}", other.tag()))),
    }
}

fn require_array(value: &Value, name: &str) -> Result<()> {
    if value.is_array() {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "{name}: expected an array, got {}",
            value.tag()
        )))
    }
}

/// Accumulator: addToArray(acc, value) - Nothing values are skipped
pub(super) fn add_to_array(args: &mut Args) -> Result<Operand> {
    let mut acc = match args.take_value(0) {
        Value::Nothing => Array::new(),
        other => state::array(other, "addToArray")?,
    };
    let value = args.take_value(1);
    if !value.is_nothing() {
        acc.push_back(value.to_heap());
    }
    owned(Value::Array(acc))
}

/// Accumulator: addToArrayCapped(state, value, cap)
///
/// # Errors
///
/// `MemoryLimitExceeded` past the cap.
pub(super) fn add_to_array_capped(args: &mut Args) -> Result<Operand> {
    let mut capped = capped_array(args, 2, "addToArrayCapped")?;
    let value = args.take_value(1);
    if !value.is_nothing() {
        capped.grow(size_of(&value))?;
        capped.values.push_back(value.to_heap());
    }
    owned(capped.encode(Value::Array))
}

/// Accumulator: addToSet(acc, value)
pub(super) fn add_to_set(args: &mut Args) -> Result<Operand> {
    let mut set = plain_set(args.take_value(0), None, "addToSet")?;
    let value = args.take_value(1);
    if !value.is_nothing() {
        set.insert(value.to_heap());
    }
    owned(Value::ArraySet(set))
}

/// Accumulator: addToSetCapped(state, value, cap)
///
/// # Errors
///
/// `MemoryLimitExceeded` past the cap.
pub(super) fn add_to_set_capped(args: &mut Args) -> Result<Operand> {
    let mut capped = capped_set(args, 2, None, "addToSetCapped")?;
    let value = args.take_value(1);
    add_capped_member(&mut capped, value)?;
    owned(capped.encode(Value::ArraySet))
}

fn add_capped_member(capped: &mut Capped<ArraySet>, value: Value) -> Result<()> {
    if value.is_nothing() || capped.values.contains(&value) {
        return Ok(());
    }
    capped.grow(size_of(&value))?;
    capped.values.insert(value.to_heap());
    Ok(())
}

/// Accumulator: collAddToSet(acc, collator, value)
pub(super) fn coll_add_to_set(args: &mut Args) -> Result<Operand> {
    let Some(collator) = collator_arg(args.get(1)) else {
        return nothing();
    };
    let mut set = plain_set(args.take_value(0), Some(collator), "collAddToSet")?;
    let value = args.take_value(2);
    if !value.is_nothing() {
        set.insert(value.to_heap());
    }
    owned(Value::ArraySet(set))
}

/// Accumulator: collAddToSetCapped(state, collator, value, cap)
///
/// # Errors
///
/// `MemoryLimitExceeded` past the cap.
pub(super) fn coll_add_to_set_capped(args: &mut Args) -> Result<Operand> {
    let Some(collator) = collator_arg(args.get(1)) else {
        return nothing();
    };
    let mut capped = capped_set(args, 3, Some(collator), "collAddToSetCapped")?;
    let value = args.take_value(2);
    add_capped_member(&mut capped, value)?;
    owned(capped.encode(Value::ArraySet))
}

/// Accumulator: aggConcatArraysCapped(state, array, cap)
///
/// # Errors
///
/// `InvalidArgument` for a non-array input, `MemoryLimitExceeded` past the cap.
pub(super) fn agg_concat_arrays_capped(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggConcatArraysCapped";
    let mut capped = capped_array(args, 2, NAME)?;
    let input = args.get(1);
    if !input.is_nothing() {
        require_array(input, NAME)?;
        capped.grow(size_of(input))?;
        for element in input.array_iter() {
            capped.values.push_back(element.to_heap());
        }
    }
    owned(capped.encode(Value::Array))
}

/// Accumulator: aggSetUnion(acc, array)
///
/// # Errors
///
/// `InvalidArgument` for a non-array input.
pub(super) fn agg_set_union(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggSetUnion";
    let mut set = plain_set(args.take_value(0), None, NAME)?;
    let input = args.get(1);
    if !input.is_nothing() {
        require_array(input, NAME)?;
        for element in input.array_iter() {
            set.insert(element.to_heap());
        }
    }
    owned(Value::ArraySet(set))
}

fn union_capped(args: &mut Args, collated: bool, name: &'static str) -> Result<Operand> {
    let collator = if collated {
        let Some(collator) = collator_arg(args.get(1)) else {
            return nothing();
        };
        Some(collator)
    } else {
        None
    };
    let offset = usize::from(collated);
    let mut capped = capped_set(args, 2 + offset, collator, name)?;
    let input = args.take_value(1 + offset);
    if !input.is_nothing() {
        require_array(&input, name)?;
        for element in input.array_iter() {
            add_capped_member(&mut capped, element)?;
        }
    }
    owned(capped.encode(Value::ArraySet))
}

/// Accumulator: aggSetUnionCapped(state, array, cap)
///
/// # Errors
///
/// `InvalidArgument` for a non-array input, `MemoryLimitExceeded` past the cap.
pub(super) fn agg_set_union_capped(args: &mut Args) -> Result<Operand> {
    union_capped(args, false, "aggSetUnionCapped")
}

/// Accumulator: aggCollSetUnionCapped(state, collator, array, cap)
///
/// # Errors
///
/// `InvalidArgument` for a non-array input, `MemoryLimitExceeded` past the cap.
pub(super) fn agg_coll_set_union_capped(args: &mut Args) -> Result<Operand> {
    union_capped(args, true, "aggCollSetUnionCapped")
}
