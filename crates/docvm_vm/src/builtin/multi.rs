//! N-element accumulators.
//!
//! `aggMultiInit` creates the state shared by firstN, lastN, topN, bottomN,
//! minN and maxN: `[items, startIdx, maxSize, memUsage, memLimit]`. Only
//! lastN uses `startIdx`, as the head of its ring buffer. topN and bottomN
//! store `[key, value]` pairs.
//!
//! The removable variants used by sliding windows keep every value of the
//! window sorted, in `[sortedItems, maxSize, memUsage, memLimit]`, and cut
//! the N results at finalization.

use std::cmp::Ordering;
use std::sync::Arc;

use docvm_foundation::numeric::exact_i64;
use docvm_foundation::{Array, Collator, Error, Operand, Result, SortSpec, Value, compare_values};

use super::state::{self, count_value, pack, shape_error, size_of, unpack};
use super::{Args, collator_arg, owned};

fn max_size(value: &Value, accumulator: &str) -> Result<usize> {
    match exact_i64(value) {
        Some(n) if n > 0 => Ok(usize::try_from(n).unwrap_or(usize::MAX)),
        _ => Err(Error::invalid_argument(format!(
            "{accumulator}: n must be a positive integer, got {value}"
        ))),
    }
}

fn uninitialized(state: &Value, accumulator: &str) -> Result<()> {
    if state.is_nothing() {
        return Err(shape_error(accumulator, "accumulator was not initialized"));
    }
    Ok(())
}

fn spec_arg<'a>(args: &'a Args, i: usize, accumulator: &str) -> Result<&'a Arc<SortSpec>> {
    match args.get(i) {
        Value::SortSpec(spec) => Ok(spec),
        other => Err(shape_error(accumulator, format!("expected a sort spec, got {}", other.tag()))),
    }
}

fn pair(key: Value, value: Value) -> Value {
    Value::array([key, value])
}

fn pair_key(pair: &Value) -> Value {
    pair.element(0).unwrap_or_default()
}

fn pair_value(pair: &Value) -> Value {
    pair.element(1).unwrap_or_default()
}

// =============================================================================
// State
// =============================================================================

/// Decoded `[items, startIdx, maxSize, memUsage, memLimit]`.
///
/// `items` stays the persistent array taken from the state, so adding to a
/// state touches only the elements that change.
struct MultiState {
    items: Array,
    start: usize,
    max_size: usize,
    mem_usage: i64,
    mem_limit: i64,
    name: &'static str,
}

impl MultiState {
    fn decode(value: Value, name: &'static str) -> Result<Self> {
        uninitialized(&value, name)?;
        let [items, start, max_size, mem_usage, mem_limit] = unpack(value, name)?;
        let max_size = state::count(&max_size, name)?;
        if max_size == 0 {
            return Err(shape_error(name, "maxSize is zero"));
        }
        Ok(Self {
            items: state::array(items, name)?,
            start: state::count(&start, name)?,
            max_size,
            mem_usage: state::int(&mem_usage, name)?,
            mem_limit: state::int(&mem_limit, name)?,
            name,
        })
    }

    fn encode(self) -> Value {
        pack([
            Value::Array(self.items),
            count_value(self.start),
            count_value(self.max_size),
            Value::Int64(self.mem_usage),
            Value::Int64(self.mem_limit),
        ])
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    /// Checks that the state may hold `usage` bytes and records it.
    fn account(&mut self, usage: i64) -> Result<()> {
        if usage > self.mem_limit {
            return Err(Error::memory_limit(self.name, usage, self.mem_limit));
        }
        self.mem_usage = usage;
        Ok(())
    }

    /// Appends `item` to a state that is not full.
    fn push(&mut self, item: Value) -> Result<()> {
        self.account(self.mem_usage.saturating_add(size_of(&item)))?;
        self.items.push_back(item);
        Ok(())
    }

    /// Puts `item` in place of the item at `at`, charging only the difference.
    fn replace(&mut self, at: usize, item: Value) -> Result<()> {
        let evicted = self.items.get(at).map_or(0, size_of);
        let usage = self.mem_usage.saturating_sub(evicted).saturating_add(size_of(&item));
        self.account(usage)?;
        self.items.set(at, item);
        Ok(())
    }

    /// Items in insertion order, unrolling the ring buffer.
    fn ordered(self) -> Vec<Value> {
        let start = self.start.min(self.items.len());
        let mut items: Vec<Value> = self.items.into_iter().collect();
        items.rotate_left(start);
        items
    }

    /// Items sorted by `order`.
    fn sorted(self, order: impl Fn(&Value, &Value) -> Ordering) -> Vec<Value> {
        let mut items: Vec<Value> = self.items.into_iter().collect();
        items.sort_by(order);
        items
    }

    /// Adds `item`, evicting the worst item under `order` once full.
    ///
    /// Items that do not beat the worst retained item are dropped.
    fn offer(&mut self, item: Value, order: impl Fn(&Value, &Value) -> Ordering) -> Result<()> {
        if !self.is_full() {
            return self.push(item);
        }
        let worst = self
            .items
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| order(a, b))
            .map(|(i, worst)| (i, order(&item, worst)));
        match worst {
            Some((i, Ordering::Less)) => self.replace(i, item),
            _ => Ok(()),
        }
    }
}

/// Accumulator: aggMultiInit(maxSize, [memLimit])
///
/// # Errors
///
/// `InvalidArgument` for a non-positive size or memory limit.
pub(super) fn agg_multi_init(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggMultiInit";
    let max_size = max_size(args.get(0), NAME)?;
    let mem_limit = state::memory_limit(args.get(1), NAME)?;
    let state = MultiState {
        items: Array::new(),
        start: 0,
        max_size,
        mem_usage: 0,
        mem_limit,
        name: NAME,
    };
    owned(state.encode())
}

// =============================================================================
// firstN / lastN
// =============================================================================

/// Accumulator: aggFirstNNeedsMoreInput(state)
pub(super) fn agg_first_n_needs_more_input(args: &mut Args) -> Result<Operand> {
    let state = MultiState::decode(args.take_value(0), "aggFirstNNeedsMoreInput")?;
    owned(Value::Bool(!state.is_full()))
}

fn push_first(state: &mut MultiState, value: Value) -> Result<()> {
    if state.is_full() {
        return Ok(());
    }
    let value = if value.is_nothing() { Value::Null } else { value.to_heap() };
    state.push(value)
}

fn push_last(state: &mut MultiState, value: Value) -> Result<()> {
    let value = if value.is_nothing() { Value::Null } else { value.to_heap() };
    if !state.is_full() {
        return state.push(value);
    }
    let head = state.start % state.max_size;
    state.replace(head, value)?;
    state.start = (head + 1) % state.max_size;
    Ok(())
}

/// Accumulator: aggFirstN(state, value) - missing values count as Null
pub(super) fn agg_first_n(args: &mut Args) -> Result<Operand> {
    let mut state = MultiState::decode(args.take_value(0), "aggFirstN")?;
    push_first(&mut state, args.take_value(1))?;
    owned(state.encode())
}

/// Accumulator: aggFirstNMerge(state, other)
pub(super) fn agg_first_n_merge(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggFirstNMerge";
    let mut state = MultiState::decode(args.take_value(0), NAME)?;
    let other = MultiState::decode(args.take_value(1), NAME)?;
    for item in other.ordered() {
        push_first(&mut state, item)?;
    }
    owned(state.encode())
}

/// Accumulator: aggFirstNFinalize(state)
pub(super) fn agg_first_n_finalize(args: &mut Args) -> Result<Operand> {
    let state = MultiState::decode(args.take_value(0), "aggFirstNFinalize")?;
    owned(Value::array(state.ordered()))
}

/// Accumulator: aggLastN(state, value) - missing values count as Null
pub(super) fn agg_last_n(args: &mut Args) -> Result<Operand> {
    let mut state = MultiState::decode(args.take_value(0), "aggLastN")?;
    push_last(&mut state, args.take_value(1))?;
    owned(state.encode())
}

/// Accumulator: aggLastNMerge(state, other) - `other` holds the later values
pub(super) fn agg_last_n_merge(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggLastNMerge";
    let mut state = MultiState::decode(args.take_value(0), NAME)?;
    let other = MultiState::decode(args.take_value(1), NAME)?;
    for item in other.ordered() {
        push_last(&mut state, item)?;
    }
    owned(state.encode())
}

/// Accumulator: aggLastNFinalize(state)
pub(super) fn agg_last_n_finalize(args: &mut Args) -> Result<Operand> {
    let state = MultiState::decode(args.take_value(0), "aggLastNFinalize")?;
    owned(Value::array(state.ordered()))
}

// =============================================================================
// topN / bottomN
// =============================================================================

/// Orders pairs by key; bottomN keeps the greatest keys, so its order is reversed.
fn key_order(spec: &SortSpec, bottom: bool) -> impl Fn(&Value, &Value) -> Ordering + '_ {
    move |a, b| {
        let ord = spec.compare_keys(&pair_key(a), &pair_key(b), None);
        if bottom { ord.reverse() } else { ord }
    }
}

fn select_add(args: &mut Args, bottom: bool, name: &'static str) -> Result<Operand> {
    let mut state = MultiState::decode(args.take_value(0), name)?;
    let spec = Arc::clone(spec_arg(args, 1, name)?);
    let item = pair(args.take_value(2).to_heap(), args.take_value(3).to_heap());
    state.offer(item, key_order(&spec, bottom))?;
    owned(state.encode())
}

fn select_merge(args: &mut Args, bottom: bool, name: &'static str) -> Result<Operand> {
    let mut state = MultiState::decode(args.take_value(0), name)?;
    let other = MultiState::decode(args.take_value(1), name)?;
    let spec = Arc::clone(spec_arg(args, 2, name)?);
    for item in other.items {
        state.offer(item, key_order(&spec, bottom))?;
    }
    owned(state.encode())
}

fn select_finalize(args: &mut Args, name: &'static str) -> Result<Operand> {
    let mut state = MultiState::decode(args.take_value(0), name)?;
    let spec = Arc::clone(spec_arg(args, 1, name)?);
    let items = state.sorted(key_order(&spec, false));
    owned(Value::array(items.iter().map(pair_value)))
}

/// Accumulator: aggTopN(state, sortSpec, key, value)
pub(super) fn agg_top_n(args: &mut Args) -> Result<Operand> {
    select_add(args, false, "aggTopN")
}

/// Accumulator: aggTopNMerge(state, other, sortSpec)
pub(super) fn agg_top_n_merge(args: &mut Args) -> Result<Operand> {
    select_merge(args, false, "aggTopNMerge")
}

/// Accumulator: aggTopNFinalize(state, sortSpec) - values in sort order
pub(super) fn agg_top_n_finalize(args: &mut Args) -> Result<Operand> {
    select_finalize(args, "aggTopNFinalize")
}

/// Accumulator: aggBottomN(state, sortSpec, key, value)
pub(super) fn agg_bottom_n(args: &mut Args) -> Result<Operand> {
    select_add(args, true, "aggBottomN")
}

/// Accumulator: aggBottomNMerge(state, other, sortSpec)
pub(super) fn agg_bottom_n_merge(args: &mut Args) -> Result<Operand> {
    select_merge(args, true, "aggBottomNMerge")
}

/// Accumulator: aggBottomNFinalize(state, sortSpec) - values in sort order
pub(super) fn agg_bottom_n_finalize(args: &mut Args) -> Result<Operand> {
    select_finalize(args, "aggBottomNFinalize")
}

// =============================================================================
// minN / maxN
// =============================================================================

fn value_order(
    collator: Option<&Arc<dyn Collator>>,
    max: bool,
) -> impl Fn(&Value, &Value) -> Ordering + '_ {
    move |a, b| {
        let ord = compare_values(a, b, collator.map(AsRef::as_ref));
        if max { ord.reverse() } else { ord }
    }
}

fn extreme_add(args: &mut Args, collated: bool, max: bool, name: &'static str) -> Result<Operand> {
    let mut state = MultiState::decode(args.take_value(0), name)?;
    let collator = if collated { collator_arg(args.get(1)) } else { None };
    let value = args.take_value(1 + usize::from(collated));
    if !value.is_nullish() {
        state.offer(value.to_heap(), value_order(collator.as_ref(), max))?;
    }
    owned(state.encode())
}

/// Offers every item of `other`, so the merged state still holds at most N.
fn extreme_merge(args: &mut Args, max: bool, name: &'static str) -> Result<Operand> {
    let mut state = MultiState::decode(args.take_value(0), name)?;
    let other = MultiState::decode(args.take_value(1), name)?;
    let collator = collator_arg(args.get(2));
    for item in other.items {
        state.offer(item, value_order(collator.as_ref(), max))?;
    }
    owned(state.encode())
}

fn extreme_finalize(args: &mut Args, max: bool, name: &'static str) -> Result<Operand> {
    let state = MultiState::decode(args.take_value(0), name)?;
    let collator = collator_arg(args.get(1));
    let max_size = state.max_size;
    let items = state.sorted(value_order(collator.as_ref(), max));
    owned(Value::array(items.into_iter().take(max_size)))
}

/// Accumulator: aggMinN(state, value) - nullish values are skipped
pub(super) fn agg_min_n(args: &mut Args) -> Result<Operand> {
    extreme_add(args, false, false, "aggMinN")
}

/// Accumulator: aggMinNMerge(state, other, [collator])
pub(super) fn agg_min_n_merge(args: &mut Args) -> Result<Operand> {
    extreme_merge(args, false, "aggMinNMerge")
}

/// Accumulator: aggMinNFinalize(state, [collator]) - ascending
pub(super) fn agg_min_n_finalize(args: &mut Args) -> Result<Operand> {
    extreme_finalize(args, false, "aggMinNFinalize")
}

/// Accumulator: aggMaxN(state, value) - nullish values are skipped
pub(super) fn agg_max_n(args: &mut Args) -> Result<Operand> {
    extreme_add(args, false, true, "aggMaxN")
}

/// Accumulator: aggMaxNMerge(state, other, [collator])
pub(super) fn agg_max_n_merge(args: &mut Args) -> Result<Operand> {
    extreme_merge(args, true, "aggMaxNMerge")
}

/// Accumulator: aggMaxNFinalize(state, [collator]) - descending
pub(super) fn agg_max_n_finalize(args: &mut Args) -> Result<Operand> {
    extreme_finalize(args, true, "aggMaxNFinalize")
}

/// Accumulator: aggCollMinN(state, collator, value)
pub(super) fn agg_coll_min_n(args: &mut Args) -> Result<Operand> {
    extreme_add(args, true, false, "aggCollMinN")
}

/// Accumulator: aggCollMaxN(state, collator, value)
pub(super) fn agg_coll_max_n(args: &mut Args) -> Result<Operand> {
    extreme_add(args, true, true, "aggCollMaxN")
}

// =============================================================================
// Removable Variants
// =============================================================================

/// Decoded `[sortedItems, maxSize, memUsage, memLimit]`.
struct Removable {
    items: Array,
    max_size: usize,
    mem_usage: i64,
    mem_limit: i64,
    name: &'static str,
}

impl Removable {
    fn decode(value: Value, name: &'static str) -> Result<Self> {
        uninitialized(&value, name)?;
        let [items, max_size, mem_usage, mem_limit] = unpack(value, name)?;
        Ok(Self {
            items: state::array(items, name)?,
            max_size: state::count(&max_size, name)?,
            mem_usage: state::int(&mem_usage, name)?,
            mem_limit: state::int(&mem_limit, name)?,
            name,
        })
    }

    fn encode(self) -> Value {
        pack([
            Value::Array(self.items),
            count_value(self.max_size),
            Value::Int64(self.mem_usage),
            Value::Int64(self.mem_limit),
        ])
    }

    /// Inserts after every item that does not sort after `item`.
    fn insert(&mut self, item: Value, order: impl Fn(&Value, &Value) -> Ordering) -> Result<()> {
        self.mem_usage = self.mem_usage.saturating_add(size_of(&item));
        if self.mem_usage > self.mem_limit {
            return Err(Error::memory_limit(self.name, self.mem_usage, self.mem_limit));
        }
        let at = self.items.partition_point(|x| order(x, &item) != Ordering::Greater);
        self.items.insert(at, item);
        Ok(())
    }

    /// Removes the first item matching `matches`.
    ///
    /// # Errors
    ///
    /// `Internal` when nothing matches: the window removed a value it never added.
    fn remove(&mut self, matches: impl Fn(&Value) -> bool) -> Result<()> {
        let Some(at) = self.items.iter().position(matches) else {
            return Err(Error::internal(format!(
                "{}: removed a value that is not in the window",
                self.name
            )));
        };
        let removed = self.items.remove(at);
        self.mem_usage = self.mem_usage.saturating_sub(size_of(&removed));
        Ok(())
    }
}

fn removable_init(args: &Args, name: &'static str) -> Result<Operand> {
    let state = Removable {
        items: Array::new(),
        max_size: max_size(args.get(0), name)?,
        mem_usage: 0,
        mem_limit: state::memory_limit(args.get(1), name)?,
        name,
    };
    owned(state.encode())
}

/// Accumulator: aggRemovableMinMaxNInit(maxSize, [memLimit])
///
/// # Errors
///
/// `InvalidArgument` for a non-positive size or memory limit.
pub(super) fn agg_removable_min_max_n_init(args: &mut Args) -> Result<Operand> {
    removable_init(args, "aggRemovableMinMaxNInit")
}

fn removable_extreme_add(args: &mut Args, name: &'static str) -> Result<Operand> {
    let mut state = Removable::decode(args.take_value(0), name)?;
    let value = args.take_value(1);
    if !value.is_nullish() {
        state.insert(value.to_heap(), value_order(None, false))?;
    }
    owned(state.encode())
}

fn removable_extreme_remove(args: &mut Args, name: &'static str) -> Result<Operand> {
    let mut state = Removable::decode(args.take_value(0), name)?;
    let value = args.get(1);
    if !value.is_nullish() {
        state.remove(|x| compare_values(x, value, None) == Ordering::Equal)?;
    }
    owned(state.encode())
}

/// Accumulator: aggRemovableMinNAdd(state, value)
pub(super) fn agg_removable_min_n_add(args: &mut Args) -> Result<Operand> {
    removable_extreme_add(args, "aggRemovableMinNAdd")
}

/// Accumulator: aggRemovableMinNRemove(state, value)
pub(super) fn agg_removable_min_n_remove(args: &mut Args) -> Result<Operand> {
    removable_extreme_remove(args, "aggRemovableMinNRemove")
}

/// Accumulator: aggRemovableMinNFinalize(state) - the N smallest, ascending
pub(super) fn agg_removable_min_n_finalize(args: &mut Args) -> Result<Operand> {
    let state = Removable::decode(args.take_value(0), "aggRemovableMinNFinalize")?;
    owned(Value::array(state.items.into_iter().take(state.max_size)))
}

/// Accumulator: aggRemovableMaxNAdd(state, value)
pub(super) fn agg_removable_max_n_add(args: &mut Args) -> Result<Operand> {
    removable_extreme_add(args, "aggRemovableMaxNAdd")
}

/// Accumulator: aggRemovableMaxNRemove(state, value)
pub(super) fn agg_removable_max_n_remove(args: &mut Args) -> Result<Operand> {
    removable_extreme_remove(args, "aggRemovableMaxNRemove")
}

/// Accumulator: aggRemovableMaxNFinalize(state) - the N largest, descending
pub(super) fn agg_removable_max_n_finalize(args: &mut Args) -> Result<Operand> {
    let state = Removable::decode(args.take_value(0), "aggRemovableMaxNFinalize")?;
    owned(Value::array(state.items.into_iter().rev().take(state.max_size)))
}

/// Accumulator: aggRemovableTopNInit(maxSize, [memLimit])
///
/// # Errors
///
/// `InvalidArgument` for a non-positive size or memory limit.
pub(super) fn agg_removable_top_n_init(args: &mut Args) -> Result<Operand> {
    removable_init(args, "aggRemovableTopNInit")
}

/// Accumulator: aggRemovableTopNAdd(state, sortSpec, key, value)
pub(super) fn agg_removable_top_n_add(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggRemovableTopNAdd";
    let mut state = Removable::decode(args.take_value(0), NAME)?;
    let spec = Arc::clone(spec_arg(args, 1, NAME)?);
    let item = pair(args.take_value(2).to_heap(), args.take_value(3).to_heap());
    state.insert(item, key_order(&spec, false))?;
    owned(state.encode())
}

/// Accumulator: aggRemovableTopNRemove(state, sortSpec, key, value)
pub(super) fn agg_removable_top_n_remove(args: &mut Args) -> Result<Operand> {
    const NAME: &str = "aggRemovableTopNRemove";
    let mut state = Removable::decode(args.take_value(0), NAME)?;
    let spec = spec_arg(args, 1, NAME)?;
    let (key, value) = (args.get(2), args.get(3));
    state.remove(|item| {
        spec.compare_keys(&pair_key(item), key, None) == Ordering::Equal
            && compare_values(&pair_value(item), value, None) == Ordering::Equal
    })?;
    owned(state.encode())
}

/// Accumulator: aggRemovableTopNFinalize(state, sortSpec) - first N in sort order
pub(super) fn agg_removable_top_n_finalize(args: &mut Args) -> Result<Operand> {
    let state = Removable::decode(args.take_value(0), "aggRemovableTopNFinalize")?;
    let values = state.items.iter().take(state.max_size).map(pair_value);
    owned(Value::array(values))
}

/// Accumulator: aggRemovableBottomNFinalize(state, sortSpec) - last N in sort order
pub(super) fn agg_removable_bottom_n_finalize(args: &mut Args) -> Result<Operand> {
    let state = Removable::decode(args.take_value(0), "aggRemovableBottomNFinalize")?;
    let skip = state.items.len().saturating_sub(state.max_size);
    let values = state.items.iter().skip(skip).map(pair_value);
    owned(Value::array(values))
}

#[cfg(test)]
mod tests {
    use docvm_foundation::{CaseInsensitiveCollator, ErrorKind};

    use super::*;

    type Routine = fn(&mut Args) -> Result<Operand>;

    fn call(f: Routine, args: Vec<Value>) -> Value {
        f(&mut Args::from(args)).unwrap().into_owned()
    }

    fn init(n: i32) -> Value {
        call(agg_multi_init, vec![Value::Int32(n)])
    }

    fn ints(values: &[i32]) -> Vec<Value> {
        values.iter().copied().map(Value::Int32).collect()
    }

    fn fold(f: Routine, state: Value, inputs: Vec<Value>) -> Value {
        inputs.into_iter().fold(state, |acc, v| call(f, vec![acc, v]))
    }

    #[test]
    fn init_validates_size() {
        let err = agg_multi_init(&mut Args::from(vec![Value::Int32(0)])).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)));
        let err = agg_first_n(&mut Args::from(vec![Value::Nothing, Value::Int32(1)])).unwrap_err();
        assert!(!err.is_user_facing());
    }

    #[test]
    fn first_n_stops_when_full() {
        let state = fold(agg_first_n, init(2), vec![Value::Nothing, Value::Int32(2), Value::Int32(3)]);
        assert_eq!(
            call(agg_first_n_needs_more_input, vec![state.clone()]),
            Value::Bool(false)
        );
        assert_eq!(
            call(agg_first_n_finalize, vec![state]),
            Value::array([Value::Null, Value::Int32(2)])
        );
    }

    #[test]
    fn last_n_keeps_a_ring() {
        let state = fold(agg_last_n, init(3), ints(&[1, 2, 3, 4, 5]));
        assert_eq!(call(agg_last_n_finalize, vec![state.clone()]), Value::array(ints(&[3, 4, 5])));

        let later = fold(agg_last_n, init(3), ints(&[6, 7]));
        let merged = call(agg_last_n_merge, vec![state, later]);
        assert_eq!(call(agg_last_n_finalize, vec![merged]), Value::array(ints(&[5, 6, 7])));
    }

    #[test]
    fn top_n_with_descending_spec() {
        let spec = Value::SortSpec(Arc::new(SortSpec::new().desc("k")));
        let mut state = init(2);
        for key in [5, 1, 9, 3] {
            state = call(
                agg_top_n,
                vec![state, spec.clone(), Value::Int32(key), Value::Int32(key)],
            );
        }
        assert_eq!(
            call(agg_top_n_finalize, vec![state, spec]),
            Value::array(ints(&[9, 5]))
        );
    }

    #[test]
    fn bottom_n_and_merge() {
        let spec = Value::SortSpec(Arc::new(SortSpec::new().asc("k")));
        let add = |state: Value, keys: &[i32]| {
            keys.iter().fold(state, |acc, k| {
                call(
                    agg_bottom_n,
                    vec![acc, spec.clone(), Value::Int32(*k), Value::from(format!("v{k}"))],
                )
            })
        };
        let left = add(init(2), &[4, 8, 1]);
        let right = add(init(2), &[6, 2]);
        let merged = call(agg_bottom_n_merge, vec![left, right, spec.clone()]);
        assert_eq!(
            call(agg_bottom_n_finalize, vec![merged, spec]),
            Value::array([Value::from("v6"), Value::from("v8")])
        );
    }

    #[test]
    fn min_and_max_n() {
        let inputs = vec![Value::Int32(4), Value::Null, Value::Int32(1), Value::Int32(7), Value::Int32(3)];
        let min = fold(agg_min_n, init(2), inputs.clone());
        assert_eq!(call(agg_min_n_finalize, vec![min]), Value::array(ints(&[1, 3])));
        let max = fold(agg_max_n, init(2), inputs);
        assert_eq!(call(agg_max_n_finalize, vec![max.clone()]), Value::array(ints(&[7, 4])));

        let more = fold(agg_max_n, init(2), ints(&[5, 9]));
        let merged = call(agg_max_n_merge, vec![max, more]);
        assert_eq!(call(agg_max_n_finalize, vec![merged]), Value::array(ints(&[9, 7])));
    }

    #[test]
    fn collated_min_n() {
        let collator = Value::Collator(Arc::new(CaseInsensitiveCollator));
        let mut state = init(1);
        for s in ["b", "A", "c"] {
            state = call(agg_coll_min_n, vec![state, collator.clone(), s.into()]);
        }
        assert_eq!(
            call(agg_min_n_finalize, vec![state, collator]),
            Value::array([Value::from("A")])
        );
    }

    #[test]
    fn memory_limit_is_enforced() {
        let state = call(agg_multi_init, vec![Value::Int32(10), Value::Int32(100)]);
        let big = Value::from("x".repeat(200));
        let err = agg_first_n(&mut Args::from(vec![state, big])).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MemoryLimitExceeded { .. }));
    }

    fn items_len(state: &Value) -> usize {
        state.element(0).and_then(|items| items.array_len()).unwrap()
    }

    fn mem_usage(state: &Value) -> Value {
        state.element(3).unwrap()
    }

    #[test]
    fn replacing_an_equal_sized_value_at_the_limit() {
        let first = Value::from("aaaaaaaaaa");
        let limit = i64::try_from(first.to_heap().approx_size()).unwrap();
        let state = call(agg_multi_init, vec![Value::Int32(1), Value::Int64(limit)]);

        let state = call(agg_last_n, vec![state, first]);
        let state = call(agg_last_n, vec![state, Value::from("bbbbbbbbbb")]);
        assert_eq!(mem_usage(&state), Value::Int64(limit));
        assert_eq!(
            call(agg_last_n_finalize, vec![state]),
            Value::array([Value::from("bbbbbbbbbb")])
        );

        let state = call(agg_multi_init, vec![Value::Int32(1), Value::Int64(limit)]);
        let state = call(agg_min_n, vec![state, Value::from("zzzzzzzzzz")]);
        let state = call(agg_min_n, vec![state, Value::from("yyyyyyyyyy")]);
        assert_eq!(mem_usage(&state), Value::Int64(limit));
        assert_eq!(
            call(agg_min_n_finalize, vec![state]),
            Value::array([Value::from("yyyyyyyyyy")])
        );
    }

    #[test]
    fn rejected_values_are_not_charged() {
        let state = call(agg_multi_init, vec![Value::Int32(1), Value::Int32(64)]);
        let state = call(agg_min_n, vec![state, Value::Int32(1)]);
        let before = mem_usage(&state);
        // Strings sort above numbers, so a minN of one never admits this
        let state = call(agg_min_n, vec![state, Value::from("x".repeat(200))]);
        assert_eq!(mem_usage(&state), before);
        assert_eq!(call(agg_min_n_finalize, vec![state]), Value::array(ints(&[1])));
    }

    #[test]
    fn merges_stay_within_max_size() {
        let mut state = call(agg_multi_init, vec![Value::Int32(1), Value::Int32(256)]);
        for i in 0..50 {
            let other = call(agg_max_n, vec![init(1), Value::Int32(i)]);
            state = call(agg_max_n_merge, vec![state, other]);
            assert!(items_len(&state) <= 1);
        }
        assert_eq!(call(agg_max_n_finalize, vec![state]), Value::array(ints(&[49])));

        let mut state = init(2);
        for i in [7, 3, 9, 1] {
            let other = fold(agg_min_n, init(2), ints(&[i, i + 10]));
            state = call(agg_min_n_merge, vec![state, other]);
            assert!(items_len(&state) <= 2);
        }
        assert_eq!(call(agg_min_n_finalize, vec![state]), Value::array(ints(&[1, 3])));
    }

    #[test]
    fn collated_merge_uses_the_collator() {
        let collator = Value::Collator(Arc::new(CaseInsensitiveCollator));
        let left = call(agg_coll_max_n, vec![init(1), collator.clone(), "b".into()]);
        let right = call(agg_coll_max_n, vec![init(1), collator.clone(), "C".into()]);
        let merged = call(agg_max_n_merge, vec![left, right, collator.clone()]);
        assert_eq!(items_len(&merged), 1);
        assert_eq!(
            call(agg_max_n_finalize, vec![merged, collator]),
            Value::array([Value::from("C")])
        );
    }

    #[test]
    fn removable_min_max_n() {
        let state = call(agg_removable_min_max_n_init, vec![Value::Int32(2)]);
        let state = fold(agg_removable_min_n_add, state, ints(&[5, 1, 9, 3]));
        let state = call(agg_removable_min_n_remove, vec![state, Value::Int32(1)]);
        assert_eq!(
            call(agg_removable_min_n_finalize, vec![state.clone()]),
            Value::array(ints(&[3, 5]))
        );
        assert_eq!(
            call(agg_removable_max_n_finalize, vec![state.clone()]),
            Value::array(ints(&[9, 5]))
        );
        let err = agg_removable_max_n_remove(&mut Args::from(vec![state, Value::Int32(42)]))
            .unwrap_err();
        assert!(!err.is_user_facing());
    }

    #[test]
    fn removable_top_and_bottom_n() {
        let spec = Value::SortSpec(Arc::new(SortSpec::new().asc("k")));
        let mut state = call(agg_removable_top_n_init, vec![Value::Int32(2)]);
        for k in [5, 1, 9, 3] {
            state = call(
                agg_removable_top_n_add,
                vec![state, spec.clone(), Value::Int32(k), Value::Int32(k * 10)],
            );
        }
        state = call(
            agg_removable_top_n_remove,
            vec![state, spec.clone(), Value::Int32(1), Value::Int32(10)],
        );
        assert_eq!(
            call(agg_removable_top_n_finalize, vec![state.clone(), spec.clone()]),
            Value::array(ints(&[30, 50]))
        );
        assert_eq!(
            call(agg_removable_bottom_n_finalize, vec![state.clone(), spec.clone()]),
            Value::array(ints(&[50, 90]))
        );
        let err = agg_removable_top_n_remove(&mut Args::from(vec![
            state,
            spec,
            Value::Int32(5),
            Value::Int32(0),
        ]))
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Internal(_)));
    }
}
