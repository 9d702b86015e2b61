//! Array traversal instructions.
//!
//! Each traversal repeatedly invokes a lambda through [`Vm::invoke`]; the
//! element passed to the lambda is owned when the traversed input was.

use docvm_foundation::{Array, CellEntry, CsiCell, Object, Operand, Result, Value};

use super::{SlotAccess, Vm};
use crate::fragment::CodeFragment;
use crate::opcode::{MAGIC_POST_TRAVERSE, MAGIC_PRE_TRAVERSE};

/// Field of an object, or element of an array for an all-digits key.
pub(super) fn access(container: &Value, key: &str) -> Option<Value> {
    if container.is_object() {
        return container.field(key);
    }
    if container.is_array() && !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        return key.parse().ok().and_then(|i| container.element(i));
    }
    None
}

/// Wraps `value` with the ownership of the container it came from.
fn element(owned: bool, value: Value) -> Operand {
    if owned {
        Operand::Owned(value)
    } else {
        Operand::Borrowed(value)
    }
}

impl Vm {
    /// Projects `input` through the lambda at `lambda`.
    ///
    /// Arrays are traversed down to `depth` levels (`None` for no limit);
    /// results that are Nothing are dropped.
    pub(super) fn traverse_p<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        input: Operand,
        lambda: usize,
        depth: Option<usize>,
    ) -> Result<Operand> {
        if !input.value().is_array() || depth == Some(0) {
            return self.invoke(code, slots, lambda, input);
        }
        let owned = input.is_owned();
        let mut results = Array::new();
        for value in input.value().array_iter() {
            let result = if value.is_array() {
                self.traverse_p(code, slots, element(owned, value), lambda, depth.map(|d| d - 1))?
            } else {
                self.invoke(code, slots, lambda, element(owned, value))?
            };
            if !result.value().is_nothing() {
                results.push_back(result.into_owned());
            }
        }
        Ok(Operand::Owned(Value::Array(results)))
    }

    /// Filters `input` with the predicate at `lambda`.
    ///
    /// True when any array element matches; with `compare_array` set, the
    /// whole array is tried as well. A scalar input is tested directly.
    pub(super) fn traverse_f<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        input: Operand,
        lambda: usize,
        compare_array: bool,
    ) -> Result<bool> {
        if !input.value().is_array() {
            return self.test(code, slots, lambda, input);
        }
        let owned = input.is_owned();
        for value in input.value().array_iter() {
            if self.test(code, slots, lambda, element(owned, value))? {
                return Ok(true);
            }
        }
        if compare_array {
            return self.test(code, slots, lambda, input);
        }
        Ok(false)
    }

    /// Tests the predicate against every value `key` may name in `input`.
    pub(super) fn traverse_magic<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        input: &Operand,
        key: &Value,
        lambda: usize,
        flags: u8,
    ) -> Result<bool> {
        let Some(key) = key.as_str() else {
            return Ok(false);
        };
        let pre = flags & MAGIC_PRE_TRAVERSE != 0;
        let post = flags & MAGIC_POST_TRAVERSE != 0;

        let mut candidates: Vec<Value> = access(input.value(), key).into_iter().collect();
        if input.value().is_array() {
            for value in input.value().array_iter() {
                if value.is_object() || (pre && value.is_array()) {
                    candidates.extend(access(&value, key));
                }
            }
        }

        let owned = input.is_owned();
        for candidate in candidates {
            if post && candidate.is_array() {
                for value in candidate.array_iter() {
                    if self.test(code, slots, lambda, element(owned, value))? {
                        return Ok(true);
                    }
                }
            }
            if self.test(code, slots, lambda, element(owned, candidate))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Tests the predicate against the scalar values of a cell.
    pub(super) fn traverse_cell_values<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        cell: &CsiCell,
        lambda: usize,
    ) -> Result<bool> {
        let flat = !cell.has_double_nested_arrays();
        for (depth, entry) in cell.entries() {
            let CellEntry::Value(value) = entry else {
                continue;
            };
            if (flat || depth <= 1) && self.test(code, slots, lambda, Operand::Borrowed(value.clone()))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Tests the predicate against the shallow entries of a cell.
    ///
    /// Structural markers stand in for their container: an empty array for
    /// array markers, an empty object for objects.
    pub(super) fn traverse_cell_types<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        cell: &CsiCell,
        lambda: usize,
    ) -> Result<bool> {
        for (depth, entry) in cell.entries() {
            if depth > 1 {
                continue;
            }
            let value = match entry {
                CellEntry::Value(value) => Operand::Borrowed(value.clone()),
                CellEntry::EmptyArray | CellEntry::NestedArray => Operand::Owned(Value::Array(Array::new())),
                CellEntry::Object => Operand::Owned(Value::Object(Object::new())),
            };
            if self.test(code, slots, lambda, value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
