//! Stack-based interpreter for docvm bytecode.
//!
//! The VM executes a sealed [`CodeFragment`] and produces exactly one
//! [`Operand`].
//!
//! # Operand Stack
//!
//! Every stack entry is an [`Operand`]: an owned value or a borrowed view.
//! Popping an entry drops it, which releases an owned value exactly once;
//! a view never releases its owner's data. On any error the stack is drained
//! back to where the invocation started before the error propagates.
//!
//! # Lambdas
//!
//! Lambdas are code positions inside the same fragment. Invoking one pushes
//! its argument, runs the interpreter from that position until `ret`, and
//! replaces the argument with the lambda's result. There is no call stack:
//! a lambda invocation is a nested run of the interpreter loop, bounded by
//! [`VmConfig::max_lambda_depth`].
//!
//! # Slots
//!
//! Programs read their inputs through [`SlotAccess`]. When a program reads
//! no slots, [`Vm::run`] supplies [`NoSlots`].

#![allow(clippy::too_many_lines)]

mod context;
#[cfg(test)]
mod tests;
mod traverse;

pub use context::{NoSlots, SlotAccess, SlotTable};

use tracing::{debug, instrument, trace};

use docvm_foundation::numeric::{self, exact_i64};
use docvm_foundation::{
    Error, ErrorContext, Object, Operand, Result, TimeZoneDb, TypeMask, TypeTag, Value,
    compare_3way,
};

use crate::arith::{self, CompareOp};
use crate::builtin::{Args, Builtin};
use crate::config::VmConfig;
use crate::datetime::{self, DayOfWeek, TimeUnit};
use crate::fragment::CodeFragment;
use crate::opcode::{CodeReader, ImmConstant, Instruction, ParamSource};

/// What the interpreter loop does after an instruction.
enum Flow {
    Continue,
    Return,
}

/// Stack-based virtual machine.
///
/// A `Vm` is cheap to create and holds no program state between runs apart
/// from its stack allocation. One `Vm` runs one program at a time; share the
/// immutable [`CodeFragment`] and give each thread its own `Vm`.
#[derive(Debug)]
pub struct Vm {
    /// Operand stack.
    stack: Vec<Operand>,
    /// Current nesting of lambda invocations.
    lambda_depth: usize,
    config: VmConfig,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates a VM with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Creates a VM with `config`.
    #[must_use]
    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: Vec::with_capacity(config.initial_stack_capacity),
            lambda_depth: 0,
            config,
        }
    }

    /// The VM's configuration.
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Number of values currently on the operand stack.
    ///
    /// Zero between runs, including after a failed run.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Runs a program that reads no slots.
    ///
    /// # Errors
    ///
    /// See [`Vm::run_with`].
    pub fn run(&mut self, code: &CodeFragment) -> Result<Operand> {
        self.run_with(code, &mut NoSlots)
    }

    /// Runs a program from its first instruction and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the error raised by an instruction or builtin, with the
    /// failing instruction recorded in its context. Returns an internal error
    /// when validation is on and the fragment has pending fixups, or when the
    /// program does not leave exactly one value on the stack.
    #[instrument(level = "debug", skip_all, fields(len = code.len()))]
    pub fn run_with<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
    ) -> Result<Operand> {
        if self.config.validate_fragments {
            code.check()?;
        }
        let base = self.stack.len();
        self.stack
            .reserve(usize::try_from(code.max_stack_size()).unwrap_or_default());

        let result = self.execute(code, slots, 0).and_then(|()| {
            let left = self.stack.len().saturating_sub(base);
            if left == 1 {
                self.pop()
            } else {
                Err(Error::internal(format!(
                    "program left {left} values on the stack, expected 1"
                )))
            }
        });
        if result.is_err() {
            self.drain(base);
        }
        result
    }

    /// Runs a predicate program: true only for a Boolean true result.
    ///
    /// # Errors
    ///
    /// See [`Vm::run_with`].
    pub fn run_predicate(&mut self, code: &CodeFragment) -> Result<bool> {
        self.run_predicate_with(code, &mut NoSlots)
    }

    /// Runs a predicate program with slot access.
    ///
    /// # Errors
    ///
    /// See [`Vm::run_with`].
    pub fn run_predicate_with<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
    ) -> Result<bool> {
        let result = self.run_with(code, slots)?;
        Ok(matches!(result.value(), Value::Bool(true)))
    }

    /// Releases everything above `base`.
    fn drain(&mut self, base: usize) {
        let released = self.stack.len().saturating_sub(base);
        self.stack.truncate(base);
        debug!(released, "drained operand stack after error");
    }

    // =========================================================================
    // Stack Primitives
    // =========================================================================

    fn push(&mut self, operand: Operand) {
        self.stack.push(operand);
    }

    fn push_owned(&mut self, value: Value) {
        self.stack.push(Operand::Owned(value));
    }

    fn pop(&mut self) -> Result<Operand> {
        self.stack
            .pop()
            .ok_or_else(|| Error::internal("operand stack underflow"))
    }

    fn top(&self) -> Result<&Operand> {
        self.stack
            .last()
            .ok_or_else(|| Error::internal("operand stack underflow"))
    }

    /// Index of the entry `offset` places below the top.
    fn local_index(&self, offset: usize) -> Result<usize> {
        self.stack
            .len()
            .checked_sub(offset + 1)
            .ok_or_else(|| Error::internal(format!("local offset {offset} below the stack")))
    }

    /// Decodes `N` parameters and resolves them last to first.
    ///
    /// Popped parameters are owned by the caller; frame-local ones are views.
    fn params<const N: usize>(&mut self, reader: &mut CodeReader<'_>) -> Result<[Operand; N]> {
        let mut sources = [ParamSource::Pop; N];
        for source in &mut sources {
            *source = reader.param()?;
        }
        let mut operands: [Operand; N] = std::array::from_fn(|_| Operand::default());
        for i in (0..N).rev() {
            operands[i] = match sources[i] {
                ParamSource::Pop => self.pop()?,
                ParamSource::Offset(offset) => self.stack[self.local_index(offset)?].view(),
            };
        }
        Ok(operands)
    }

    fn unary(&mut self, reader: &mut CodeReader<'_>, f: impl FnOnce(&Value) -> Value) -> Result<()> {
        let [input] = self.params(reader)?;
        self.push_owned(f(input.value()));
        Ok(())
    }

    fn binary(
        &mut self,
        reader: &mut CodeReader<'_>,
        f: impl FnOnce(&Value, &Value) -> Value,
    ) -> Result<()> {
        let [lhs, rhs] = self.params(reader)?;
        self.push_owned(f(lhs.value(), rhs.value()));
        Ok(())
    }

    fn collated(
        &mut self,
        reader: &mut CodeReader<'_>,
        f: impl FnOnce(&Value, &Value, &dyn docvm_foundation::Collator) -> Value,
    ) -> Result<()> {
        let [lhs, rhs, collator] = self.params(reader)?;
        let result = match collator.value().as_collator() {
            Some(collator) => f(lhs.value(), rhs.value(), collator),
            None => Value::Nothing,
        };
        self.push_owned(result);
        Ok(())
    }

    /// Type predicate: Nothing in, Nothing out.
    fn predicate(&mut self, reader: &mut CodeReader<'_>, test: impl FnOnce(&Value) -> bool) -> Result<()> {
        self.unary(reader, |v| {
            if v.is_nothing() {
                Value::Nothing
            } else {
                Value::Bool(test(v))
            }
        })
    }

    // =========================================================================
    // Interpreter Loop
    // =========================================================================

    /// Runs from `pc` until `ret` or the end of the code.
    fn execute<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        pc: usize,
    ) -> Result<()> {
        let instrs = code.instrs();
        let mut reader = CodeReader::new(instrs, pc);
        while reader.pc < instrs.len() {
            let offset = reader.pc;
            let byte = reader.u8()?;
            let instr = Instruction::from_u8(byte).ok_or_else(|| {
                Error::internal(format!("unknown instruction tag {byte} at offset {offset}"))
            })?;
            if self.config.trace_instructions {
                trace!(offset, instr = instr.name(), depth = self.stack.len(), "execute");
            }
            match self.step(code, slots, &mut reader, instr) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Return) => return Ok(()),
                Err(error) => return Err(locate(error, instr, offset)),
            }
        }
        Ok(())
    }

    fn step<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        reader: &mut CodeReader<'_>,
        instr: Instruction,
    ) -> Result<Flow> {
        use Instruction as I;
        match instr {
            // Stack and accessors
            I::PushConstVal => {
                let index = reader.u32()? as usize;
                let value = code
                    .constants()
                    .get(index)
                    .ok_or_else(|| Error::internal(format!("constant {index} out of range")))?;
                self.push(Operand::Borrowed(value.clone()));
            }
            I::PushAccessVal | I::PushOwnedAccessorVal => {
                let slot = reader.u32()?;
                let value = slots
                    .get(slot)
                    .ok_or_else(|| Error::internal(format!("unknown slot {slot}")))?
                    .clone();
                self.push(if instr == I::PushAccessVal {
                    Operand::Borrowed(value)
                } else {
                    Operand::Owned(value)
                });
            }
            I::PushEnvAccessorVal => {
                let slot = reader.u32()?;
                let value = slots.env(slot).cloned().unwrap_or_default();
                self.push(Operand::Borrowed(value));
            }
            I::PushMoveVal => {
                let slot = reader.u32()?;
                let value = slots
                    .take(slot)
                    .ok_or_else(|| Error::internal(format!("unknown slot {slot}")))?;
                self.push_owned(value);
            }
            I::PushLocalVal | I::PushMoveLocalVal => {
                let offset = usize::try_from(reader.i32()?)
                    .map_err(|_| Error::internal("negative local offset"))?;
                let index = self.local_index(offset)?;
                let operand = if instr == I::PushLocalVal {
                    self.stack[index].view()
                } else {
                    self.stack[index].take()
                };
                self.push(operand);
            }
            I::PushLocalLambda => {
                let target = reader.target()?;
                self.push_owned(Value::LocalLambda(target));
            }
            I::Pop => {
                self.pop()?;
            }
            I::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(Error::internal("operand stack underflow"));
                }
                self.stack.swap(len - 1, len - 2);
            }

            // Arithmetic
            I::Add => self.binary(reader, arith::add)?,
            I::Sub => self.binary(reader, arith::sub)?,
            I::Mul => self.binary(reader, arith::mul)?,
            I::Div => self.binary(reader, arith::div)?,
            I::IDiv => self.binary(reader, arith::idiv)?,
            I::Mod => self.binary(reader, arith::modulo)?,
            I::Negate => self.unary(reader, arith::negate)?,
            I::NumConvert => {
                let [input] = self.params(reader)?;
                let byte = reader.u8()?;
                let target = TypeTag::from_u8(byte)
                    .ok_or_else(|| Error::internal(format!("bad numConvert target {byte}")))?;
                self.push_owned(arith::num_convert(input.value(), target));
            }
            I::LogicNot => self.unary(reader, |v| match v {
                Value::Bool(b) => Value::Bool(!b),
                _ => Value::Nothing,
            })?,

            // Comparison
            I::Less => self.binary(reader, |a, b| arith::generic_compare(CompareOp::Less, a, b, None))?,
            I::LessEq => {
                self.binary(reader, |a, b| arith::generic_compare(CompareOp::LessEq, a, b, None))?;
            }
            I::Greater => {
                self.binary(reader, |a, b| arith::generic_compare(CompareOp::Greater, a, b, None))?;
            }
            I::GreaterEq => {
                self.binary(reader, |a, b| {
                    arith::generic_compare(CompareOp::GreaterEq, a, b, None)
                })?;
            }
            I::Eq => self.binary(reader, |a, b| arith::generic_compare(CompareOp::Eq, a, b, None))?,
            I::Neq => self.binary(reader, |a, b| arith::generic_compare(CompareOp::Neq, a, b, None))?,
            I::Cmp3w => self.binary(reader, |a, b| compare_3way(a, b, None))?,
            I::CollLess | I::CollLessEq | I::CollGreater | I::CollGreaterEq | I::CollEq | I::CollNeq => {
                let op = match instr {
                    I::CollLess => CompareOp::Less,
                    I::CollLessEq => CompareOp::LessEq,
                    I::CollGreater => CompareOp::Greater,
                    I::CollGreaterEq => CompareOp::GreaterEq,
                    I::CollEq => CompareOp::Eq,
                    _ => CompareOp::Neq,
                };
                self.collated(reader, |a, b, c| arith::generic_compare(op, a, b, Some(c)))?;
            }
            I::CollCmp3w => self.collated(reader, |a, b, c| compare_3way(a, b, Some(c)))?,

            // Missing values
            I::FillEmpty => {
                let fallback = self.pop()?;
                let value = self.pop()?;
                self.push(if value.value().is_nothing() { fallback } else { value });
            }
            I::FillEmptyImm => {
                let byte = reader.u8()?;
                let constant = ImmConstant::from_u8(byte)
                    .ok_or_else(|| Error::internal(format!("bad immediate constant {byte}")))?;
                if self.top()?.value().is_nothing() {
                    self.pop()?;
                    self.push_owned(constant.value());
                }
            }

            // Field and element access
            I::GetField => {
                let [object, name] = self.params(reader)?;
                let field = name.value().as_str().and_then(|n| object.value().field(n));
                self.push(child(&object, field));
            }
            I::GetFieldImm => {
                let [object] = self.params(reader)?;
                let name = reader.str()?;
                let field = object.value().field(name);
                self.push(child(&object, field));
            }
            I::GetElement => {
                let [array, index] = self.params(reader)?;
                let element = exact_i64(index.value())
                    .and_then(|i| usize::try_from(i).ok())
                    .filter(|_| array.value().is_array())
                    .and_then(|i| array.value().element(i));
                self.push(child(&array, element));
            }
            I::GetFieldOrElement => {
                let [container, key] = self.params(reader)?;
                let found = key
                    .value()
                    .as_str()
                    .and_then(|k| traverse::access(container.value(), k));
                self.push(child(&container, found));
            }
            I::CollComparisonKey => {
                let [value, collator] = self.params(reader)?;
                let key = match collator.value().as_collator() {
                    Some(c) if !value.value().is_nothing() => arith::comparison_key(value.value(), c),
                    _ => Value::Nothing,
                };
                self.push_owned(key);
            }
            I::GetArraySize => self.unary(reader, |v| {
                v.array_len()
                    .and_then(|n| i64::try_from(n).ok())
                    .map_or(Value::Nothing, Value::Int64)
            })?,
            I::SetField => {
                let value = self.pop()?;
                let name = self.pop()?;
                let object = self.pop()?;
                self.push_owned(set_field(object.into_owned(), name.value(), value.into_owned()));
            }

            // Traversal
            I::TraverseP => {
                let depth = self.pop()?;
                let lambda = lambda_position(self.pop()?.value())?;
                let input = self.pop()?;
                let depth = match depth.value() {
                    Value::Nothing => None,
                    v => Some(
                        exact_i64(v)
                            .and_then(|d| usize::try_from(d).ok())
                            .ok_or_else(|| Error::internal(format!("bad traverseP depth {v}")))?,
                    ),
                };
                let result = self.traverse_p(code, slots, input, lambda, depth)?;
                self.push(result);
            }
            I::TraversePImm => {
                let byte = reader.u8()?;
                let depth = match ImmConstant::from_u8(byte) {
                    Some(ImmConstant::Nothing) => None,
                    Some(ImmConstant::Int32One) => Some(1),
                    _ => return Err(Error::internal(format!("bad traversePImm depth {byte}"))),
                };
                let lambda = reader.target()?;
                let input = self.pop()?;
                let result = self.traverse_p(code, slots, input, lambda, depth)?;
                self.push(result);
            }
            I::TraverseF => {
                let compare_array = matches!(self.pop()?.value(), Value::Bool(true));
                let lambda = lambda_position(self.pop()?.value())?;
                let input = self.pop()?;
                let result = self.traverse_f(code, slots, input, lambda, compare_array)?;
                self.push_owned(Value::Bool(result));
            }
            I::TraverseFImm => {
                let compare_array = reader.u8()? != 0;
                let lambda = reader.target()?;
                let input = self.pop()?;
                let result = self.traverse_f(code, slots, input, lambda, compare_array)?;
                self.push_owned(Value::Bool(result));
            }
            I::TraverseMagicImm => {
                let flags = reader.u8()?;
                let lambda = reader.target()?;
                let key = self.pop()?;
                let input = self.pop()?;
                let result = self.traverse_magic(code, slots, &input, key.value(), lambda, flags)?;
                self.push_owned(Value::Bool(result));
            }
            I::TraverseCsiCellValues | I::TraverseCsiCellTypes => {
                let lambda = lambda_position(self.pop()?.value())?;
                let cell = self.pop()?;
                let result = match cell.value() {
                    Value::CsiCell(cell) if instr == I::TraverseCsiCellValues => {
                        Value::Bool(self.traverse_cell_values(code, slots, cell, lambda)?)
                    }
                    Value::CsiCell(cell) => Value::Bool(self.traverse_cell_types(code, slots, cell, lambda)?),
                    _ => Value::Nothing,
                };
                self.push_owned(result);
            }

            // Group aggregates
            I::AggSum => {
                let value = self.pop()?;
                let acc = self.pop()?;
                self.push_owned(arith::agg_sum(acc.into_owned(), value.value()));
            }
            I::AggMin | I::AggMax | I::AggFirst | I::AggLast => {
                let value = self.pop()?.into_owned();
                let acc = self.pop()?.into_owned();
                self.push_owned(match instr {
                    I::AggMin => arith::agg_min(acc, value, None),
                    I::AggMax => arith::agg_max(acc, value, None),
                    I::AggFirst => arith::agg_first(acc, value),
                    _ => arith::agg_last(acc, value),
                });
            }
            I::AggCollMin | I::AggCollMax => {
                let value = self.pop()?.into_owned();
                let collator = self.pop()?;
                let acc = self.pop()?.into_owned();
                let collator = collator.value().as_collator();
                self.push_owned(if instr == I::AggCollMin {
                    arith::agg_min(acc, value, collator)
                } else {
                    arith::agg_max(acc, value, collator)
                });
            }

            // Type predicates
            I::Exists => self.unary(reader, |v| Value::Bool(!v.is_nothing()))?,
            I::IsNull => self.predicate(reader, |v| matches!(v, Value::Null))?,
            I::IsObject => self.predicate(reader, Value::is_object)?,
            I::IsArray => self.predicate(reader, Value::is_array)?,
            I::IsString => self.predicate(reader, Value::is_string)?,
            I::IsNumber => self.predicate(reader, Value::is_number)?,
            I::IsBinData | I::IsRecordId => self.predicate(reader, |_| false)?,
            I::IsDate => self.predicate(reader, |v| matches!(v, Value::Date(_)))?,
            I::IsNaN => self.predicate(reader, numeric::is_nan)?,
            I::IsInfinity => self.predicate(reader, numeric::is_infinity)?,
            I::IsMinKey => self.predicate(reader, |v| matches!(v, Value::MinKey))?,
            I::IsMaxKey => self.predicate(reader, |v| matches!(v, Value::MaxKey))?,
            I::IsTimestamp => self.predicate(reader, |v| matches!(v, Value::Timestamp(_)))?,
            I::TypeMatchImm => {
                let [input] = self.params(reader)?;
                let mask = TypeMask(reader.u32()?);
                let value = input.value();
                self.push_owned(if value.is_nothing() {
                    Value::Nothing
                } else {
                    Value::Bool(mask.contains(value.tag()))
                });
            }

            // Builtins
            I::Function | I::FunctionSmall => {
                let id = reader.u16()?;
                let arity = if instr == I::FunctionSmall {
                    u32::from(reader.u8()?)
                } else {
                    reader.u32()?
                };
                let builtin = Builtin::from_u16(id)
                    .ok_or_else(|| Error::internal(format!("unknown builtin id {id}")))?;
                let first = self
                    .stack
                    .len()
                    .checked_sub(arity as usize)
                    .ok_or_else(|| Error::internal("operand stack underflow"))?;
                let args = Args::new(self.stack.drain(first..));
                let result = builtin.call(args)?;
                self.push(result);
            }

            // Control flow
            I::Jmp => {
                reader.pc = reader.target()?;
            }
            I::JmpTrue | I::JmpFalse => {
                let target = reader.target()?;
                let condition = self.pop()?;
                let wanted = instr == I::JmpTrue;
                if matches!(condition.value(), Value::Bool(b) if *b == wanted) {
                    reader.pc = target;
                }
            }
            I::JmpNothing | I::JmpNotNothing => {
                let target = reader.target()?;
                let nothing = self.top()?.value().is_nothing();
                if nothing == (instr == I::JmpNothing) {
                    reader.pc = target;
                }
            }
            I::Ret => return Ok(Flow::Return),
            I::AllocStack => {
                let size = reader.u32()?;
                self.stack.reserve(size as usize);
            }
            I::Fail => {
                let message = self.pop()?;
                let code = self.pop()?;
                let (Some(code), Some(message)) = (exact_i64(code.value()), message.value().as_str())
                else {
                    return Err(Error::internal("fail expects an integer code and a string message"));
                };
                return Err(Error::failed(code, message));
            }
            I::DateTruncImm => {
                let [timezone_db, date] = self.params(reader)?;
                let unit = reader.u8()?;
                let unit = TimeUnit::from_u8(unit)
                    .ok_or_else(|| Error::internal(format!("bad time unit {unit}")))?;
                let bin_size = reader.i64()?;
                let timezone = reader.str()?;
                let start_of_week = reader.u8()?;
                let start_of_week = DayOfWeek::from_u8(start_of_week)
                    .ok_or_else(|| Error::internal(format!("bad start of week {start_of_week}")))?;
                let fallback = TimeZoneDb::new();
                let db = match timezone_db.value() {
                    Value::TimeZoneDb(db) => db.as_ref(),
                    _ => &fallback,
                };
                let truncated = datetime::date_millis(date.value())
                    .zip(db.resolve(timezone))
                    .and_then(|(ms, offset)| datetime::truncate(ms, unit, bin_size, offset, start_of_week));
                self.push_owned(truncated.map_or(Value::Nothing, Value::Date));
            }
        }
        Ok(Flow::Continue)
    }

    // =========================================================================
    // Lambdas
    // =========================================================================

    /// Runs the lambda at `position` on `argument` and returns its result.
    ///
    /// # Errors
    ///
    /// Returns an internal error past the lambda nesting limit or when the
    /// body does not leave exactly its argument and one result.
    fn invoke<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        position: usize,
        argument: Operand,
    ) -> Result<Operand> {
        if self.lambda_depth >= self.config.max_lambda_depth {
            return Err(Error::internal(format!(
                "lambda nesting exceeds {}",
                self.config.max_lambda_depth
            )));
        }
        let base = self.stack.len();
        self.push(argument);
        self.lambda_depth += 1;
        let outcome = self.execute(code, slots, position);
        self.lambda_depth -= 1;
        outcome?;

        let left = self.stack.len().saturating_sub(base);
        if left != 2 {
            return Err(Error::internal(format!(
                "lambda at {position} left {left} values, expected its argument and a result"
            )));
        }
        let result = self.pop()?;
        // Releases the argument
        self.stack.truncate(base);
        Ok(result)
    }

    /// Runs a predicate lambda: true only for a Boolean true result.
    fn test<S: SlotAccess + ?Sized>(
        &mut self,
        code: &CodeFragment,
        slots: &mut S,
        position: usize,
        argument: Operand,
    ) -> Result<bool> {
        let result = self.invoke(code, slots, position, argument)?;
        Ok(matches!(result.value(), Value::Bool(true)))
    }
}

/// Records the failing instruction unless a nested one already did.
fn locate(mut error: Error, instr: Instruction, offset: usize) -> Error {
    let context = error.context.get_or_insert_with(ErrorContext::new);
    if context.instruction.is_none() {
        context.instruction = Some(instr.name());
        context.offset = Some(offset);
    }
    error
}

fn lambda_position(value: &Value) -> Result<usize> {
    match value {
        Value::LocalLambda(position) => Ok(*position),
        other => Err(Error::internal(format!("expected a lambda, got {}", other.tag()))),
    }
}

/// A value found inside `container`, owned when the container was.
fn child(container: &Operand, found: Option<Value>) -> Operand {
    match found {
        None => Operand::Owned(Value::Nothing),
        Some(value) if container.is_owned() => Operand::Owned(value),
        Some(value) => Operand::Borrowed(value),
    }
}

/// Replaces, appends or (for a Nothing value) removes field `name`.
fn set_field(object: Value, name: &Value, value: Value) -> Value {
    let Some(name) = name.as_str() else {
        return Value::Nothing;
    };
    let mut fields = match object {
        Value::Nothing => Object::new(),
        Value::Object(fields) => fields,
        doc @ Value::BsonObject(_) => doc.object_iter().collect(),
        _ => return Value::Nothing,
    };
    if value.is_nothing() {
        fields.remove(name);
    } else {
        fields.insert(name, value);
    }
    Value::Object(fields)
}
