//! Bytecode instruction set for the docvm interpreter.
//!
//! Instructions are a one byte tag followed by their parameters and then
//! their immediates, all little-endian. The static stack effect of every
//! instruction is given by [`Instruction::stack_offset`]; the builder uses it
//! to track the running and maximum operand-stack depth.

#![allow(clippy::doc_markdown)]

use std::fmt;

use docvm_foundation::{Error, Result, Value};

/// Identifies a frame of local variables inside a fragment.
pub type FrameId = i64;

/// Identifies a jump target inside a fragment.
pub type LabelId = i64;

/// Identifies a slot accessor supplied by the caller.
pub type SlotId = u32;

macro_rules! instructions {
    ($($(#[$doc:meta])* $variant:ident = $name:literal, $offset:expr;)*) => {
        /// A single bytecode instruction tag.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Instruction {
            $($(#[$doc])* $variant,)*
        }

        impl Instruction {
            /// Every instruction, in tag order.
            pub const ALL: &'static [Instruction] = &[$(Instruction::$variant,)*];

            /// Name used in traces and error context.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Instruction::$variant => $name,)*
                }
            }

            /// Net operand-stack delta, assuming every parameter is popped.
            ///
            /// `function` and `functionSmall` depend on their arity; the table
            /// reports zero for them and the builder accounts for the arity.
            #[must_use]
            pub const fn stack_offset(self) -> i64 {
                match self {
                    $(Instruction::$variant => $offset,)*
                }
            }
        }
    };
}

instructions! {
    /// `[] -> [constant]`
    PushConstVal = "pushConstVal", 1;
    /// `[] -> [view of slot]`
    PushAccessVal = "pushAccessVal", 1;
    /// `[] -> [owned copy of slot]`
    PushOwnedAccessorVal = "pushOwnedAccessorVal", 1;
    /// `[] -> [view of environment slot]`
    PushEnvAccessorVal = "pushEnvAccessorVal", 1;
    /// `[] -> [slot value, moved out]`
    PushMoveVal = "pushMoveVal", 1;
    /// `[] -> [view of local]`
    PushLocalVal = "pushLocalVal", 1;
    /// `[] -> [local, moved out]`
    PushMoveLocalVal = "pushMoveLocalVal", 1;
    /// `[] -> [lambda]`
    PushLocalLambda = "pushLocalLambda", 1;
    /// `[a] -> []`
    Pop = "pop", -1;
    /// `[a, b] -> [b, a]`
    Swap = "swap", 0;
    /// `[a, b] -> [a + b]`
    Add = "add", -1;
    /// `[a, b] -> [a - b]`
    Sub = "sub", -1;
    /// `[a, b] -> [a * b]`
    Mul = "mul", -1;
    /// `[a, b] -> [a / b]`
    Div = "div", -1;
    /// `[a, b] -> [a div b]`
    IDiv = "idiv", -1;
    /// `[a, b] -> [a mod b]`
    Mod = "mod", -1;
    /// `[a] -> [-a]`
    Negate = "negate", 0;
    /// `[a] -> [a as tag]`
    NumConvert = "numConvert", 0;
    /// `[a] -> [!a]`
    LogicNot = "logicNot", 0;
    /// `[a, b] -> [a < b]`
    Less = "less", -1;
    /// `[a, b] -> [a <= b]`
    LessEq = "lessEq", -1;
    /// `[a, b] -> [a > b]`
    Greater = "greater", -1;
    /// `[a, b] -> [a >= b]`
    GreaterEq = "greaterEq", -1;
    /// `[a, b] -> [a == b]`
    Eq = "eq", -1;
    /// `[a, b] -> [a != b]`
    Neq = "neq", -1;
    /// `[a, b] -> [cmp(a, b)]`
    Cmp3w = "cmp3w", -1;
    /// `[a, b, collator] -> [a < b]`
    CollLess = "collLess", -2;
    /// `[a, b, collator] -> [a <= b]`
    CollLessEq = "collLessEq", -2;
    /// `[a, b, collator] -> [a > b]`
    CollGreater = "collGreater", -2;
    /// `[a, b, collator] -> [a >= b]`
    CollGreaterEq = "collGreaterEq", -2;
    /// `[a, b, collator] -> [a == b]`
    CollEq = "collEq", -2;
    /// `[a, b, collator] -> [a != b]`
    CollNeq = "collNeq", -2;
    /// `[a, b, collator] -> [cmp(a, b)]`
    CollCmp3w = "collCmp3w", -2;
    /// `[a, b] -> [a or b if a is Nothing]`
    FillEmpty = "fillEmpty", -1;
    /// `[a] -> [a or constant if a is Nothing]`
    FillEmptyImm = "fillEmptyImm", 0;
    /// `[obj, name] -> [obj.name]`
    GetField = "getField", -1;
    /// `[obj] -> [obj.name]`
    GetFieldImm = "getFieldImm", 0;
    /// `[arr, idx] -> [arr[idx]]`
    GetElement = "getElement", -1;
    /// `[value, collator] -> [comparison key]`
    CollComparisonKey = "collComparisonKey", -1;
    /// `[container, key] -> [field or element]`
    GetFieldOrElement = "getFieldOrElement", -1;
    /// `[input, lambda, maxDepth] -> [result]`
    TraverseP = "traverseP", -2;
    /// `[input] -> [result]`
    TraversePImm = "traversePImm", 0;
    /// `[input, lambda, compareArray] -> [result]`
    TraverseF = "traverseF", -2;
    /// `[input] -> [result]`
    TraverseFImm = "traverseFImm", 0;
    /// `[input, key] -> [result]`
    TraverseMagicImm = "traverseMagicImm", -1;
    /// `[cell, lambda] -> [result]`
    TraverseCsiCellValues = "traverseCsiCellValues", -1;
    /// `[cell, lambda] -> [result]`
    TraverseCsiCellTypes = "traverseCsiCellTypes", -1;
    /// `[obj, name, value] -> [obj']`
    SetField = "setField", -2;
    /// `[arr] -> [size]`
    GetArraySize = "getArraySize", 0;
    /// `[acc, value] -> [acc']`
    AggSum = "aggSum", -1;
    /// `[acc, value] -> [acc']`
    AggMin = "aggMin", -1;
    /// `[acc, value] -> [acc']`
    AggMax = "aggMax", -1;
    /// `[acc, value] -> [acc']`
    AggFirst = "aggFirst", -1;
    /// `[acc, value] -> [acc']`
    AggLast = "aggLast", -1;
    /// `[acc, collator, value] -> [acc']`
    AggCollMin = "aggCollMin", -2;
    /// `[acc, collator, value] -> [acc']`
    AggCollMax = "aggCollMax", -2;
    /// `[a] -> [a is not Nothing]`
    Exists = "exists", 0;
    /// `[a] -> [a is Null]`
    IsNull = "isNull", 0;
    /// `[a] -> [a is an object]`
    IsObject = "isObject", 0;
    /// `[a] -> [a is an array]`
    IsArray = "isArray", 0;
    /// `[a] -> [a is a string]`
    IsString = "isString", 0;
    /// `[a] -> [a is a number]`
    IsNumber = "isNumber", 0;
    /// `[a] -> [a is binary data]`
    IsBinData = "isBinData", 0;
    /// `[a] -> [a is a date]`
    IsDate = "isDate", 0;
    /// `[a] -> [a is NaN]`
    IsNaN = "isNaN", 0;
    /// `[a] -> [a is infinite]`
    IsInfinity = "isInfinity", 0;
    /// `[a] -> [a is a record id]`
    IsRecordId = "isRecordId", 0;
    /// `[a] -> [a is MinKey]`
    IsMinKey = "isMinKey", 0;
    /// `[a] -> [a is MaxKey]`
    IsMaxKey = "isMaxKey", 0;
    /// `[a] -> [a is a timestamp]`
    IsTimestamp = "isTimestamp", 0;
    /// `[a] -> [tag(a) in mask]`
    TypeMatchImm = "typeMatchImm", 0;
    /// `[args...] -> [result]`
    Function = "function", 0;
    /// `[args...] -> [result]`
    FunctionSmall = "functionSmall", 0;
    /// Unconditional relative jump.
    Jmp = "jmp", 0;
    /// `[cond] -> []`, jumps on true.
    JmpTrue = "jmpTrue", -1;
    /// `[cond] -> []`, jumps on false.
    JmpFalse = "jmpFalse", -1;
    /// `[a] -> [a]`, jumps if a is Nothing.
    JmpNothing = "jmpNothing", 0;
    /// `[a] -> [a]`, jumps if a is not Nothing.
    JmpNotNothing = "jmpNotNothing", 0;
    /// Ends the current invocation.
    Ret = "ret", 0;
    /// Reserves operand-stack capacity.
    AllocStack = "allocStack", 0;
    /// `[code, message] -> !`
    Fail = "fail", -1;
    /// `[timezoneDb, date] -> [truncated date]`
    DateTruncImm = "dateTruncImm", -1;
}

impl Instruction {
    /// Decodes an instruction tag.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// Number of parameters (pop or frame-local) the instruction decodes.
    #[must_use]
    pub const fn param_count(self) -> usize {
        use Instruction as I;
        match self {
            I::Add
            | I::Sub
            | I::Mul
            | I::Div
            | I::IDiv
            | I::Mod
            | I::Less
            | I::LessEq
            | I::Greater
            | I::GreaterEq
            | I::Eq
            | I::Neq
            | I::Cmp3w
            | I::GetField
            | I::GetElement
            | I::CollComparisonKey
            | I::GetFieldOrElement
            | I::DateTruncImm => 2,
            I::CollLess
            | I::CollLessEq
            | I::CollGreater
            | I::CollGreaterEq
            | I::CollEq
            | I::CollNeq
            | I::CollCmp3w => 3,
            I::Negate
            | I::NumConvert
            | I::LogicNot
            | I::GetFieldImm
            | I::GetArraySize
            | I::Exists
            | I::IsNull
            | I::IsObject
            | I::IsArray
            | I::IsString
            | I::IsNumber
            | I::IsBinData
            | I::IsDate
            | I::IsNaN
            | I::IsInfinity
            | I::IsRecordId
            | I::IsMinKey
            | I::IsMaxKey
            | I::IsTimestamp
            | I::TypeMatchImm => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an instruction finds one of its operands.
///
/// The default parameter pops its operand from the top of the stack. A
/// frame-local parameter reads local variable `var` of `frame` in place,
/// which leaves the stack untouched and costs one extra stack slot in the
/// static accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Parameter {
    /// `(frame, variable)` for a frame-local read.
    pub local: Option<(FrameId, u32)>,
}

impl Parameter {
    /// Pops the operand from the stack.
    pub const POP: Parameter = Parameter { local: None };

    /// Reads local variable `var` of `frame` without popping.
    #[must_use]
    pub const fn local(frame: FrameId, var: u32) -> Self {
        Self {
            local: Some((frame, var)),
        }
    }

    /// Returns true if the operand is popped.
    #[must_use]
    pub const fn is_pop(&self) -> bool {
        self.local.is_none()
    }
}

/// Constants encodable by `fillEmptyImm` and `traversePImm`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ImmConstant {
    /// Nothing.
    Nothing = 0,
    /// Null.
    Null = 1,
    /// Boolean false.
    False = 2,
    /// Boolean true.
    True = 3,
    /// Int32 one.
    Int32One = 4,
}

impl ImmConstant {
    /// Decodes a constant byte.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Nothing),
            1 => Some(Self::Null),
            2 => Some(Self::False),
            3 => Some(Self::True),
            4 => Some(Self::Int32One),
            _ => None,
        }
    }

    /// The value of the constant.
    #[must_use]
    pub const fn value(self) -> Value {
        match self {
            Self::Nothing => Value::Nothing,
            Self::Null => Value::Null,
            Self::False => Value::Bool(false),
            Self::True => Value::Bool(true),
            Self::Int32One => Value::Int32(1),
        }
    }
}

/// Magic traversal flag: access array-typed elements by index.
pub const MAGIC_PRE_TRAVERSE: u8 = 0b01;

/// Magic traversal flag: also visit elements of array-typed access results.
pub const MAGIC_POST_TRAVERSE: u8 = 0b10;

/// A decoded parameter: popped, or a distance from the current stack top.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParamSource {
    Pop,
    Offset(usize),
}

/// Sequential little-endian reader over an instruction stream.
///
/// Reading past the end of the stream is an internal error; a sealed fragment
/// never produces one.
pub(crate) struct CodeReader<'a> {
    code: &'a [u8],
    pub(crate) pc: usize,
}

impl<'a> CodeReader<'a> {
    pub(crate) fn new(code: &'a [u8], pc: usize) -> Self {
        Self { code, pc }
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pc + N;
        let slice = self
            .code
            .get(self.pc..end)
            .ok_or_else(|| Error::internal(format!("truncated instruction stream at {}", self.pc)))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pc = end;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.bytes()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.bytes()?))
    }

    pub(crate) fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.bytes()?))
    }

    /// A `u8` length followed by that many UTF-8 bytes.
    pub(crate) fn str(&mut self) -> Result<&'a str> {
        let len = usize::from(self.u8()?);
        let end = self.pc + len;
        let bytes = self
            .code
            .get(self.pc..end)
            .ok_or_else(|| Error::internal("truncated inline string"))?;
        self.pc = end;
        std::str::from_utf8(bytes).map_err(|_| Error::internal("inline string is not UTF-8"))
    }

    /// Reads a relative code offset and returns the absolute target.
    ///
    /// Offsets are relative to the position just past the offset itself.
    pub(crate) fn target(&mut self) -> Result<usize> {
        let offset = i64::from(self.i32()?);
        let target = i64::try_from(self.pc).unwrap_or(i64::MAX) + offset;
        usize::try_from(target)
            .ok()
            .filter(|t| *t <= self.code.len())
            .ok_or_else(|| Error::internal(format!("jump target {target} outside code")))
    }

    pub(crate) fn param(&mut self) -> Result<ParamSource> {
        if self.u8()? != 0 {
            return Ok(ParamSource::Pop);
        }
        let offset = self.i32()?;
        usize::try_from(offset)
            .map(ParamSource::Offset)
            .map_err(|_| Error::internal(format!("negative local offset {offset}")))
    }
}
