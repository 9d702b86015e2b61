//! Code fragments: bytecode under construction.
//!
//! A [`CodeFragment`] is an append-only instruction buffer with a constant
//! pool and two tables of deferred fixups:
//!
//! - **Frames** resolve references to local variables. A reference records a
//!   partial stack offset; once the frame's base stack position is known the
//!   base is subtracted at every recorded site.
//! - **Labels** resolve jump targets. A jump records the negated position of
//!   the end of its offset field; once the label's byte position is known it
//!   is added at every recorded site.
//!
//! Fragments are spliced together with [`CodeFragment::append`] and friends,
//! which rebase the appended fragment's byte positions, constant indices and
//! stack depths into the receiver and merge the fixup tables. Misusing the
//! builder (resolving a frame or label twice, dropping one with pending
//! references, splicing branches of unequal stack effect) is a compiler bug
//! and panics.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::debug;

use docvm_foundation::{Error, Result, TypeMask, TypeTag, Value};

use crate::builtin::Builtin;
use crate::datetime::{DayOfWeek, TimeUnit};
use crate::opcode::{
    FrameId, ImmConstant, Instruction, LabelId, MAGIC_POST_TRAVERSE, MAGIC_PRE_TRAVERSE,
    Parameter, SlotId,
};

/// A fixup table entry.
#[derive(Clone, Debug)]
enum Fixup {
    /// Byte positions of `i32` fields waiting for the position.
    Unresolved(SmallVec<[usize; 2]>),
    /// The resolved position.
    Resolved(i64),
}

#[derive(Clone, Copy, Debug)]
enum FixupKind {
    Frame,
    Label,
}

impl FixupKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Label => "label",
        }
    }

    /// Final field value for a stored partial value and a resolved position.
    const fn resolve(self, stored: i64, position: i64) -> i64 {
        match self {
            Self::Frame => stored - position,
            Self::Label => stored + position,
        }
    }
}

/// Bytecode under construction, and once sealed, ready to run.
#[derive(Clone, Debug, Default)]
pub struct CodeFragment {
    instrs: Vec<u8>,
    constants: Vec<Value>,
    const_sites: Vec<usize>,
    frames: HashMap<FrameId, Fixup>,
    labels: HashMap<LabelId, Fixup>,
    stack_size: i64,
    max_stack_size: i64,
}

fn offset_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or_else(|_| panic!("code offset {value} does not fit in 32 bits"))
}

fn read_i32(instrs: &[u8], site: usize) -> i64 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&instrs[site..site + 4]);
    i64::from(i32::from_le_bytes(bytes))
}

fn write_i32(instrs: &mut [u8], site: usize, value: i64) {
    instrs[site..site + 4].copy_from_slice(&offset_i32(value).to_le_bytes());
}

fn patch_sites(instrs: &mut [u8], sites: &[usize], kind: FixupKind, position: i64) {
    for &site in sites {
        let stored = read_i32(instrs, site);
        write_i32(instrs, site, kind.resolve(stored, position));
    }
}

fn merge_fixup(
    instrs: &mut [u8],
    table: &mut HashMap<i64, Fixup>,
    kind: FixupKind,
    id: i64,
    incoming: Fixup,
) {
    let merged = match (table.remove(&id), incoming) {
        (None, fixup) => fixup,
        (Some(Fixup::Unresolved(mut a)), Fixup::Unresolved(b)) => {
            a.extend(b);
            Fixup::Unresolved(a)
        }
        (Some(Fixup::Resolved(position)), Fixup::Unresolved(sites))
        | (Some(Fixup::Unresolved(sites)), Fixup::Resolved(position)) => {
            patch_sites(instrs, &sites, kind, position);
            Fixup::Resolved(position)
        }
        (Some(Fixup::Resolved(_)), Fixup::Resolved(_)) => {
            panic!("{} {id} is resolved in both fragments", kind.name())
        }
    };
    table.insert(id, merged);
}

fn unresolved_ids(table: &HashMap<i64, Fixup>) -> Vec<i64> {
    let mut ids: Vec<i64> = table
        .iter()
        .filter(|(_, f)| matches!(f, Fixup::Unresolved(sites) if !sites.is_empty()))
        .map(|(id, _)| *id)
        .collect();
    ids.sort_unstable();
    ids
}

macro_rules! param_appenders {
    ($(($name:ident, $instr:ident, $($p:ident),+)),* $(,)?) => {
        $(
            #[doc = concat!("Appends `", stringify!($instr), "`.")]
            pub fn $name(&mut self, $($p: Parameter),+) {
                self.append_instr(Instruction::$instr, &[$($p),+]);
            }
        )*
    };
}

macro_rules! simple_appenders {
    ($(($name:ident, $instr:ident)),* $(,)?) => {
        $(
            #[doc = concat!("Appends `", stringify!($instr), "`.")]
            pub fn $name(&mut self) {
                self.append_instr(Instruction::$instr, &[]);
            }
        )*
    };
}

impl CodeFragment {
    /// Creates an empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The instruction stream.
    #[must_use]
    pub fn instrs(&self) -> &[u8] {
        &self.instrs
    }

    /// The constant pool.
    #[must_use]
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// Length of the instruction stream in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Returns true if no instruction has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Net stack effect of the fragment so far.
    #[must_use]
    pub fn stack_size(&self) -> i64 {
        self.stack_size
    }

    /// Deepest stack depth reached so far, relative to the start.
    #[must_use]
    pub fn max_stack_size(&self) -> i64 {
        self.max_stack_size
    }

    /// Returns true if any frame is still in scope.
    #[must_use]
    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    fn push_u8(&mut self, byte: u8) {
        self.instrs.push(byte);
    }

    fn push_u16(&mut self, value: u16) {
        self.instrs.extend_from_slice(&value.to_le_bytes());
    }

    fn push_u32(&mut self, value: u32) {
        self.instrs.extend_from_slice(&value.to_le_bytes());
    }

    fn push_i32(&mut self, value: i32) {
        self.instrs.extend_from_slice(&value.to_le_bytes());
    }

    fn push_i64(&mut self, value: i64) {
        self.instrs.extend_from_slice(&value.to_le_bytes());
    }

    fn push_str(&mut self, s: &str) {
        let len = u8::try_from(s.len())
            .unwrap_or_else(|_| panic!("inline string of {} bytes is too long", s.len()));
        self.push_u8(len);
        self.instrs.extend_from_slice(s.as_bytes());
    }

    fn adjust_stack(&mut self, delta: i64) {
        self.stack_size += delta;
        self.max_stack_size = self.max_stack_size.max(self.stack_size);
    }

    /// Writes an instruction tag and its parameters and applies its stack
    /// effect.
    ///
    /// Parameters are read last-to-first at runtime, so a frame-local
    /// parameter's offset is computed after the pops of the parameters that
    /// follow it.
    fn append_instr(&mut self, instr: Instruction, params: &[Parameter]) {
        assert_eq!(
            params.len(),
            instr.param_count(),
            "{instr} takes {} parameters",
            instr.param_count()
        );
        let start = self.stack_size;
        self.push_u8(instr as u8);
        let mut locals = 0;
        for (i, param) in params.iter().enumerate() {
            match param.local {
                None => self.push_u8(1),
                Some((frame, var)) => {
                    locals += 1;
                    let pops_after = params[i + 1..].iter().filter(|p| p.is_pop()).count();
                    self.push_u8(0);
                    self.append_local_offset(frame, start - pops_after as i64 - 1 - i64::from(var));
                }
            }
        }
        self.adjust_stack(instr.stack_offset() + locals);
    }

    /// Writes the stack offset of a local variable, or records a fixup.
    fn append_local_offset(&mut self, frame: FrameId, partial: i64) {
        let site = self.instrs.len();
        let resolved = match self
            .frames
            .entry(frame)
            .or_insert_with(|| Fixup::Unresolved(SmallVec::new()))
        {
            Fixup::Resolved(position) => Some(*position),
            Fixup::Unresolved(sites) => {
                sites.push(site);
                None
            }
        };
        let value = resolved.map_or(partial, |position| FixupKind::Frame.resolve(partial, position));
        self.push_i32(offset_i32(value));
    }

    /// Writes a jump offset to a label, or records a fixup.
    fn append_label_offset(&mut self, label: LabelId) {
        let site = self.instrs.len();
        let partial = -((site + 4) as i64);
        let resolved = match self
            .labels
            .entry(label)
            .or_insert_with(|| Fixup::Unresolved(SmallVec::new()))
        {
            Fixup::Resolved(position) => Some(*position),
            Fixup::Unresolved(sites) => {
                sites.push(site);
                None
            }
        };
        let value = resolved.map_or(partial, |position| FixupKind::Label.resolve(partial, position));
        self.push_i32(offset_i32(value));
    }

    // =========================================================================
    // Frames and Labels
    // =========================================================================

    /// Declares the base of `frame` at the current depth plus `offset`.
    ///
    /// Local variable `v` of the frame lives at stack position `base + v`.
    /// Pending references to the frame are resolved.
    ///
    /// # Panics
    ///
    /// Panics if the frame is already declared.
    pub fn declare_frame(&mut self, frame: FrameId, offset: i64) {
        let position = self.stack_size + offset;
        let pending = match self.frames.insert(frame, Fixup::Resolved(position)) {
            Some(Fixup::Resolved(_)) => panic!("frame {frame} is already declared"),
            Some(Fixup::Unresolved(sites)) => sites,
            None => SmallVec::new(),
        };
        patch_sites(&mut self.instrs, &pending, FixupKind::Frame, position);
    }

    /// Removes `frame` from scope.
    ///
    /// # Panics
    ///
    /// Panics if the frame has unresolved references.
    pub fn remove_frame(&mut self, frame: FrameId) {
        if let Some(Fixup::Unresolved(sites)) = self.frames.remove(&frame) {
            assert!(sites.is_empty(), "frame {frame} removed with {} unresolved references", sites.len());
        }
    }

    /// Defines `label` at the current code position.
    ///
    /// # Panics
    ///
    /// Panics if the label is already defined.
    pub fn append_label(&mut self, label: LabelId) {
        let position = self.instrs.len() as i64;
        let pending = match self.labels.insert(label, Fixup::Resolved(position)) {
            Some(Fixup::Resolved(_)) => panic!("label {label} is already defined"),
            Some(Fixup::Unresolved(sites)) => sites,
            None => SmallVec::new(),
        };
        patch_sites(&mut self.instrs, &pending, FixupKind::Label, position);
    }

    /// Removes `label` from scope.
    ///
    /// # Panics
    ///
    /// Panics if jumps to the label are unresolved.
    pub fn remove_label(&mut self, label: LabelId) {
        if let Some(Fixup::Unresolved(sites)) = self.labels.remove(&label) {
            assert!(sites.is_empty(), "label {label} removed with {} unresolved jumps", sites.len());
        }
    }

    /// Shifts every frame position of this fragment by `delta`.
    ///
    /// Used when the fragment is placed on top of `delta` stack values.
    pub fn fixup_stack_offsets(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }
        for fixup in self.frames.values_mut() {
            match fixup {
                Fixup::Resolved(position) => *position += delta,
                Fixup::Unresolved(sites) => {
                    for &site in sites.iter() {
                        let stored = read_i32(&self.instrs, site);
                        write_i32(&mut self.instrs, site, stored + delta);
                    }
                }
            }
        }
    }

    /// Checks that every referenced frame and label is resolved.
    ///
    /// # Errors
    ///
    /// Returns an internal error naming the unresolved ids.
    pub fn check(&self) -> Result<()> {
        let frames = unresolved_ids(&self.frames);
        let labels = unresolved_ids(&self.labels);
        if frames.is_empty() && labels.is_empty() {
            Ok(())
        } else {
            Err(Error::internal(format!(
                "unresolved fixups: frames {frames:?}, labels {labels:?}"
            )))
        }
    }

    /// Asserts that every referenced frame and label is resolved.
    ///
    /// # Panics
    ///
    /// Panics if a fixup is pending.
    pub fn validate(&self) {
        if let Err(e) = self.check() {
            panic!("{e}");
        }
    }

    // =========================================================================
    // Splicing
    // =========================================================================

    /// Copies `other`'s code, constants and fixups after this fragment's
    /// code. Stack depths are left to the caller.
    fn splice(&mut self, other: CodeFragment) {
        let base = self.instrs.len();
        let const_base = u32::try_from(self.constants.len())
            .unwrap_or_else(|_| panic!("constant pool overflow"));
        let CodeFragment {
            mut instrs,
            constants,
            const_sites,
            frames,
            labels,
            ..
        } = other;

        for &site in &const_sites {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&instrs[site..site + 4]);
            let index = u32::from_le_bytes(bytes) + const_base;
            instrs[site..site + 4].copy_from_slice(&index.to_le_bytes());
        }
        // Pending jumps store the negated end of their field, which moves by `base`
        for fixup in labels.values() {
            if let Fixup::Unresolved(sites) = fixup {
                for &site in sites {
                    let stored = read_i32(&instrs, site);
                    write_i32(&mut instrs, site, stored - base as i64);
                }
            }
        }

        self.instrs.extend_from_slice(&instrs);
        self.constants.extend(constants);
        self.const_sites.extend(const_sites.into_iter().map(|s| s + base));

        let rebase = |fixup: Fixup, shift: i64| match fixup {
            Fixup::Unresolved(sites) => Fixup::Unresolved(sites.into_iter().map(|s| s + base).collect()),
            Fixup::Resolved(position) => Fixup::Resolved(position + shift),
        };
        for (id, fixup) in frames {
            merge_fixup(&mut self.instrs, &mut self.frames, FixupKind::Frame, id, rebase(fixup, 0));
        }
        for (id, fixup) in labels {
            merge_fixup(
                &mut self.instrs,
                &mut self.labels,
                FixupKind::Label,
                id,
                rebase(fixup, base as i64),
            );
        }
    }

    /// Appends `other`, which runs on top of this fragment's stack.
    pub fn append(&mut self, mut other: CodeFragment) {
        debug!(at = self.instrs.len(), len = other.len(), stack = other.stack_size, "splicing fragment");
        other.fixup_stack_offsets(self.stack_size);
        self.max_stack_size = self.max_stack_size.max(self.stack_size + other.max_stack_size);
        self.stack_size += other.stack_size;
        self.splice(other);
    }

    /// Appends `other` without accounting its stack effect.
    ///
    /// Used for lambda bodies, which run on a nested invocation's stack.
    pub fn append_no_stack(&mut self, other: CodeFragment) {
        debug!(at = self.instrs.len(), len = other.len(), "splicing fragment without stack");
        self.max_stack_size = self.max_stack_size.max(self.stack_size + other.max_stack_size);
        self.splice(other);
    }

    /// Appends the two arms of a branch; only one of them runs.
    ///
    /// # Panics
    ///
    /// Panics if the arms have different stack effects.
    pub fn append_branches(&mut self, mut lhs: CodeFragment, mut rhs: CodeFragment) {
        assert_eq!(
            lhs.stack_size, rhs.stack_size,
            "branches must have the same stack effect"
        );
        lhs.fixup_stack_offsets(self.stack_size);
        rhs.fixup_stack_offsets(self.stack_size);
        self.max_stack_size = self
            .max_stack_size
            .max(self.stack_size + lhs.max_stack_size)
            .max(self.stack_size + rhs.max_stack_size);
        self.stack_size += lhs.stack_size;
        self.splice(lhs);
        self.splice(rhs);
    }

    // =========================================================================
    // Stack and Accessors
    // =========================================================================

    /// Appends `pushConstVal` for `value`, adding it to the constant pool.
    pub fn append_const_val(&mut self, value: Value) {
        let index = u32::try_from(self.constants.len())
            .unwrap_or_else(|_| panic!("constant pool overflow"));
        self.constants.push(value);
        self.append_instr(Instruction::PushConstVal, &[]);
        self.const_sites.push(self.instrs.len());
        self.push_u32(index);
    }

    fn append_slot(&mut self, instr: Instruction, slot: SlotId) {
        self.append_instr(instr, &[]);
        self.push_u32(slot);
    }

    /// Appends `pushAccessVal`: a view of `slot`.
    pub fn append_access_val(&mut self, slot: SlotId) {
        self.append_slot(Instruction::PushAccessVal, slot);
    }

    /// Appends `pushOwnedAccessorVal`: an owned copy of `slot`.
    pub fn append_owned_accessor_val(&mut self, slot: SlotId) {
        self.append_slot(Instruction::PushOwnedAccessorVal, slot);
    }

    /// Appends `pushEnvAccessorVal`: a view of environment `slot`.
    pub fn append_env_accessor_val(&mut self, slot: SlotId) {
        self.append_slot(Instruction::PushEnvAccessorVal, slot);
    }

    /// Appends `pushMoveVal`: the value of `slot`, moved out.
    pub fn append_move_val(&mut self, slot: SlotId) {
        self.append_slot(Instruction::PushMoveVal, slot);
    }

    /// Appends a push of local variable `var` of `frame`, moving it out when
    /// `move_out` is set.
    pub fn append_local_val(&mut self, frame: FrameId, var: u32, move_out: bool) {
        let start = self.stack_size;
        let instr = if move_out {
            Instruction::PushMoveLocalVal
        } else {
            Instruction::PushLocalVal
        };
        self.append_instr(instr, &[]);
        self.append_local_offset(frame, start - 1 - i64::from(var));
    }

    /// Appends `pushLocalLambda` for the lambda body at `label`.
    pub fn append_local_lambda(&mut self, label: LabelId) {
        self.append_instr(Instruction::PushLocalLambda, &[]);
        self.append_label_offset(label);
    }

    simple_appenders! {
        (append_pop, Pop),
        (append_swap, Swap),
        (append_fill_empty, FillEmpty),
        (append_traverse_p, TraverseP),
        (append_traverse_f, TraverseF),
        (append_traverse_cell_values, TraverseCsiCellValues),
        (append_traverse_cell_types, TraverseCsiCellTypes),
        (append_set_field, SetField),
        (append_agg_sum, AggSum),
        (append_agg_min, AggMin),
        (append_agg_max, AggMax),
        (append_agg_first, AggFirst),
        (append_agg_last, AggLast),
        (append_agg_coll_min, AggCollMin),
        (append_agg_coll_max, AggCollMax),
        (append_ret, Ret),
        (append_fail, Fail),
    }

    // =========================================================================
    // Arithmetic, Comparison and Access
    // =========================================================================

    param_appenders! {
        (append_add, Add, lhs, rhs),
        (append_sub, Sub, lhs, rhs),
        (append_mul, Mul, lhs, rhs),
        (append_div, Div, lhs, rhs),
        (append_idiv, IDiv, lhs, rhs),
        (append_mod, Mod, lhs, rhs),
        (append_negate, Negate, input),
        (append_not, LogicNot, input),
        (append_less, Less, lhs, rhs),
        (append_less_eq, LessEq, lhs, rhs),
        (append_greater, Greater, lhs, rhs),
        (append_greater_eq, GreaterEq, lhs, rhs),
        (append_eq, Eq, lhs, rhs),
        (append_neq, Neq, lhs, rhs),
        (append_cmp3w, Cmp3w, lhs, rhs),
        (append_coll_less, CollLess, lhs, rhs, collator),
        (append_coll_less_eq, CollLessEq, lhs, rhs, collator),
        (append_coll_greater, CollGreater, lhs, rhs, collator),
        (append_coll_greater_eq, CollGreaterEq, lhs, rhs, collator),
        (append_coll_eq, CollEq, lhs, rhs, collator),
        (append_coll_neq, CollNeq, lhs, rhs, collator),
        (append_coll_cmp3w, CollCmp3w, lhs, rhs, collator),
        (append_get_field, GetField, object, name),
        (append_get_element, GetElement, array, index),
        (append_coll_comparison_key, CollComparisonKey, value, collator),
        (append_get_field_or_element, GetFieldOrElement, container, key),
        (append_get_array_size, GetArraySize, input),
        (append_exists, Exists, input),
        (append_is_null, IsNull, input),
        (append_is_object, IsObject, input),
        (append_is_array, IsArray, input),
        (append_is_string, IsString, input),
        (append_is_number, IsNumber, input),
        (append_is_bin_data, IsBinData, input),
        (append_is_date, IsDate, input),
        (append_is_nan, IsNaN, input),
        (append_is_infinity, IsInfinity, input),
        (append_is_record_id, IsRecordId, input),
        (append_is_min_key, IsMinKey, input),
        (append_is_max_key, IsMaxKey, input),
        (append_is_timestamp, IsTimestamp, input),
    }

    /// Appends `numConvert` to the numeric type `target`.
    pub fn append_num_convert(&mut self, input: Parameter, target: TypeTag) {
        assert!(target.is_number(), "numConvert target {target} is not numeric");
        self.append_instr(Instruction::NumConvert, &[input]);
        self.push_u8(target as u8);
    }

    /// Appends `fillEmptyImm` with `constant`.
    pub fn append_fill_empty_imm(&mut self, constant: ImmConstant) {
        self.append_instr(Instruction::FillEmptyImm, &[]);
        self.push_u8(constant as u8);
    }

    /// Appends `getFieldImm` for the inline field `name`.
    pub fn append_get_field_imm(&mut self, object: Parameter, name: &str) {
        self.append_instr(Instruction::GetFieldImm, &[object]);
        self.push_str(name);
    }

    /// Appends `typeMatchImm` against `mask`.
    pub fn append_type_match(&mut self, input: Parameter, mask: TypeMask) {
        self.append_instr(Instruction::TypeMatchImm, &[input]);
        self.push_u32(mask.0);
    }

    /// Appends `dateTruncImm`.
    ///
    /// `timezone` is resolved through the timezone database operand; a
    /// Nothing database resolves only UTC aliases and numeric offsets.
    pub fn append_date_trunc(
        &mut self,
        timezone_db: Parameter,
        date: Parameter,
        unit: TimeUnit,
        bin_size: i64,
        timezone: &str,
        start_of_week: DayOfWeek,
    ) {
        self.append_instr(Instruction::DateTruncImm, &[timezone_db, date]);
        self.push_u8(unit as u8);
        self.push_i64(bin_size);
        self.push_str(timezone);
        self.push_u8(start_of_week as u8);
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Appends `traversePImm` with the lambda at `label`.
    ///
    /// `depth` is `ImmConstant::Nothing` for unlimited depth or
    /// `ImmConstant::Int32One` for a single level.
    pub fn append_traverse_p_imm(&mut self, label: LabelId, depth: ImmConstant) {
        assert!(
            matches!(depth, ImmConstant::Nothing | ImmConstant::Int32One),
            "traversePImm depth must be Nothing or 1"
        );
        self.append_instr(Instruction::TraversePImm, &[]);
        self.push_u8(depth as u8);
        self.append_label_offset(label);
    }

    /// Appends `traverseFImm` with the predicate at `label`.
    pub fn append_traverse_f_imm(&mut self, label: LabelId, compare_array: bool) {
        self.append_instr(Instruction::TraverseFImm, &[]);
        self.push_u8(u8::from(compare_array));
        self.append_label_offset(label);
    }

    /// Appends `traverseMagicImm` with the predicate at `label`.
    pub fn append_traverse_magic(&mut self, label: LabelId, pre: bool, post: bool) {
        let mut flags = 0;
        if pre {
            flags |= MAGIC_PRE_TRAVERSE;
        }
        if post {
            flags |= MAGIC_POST_TRAVERSE;
        }
        self.append_instr(Instruction::TraverseMagicImm, &[]);
        self.push_u8(flags);
        self.append_label_offset(label);
    }

    /// Appends a cell value traversal with the predicate at `label`.
    pub fn append_traverse_cell_values_imm(&mut self, label: LabelId) {
        self.append_local_lambda(label);
        self.append_traverse_cell_values();
    }

    /// Appends a cell type traversal with the predicate at `label`.
    pub fn append_traverse_cell_types_imm(&mut self, label: LabelId) {
        self.append_local_lambda(label);
        self.append_traverse_cell_types();
    }

    // =========================================================================
    // Calls and Control Flow
    // =========================================================================

    /// Appends a call of `builtin` with `arity` stack arguments.
    pub fn append_function(&mut self, builtin: Builtin, arity: u32) {
        match u8::try_from(arity) {
            Ok(small) => {
                self.append_instr(Instruction::FunctionSmall, &[]);
                self.push_u16(builtin as u16);
                self.push_u8(small);
            }
            Err(_) => {
                self.append_instr(Instruction::Function, &[]);
                self.push_u16(builtin as u16);
                self.push_u32(arity);
            }
        }
        self.adjust_stack(1 - i64::from(arity));
    }

    fn append_jump(&mut self, instr: Instruction, label: LabelId) {
        self.append_instr(instr, &[]);
        self.append_label_offset(label);
    }

    /// Appends an unconditional jump to `label`.
    pub fn append_label_jump(&mut self, label: LabelId) {
        self.append_jump(Instruction::Jmp, label);
    }

    /// Appends a jump to `label` taken when the popped condition is true.
    pub fn append_label_jump_true(&mut self, label: LabelId) {
        self.append_jump(Instruction::JmpTrue, label);
    }

    /// Appends a jump to `label` taken when the popped condition is false.
    pub fn append_label_jump_false(&mut self, label: LabelId) {
        self.append_jump(Instruction::JmpFalse, label);
    }

    /// Appends a jump to `label` taken when the top of the stack is Nothing.
    pub fn append_label_jump_nothing(&mut self, label: LabelId) {
        self.append_jump(Instruction::JmpNothing, label);
    }

    /// Appends a jump to `label` taken when the top of the stack is not
    /// Nothing.
    pub fn append_label_jump_not_nothing(&mut self, label: LabelId) {
        self.append_jump(Instruction::JmpNotNothing, label);
    }

    /// Appends `allocStack` reserving `size` slots.
    pub fn append_alloc_stack(&mut self, size: u32) {
        self.append_instr(Instruction::AllocStack, &[]);
        self.push_u32(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32_at(code: &CodeFragment, site: usize) -> i64 {
        read_i32(code.instrs(), site)
    }

    #[test]
    fn stack_accounting() {
        let mut code = CodeFragment::new();
        code.append_const_val(Value::Int32(1));
        code.append_const_val(Value::Int32(2));
        code.append_add(Parameter::POP, Parameter::POP);
        assert_eq!(code.stack_size(), 1);
        assert_eq!(code.max_stack_size(), 2);
        code.append_ret();
        assert_eq!(code.stack_size(), 1);
    }

    #[test]
    fn local_parameters_do_not_consume_the_stack() {
        let mut code = CodeFragment::new();
        code.declare_frame(7, 0);
        code.append_const_val(Value::Int32(1));
        code.append_add(Parameter::local(7, 0), Parameter::local(7, 0));
        assert_eq!(code.stack_size(), 2);
    }

    #[test]
    fn frame_resolution_order_does_not_matter() {
        let mut early = CodeFragment::new();
        early.declare_frame(1, 0);
        early.append_const_val(Value::Int32(10));
        early.append_local_val(1, 0, false);

        let mut late = CodeFragment::new();
        late.append_const_val(Value::Int32(10));
        late.append_local_val(1, 0, false);
        late.declare_frame(1, -2);

        assert_eq!(early.instrs(), late.instrs());
        // pushConstVal (5 bytes), then pushLocalVal's offset
        assert_eq!(i32_at(&early, 6), 0);
    }

    #[test]
    fn pop_compensation() {
        let mut code = CodeFragment::new();
        code.declare_frame(1, 0);
        code.append_const_val(Value::Int32(1));
        code.append_const_val(Value::Int32(2));
        // lhs is a local read after rhs is popped: distance from the new top
        code.append_sub(Parameter::local(1, 0), Parameter::POP);
        // tag at 10, lhs pop flag at 11, lhs offset at 12
        assert_eq!(i32_at(&code, 12), 0);
        assert_eq!(code.stack_size(), 2);
    }

    #[test]
    fn forward_and_backward_labels() {
        let mut code = CodeFragment::new();
        code.append_label(1);
        code.append_label_jump(2);
        code.append_label_jump(1);
        code.append_label(2);
        // jump at 0: offset field 1..5 targets 10
        assert_eq!(i32_at(&code, 1), 10 - 5);
        // jump at 5: offset field 6..10 targets 0
        assert_eq!(i32_at(&code, 6), -10);
        code.validate();
    }

    #[test]
    fn splice_rebases_constants_and_labels() {
        let mut a = CodeFragment::new();
        a.append_const_val(Value::Int32(1));
        a.append_label_jump(9);

        let mut b = CodeFragment::new();
        b.append_const_val(Value::Int32(2));
        b.append_label(9);
        b.append_ret();

        a.append(b);
        assert_eq!(a.constants(), &[Value::Int32(1), Value::Int32(2)]);
        // b's constant index was rebased to 1
        assert_eq!(i32_at(&a, 11), 1);
        // the jump at 5 (field 6..10) lands on b's label at 15
        assert_eq!(i32_at(&a, 6), 15 - 10);
        assert_eq!(a.stack_size(), 2);
        a.validate();
    }

    #[test]
    fn splice_rebases_unresolved_frames_by_stack_depth() {
        let mut a = CodeFragment::new();
        a.declare_frame(3, 0);
        a.append_const_val(Value::Int32(1));

        let mut b = CodeFragment::new();
        b.append_local_val(3, 0, false);
        a.append(b);
        // a has one value; reading local 0 from depth 1 is distance 0
        assert_eq!(i32_at(&a, 6), 0);
        assert_eq!(a.stack_size(), 2);
    }

    #[test]
    fn function_stack_effect() {
        let mut code = CodeFragment::new();
        for i in 0..3 {
            code.append_const_val(Value::Int32(i));
        }
        code.append_function(Builtin::NewArray, 3);
        assert_eq!(code.stack_size(), 1);
    }

    #[test]
    #[should_panic(expected = "already declared")]
    fn redeclaring_a_frame_panics() {
        let mut code = CodeFragment::new();
        code.declare_frame(1, 0);
        code.declare_frame(1, 0);
    }

    #[test]
    #[should_panic(expected = "unresolved references")]
    fn removing_an_unresolved_frame_panics() {
        let mut code = CodeFragment::new();
        code.append_local_val(1, 0, false);
        code.remove_frame(1);
    }

    #[test]
    #[should_panic(expected = "unresolved jumps")]
    fn removing_an_unresolved_label_panics() {
        let mut code = CodeFragment::new();
        code.append_label_jump(4);
        code.remove_label(4);
    }

    #[test]
    #[should_panic(expected = "resolved in both")]
    fn double_resolution_panics() {
        let mut a = CodeFragment::new();
        a.append_label(1);
        let mut b = CodeFragment::new();
        b.append_label(1);
        a.append(b);
    }

    #[test]
    #[should_panic(expected = "same stack effect")]
    fn unequal_branches_panic() {
        let mut lhs = CodeFragment::new();
        lhs.append_const_val(Value::Null);
        CodeFragment::new().append_branches(lhs, CodeFragment::new());
    }

    #[test]
    fn check_reports_pending_fixups() {
        let mut code = CodeFragment::new();
        code.append_label_jump(5);
        code.append_local_val(2, 0, false);
        let err = code.check().unwrap_err();
        assert!(err.to_string().contains("frames [2], labels [5]"));
    }
}
