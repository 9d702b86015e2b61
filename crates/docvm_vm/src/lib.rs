//! Code fragment builder, bytecode interpreter and builtin library for docvm.
//!
//! This crate provides:
//! - [`CodeFragment`] - Bytecode under construction, with frame and label fixups
//! - [`Instruction`] - The instruction set and its binary encoding
//! - [`Vm`] - Stack-based interpreter that runs a sealed fragment
//! - [`Builtin`] - The library of builtin functions and accumulators
//! - [`SlotAccess`] - How a program reads its inputs

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod arith;
pub mod builtin;
pub mod config;
pub mod datetime;
pub mod fragment;
pub mod opcode;
pub mod vm;

pub use builtin::{Args, Arity, Builtin, DoubleDouble};
pub use config::VmConfig;
pub use datetime::{DayOfWeek, TimeUnit};
pub use fragment::CodeFragment;
pub use opcode::{FrameId, ImmConstant, Instruction, LabelId, Parameter, SlotId};
pub use vm::{NoSlots, SlotAccess, SlotTable, Vm};
