//! Tagged values and the value-system contract for docvm.
//!
//! This crate provides:
//! - [`Value`] - The tagged value evaluated by the VM
//! - [`Operand`] - A value with its ownership (owned or borrowed view)
//! - [`TypeTag`] / [`TypeMask`] - The closed set of type tags
//! - Heap containers ([`Array`], [`ArraySet`], [`ArrayMultiSet`], [`Object`])
//! - Comparison ([`compare_values`], [`CanonicalKey`])
//! - The compact wire codec ([`WireDoc`], [`WireBuilder`])
//! - External engine handles ([`Collator`], [`TimeZoneDb`], [`CompiledRegex`],
//!   [`SortSpec`], [`CsiCell`])
//! - [`Error`] - Error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cell;
pub mod collation;
pub mod collections;
pub mod compare;
pub mod error;
pub mod numeric;
pub mod operand;
pub mod regex;
pub mod sort;
pub mod timezone;
pub mod types;
pub mod value;
pub mod wire;

pub use cell::{CellEntry, CsiCell};
pub use collation::{BinaryCollator, CaseInsensitiveCollator, Collator};
pub use collections::{Array, ArrayMultiSet, ArraySet, Object};
pub use compare::{CanonicalKey, compare_3way, compare_values, values_equal};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use numeric::NumericWidth;
pub use operand::Operand;
pub use regex::CompiledRegex;
pub use sort::{SortKey, SortPart, SortSpec};
pub use timezone::TimeZoneDb;
pub use types::{TypeMask, TypeTag};
pub use value::Value;
pub use wire::{WireBuilder, WireDoc};

pub use rust_decimal::Decimal;
