//! docvm - Slot-based bytecode virtual machine for document queries
//!
//! This crate re-exports both layers of the docvm system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 1: docvm_vm         - Code fragments, interpreter, builtins, accumulators
//! Layer 0: docvm_foundation - Tagged values, operands, comparison, wire codec, Error
//! ```

pub use docvm_foundation as foundation;
pub use docvm_vm as vm;
