//! Integration tests for the foundation layer
//!
//! Tests for values, operands, containers, comparison, the wire codec and errors.

mod collections;
mod errors;
mod values;
mod wire;
