//! Integration tests for the interpreter
//!
//! Tests whole programs built with the fragment builder: splicing, slot
//! ownership, traversal and accumulator pipelines.

mod accumulators;
mod programs;
mod properties;
