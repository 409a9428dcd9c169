//! Deterministic, pure logic shared by the pipeline stages.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod apply;
pub mod convergence;
pub mod language;
pub mod merge;
pub mod parse;
pub mod types;
