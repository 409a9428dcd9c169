//! Stable exit codes for the autofix CLI.

/// The run succeeded.
pub const OK: i32 = 0;
/// A stage failed; partial results were still reported.
pub const FAILED: i32 = 1;
/// Invalid configuration or a missing prerequisite. Nothing ran.
pub const INVALID: i32 = 2;
