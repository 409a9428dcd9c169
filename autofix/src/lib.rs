//! Automated source remediation: analyze a file, fix it, verify the fix and
//! publish it for review.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (issue model, merging, parsing,
//!   fix application, convergence). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (filesystem, processes, git, the LLM
//!   command, per-language tools). Each sits behind a trait so tests can
//!   script it.
//!
//! Stage modules ([`analysis`], [`fixes`], [`verify`], [`publish`]) build on
//! both; [`workflow`], [`iterate`] and [`agents`] orchestrate them into runs,
//! and [`directory`] fans analysis out over a source tree.

pub mod agents;
pub mod analysis;
pub mod core;
pub mod directory;
pub mod error;
pub mod exit_codes;
pub mod fixes;
pub mod io;
pub mod iterate;
pub mod logging;
pub mod publish;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verify;
pub mod workflow;
