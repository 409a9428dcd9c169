//! Side-effecting adapters: filesystem, processes, git, LLM and tools.

pub mod artifact;
pub mod checks;
pub mod config;
pub mod discover;
pub mod git;
pub mod llm;
pub mod prereq;
pub mod process;
pub mod prompt;
pub mod static_tools;
