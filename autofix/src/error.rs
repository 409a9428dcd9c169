//! Typed error taxonomy for the pipeline stages.
//!
//! Plumbing (process, git, config loading) returns `anyhow::Result`; each
//! stage converts at its boundary, keeping the rendered cause chain as text.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::{Gate, Stage};
use crate::publish::PublishStep;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("cannot read {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("unsupported file type: {}", .path.display())]
    UnsupportedLanguage { path: PathBuf },

    #[error("{provider} provider failed: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum FixGenerationError {
    #[error("fix provider failed: {message}")]
    Provider { message: String },
}

/// The checker could not run; distinct from a failed gate.
#[derive(Debug, Error)]
#[error("{gate} gate could not run: {message}")]
pub struct VerificationError {
    pub gate: Gate,
    pub message: String,
}

#[derive(Debug, Error)]
#[error("publish failed at {step}: {message}")]
pub struct PublishError {
    pub step: PublishStep,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing prerequisite {name}: {detail}")]
    MissingPrerequisite { name: String, detail: String },

    #[error("missing environment variable {var}")]
    MissingEnv { var: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Run-level invariant violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("run halted at {failed}; cannot record {attempted}")]
    Halted { failed: Stage, attempted: Stage },

    #[error("change reference requires a passing test report")]
    Ungated,
}
