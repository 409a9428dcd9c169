//! Fix generation and application.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::language::Language;
use crate::core::parse::{ParseOutcome, parse_fix_response};
use crate::core::types::{FixBatch, IssueRecord};
use crate::error::FixGenerationError;
use crate::io::artifact::{candidate_path, write_artifact};
use crate::io::llm::LlmProvider;
use crate::io::prompt::fix_prompt;

pub use crate::core::apply::apply_fixes;

/// Asks the fix provider for a [`FixBatch`].
#[derive(Debug, Clone)]
pub struct FixGenerator<L> {
    llm: L,
    max_issues: usize,
}

impl<L: LlmProvider> FixGenerator<L> {
    pub fn new(llm: L, max_issues: usize) -> Self {
        Self { llm, max_issues }
    }

    /// Generate fixes for `issues`. No issues means no provider call.
    #[instrument(skip_all, fields(language = %language, issues = issues.len()))]
    pub fn generate(
        &self,
        source: &str,
        language: Language,
        issues: &[IssueRecord],
    ) -> Result<FixBatch, FixGenerationError> {
        if issues.is_empty() {
            debug!("no issues, skipping fix provider");
            return Ok(FixBatch::default());
        }

        let selected = prioritize(issues, self.max_issues);
        let prompt = fix_prompt(language, source, &selected).map_err(|err| {
            FixGenerationError::Provider {
                message: format!("{err:#}"),
            }
        })?;
        let response = self
            .llm
            .complete(&prompt)
            .map_err(|err| FixGenerationError::Provider {
                message: format!("{err:#}"),
            })?;

        match parse_fix_response(&response) {
            ParseOutcome::Structured(batch) => {
                info!(
                    fixes = batch.fixes.len(),
                    whole_file = batch.whole_file.is_some(),
                    "fix batch received"
                );
                Ok(batch)
            }
            ParseOutcome::Unstructured { reason, .. } => {
                warn!(reason = %reason, "fix response unparsable, returning empty batch");
                Ok(FixBatch {
                    fixes: Vec::new(),
                    whole_file: None,
                    explanation: Some(format!("fix provider output could not be used: {reason}")),
                })
            }
        }
    }
}

/// Order high → medium → low (stable) and cap at `max`.
pub fn prioritize(issues: &[IssueRecord], max: usize) -> Vec<IssueRecord> {
    let mut ordered = issues.to_vec();
    ordered.sort_by(|a, b| b.severity.cmp(&a.severity));
    ordered.truncate(max);
    ordered
}

/// Write `content` to the sibling candidate path. The original is left alone.
pub fn write_candidate(original: &Path, content: &str) -> Result<PathBuf> {
    let path = candidate_path(original);
    write_artifact(&path, content)?;
    Ok(path)
}
