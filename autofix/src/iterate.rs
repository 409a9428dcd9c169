//! Iteration controller: bounded rounds of analyze → fix → apply-to-scratch.
//!
//! The controller owns the round history. Verification and publishing never
//! run per round; the workflow manager does that once on the final artifact.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::analysis::Analyze;
use crate::core::apply::apply_fixes;
use crate::core::convergence::{ConvergenceSummary, summarize};
use crate::core::types::{FixRecord, IterationRecord};
use crate::fixes::FixGenerator;
use crate::io::artifact::{read_source, scratch_path, write_artifact};
use crate::io::llm::LlmProvider;
use crate::workflow::CancelToken;

/// Why the rounds stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IterationStop {
    /// A round found no issues.
    Converged { round: u32 },
    MaxRounds,
    AnalysisFailed { round: u32, error: String },
    FixFailed { round: u32, error: String },
    Cancelled { round: u32 },
}

impl IterationStop {
    /// True for the stops that are not failures.
    pub fn is_clean(&self) -> bool {
        matches!(self, IterationStop::Converged { .. } | IterationStop::MaxRounds)
    }
}

impl fmt::Display for IterationStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationStop::Converged { round } => write!(f, "converged in round {round}"),
            IterationStop::MaxRounds => f.write_str("reached the round limit"),
            IterationStop::AnalysisFailed { round, error } => {
                write!(f, "analysis failed in round {round}: {error}")
            }
            IterationStop::FixFailed { round, error } => {
                write!(f, "fix generation failed in round {round}: {error}")
            }
            IterationStop::Cancelled { round } => write!(f, "cancelled before round {round}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationReport {
    pub history: Vec<IterationRecord>,
    /// Latest artifact; the original file when no round produced one.
    pub final_artifact: PathBuf,
    pub summary: Option<ConvergenceSummary>,
    pub stop: IterationStop,
    /// Fixes applied across all rounds, in order.
    pub fixes: Vec<FixRecord>,
}

impl IterationReport {
    /// True when at least one round wrote a scratch artifact.
    pub fn produced_artifact(&self, original: &Path) -> bool {
        self.final_artifact != original
    }
}

pub struct IterationController<A, L> {
    analyzer: A,
    fixer: FixGenerator<L>,
    cancel: CancelToken,
    history: Vec<IterationRecord>,
}

impl<A: Analyze, L: LlmProvider> IterationController<A, L> {
    pub fn new(analyzer: A, fixer: FixGenerator<L>, cancel: CancelToken) -> Self {
        Self {
            analyzer,
            fixer,
            cancel,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Run up to `max_rounds` rounds starting from `file_path`. Never fails;
    /// round failures become early stops with the partial history.
    #[instrument(skip_all, fields(path = %file_path.display(), max_rounds))]
    pub fn run_iterations(&mut self, file_path: &Path, max_rounds: u32) -> IterationReport {
        self.history.clear();
        let mut current = file_path.to_path_buf();
        let mut fixes = Vec::new();

        let stop = 'rounds: {
            for round in 1..=max_rounds {
                if self.cancel.is_cancelled() {
                    break 'rounds IterationStop::Cancelled { round };
                }

                let analysis = match self.analyzer.analyze(&current) {
                    Ok(analysis) => analysis,
                    Err(err) => {
                        warn!(round, err = %err, "analysis failed, stopping");
                        break 'rounds IterationStop::AnalysisFailed {
                            round,
                            error: err.to_string(),
                        };
                    }
                };
                self.history.push(IterationRecord {
                    index: round,
                    quality_score: analysis.quality_score,
                    issues_count: analysis.issues.len(),
                });
                info!(
                    round,
                    quality = analysis.quality_score.get(),
                    issues = analysis.issues.len(),
                    "round analyzed"
                );
                if analysis.issues.is_empty() {
                    break 'rounds IterationStop::Converged { round };
                }

                let scratch = scratch_path(file_path, round);
                let outcome = read_source(&current)
                    .map_err(|err| format!("{err:#}"))
                    .and_then(|source| {
                        let batch = self
                            .fixer
                            .generate(&source, analysis.language, &analysis.issues)
                            .map_err(|err| err.to_string())?;
                        let applied = apply_fixes(&source, &batch);
                        write_artifact(&scratch, &applied.content).map_err(|err| format!("{err:#}"))?;
                        Ok(batch.fixes)
                    });
                match outcome {
                    Ok(batch_fixes) => fixes.extend(batch_fixes),
                    Err(error) => {
                        warn!(round, error = %error, "fix round failed, stopping");
                        break 'rounds IterationStop::FixFailed { round, error };
                    }
                }

                current = scratch;
                if round == max_rounds {
                    break 'rounds IterationStop::MaxRounds;
                }
            }
            IterationStop::MaxRounds
        };

        let report = IterationReport {
            history: self.history.clone(),
            final_artifact: current,
            summary: summarize(&self.history),
            stop,
            fixes,
        };
        info!(rounds = report.history.len(), stop = %report.stop, "iterations finished");
        report
    }
}
