//! Convergence summary over an iteration history.

use serde::Serialize;

use crate::core::types::IterationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressTrend {
    Improving,
    Stable,
    Regressing,
}

impl ProgressTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressTrend::Improving => "improving",
            ProgressTrend::Stable => "stable",
            ProgressTrend::Regressing => "regressing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvergenceSummary {
    pub iterations: usize,
    pub initial_quality: u8,
    pub final_quality: u8,
    pub quality_improvement: i32,
    pub initial_issues: usize,
    pub final_issues: usize,
    /// Negative when later rounds found more issues.
    pub issues_resolved: i64,
    pub progress_trend: ProgressTrend,
}

/// Summarize `history`. `None` when no round was recorded.
pub fn summarize(history: &[IterationRecord]) -> Option<ConvergenceSummary> {
    let first = history.first()?;
    let last = history.last()?;

    let quality_improvement = i32::from(last.quality_score.get()) - i32::from(first.quality_score.get());
    let issues_resolved = first.issues_count as i64 - last.issues_count as i64;

    let progress_trend = if issues_resolved > 0 || (issues_resolved == 0 && quality_improvement > 0) {
        ProgressTrend::Improving
    } else if issues_resolved == 0 && quality_improvement == 0 {
        ProgressTrend::Stable
    } else {
        ProgressTrend::Regressing
    };

    Some(ConvergenceSummary {
        iterations: history.len(),
        initial_quality: first.quality_score.get(),
        final_quality: last.quality_score.get(),
        quality_improvement,
        initial_issues: first.issues_count,
        final_issues: last.issues_count,
        issues_resolved,
        progress_trend,
    })
}
