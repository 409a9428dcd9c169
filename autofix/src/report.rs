//! Human-facing reports: run summaries for stdout and markdown report files.

use std::path::Path;

use anyhow::Result;
use minijinja::context;

use crate::core::types::{StageStatus, WorkflowRun};
use crate::directory::DirectoryRun;
use crate::io::prompt::{Template, render};
use crate::iterate::IterationReport;
use crate::workflow::workflow_info;

/// Markdown report of an iterative run with the per-round quality trend.
pub fn iteration_report(file_path: &Path, report: &IterationReport) -> Result<String> {
    render(
        Template::IterationReport,
        context! {
            file_path => file_path.display().to_string(),
            history => &report.history,
            stop => report.stop.to_string(),
            final_artifact => report
                .produced_artifact(file_path)
                .then(|| report.final_artifact.display().to_string()),
            summary => &report.summary,
        },
    )
}

/// Markdown summary of a coordinated run's agent interactions.
pub fn agent_summary(run: &WorkflowRun) -> Result<String> {
    render(
        Template::AgentSummary,
        context! {
            file_path => run.file_path.display().to_string(),
            success => run.success,
            failure => run.failure(),
            interactions => &run.interactions,
            stages => run.stages(),
        },
    )
}

/// Plain-text summary printed by the CLI.
pub fn run_summary(run: &WorkflowRun, quality_threshold: u8) -> String {
    let info = workflow_info(run.workflow);
    let mut out = String::new();
    out.push_str(&format!("Workflow: {} ({})\n", info.name, run.workflow.as_str()));
    out.push_str(&format!("  {}\n", info.description));
    out.push_str(&format!("  features: {}\n", info.features.join(", ")));
    out.push_str(&format!("File: {}\n", run.file_path.display()));

    if let Some(analysis) = &run.analysis {
        out.push_str(&format!(
            "Quality: {}/10 ({} issue(s), language {})",
            analysis.quality_score,
            analysis.issues.len(),
            analysis.language
        ));
        if analysis.below_threshold(quality_threshold) {
            out.push_str(&format!(" [below threshold {quality_threshold}]"));
        }
        out.push('\n');
        for issue in &analysis.issues {
            let line = issue
                .line
                .map(|l| l.to_string())
                .unwrap_or_else(|| "?".to_string());
            out.push_str(&format!(
                "  - [{}/{}] line {line}: {} ({})\n",
                issue.severity.as_str(),
                issue.kind.as_str(),
                issue.description,
                issue.source_tool
            ));
        }
        if !analysis.recommendations.is_empty() {
            out.push_str("Recommendations:\n");
            for recommendation in &analysis.recommendations {
                out.push_str(&format!("  - {recommendation}\n"));
            }
        }
    }

    out.push_str("Stages:\n");
    for outcome in run.stages() {
        let status = match outcome.status {
            StageStatus::Completed => "completed",
            StageStatus::Passed => "passed",
            StageStatus::Failed => "FAILED",
        };
        let note = outcome
            .error
            .as_deref()
            .or(outcome.detail.as_deref())
            .unwrap_or_default();
        out.push_str(&format!(
            "  {:<15} {status:<9} {note}\n",
            outcome.stage.as_str()
        ));
    }

    if let Some(reference) = run.change_reference() {
        out.push_str(&format!("Review: {} ({})\n", reference.url, reference.branch));
    }
    out.push_str(&format!(
        "Result: {}\n",
        if run.success { "success" } else { "failed" }
    ));
    out
}

/// Plain-text summary of a directory run: one line per file, then the aggregate.
pub fn directory_summary(report: &DirectoryRun, quality_threshold: u8) -> String {
    let mut out = String::new();
    let mode = if report.recursive { ", recursive" } else { "" };
    out.push_str(&format!("Directory: {}{mode}\n", report.root.display()));
    out.push_str(&format!("Files: {}\n", report.runs.len()));
    for run in &report.runs {
        let shown = run
            .file_path
            .strip_prefix(&report.root)
            .unwrap_or(&run.file_path)
            .display();
        match (&run.analysis, run.failure()) {
            (Some(analysis), None) => {
                out.push_str(&format!(
                    "  {shown}: quality {}/10, {} issue(s)",
                    analysis.quality_score,
                    analysis.issues.len()
                ));
                if analysis.below_threshold(quality_threshold) {
                    out.push_str(&format!(" [below threshold {quality_threshold}]"));
                }
                out.push('\n');
            }
            (_, failure) => {
                let reason = failure
                    .and_then(|f| f.error.as_deref())
                    .unwrap_or("no analysis recorded");
                out.push_str(&format!("  {shown}: FAILED ({reason})\n"));
            }
        }
    }
    if let Some(summary) = &report.summary {
        out.push_str(&format!("Files analyzed: {}\n", summary.files_analyzed));
        out.push_str(&format!("Average quality: {:.1}/10\n", summary.average_quality));
        out.push_str(&format!("Total issues: {}\n", summary.total_issues));
        out.push_str(&format!(
            "Average issues per file: {:.1}\n",
            summary.average_issues
        ));
    }
    out.push_str(&format!(
        "Result: {}\n",
        if report.success() { "success" } else { "failed" }
    ));
    out
}
