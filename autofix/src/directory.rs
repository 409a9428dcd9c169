//! Directory runs: one analysis-only run per supported file under a root.
//!
//! Each file is an independent [`WorkflowRun`]; a failure on one file is
//! recorded on its run and the walk continues.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::types::{WorkflowRun, WorkflowType};
use crate::io::discover::discover_sources;
use crate::workflow::{WorkflowManager, WorkflowOptions};

/// Aggregate over the files whose analysis succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectorySummary {
    pub files_analyzed: usize,
    pub files_failed: usize,
    pub average_quality: f64,
    pub total_issues: usize,
    pub average_issues: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryRun {
    pub root: PathBuf,
    pub recursive: bool,
    pub runs: Vec<WorkflowRun>,
    /// Absent when no file could be analyzed.
    pub summary: Option<DirectorySummary>,
}

impl DirectoryRun {
    pub fn success(&self) -> bool {
        self.runs.iter().all(|run| run.success)
    }
}

/// Analyze every supported file under `root`. Fails when there is nothing to analyze.
#[instrument(skip_all, fields(root = %root.display(), recursive))]
pub fn analyze_directory(
    manager: &WorkflowManager<'_>,
    root: &Path,
    recursive: bool,
) -> Result<DirectoryRun> {
    let options = WorkflowOptions {
        publish: false,
        dry_run: false,
    };
    manager.check_prerequisites(WorkflowType::AnalysisOnly, options)?;
    let files = discover_sources(root, recursive)?;
    if files.is_empty() {
        bail!("no supported source files under {}", root.display());
    }
    info!(files = files.len(), "analyzing directory");

    let mut runs = Vec::with_capacity(files.len());
    for file in &files {
        runs.push(manager.execute(file, WorkflowType::AnalysisOnly, options)?);
    }
    let summary = summarize_runs(&runs);
    Ok(DirectoryRun {
        root: root.to_path_buf(),
        recursive,
        runs,
        summary,
    })
}

pub fn summarize_runs(runs: &[WorkflowRun]) -> Option<DirectorySummary> {
    let analyzed: Vec<_> = runs
        .iter()
        .filter(|run| run.success)
        .filter_map(|run| run.analysis.as_ref())
        .collect();
    if analyzed.is_empty() {
        return None;
    }
    let count = analyzed.len() as f64;
    let quality: u32 = analyzed.iter().map(|a| u32::from(a.quality_score.get())).sum();
    let total_issues: usize = analyzed.iter().map(|a| a.issues.len()).sum();
    Some(DirectorySummary {
        files_analyzed: analyzed.len(),
        files_failed: runs.len() - analyzed.len(),
        average_quality: f64::from(quality) / count,
        total_issues,
        average_issues: total_issues as f64 / count,
    })
}
