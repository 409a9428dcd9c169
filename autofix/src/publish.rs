//! Change publisher: branch, promote, commit, push, open a review request.

use std::fmt;
use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use minijinja::context;
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::types::{ChangeReference, FixRecord, TestReport};
use crate::error::PublishError;
use crate::io::artifact::{file_name, file_stem, promote};
use crate::io::config::GitConfig;
use crate::io::git::{ReviewRequest, VersionControl};
use crate::io::prompt::{Template, render};

/// Publish steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStep {
    /// Refusal before touching the working copy.
    Preflight,
    SyncBase,
    CreateBranch,
    Promote,
    Commit,
    Push,
    OpenReview,
}

impl PublishStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStep::Preflight => "preflight",
            PublishStep::SyncBase => "sync_base",
            PublishStep::CreateBranch => "create_branch",
            PublishStep::Promote => "promote",
            PublishStep::Commit => "commit",
            PublishStep::Push => "push",
            PublishStep::OpenReview => "open_review",
        }
    }
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// File under version control that receives the candidate.
    pub target: PathBuf,
    /// Verified candidate artifact.
    pub candidate: PathBuf,
    pub fixes: Vec<FixRecord>,
    pub whole_file: bool,
    pub report: TestReport,
    /// Quality score and issue count from the analysis that motivated the fixes.
    pub quality_before: Option<(u8, usize)>,
}

#[derive(Debug, Clone)]
pub struct ChangePublisher<V> {
    vcs: V,
    git: GitConfig,
}

impl<V: VersionControl> ChangePublisher<V> {
    pub fn new(vcs: V, git: GitConfig) -> Self {
        Self { vcs, git }
    }

    pub fn publish(&self, request: &PublishRequest) -> Result<ChangeReference, PublishError> {
        self.publish_at(request, Local::now().naive_local())
    }

    /// Publish with an explicit timestamp for the branch name.
    #[instrument(skip_all, fields(target = %request.target.display()))]
    pub fn publish_at(
        &self,
        request: &PublishRequest,
        now: NaiveDateTime,
    ) -> Result<ChangeReference, PublishError> {
        if !request.report.passed() {
            return Err(step_error(
                PublishStep::Preflight,
                "refusing to publish a candidate that did not pass verification",
            ));
        }

        let branch = branch_name(&self.git.branch_prefix, &file_stem(&request.target), now);
        let commit_message = commit_message(request, self.git.commit_fixes);
        let title = commit_message.lines().next().unwrap_or_default().to_string();
        let body = review_description(request, self.git.description_fixes)
            .map_err(|err| step_error(PublishStep::OpenReview, format!("{err:#}")))?;

        self.vcs
            .checkout(&self.git.base_branch)
            .and_then(|()| self.vcs.pull(&self.git.remote, &self.git.base_branch))
            .map_err(|err| step_error(PublishStep::SyncBase, format!("{err:#}")))?;
        self.vcs
            .create_branch(&branch)
            .map_err(|err| step_error(PublishStep::CreateBranch, format!("{err:#}")))?;
        promote(&request.candidate, &request.target)
            .map_err(|err| step_error(PublishStep::Promote, format!("{err:#}")))?;
        self.vcs
            .add(std::slice::from_ref(&request.target))
            .and_then(|()| self.vcs.commit(&commit_message))
            .map_err(|err| step_error(PublishStep::Commit, format!("{err:#}")))?;
        self.vcs
            .push(&self.git.remote, &branch)
            .map_err(|err| step_error(PublishStep::Push, format!("{err:#}")))?;

        let url = self
            .vcs
            .open_review(&ReviewRequest {
                title,
                body,
                head: branch.clone(),
                base: self.git.base_branch.clone(),
            })
            .map_err(|err| step_error(PublishStep::OpenReview, format!("{err:#}")))?;
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(step_error(PublishStep::OpenReview, "review command returned no URL"));
        }

        info!(branch = %branch, url = %url, "change published");
        Ok(ChangeReference { branch, url })
    }
}

fn step_error(step: PublishStep, message: impl Into<String>) -> PublishError {
    PublishError {
        step,
        message: message.into(),
    }
}

/// `<prefix>-<stem>-<YYYYmmdd-HHMMSS>`, with characters git dislikes replaced.
pub fn branch_name(prefix: &str, stem: &str, now: NaiveDateTime) -> String {
    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{prefix}-{stem}-{}", now.format("%Y%m%d-%H%M%S"))
}

/// Title line plus the first `listed` fix descriptions.
pub fn commit_message(request: &PublishRequest, listed: usize) -> String {
    let name = file_name(&request.target);
    let mut message = if request.fixes.is_empty() && request.whole_file {
        format!("Auto-fix: Rewrite {name}\n")
    } else {
        format!(
            "Auto-fix: Resolve {} code issues in {name}\n",
            request.fixes.len()
        )
    };
    if !request.fixes.is_empty() {
        message.push('\n');
        for fix in request.fixes.iter().take(listed) {
            let description = if fix.issue_description.trim().is_empty() {
                "Code improvement"
            } else {
                fix.issue_description.trim()
            };
            message.push_str(&format!("- {description}\n"));
        }
    }
    message
}

pub fn review_description(request: &PublishRequest, listed: usize) -> anyhow::Result<String> {
    let shown: Vec<&FixRecord> = request.fixes.iter().take(listed).collect();
    render(
        Template::Review,
        context! {
            file_name => file_name(&request.target),
            file_path => request.target.display().to_string(),
            fix_count => request.fixes.len(),
            fixes => shown,
            remaining => request.fixes.len().saturating_sub(listed),
            quality_score => request.quality_before.map(|(score, _)| score),
            issues_count => request.quality_before.map(|(_, count)| count),
            tests => &request.report,
        },
    )
}
