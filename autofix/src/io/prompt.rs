//! Prompt and report templates (minijinja, embedded at compile time).

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::language::Language;
use crate::core::types::IssueRecord;

const ANALYSIS_TEMPLATE: &str = include_str!("prompts/analysis.md");
const FIXES_TEMPLATE: &str = include_str!("prompts/fixes.md");
const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");
const REPORT_TEMPLATE: &str = include_str!("prompts/report.md");
const AGENT_SUMMARY_TEMPLATE: &str = include_str!("prompts/agent_summary.md");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Analysis,
    Fixes,
    Review,
    IterationReport,
    AgentSummary,
}

impl Template {
    fn name(&self) -> &'static str {
        match self {
            Template::Analysis => "analysis",
            Template::Fixes => "fixes",
            Template::Review => "review",
            Template::IterationReport => "iteration_report",
            Template::AgentSummary => "agent_summary",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Template::Analysis => ANALYSIS_TEMPLATE,
            Template::Fixes => FIXES_TEMPLATE,
            Template::Review => REVIEW_TEMPLATE,
            Template::IterationReport => REPORT_TEMPLATE,
            Template::AgentSummary => AGENT_SUMMARY_TEMPLATE,
        }
    }
}

/// Render `template` with any serializable context.
pub fn render<S: Serialize>(template: Template, ctx: S) -> Result<String> {
    let mut env = Environment::new();
    env.add_template(template.name(), template.source())
        .with_context(|| format!("load {} template", template.name()))?;
    let rendered = env
        .get_template(template.name())?
        .render(ctx)
        .with_context(|| format!("render {} template", template.name()))?;
    debug!(template = template.name(), bytes = rendered.len(), "rendered template");
    Ok(rendered)
}

/// Prompt asking the LLM to analyze `code`, seeded with the static findings.
pub fn analysis_prompt(
    file_name: &str,
    language: Language,
    code: &str,
    static_issues: &[IssueRecord],
) -> Result<String> {
    render(
        Template::Analysis,
        context! {
            file_name => file_name,
            language => language.as_str(),
            code => code.trim_end(),
            static_issues => static_issues,
        },
    )
}

/// Prompt asking the LLM for a fix batch. `issues` should already be ordered and capped.
pub fn fix_prompt(language: Language, code: &str, issues: &[IssueRecord]) -> Result<String> {
    render(
        Template::Fixes,
        context! {
            language => language.as_str(),
            code => code.trim_end(),
            issues => issues,
        },
    )
}
