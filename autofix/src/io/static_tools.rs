//! Static-analysis provider.
//!
//! [`ToolAnalyzer`] runs the syntax checker plus a per-language linter
//! (`flake8` for Python, `eslint --format unix` for JS/TS) and normalizes
//! `path:line:col: message` diagnostics into [`IssueRecord`]s. A missing tool
//! or an unexpected exit contributes zero issues.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::language::Language;
use crate::core::types::{IssueKind, IssueRecord, Severity};
use crate::io::checks::{CheckOutcome, CommandChecker, SourceChecker};
use crate::io::config::{AutofixConfig, LanguageOverrides};
use crate::io::process::{
    ProcessLimits, command_from_argv, expand_file_argument, is_not_found, run_with_timeout,
};

/// Issues reported by static tooling, plus the tools that actually ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticReport {
    pub issues: Vec<IssueRecord>,
    pub tools_used: Vec<String>,
}

/// File + language in, ordered raw issues out.
pub trait StaticAnalyzer {
    fn analyze(&self, path: &Path, language: Language) -> Result<StaticReport>;
}

impl<T: StaticAnalyzer + ?Sized> StaticAnalyzer for &T {
    fn analyze(&self, path: &Path, language: Language) -> Result<StaticReport> {
        (**self).analyze(path, language)
    }
}

/// Tool name recorded on syntax-checker issues.
pub const SYNTAX_TOOL: &str = "syntax_check";

#[derive(Debug, Clone)]
pub struct ToolAnalyzer {
    overrides: BTreeMap<String, LanguageOverrides>,
    checker: CommandChecker,
    limits: ProcessLimits,
}

impl ToolAnalyzer {
    pub fn new(
        overrides: BTreeMap<String, LanguageOverrides>,
        checker: CommandChecker,
        limits: ProcessLimits,
    ) -> Self {
        Self {
            overrides,
            checker,
            limits,
        }
    }

    pub fn from_config(config: &AutofixConfig) -> Self {
        Self::new(
            config.languages.clone(),
            CommandChecker::new(config.languages.clone(), config.static_limits()),
            config.static_limits(),
        )
    }

    pub fn lint_command(&self, language: Language) -> Option<Vec<String>> {
        self.overrides
            .get(language.as_str())
            .and_then(|o| o.lint.clone())
            .or_else(|| default_lint_command(language))
    }

    fn syntax_issues(&self, path: &Path, language: Language, report: &mut StaticReport) {
        match self.checker.syntax(path, language) {
            Ok(CheckOutcome::Fail { message, line, .. }) => {
                report.tools_used.push(SYNTAX_TOOL.to_string());
                report.issues.push(IssueRecord {
                    kind: IssueKind::Syntax,
                    severity: Severity::High,
                    description: format!("Syntax error: {}", last_line(&message)),
                    line,
                    source_tool: SYNTAX_TOOL.to_string(),
                });
            }
            Ok(CheckOutcome::Pass) => report.tools_used.push(SYNTAX_TOOL.to_string()),
            Ok(CheckOutcome::NotConfigured) => {}
            Err(err) => warn!(err = %format!("{err:#}"), "syntax checker unavailable"),
        }
    }

    #[instrument(skip_all, fields(tool))]
    fn lint_issues(&self, template: &[String], path: &Path, report: &mut StaticReport) {
        let tool = tool_name(template);
        tracing::Span::current().record("tool", tool.as_str());
        let argv = expand_file_argument(template, path);
        let cmd = match command_from_argv(&argv, None) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(err = %err, "invalid lint command");
                return;
            }
        };
        let output = match run_with_timeout(cmd, None, self.limits) {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => {
                debug!("lint tool not installed");
                return;
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "lint tool failed to run");
                return;
            }
        };
        if output.timed_out {
            warn!("lint tool timed out");
            return;
        }
        // Linters exit 1 when they report findings; anything else is a tool fault.
        if !matches!(output.status.code(), Some(0) | Some(1)) {
            warn!(exit_code = ?output.status.code(), "lint tool exited unexpectedly");
            return;
        }
        report.tools_used.push(tool.clone());
        let issues = parse_diagnostics(&output.stdout_text(), &tool);
        debug!(count = issues.len(), "lint issues parsed");
        report.issues.extend(issues);
    }
}

impl StaticAnalyzer for ToolAnalyzer {
    #[instrument(skip_all, fields(path = %path.display(), language = %language))]
    fn analyze(&self, path: &Path, language: Language) -> Result<StaticReport> {
        let mut report = StaticReport::default();
        if let Some(template) = self.lint_command(language) {
            self.lint_issues(&template, path, &mut report);
        }
        self.syntax_issues(path, language, &mut report);
        Ok(report)
    }
}

fn default_lint_command(language: Language) -> Option<Vec<String>> {
    match language {
        Language::Python => Some(vec!["flake8".to_string(), "{file}".to_string()]),
        Language::JavaScript | Language::TypeScript => Some(vec![
            "eslint".to_string(),
            "--format".to_string(),
            "unix".to_string(),
            "{file}".to_string(),
        ]),
        _ => None,
    }
}

fn tool_name(template: &[String]) -> String {
    template
        .first()
        .map(|program| {
            Path::new(program)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| program.clone())
        })
        .unwrap_or_default()
}

fn last_line(message: &str) -> &str {
    message
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("unknown")
}

static DIAGNOSTIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]:)?[^:]+:(\d+):(?:(\d+):)?\s*(.+)$").expect("diagnostic regex")
});
static ESLINT_SEVERITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[(Error|Warning)(?:/[^\]]*)?\]\s*$").expect("eslint regex"));

/// Parse `path:line[:col]: message` lines. Other lines are ignored.
pub fn parse_diagnostics(output: &str, tool: &str) -> Vec<IssueRecord> {
    output
        .lines()
        .filter_map(|line| DIAGNOSTIC_RE.captures(line.trim_end()))
        .filter_map(|caps| {
            let line_no: u32 = caps[1].parse().ok()?;
            let message = caps[3].trim();
            let (kind, severity, description) = match tool {
                "flake8" => normalize_flake8(message),
                "eslint" => normalize_eslint(message),
                _ => (IssueKind::Style, Severity::Medium, message.to_string()),
            };
            Some(IssueRecord {
                kind,
                severity,
                description,
                line: Some(line_no),
                source_tool: tool.to_string(),
            })
        })
        .collect()
}

/// `E9`/`F63`/`F7`/`F82` are runtime errors; other `F` codes are likely bugs; the rest is style.
fn normalize_flake8(message: &str) -> (IssueKind, Severity, String) {
    let code = message.split_whitespace().next().unwrap_or_default();
    let (kind, severity) = if ["E9", "F63", "F7", "F82"]
        .iter()
        .any(|prefix| code.starts_with(prefix))
    {
        (IssueKind::Bug, Severity::High)
    } else if code.starts_with('F') {
        (IssueKind::Bug, Severity::Medium)
    } else {
        (IssueKind::Style, Severity::Medium)
    };
    (kind, severity, message.to_string())
}

/// `[Error/rule]` maps to high, `[Warning/rule]` to low.
fn normalize_eslint(message: &str) -> (IssueKind, Severity, String) {
    let severity = match ESLINT_SEVERITY_RE.captures(message) {
        Some(caps) if &caps[1] == "Error" => Severity::High,
        Some(_) => Severity::Low,
        None => Severity::Medium,
    };
    let description = ESLINT_SEVERITY_RE.replace(message, "").trim().to_string();
    (IssueKind::Style, severity, description)
}
