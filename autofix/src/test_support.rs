//! Scripted collaborators for unit and integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::analysis::Analyze;
use crate::core::language::Language;
use crate::core::types::{
    AnalysisMetadata, AnalysisResult, Gate, IssueKind, IssueRecord, ParseMode, QualityScore, Severity,
};
use crate::error::AnalysisError;
use crate::io::checks::{CheckOutcome, SourceChecker};
use crate::io::git::{ReviewRequest, VersionControl};
use crate::io::llm::LlmProvider;
use crate::io::prereq::HostProbe;
use crate::io::static_tools::{StaticAnalyzer, StaticReport};
use crate::workflow::Collaborators;

/// LLM that replays responses in order and records prompts.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    responses: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            responses: RefCell::new(VecDeque::from([Err(message.to_string())])),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl LlmProvider for ScriptedLlm {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let mut responses = self.responses.borrow_mut();
        match responses.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => {
                responses.push_front(Err(message.clone()));
                Err(anyhow!(message))
            }
            None => Err(anyhow!("no scripted llm response left")),
        }
    }
}

/// Static analyzer that returns reports in order, repeating the last one.
#[derive(Debug)]
pub struct ScriptedStatic {
    reports: RefCell<VecDeque<StaticReport>>,
    calls: RefCell<usize>,
}

impl ScriptedStatic {
    pub fn new(report: StaticReport) -> Self {
        Self::sequence([report])
    }

    pub fn sequence(reports: impl IntoIterator<Item = StaticReport>) -> Self {
        Self {
            reports: RefCell::new(reports.into_iter().collect()),
            calls: RefCell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl StaticAnalyzer for ScriptedStatic {
    fn analyze(&self, _path: &Path, _language: Language) -> Result<StaticReport> {
        *self.calls.borrow_mut() += 1;
        let mut reports = self.reports.borrow_mut();
        if reports.len() > 1 {
            return reports.pop_front().ok_or_else(|| anyhow!("no report"));
        }
        Ok(reports.front().cloned().unwrap_or_default())
    }
}

/// Checker with fixed outcomes and an optional faulting gate.
#[derive(Debug)]
pub struct ScriptedChecker {
    syntax: CheckOutcome,
    load: CheckOutcome,
    fault: Option<Gate>,
    calls: RefCell<Vec<Gate>>,
}

impl ScriptedChecker {
    pub fn passing() -> Self {
        Self {
            syntax: CheckOutcome::Pass,
            load: CheckOutcome::Pass,
            fault: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_syntax(mut self, outcome: CheckOutcome) -> Self {
        self.syntax = outcome;
        self
    }

    pub fn with_load(mut self, outcome: CheckOutcome) -> Self {
        self.load = outcome;
        self
    }

    pub fn with_fault(mut self, gate: Gate) -> Self {
        self.fault = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<Gate> {
        self.calls.borrow().clone()
    }

    fn outcome(&self, gate: Gate, outcome: &CheckOutcome) -> Result<CheckOutcome> {
        self.calls.borrow_mut().push(gate);
        if self.fault == Some(gate) {
            return Err(anyhow!("scripted {gate} checker fault"));
        }
        Ok(outcome.clone())
    }
}

impl SourceChecker for ScriptedChecker {
    fn syntax(&self, _path: &Path, _language: Language) -> Result<CheckOutcome> {
        self.outcome(Gate::Syntax, &self.syntax)
    }

    fn load(&self, _path: &Path, _language: Language) -> Result<CheckOutcome> {
        self.outcome(Gate::Load, &self.load)
    }
}

/// Version control double that records calls and can fail a named operation.
#[derive(Debug)]
pub struct ScriptedVcs {
    url: String,
    fail_on: Option<String>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedVcs {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            fail_on: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Fail the first call whose name (`checkout`, `pull`, `push`, `review`, ...) matches.
    pub fn failing_on(mut self, operation: &str) -> Self {
        self.fail_on = Some(operation.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        let op = call.split_whitespace().next().unwrap_or_default().to_string();
        self.calls.borrow_mut().push(call);
        if self.fail_on.as_deref() == Some(op.as_str()) {
            return Err(anyhow!("scripted {op} failure"));
        }
        Ok(())
    }
}

impl VersionControl for ScriptedVcs {
    fn checkout(&self, branch: &str) -> Result<()> {
        self.record(format!("checkout {branch}"))
    }

    fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        self.record(format!("pull {remote} {branch}"))
    }

    fn create_branch(&self, branch: &str) -> Result<()> {
        self.record(format!("checkout -b {branch}"))
    }

    fn add(&self, paths: &[PathBuf]) -> Result<()> {
        let names: Vec<String> = paths
            .iter()
            .map(|p| crate::io::artifact::file_name(p))
            .collect();
        self.record(format!("add {}", names.join(" ")))
    }

    fn commit(&self, _message: &str) -> Result<()> {
        self.record("commit".to_string())
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.record(format!("push -u {remote} {branch}"))
    }

    fn open_review(&self, request: &ReviewRequest) -> Result<String> {
        self.record(format!("review {} -> {}", request.head, request.base))?;
        Ok(self.url.clone())
    }
}

/// Analyzer that replays results (or failures) in order.
#[derive(Debug, Default)]
pub struct ScriptedAnalyzer {
    results: RefCell<VecDeque<Result<AnalysisResult, String>>>,
    seen: RefCell<Vec<PathBuf>>,
}

impl ScriptedAnalyzer {
    pub fn new(results: impl IntoIterator<Item = Result<AnalysisResult, String>>) -> Self {
        Self {
            results: RefCell::new(results.into_iter().collect()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Paths analyzed so far, in order.
    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.borrow().clone()
    }
}

impl Analyze for ScriptedAnalyzer {
    fn analyze(&self, path: &Path) -> Result<AnalysisResult, AnalysisError> {
        self.seen.borrow_mut().push(path.to_path_buf());
        match self.results.borrow_mut().pop_front() {
            Some(Ok(mut result)) => {
                result.file_path = path.to_path_buf();
                Ok(result)
            }
            Some(Err(message)) => Err(AnalysisError::Provider {
                provider: "llm",
                message,
            }),
            None => Err(AnalysisError::Provider {
                provider: "llm",
                message: "no scripted analysis left".to_string(),
            }),
        }
    }
}

/// Host probe with a fixed set of programs and variables.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    pub programs: Vec<String>,
    pub env: Vec<String>,
}

impl StaticProbe {
    pub fn with_programs(programs: &[&str]) -> Self {
        Self {
            programs: programs.iter().map(|p| p.to_string()).collect(),
            env: Vec::new(),
        }
    }
}

impl HostProbe for StaticProbe {
    fn has_program(&self, program: &str) -> bool {
        self.programs.iter().any(|p| p == program)
    }

    fn has_env(&self, var: &str) -> bool {
        self.env.iter().any(|v| v == var)
    }
}

/// One scripted double per collaborator. Everything passes by default and
/// the probe knows `llm`, `git` and `gh`.
#[derive(Debug)]
pub struct ScriptedParts {
    pub analyzer: ScriptedAnalyzer,
    pub llm: ScriptedLlm,
    pub static_analyzer: ScriptedStatic,
    pub checker: ScriptedChecker,
    pub vcs: ScriptedVcs,
    pub probe: StaticProbe,
}

impl ScriptedParts {
    pub fn new(analyzer: ScriptedAnalyzer, llm: ScriptedLlm) -> Self {
        Self {
            analyzer,
            llm,
            static_analyzer: ScriptedStatic::new(StaticReport::default()),
            checker: ScriptedChecker::passing(),
            vcs: ScriptedVcs::new("https://example.test/pr/3"),
            probe: StaticProbe::with_programs(&["llm", "git", "gh"]),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            analyzer: &self.analyzer,
            llm: &self.llm,
            static_analyzer: &self.static_analyzer,
            checker: &self.checker,
            vcs: &self.vcs,
            probe: &self.probe,
        }
    }
}

/// Deterministic medium-severity issue.
pub fn issue(line: u32, description: &str) -> IssueRecord {
    IssueRecord {
        kind: IssueKind::Bug,
        severity: Severity::Medium,
        description: description.to_string(),
        line: Some(line),
        source_tool: "llm".to_string(),
    }
}

/// Analysis result with `issues_count` generated issues and a fixed score.
pub fn analysis_result(path: &Path, score: i64, issues_count: usize) -> AnalysisResult {
    let issues: Vec<IssueRecord> = (1..=issues_count)
        .map(|n| issue(n as u32, &format!("issue {n}")))
        .collect();
    AnalysisResult {
        file_path: path.to_path_buf(),
        language: Language::from_path(path).unwrap_or(Language::Python),
        quality_score: QualityScore::clamped(score),
        recommendations: Vec::new(),
        metadata: AnalysisMetadata {
            static_score: QualityScore::clamped(score),
            llm_score: QualityScore::clamped(score),
            static_issues: 0,
            llm_issues: issues.len(),
            tools_used: vec!["llm".to_string()],
            lines_of_code: 1,
            llm_parse: ParseMode::Structured,
            raw_llm_response: None,
        },
        issues,
    }
}

/// Fix response JSON replacing `original` with `replacement`.
pub fn fix_response(original: &str, replacement: &str) -> String {
    serde_json::json!({
        "fixes": [{
            "issue_description": "scripted fix",
            "line_number": 1,
            "original_code": original,
            "fixed_code": replacement,
            "explanation": "scripted"
        }]
    })
    .to_string()
}
