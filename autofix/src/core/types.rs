//! Shared deterministic types for the remediation pipeline.
//!
//! These types define the contracts between stages. They carry no I/O and
//! enforce the run-level invariants (score bounds, append-only stage log,
//! verify-before-publish) by construction.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::language::Language;
use crate::error::WorkflowError;

/// Category of a detected problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Security,
    Performance,
    Style,
    Bug,
    Syntax,
    Resource,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Security => "security",
            IssueKind::Performance => "performance",
            IssueKind::Style => "style",
            IssueKind::Bug => "bug",
            IssueKind::Syntax => "syntax",
            IssueKind::Resource => "resource",
        }
    }

    /// Map provider vocabulary onto the fixed kinds. Unknown labels become `Style`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "security" | "vulnerability" => IssueKind::Security,
            "performance" | "perf" => IssueKind::Performance,
            "bug" | "error" | "correctness" => IssueKind::Bug,
            "syntax" => IssueKind::Syntax,
            "resource" | "resource_leak" | "leak" => IssueKind::Resource,
            _ => IssueKind::Style,
        }
    }
}

/// Issue severity. Variant order gives `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Map provider vocabulary onto the fixed severities. Unknown labels become `Low`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" | "error" => Severity::High,
            "medium" | "moderate" | "warning" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Quality score, always within `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct QualityScore(u8);

impl QualityScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Build a score, clamping out-of-range values into `1..=10`.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single detected problem, normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRecord {
    pub kind: IssueKind,
    pub severity: Severity,
    pub description: String,
    pub line: Option<u32>,
    pub source_tool: String,
}

/// How the LLM response was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    Structured,
    Unstructured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisMetadata {
    pub static_score: QualityScore,
    pub llm_score: QualityScore,
    pub static_issues: usize,
    pub llm_issues: usize,
    pub tools_used: Vec<String>,
    pub lines_of_code: usize,
    pub llm_parse: ParseMode,
    /// Raw LLM text, kept only when the response could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_llm_response: Option<String>,
}

/// Result of one analysis invocation. `quality_score` is derived, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub file_path: PathBuf,
    pub language: Language,
    pub quality_score: QualityScore,
    pub issues: Vec<IssueRecord>,
    pub recommendations: Vec<String>,
    pub metadata: AnalysisMetadata,
}

impl AnalysisResult {
    pub fn below_threshold(&self, threshold: u8) -> bool {
        self.quality_score.get() < threshold
    }
}

/// One suggested textual fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixRecord {
    pub issue_description: String,
    pub line_number: Option<u32>,
    pub original_snippet: String,
    pub replacement_snippet: String,
    pub explanation: String,
}

/// Fixes proposed for one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixBatch {
    pub fixes: Vec<FixRecord>,
    /// Whole-file replacement; preferred over the pairs when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whole_file: Option<String>,
    /// Best-effort note when the provider output could not be used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl FixBatch {
    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty() && self.whole_file.is_none()
    }
}

/// Result of applying a [`FixBatch`] to source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub content: String,
    pub applied: usize,
    /// Pairs whose `original_snippet` was empty or not found.
    pub skipped: usize,
    pub whole_file: bool,
}

/// Candidate artifact written next to the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateArtifact {
    pub path: PathBuf,
    pub applied: usize,
    pub skipped: usize,
    pub whole_file: bool,
}

/// Verification gates, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Syntax,
    Static,
    Load,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Syntax => "syntax",
            Gate::Static => "static",
            Gate::Load => "load",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
    /// Not run because an earlier gate failed. Counts as a failure.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub gate: Gate,
    pub status: GateStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// Outcome of the layered verification gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub syntax_valid: bool,
    pub static_pass: bool,
    pub load_test: bool,
    pub details: Vec<GateReport>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.syntax_valid && self.static_pass && self.load_test
    }
}

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prerequisites,
    Analyze,
    GenerateFixes,
    Apply,
    Verify,
    Publish,
    Iterate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prerequisites => "prerequisites",
            Stage::Analyze => "analyze",
            Stage::GenerateFixes => "generate_fixes",
            Stage::Apply => "apply",
            Stage::Verify => "verify",
            Stage::Publish => "publish",
            Stage::Iterate => "iterate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages the workflow manager steps through. `Prerequisites` and `Iterate`
/// are recorded by the entry points and never stepped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Analyze,
    GenerateFixes,
    Apply,
    Verify,
    Publish,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::Analyze,
        PipelineStage::GenerateFixes,
        PipelineStage::Apply,
        PipelineStage::Verify,
        PipelineStage::Publish,
    ];
}

impl From<PipelineStage> for Stage {
    fn from(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Analyze => Stage::Analyze,
            PipelineStage::GenerateFixes => Stage::GenerateFixes,
            PipelineStage::Apply => Stage::Apply,
            PipelineStage::Verify => Stage::Verify,
            PipelineStage::Publish => Stage::Publish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageOutcome {
    pub fn completed(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            detail: Some(detail.into()),
            error: None,
        }
    }

    pub fn passed(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Passed,
            detail: Some(detail.into()),
            error: None,
        }
    }

    pub fn failed(stage: Stage, error: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            detail: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

/// Append-only stage log. Nothing can be recorded after a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StageLog(Vec<StageOutcome>);

impl StageLog {
    pub fn record(&mut self, outcome: StageOutcome) -> Result<(), WorkflowError> {
        if let Some(failed) = self.0.iter().find(|o| o.is_failed()) {
            return Err(WorkflowError::Halted {
                failed: failed.stage,
                attempted: outcome.stage,
            });
        }
        self.0.push(outcome);
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.0.iter().any(StageOutcome::is_failed)
    }

    /// First failed stage, if any.
    pub fn failure(&self) -> Option<&StageOutcome> {
        self.0.iter().find(|o| o.is_failed())
    }

    pub fn as_slice(&self) -> &[StageOutcome] {
        &self.0
    }
}

/// Workflow variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    AnalysisOnly,
    AutoFix,
    Coordinated,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::AnalysisOnly => "analysis_only",
            WorkflowType::AutoFix => "auto_fix",
            WorkflowType::Coordinated => "coordinated",
        }
    }

    /// True for variants that can reach the publish stage.
    pub fn can_publish(&self) -> bool {
        !matches!(self, WorkflowType::AnalysisOnly)
    }
}

/// Roles of the coordinated pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Coordinator,
    Analyzer,
    Fixer,
    Tester,
    Publisher,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::Analyzer => "analyzer",
            AgentRole::Fixer => "fixer",
            AgentRole::Tester => "tester",
            AgentRole::Publisher => "publisher",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInteraction {
    pub role: AgentRole,
    pub action: String,
    pub summary: String,
}

/// Reference to a published review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeReference {
    pub branch: String,
    pub url: String,
}

/// Top-level aggregate for one workflow execution.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub file_path: PathBuf,
    pub workflow: WorkflowType,
    pub analysis: Option<AnalysisResult>,
    pub fixes: Option<FixBatch>,
    pub candidate: Option<CandidateArtifact>,
    test_report: Option<TestReport>,
    stages: StageLog,
    pub success: bool,
    change_reference: Option<ChangeReference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interactions: Vec<AgentInteraction>,
}

impl WorkflowRun {
    pub fn new(file_path: impl Into<PathBuf>, workflow: WorkflowType) -> Self {
        Self {
            file_path: file_path.into(),
            workflow,
            analysis: None,
            fixes: None,
            candidate: None,
            test_report: None,
            stages: StageLog::default(),
            success: false,
            change_reference: None,
            interactions: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: StageOutcome) -> Result<(), WorkflowError> {
        self.stages.record(outcome)
    }

    pub fn stages(&self) -> &[StageOutcome] {
        self.stages.as_slice()
    }

    pub fn is_halted(&self) -> bool {
        self.stages.is_halted()
    }

    pub fn failure(&self) -> Option<&StageOutcome> {
        self.stages.failure()
    }

    pub fn test_report(&self) -> Option<&TestReport> {
        self.test_report.as_ref()
    }

    pub fn set_test_report(&mut self, report: TestReport) {
        // A new report invalidates any reference gated on the previous one.
        if !report.passed() {
            self.change_reference = None;
        }
        self.test_report = Some(report);
    }

    pub fn change_reference(&self) -> Option<&ChangeReference> {
        self.change_reference.as_ref()
    }

    /// Attach a review reference. Refused unless the current report passed.
    pub fn set_change_reference(&mut self, reference: ChangeReference) -> Result<(), WorkflowError> {
        match &self.test_report {
            Some(report) if report.passed() => {
                self.change_reference = Some(reference);
                Ok(())
            }
            _ => Err(WorkflowError::Ungated),
        }
    }
}

/// Per-round snapshot kept by the iteration controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationRecord {
    pub index: u32,
    pub quality_score: QualityScore,
    pub issues_count: usize,
}
