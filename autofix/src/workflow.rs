//! Workflow manager: prerequisite checks and dispatch over the workflow variants.
//!
//! Every stage records exactly one [`StageOutcome`] on the [`WorkflowRun`].
//! Stage faults are recorded as failed outcomes and halt the run; partial
//! results stay on the run. A [`WorkflowError`] means the run's own
//! invariants were violated and is logged, never propagated to callers.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::agents::CoordinatedPipeline;
use crate::analysis::Analyze;
use crate::core::apply::apply_fixes;
use crate::core::types::{
    CandidateArtifact, FixBatch, GateStatus, PipelineStage, Stage, StageOutcome, TestReport,
    WorkflowRun, WorkflowType,
};
use crate::error::{ConfigurationError, WorkflowError};
use crate::fixes::{FixGenerator, write_candidate};
use crate::io::artifact::read_source;
use crate::io::checks::SourceChecker;
use crate::io::config::AutofixConfig;
use crate::io::git::VersionControl;
use crate::io::llm::LlmProvider;
use crate::io::prereq::HostProbe;
use crate::io::static_tools::StaticAnalyzer;
use crate::iterate::{IterationController, IterationReport};
use crate::publish::{ChangePublisher, PublishRequest};
use crate::verify::Verifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowOptions {
    /// Open a review request after verification passes.
    pub publish: bool,
    /// Analyze and generate fixes only; nothing is applied.
    pub dry_run: bool,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            publish: true,
            dry_run: false,
        }
    }
}

/// Cloneable cancellation flag checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Display metadata for a workflow variant.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorkflowInfo {
    pub workflow: WorkflowType,
    pub name: &'static str,
    pub description: &'static str,
    pub features: &'static [&'static str],
}

pub const WORKFLOWS: [WorkflowInfo; 3] = [
    WorkflowInfo {
        workflow: WorkflowType::AnalysisOnly,
        name: "Analysis Only",
        description: "Static and LLM analysis with a combined quality score",
        features: &["static analysis", "llm review", "quality score"],
    },
    WorkflowInfo {
        workflow: WorkflowType::AutoFix,
        name: "Auto Fix",
        description: "Analyze, fix, verify and open a review request",
        features: &[
            "static analysis",
            "llm review",
            "fix generation",
            "verification gate",
            "review request",
        ],
    },
    WorkflowInfo {
        workflow: WorkflowType::Coordinated,
        name: "Coordinated",
        description: "Role pipeline: coordinator, analyzer, fixer, tester, publisher",
        features: &[
            "explicit agent roles",
            "agent interaction log",
            "verification gate",
            "review request",
        ],
    },
];

pub fn workflow_info(workflow: WorkflowType) -> &'static WorkflowInfo {
    match workflow {
        WorkflowType::AnalysisOnly => &WORKFLOWS[0],
        WorkflowType::AutoFix => &WORKFLOWS[1],
        WorkflowType::Coordinated => &WORKFLOWS[2],
    }
}

/// Whether the pipeline continues after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageFlow {
    Continue,
    Stop,
}

/// External collaborators of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub analyzer: &'a dyn Analyze,
    pub llm: &'a dyn LlmProvider,
    pub static_analyzer: &'a dyn StaticAnalyzer,
    pub checker: &'a dyn SourceChecker,
    pub vcs: &'a dyn VersionControl,
    pub probe: &'a dyn HostProbe,
}

/// Iterative run: the round report plus the verify/publish stages that follow it.
#[derive(Debug, Clone, Serialize)]
pub struct IterativeRun {
    pub run: WorkflowRun,
    pub iterations: IterationReport,
}

pub struct WorkflowManager<'a> {
    config: &'a AutofixConfig,
    parts: Collaborators<'a>,
    cancel: CancelToken,
}

impl<'a> WorkflowManager<'a> {
    pub fn new(config: &'a AutofixConfig, parts: Collaborators<'a>) -> Self {
        Self {
            config,
            parts,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Check the programs and variables `workflow` needs. Nothing runs on failure.
    pub fn check_prerequisites(
        &self,
        workflow: WorkflowType,
        options: WorkflowOptions,
    ) -> Result<(), ConfigurationError> {
        self.require_program("llm.command", &self.config.llm.command)?;
        for var in &self.config.llm.required_env {
            if !self.parts.probe.has_env(var) {
                return Err(ConfigurationError::MissingEnv { var: var.clone() });
            }
        }
        if workflow.can_publish() {
            self.require_program("git", &["git".to_string()])?;
            if options.publish && !options.dry_run {
                self.require_program("git.review_command", &self.config.git.review_command)?;
            }
        }
        Ok(())
    }

    fn require_program(&self, field: &str, command: &[String]) -> Result<(), ConfigurationError> {
        let program = command.first().ok_or_else(|| ConfigurationError::Invalid {
            message: format!("{field} is empty"),
        })?;
        if self.parts.probe.has_program(program) {
            Ok(())
        } else {
            Err(ConfigurationError::MissingPrerequisite {
                name: program.clone(),
                detail: format!("`{program}` ({field}) was not found on PATH"),
            })
        }
    }

    #[instrument(skip_all, fields(path = %file_path.display(), workflow = workflow.as_str()))]
    pub fn execute(
        &self,
        file_path: &Path,
        workflow: WorkflowType,
        options: WorkflowOptions,
    ) -> Result<WorkflowRun, ConfigurationError> {
        self.check_prerequisites(workflow, options)?;
        let mut run = WorkflowRun::new(file_path, workflow);
        let outcome = self.dispatch(&mut run, options);
        finish(&mut run, outcome);
        Ok(run)
    }

    fn dispatch(&self, run: &mut WorkflowRun, options: WorkflowOptions) -> Result<(), WorkflowError> {
        run.record(StageOutcome::passed(
            Stage::Prerequisites,
            "all prerequisites present",
        ))?;
        match run.workflow {
            WorkflowType::AnalysisOnly => {
                self.step(run, PipelineStage::Analyze, options)?;
                Ok(())
            }
            WorkflowType::AutoFix => {
                for stage in PipelineStage::ALL {
                    if self.step(run, stage, options)? == StageFlow::Stop {
                        break;
                    }
                }
                Ok(())
            }
            WorkflowType::Coordinated => CoordinatedPipeline::new(self).run(run, options),
        }
    }

    /// Run one pipeline stage, or record a cancellation in its place.
    pub(crate) fn step(
        &self,
        run: &mut WorkflowRun,
        stage: PipelineStage,
        options: WorkflowOptions,
    ) -> Result<StageFlow, WorkflowError> {
        if self.cancel.is_cancelled() {
            let stage = Stage::from(stage);
            warn!(stage = %stage, "run cancelled");
            run.record(StageOutcome::failed(stage, "cancelled"))?;
            return Ok(StageFlow::Stop);
        }
        match stage {
            PipelineStage::Analyze => self.analyze_stage(run),
            PipelineStage::GenerateFixes => self.generate_stage(run, options),
            PipelineStage::Apply => self.apply_stage(run),
            PipelineStage::Verify => self.verify_stage(run),
            PipelineStage::Publish => self.publish_stage(run, options),
        }
    }

    fn analyze_stage(&self, run: &mut WorkflowRun) -> Result<StageFlow, WorkflowError> {
        match self.parts.analyzer.analyze(&run.file_path) {
            Ok(analysis) => {
                let clean = analysis.issues.is_empty();
                let detail = format!(
                    "quality {}/10, {} issue(s)",
                    analysis.quality_score,
                    analysis.issues.len()
                );
                info!(
                    quality = analysis.quality_score.get(),
                    issues = analysis.issues.len(),
                    "analysis stage completed"
                );
                run.analysis = Some(analysis);
                run.record(StageOutcome::completed(Stage::Analyze, detail))?;
                Ok(if clean {
                    StageFlow::Stop
                } else {
                    StageFlow::Continue
                })
            }
            Err(err) => halt(run, Stage::Analyze, err.to_string()),
        }
    }

    fn generate_stage(
        &self,
        run: &mut WorkflowRun,
        options: WorkflowOptions,
    ) -> Result<StageFlow, WorkflowError> {
        let Some(analysis) = run.analysis.as_ref() else {
            return halt(run, Stage::GenerateFixes, "no analysis result to fix");
        };
        let source = match read_source(&run.file_path) {
            Ok(source) => source,
            Err(err) => return halt(run, Stage::GenerateFixes, format!("{err:#}")),
        };
        let fixer = FixGenerator::new(self.parts.llm, self.config.analysis.max_issues_to_fix);
        let generated = fixer.generate(&source, analysis.language, &analysis.issues);

        match generated {
            Ok(batch) if batch.is_empty() => {
                let reason = batch
                    .explanation
                    .clone()
                    .unwrap_or_else(|| "fix provider returned no fixes".to_string());
                run.fixes = Some(batch);
                halt(run, Stage::GenerateFixes, reason)
            }
            Ok(batch) => {
                let detail = if batch.whole_file.is_some() {
                    format!("{} fix(es) plus a whole-file rewrite", batch.fixes.len())
                } else {
                    format!("{} fix(es)", batch.fixes.len())
                };
                run.fixes = Some(batch);
                run.record(StageOutcome::completed(Stage::GenerateFixes, detail))?;
                if options.dry_run {
                    info!("dry run, stopping before apply");
                    return Ok(StageFlow::Stop);
                }
                Ok(StageFlow::Continue)
            }
            Err(err) => halt(run, Stage::GenerateFixes, err.to_string()),
        }
    }

    fn apply_stage(&self, run: &mut WorkflowRun) -> Result<StageFlow, WorkflowError> {
        let Some(batch) = run.fixes.as_ref() else {
            return halt(run, Stage::Apply, "no fixes to apply");
        };
        let source = match read_source(&run.file_path) {
            Ok(source) => source,
            Err(err) => return halt(run, Stage::Apply, format!("{err:#}")),
        };
        let outcome = apply_fixes(&source, batch);
        if outcome.applied == 0 && !outcome.whole_file {
            return halt(
                run,
                Stage::Apply,
                format!(
                    "no fix matched the source; {} stale fix(es) skipped",
                    outcome.skipped
                ),
            );
        }

        let path = match write_candidate(&run.file_path, &outcome.content) {
            Ok(path) => path,
            Err(err) => return halt(run, Stage::Apply, format!("{err:#}")),
        };
        let detail = if outcome.whole_file {
            format!("whole-file rewrite written to {}", path.display())
        } else {
            format!(
                "applied {} fix(es), skipped {} stale fix(es); candidate {}",
                outcome.applied,
                outcome.skipped,
                path.display()
            )
        };
        run.candidate = Some(CandidateArtifact {
            path,
            applied: outcome.applied,
            skipped: outcome.skipped,
            whole_file: outcome.whole_file,
        });
        run.record(StageOutcome::completed(Stage::Apply, detail))?;
        Ok(StageFlow::Continue)
    }

    fn verify_stage(&self, run: &mut WorkflowRun) -> Result<StageFlow, WorkflowError> {
        let Some(candidate) = run.candidate.as_ref().map(|c| c.path.clone()) else {
            return halt(run, Stage::Verify, "no candidate artifact to verify");
        };
        let verifier = Verifier::new(
            self.parts.static_analyzer,
            self.parts.checker,
            self.config.verify.severity_floor,
        );
        match verifier.verify(&candidate) {
            Ok(report) => {
                let passed = report.passed();
                let detail = gate_summary(&report);
                run.set_test_report(report);
                if passed {
                    run.record(StageOutcome::passed(Stage::Verify, detail))?;
                    Ok(StageFlow::Continue)
                } else {
                    halt(run, Stage::Verify, detail)
                }
            }
            Err(err) => halt(run, Stage::Verify, err.to_string()),
        }
    }

    fn publish_stage(
        &self,
        run: &mut WorkflowRun,
        options: WorkflowOptions,
    ) -> Result<StageFlow, WorkflowError> {
        if !options.publish || options.dry_run {
            debug!("publishing disabled");
            return Ok(StageFlow::Stop);
        }
        let report = match run.test_report() {
            Some(report) if report.passed() => report.clone(),
            _ => return Err(WorkflowError::Ungated),
        };
        let Some(candidate) = run.candidate.clone() else {
            return halt(run, Stage::Publish, "no candidate artifact to publish");
        };
        let request = PublishRequest {
            target: run.file_path.clone(),
            candidate: candidate.path,
            fixes: run
                .fixes
                .as_ref()
                .map(|batch| batch.fixes.clone())
                .unwrap_or_default(),
            whole_file: candidate.whole_file,
            report,
            quality_before: run
                .analysis
                .as_ref()
                .map(|a| (a.quality_score.get(), a.issues.len())),
        };

        let publisher = ChangePublisher::new(self.parts.vcs, self.config.git.clone());
        match publisher.publish(&request) {
            Ok(reference) => {
                let detail = format!("{} ({})", reference.url, reference.branch);
                run.set_change_reference(reference)?;
                run.record(StageOutcome::completed(Stage::Publish, detail))?;
                Ok(StageFlow::Stop)
            }
            Err(err) => halt(run, Stage::Publish, err.to_string()),
        }
    }

    /// Run the iteration controller, then verify the final artifact once and
    /// publish it when publishing is enabled.
    #[instrument(skip_all, fields(path = %file_path.display(), rounds))]
    pub fn execute_iterative(
        &self,
        file_path: &Path,
        rounds: u32,
        options: WorkflowOptions,
    ) -> Result<IterativeRun, ConfigurationError> {
        self.check_prerequisites(WorkflowType::AutoFix, options)?;
        let mut run = WorkflowRun::new(file_path, WorkflowType::AutoFix);
        let mut controller = IterationController::new(
            self.parts.analyzer,
            FixGenerator::new(self.parts.llm, self.config.analysis.max_issues_to_fix),
            self.cancel.clone(),
        );
        let report = controller.run_iterations(file_path, rounds);
        let outcome = self.finish_iterations(&mut run, &report, options);
        finish(&mut run, outcome);
        Ok(IterativeRun {
            run,
            iterations: report,
        })
    }

    fn finish_iterations(
        &self,
        run: &mut WorkflowRun,
        report: &IterationReport,
        options: WorkflowOptions,
    ) -> Result<(), WorkflowError> {
        run.record(StageOutcome::passed(
            Stage::Prerequisites,
            "all prerequisites present",
        ))?;
        let detail = format!("{} round(s), {}", report.history.len(), report.stop);
        if !report.stop.is_clean() {
            run.record(StageOutcome::failed(Stage::Iterate, detail))?;
            return Ok(());
        }
        run.record(StageOutcome::completed(Stage::Iterate, detail))?;

        if options.dry_run || !report.produced_artifact(&run.file_path) {
            return Ok(());
        }
        run.fixes = Some(FixBatch {
            fixes: report.fixes.clone(),
            whole_file: None,
            explanation: None,
        });
        run.candidate = Some(CandidateArtifact {
            path: report.final_artifact.clone(),
            applied: report.fixes.len(),
            skipped: 0,
            whole_file: false,
        });
        if self.step(run, PipelineStage::Verify, options)? == StageFlow::Continue {
            self.step(run, PipelineStage::Publish, options)?;
        }
        Ok(())
    }
}

fn halt(
    run: &mut WorkflowRun,
    stage: Stage,
    error: impl Into<String>,
) -> Result<StageFlow, WorkflowError> {
    let error = error.into();
    warn!(stage = %stage, error = %error, "stage failed");
    run.record(StageOutcome::failed(stage, error))?;
    Ok(StageFlow::Stop)
}

fn finish(run: &mut WorkflowRun, outcome: Result<(), WorkflowError>) {
    match outcome {
        Ok(()) => run.success = !run.is_halted(),
        Err(err) => {
            warn!(err = %err, "workflow invariant violated");
            run.success = false;
        }
    }
    info!(
        success = run.success,
        stages = run.stages().len(),
        "workflow finished"
    );
}

fn gate_summary(report: &TestReport) -> String {
    report
        .details
        .iter()
        .map(|gate| {
            let status = match gate.status {
                GateStatus::Pass => "pass".to_string(),
                GateStatus::Skipped => "skipped".to_string(),
                GateStatus::Fail => format!("fail ({})", gate.message),
            };
            format!("{}: {status}", gate.gate)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Gate, StageStatus};
    use crate::io::checks::CheckOutcome;
    use crate::test_support::{
        ScriptedAnalyzer, ScriptedChecker, ScriptedLlm, ScriptedParts, StaticProbe, analysis_result,
        fix_response,
    };
    use std::fs;
    use std::path::PathBuf;

    fn target(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("app.py");
        fs::write(&path, contents).expect("write");
        (temp, path)
    }

    fn stages(run: &WorkflowRun) -> Vec<(Stage, StageStatus)> {
        run.stages().iter().map(|o| (o.stage, o.status)).collect()
    }

    #[test]
    fn missing_llm_program_is_a_configuration_error() {
        let config = AutofixConfig::default();
        let mut doubles = ScriptedParts::new(ScriptedAnalyzer::new([]), ScriptedLlm::new(Vec::<&str>::new()));
        doubles.probe = StaticProbe::with_programs(&["git", "gh"]);
        let manager = WorkflowManager::new(&config, doubles.collaborators());

        let err = manager
            .execute(Path::new("app.py"), WorkflowType::AnalysisOnly, WorkflowOptions::default())
            .expect_err("missing llm");
        assert!(matches!(err, ConfigurationError::MissingPrerequisite { ref name, .. } if name == "llm"));
        assert!(doubles.analyzer.seen().is_empty());
    }

    #[test]
    fn required_env_is_checked() {
        let mut config = AutofixConfig::default();
        config.llm.required_env = vec!["LLM_API_KEY".to_string()];
        let doubles = ScriptedParts::new(ScriptedAnalyzer::new([]), ScriptedLlm::new(Vec::<&str>::new()));
        let manager = WorkflowManager::new(&config, doubles.collaborators());

        let err = manager
            .check_prerequisites(WorkflowType::AnalysisOnly, WorkflowOptions::default())
            .expect_err("missing env");
        assert!(matches!(err, ConfigurationError::MissingEnv { ref var } if var == "LLM_API_KEY"));
    }

    #[test]
    fn git_and_review_cli_only_needed_when_they_can_run() {
        let config = AutofixConfig::default();
        let mut doubles = ScriptedParts::new(ScriptedAnalyzer::new([]), ScriptedLlm::new(Vec::<&str>::new()));
        doubles.probe = StaticProbe::with_programs(&["llm"]);
        let manager = WorkflowManager::new(&config, doubles.collaborators());

        manager
            .check_prerequisites(WorkflowType::AnalysisOnly, WorkflowOptions::default())
            .expect("analysis needs only the llm");
        let err = manager
            .check_prerequisites(WorkflowType::AutoFix, WorkflowOptions::default())
            .expect_err("git required");
        assert!(matches!(err, ConfigurationError::MissingPrerequisite { ref name, .. } if name == "git"));

        let mut doubles = ScriptedParts::new(ScriptedAnalyzer::new([]), ScriptedLlm::new(Vec::<&str>::new()));
        doubles.probe = StaticProbe::with_programs(&["llm", "git"]);
        let manager = WorkflowManager::new(&config, doubles.collaborators());
        let no_publish = WorkflowOptions {
            publish: false,
            dry_run: false,
        };
        manager
            .check_prerequisites(WorkflowType::Coordinated, no_publish)
            .expect("review cli not needed without publishing");
        assert!(
            manager
                .check_prerequisites(WorkflowType::Coordinated, WorkflowOptions::default())
                .is_err()
        );
    }

    #[test]
    fn analysis_only_records_one_stage() {
        let (_temp, path) = target("x = 1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 6, 2))]),
            ScriptedLlm::new(Vec::<&str>::new()),
        );
        let run = WorkflowManager::new(&config, doubles.collaborators())
            .execute(&path, WorkflowType::AnalysisOnly, WorkflowOptions::default())
            .expect("run");

        assert!(run.success);
        assert_eq!(
            stages(&run),
            vec![
                (Stage::Prerequisites, StageStatus::Passed),
                (Stage::Analyze, StageStatus::Completed)
            ]
        );
        assert_eq!(run.analysis.as_ref().map(|a| a.issues.len()), Some(2));
        assert_eq!(doubles.llm.calls(), 0);
    }

    #[test]
    fn auto_fix_runs_every_stage_and_publishes() {
        let (_temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("x=1", "x = 1")]),
        );
        let run = WorkflowManager::new(&config, doubles.collaborators())
            .execute(&path, WorkflowType::AutoFix, WorkflowOptions::default())
            .expect("run");

        assert!(run.success, "stages: {:?}", run.stages());
        assert_eq!(
            stages(&run),
            vec![
                (Stage::Prerequisites, StageStatus::Passed),
                (Stage::Analyze, StageStatus::Completed),
                (Stage::GenerateFixes, StageStatus::Completed),
                (Stage::Apply, StageStatus::Completed),
                (Stage::Verify, StageStatus::Passed),
                (Stage::Publish, StageStatus::Completed),
            ]
        );
        let reference = run.change_reference().expect("reference");
        assert_eq!(reference.url, "https://example.test/pr/3");
        assert!(run.test_report().is_some_and(TestReport::passed));
        assert_eq!(fs::read_to_string(&path).expect("read"), "x = 1\n");
        assert!(doubles.vcs.calls().iter().any(|c| c.starts_with("review ")));
    }

    #[test]
    fn failed_verification_never_publishes() {
        let (_temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let mut doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("x=1", "x = (")]),
        );
        doubles.checker = ScriptedChecker::passing().with_syntax(CheckOutcome::Fail {
            message: "SyntaxError: '(' was never closed".to_string(),
            line: Some(1),
            column: Some(5),
        });
        let run = WorkflowManager::new(&config, doubles.collaborators())
            .execute(&path, WorkflowType::AutoFix, WorkflowOptions::default())
            .expect("run");

        assert!(!run.success);
        let failure = run.failure().expect("failure");
        assert_eq!(failure.stage, Stage::Verify);
        assert!(failure.error.as_deref().is_some_and(|e| e.contains("syntax: fail")));
        assert!(run.change_reference().is_none());
        assert!(doubles.vcs.calls().is_empty());
        assert_eq!(fs::read_to_string(&path).expect("read"), "x=1\n");
    }

    #[test]
    fn checker_fault_fails_verify_stage() {
        let (_temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let mut doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("x=1", "x = 1")]),
        );
        doubles.checker = ScriptedChecker::passing().with_fault(Gate::Syntax);
        let run = WorkflowManager::new(&config, doubles.collaborators())
            .execute(&path, WorkflowType::AutoFix, WorkflowOptions::default())
            .expect("run");

        assert_eq!(run.failure().map(|f| f.stage), Some(Stage::Verify));
        assert!(run.test_report().is_none());
    }

    #[test]
    fn dry_run_stops_after_fix_generation() {
        let (temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("x=1", "x = 1")]),
        );
        let options = WorkflowOptions {
            publish: true,
            dry_run: true,
        };
        let run = WorkflowManager::new(&config, doubles.collaborators())
            .execute(&path, WorkflowType::AutoFix, options)
            .expect("run");

        assert!(run.success);
        assert_eq!(run.stages().last().map(|o| o.stage), Some(Stage::GenerateFixes));
        assert!(run.fixes.is_some());
        assert!(run.candidate.is_none());
        assert!(!temp.path().join("app_fixed.py").exists());
    }

    #[test]
    fn clean_file_succeeds_after_analysis() {
        let (_temp, path) = target("x = 1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 9, 0))]),
            ScriptedLlm::new(Vec::<&str>::new()),
        );
        let run = WorkflowManager::new(&config, doubles.collaborators())
            .execute(&path, WorkflowType::AutoFix, WorkflowOptions::default())
            .expect("run");

        assert!(run.success);
        assert_eq!(run.stages().len(), 2);
        assert_eq!(doubles.llm.calls(), 0);
    }

    #[test]
    fn stale_fixes_fail_apply_with_skip_count() {
        let (_temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("y=2", "y = 2")]),
        );
        let run = WorkflowManager::new(&config, doubles.collaborators())
            .execute(&path, WorkflowType::AutoFix, WorkflowOptions::default())
            .expect("run");

        let failure = run.failure().expect("failure");
        assert_eq!(failure.stage, Stage::Apply);
        assert!(failure.error.as_deref().is_some_and(|e| e.contains("1 stale fix(es)")));
    }

    #[test]
    fn unusable_fix_output_fails_generation() {
        let (_temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new(["I cannot help with that."]),
        );
        let run = WorkflowManager::new(&config, doubles.collaborators())
            .execute(&path, WorkflowType::AutoFix, WorkflowOptions::default())
            .expect("run");

        assert_eq!(run.failure().map(|f| f.stage), Some(Stage::GenerateFixes));
        assert!(run.fixes.is_some());
    }

    #[test]
    fn cancelled_run_records_cancellation() {
        let (_temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new(Vec::<&str>::new()),
        );
        let cancel = CancelToken::new();
        let manager = WorkflowManager::new(&config, doubles.collaborators()).with_cancel(cancel.clone());
        cancel.cancel();

        let run = manager
            .execute(&path, WorkflowType::AutoFix, WorkflowOptions::default())
            .expect("run");

        assert!(!run.success);
        let failure = run.failure().expect("failure");
        assert_eq!(failure.stage, Stage::Analyze);
        assert_eq!(failure.error.as_deref(), Some("cancelled"));
        assert!(doubles.analyzer.seen().is_empty());
    }

    #[test]
    fn iterative_run_verifies_and_publishes_final_artifact_once() {
        let (temp, path) = target("a=1\nb=2\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([
                Ok(analysis_result(&path, 4, 2)),
                Ok(analysis_result(&path, 7, 1)),
                Ok(analysis_result(&path, 9, 0)),
            ]),
            ScriptedLlm::new([fix_response("a=1", "a = 1"), fix_response("b=2", "b = 2")]),
        );
        let result = WorkflowManager::new(&config, doubles.collaborators())
            .execute_iterative(&path, 5, WorkflowOptions::default())
            .expect("run");

        assert!(result.run.success, "stages: {:?}", result.run.stages());
        assert_eq!(result.iterations.history.len(), 3);
        assert_eq!(
            stages(&result.run),
            vec![
                (Stage::Prerequisites, StageStatus::Passed),
                (Stage::Iterate, StageStatus::Completed),
                (Stage::Verify, StageStatus::Passed),
                (Stage::Publish, StageStatus::Completed),
            ]
        );
        assert_eq!(doubles.checker.calls(), vec![Gate::Syntax, Gate::Load]);
        assert_eq!(fs::read_to_string(&path).expect("read"), "a = 1\nb = 2\n");
        assert!(!temp.path().join("app_iter2.py").exists());
    }

    #[test]
    fn iterative_failure_is_recorded() {
        let (_temp, path) = target("a=1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Err("model unavailable".to_string())]),
            ScriptedLlm::new(Vec::<&str>::new()),
        );
        let result = WorkflowManager::new(&config, doubles.collaborators())
            .execute_iterative(&path, 3, WorkflowOptions::default())
            .expect("run");

        assert!(!result.run.success);
        assert_eq!(result.run.failure().map(|f| f.stage), Some(Stage::Iterate));
        assert!(doubles.vcs.calls().is_empty());
    }

    #[test]
    fn iterative_run_without_publishing_still_verifies() {
        let (_temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let mut doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("x=1", "x = (")]),
        );
        doubles.checker = ScriptedChecker::passing().with_syntax(CheckOutcome::Fail {
            message: "SyntaxError: '(' was never closed".to_string(),
            line: Some(1),
            column: Some(5),
        });
        let no_publish = WorkflowOptions {
            publish: false,
            dry_run: false,
        };

        let result = WorkflowManager::new(&config, doubles.collaborators())
            .execute_iterative(&path, 1, no_publish)
            .expect("run");

        assert!(!result.run.success);
        assert_eq!(
            stages(&result.run),
            vec![
                (Stage::Prerequisites, StageStatus::Passed),
                (Stage::Iterate, StageStatus::Completed),
                (Stage::Verify, StageStatus::Failed),
            ]
        );
        assert!(result.run.test_report().is_some_and(|r| !r.passed()));
        assert_eq!(doubles.checker.calls(), vec![Gate::Syntax]);
        assert!(doubles.vcs.calls().is_empty());
    }

    #[test]
    fn iterative_run_without_publishing_stops_after_passing_verify() {
        let (_temp, path) = target("x=1\n");
        let config = AutofixConfig::default();
        let doubles = ScriptedParts::new(
            ScriptedAnalyzer::new([Ok(analysis_result(&path, 5, 1))]),
            ScriptedLlm::new([fix_response("x=1", "x = 1")]),
        );
        let no_publish = WorkflowOptions {
            publish: false,
            dry_run: false,
        };

        let result = WorkflowManager::new(&config, doubles.collaborators())
            .execute_iterative(&path, 1, no_publish)
            .expect("run");

        assert!(result.run.success, "stages: {:?}", result.run.stages());
        assert_eq!(
            result.run.stages().last().map(|o| (o.stage, o.status)),
            Some((Stage::Verify, StageStatus::Passed))
        );
        assert!(result.run.change_reference().is_none());
        assert!(doubles.vcs.calls().is_empty());
        assert_eq!(fs::read_to_string(&path).expect("read"), "x=1\n");
    }

    #[test]
    fn workflow_info_covers_every_variant() {
        for info in &WORKFLOWS {
            assert_eq!(workflow_info(info.workflow).name, info.name);
            assert!(!info.features.is_empty());
        }
    }
}
