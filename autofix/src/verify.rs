//! Layered verification gate: syntax, then static analysis, then load.
//!
//! A failed syntax gate short-circuits; the later gates are reported as
//! skipped and count as failures. Checker faults are [`VerificationError`]s.

use std::path::Path;

use tracing::{info, instrument};

use crate::core::language::Language;
use crate::core::types::{Gate, GateReport, GateStatus, Severity, TestReport};
use crate::error::VerificationError;
use crate::io::checks::{CheckOutcome, SourceChecker};
use crate::io::static_tools::StaticAnalyzer;

#[derive(Debug, Clone)]
pub struct Verifier<S, C> {
    static_analyzer: S,
    checker: C,
    severity_floor: Severity,
}

impl<S: StaticAnalyzer, C: SourceChecker> Verifier<S, C> {
    pub fn new(static_analyzer: S, checker: C, severity_floor: Severity) -> Self {
        Self {
            static_analyzer,
            checker,
            severity_floor,
        }
    }

    #[instrument(skip_all, fields(candidate = %candidate.display()))]
    pub fn verify(&self, candidate: &Path) -> Result<TestReport, VerificationError> {
        let language = Language::from_path(candidate).ok_or_else(|| VerificationError {
            gate: Gate::Syntax,
            message: format!("unsupported file type: {}", candidate.display()),
        })?;

        let syntax = self
            .checker
            .syntax(candidate, language)
            .map_err(|err| fault(Gate::Syntax, err))?;
        let syntax = gate_report(Gate::Syntax, syntax, language);
        if syntax.status != GateStatus::Pass {
            info!("syntax gate failed, skipping remaining gates");
            return Ok(TestReport {
                syntax_valid: false,
                static_pass: false,
                load_test: false,
                details: vec![
                    syntax,
                    skipped(Gate::Static),
                    skipped(Gate::Load),
                ],
            });
        }

        let static_report = self
            .static_analyzer
            .analyze(candidate, language)
            .map_err(|err| fault(Gate::Static, err))?;
        let blocking = static_report
            .issues
            .iter()
            .filter(|issue| issue.severity >= self.severity_floor)
            .count();
        let static_gate = GateReport {
            gate: Gate::Static,
            status: if blocking == 0 {
                GateStatus::Pass
            } else {
                GateStatus::Fail
            },
            message: if blocking == 0 {
                format!(
                    "no issues at or above {} ({} total)",
                    self.severity_floor.as_str(),
                    static_report.issues.len()
                )
            } else {
                format!(
                    "{blocking} issue(s) at or above {}",
                    self.severity_floor.as_str()
                )
            },
            line: static_report
                .issues
                .iter()
                .find(|issue| issue.severity >= self.severity_floor)
                .and_then(|issue| issue.line),
            column: None,
        };

        let load = self
            .checker
            .load(candidate, language)
            .map_err(|err| fault(Gate::Load, err))?;
        let load = gate_report(Gate::Load, load, language);

        let report = TestReport {
            syntax_valid: true,
            static_pass: static_gate.status == GateStatus::Pass,
            load_test: load.status == GateStatus::Pass,
            details: vec![syntax, static_gate, load],
        };
        info!(passed = report.passed(), "verification finished");
        Ok(report)
    }
}

fn fault(gate: Gate, err: anyhow::Error) -> VerificationError {
    VerificationError {
        gate,
        message: format!("{err:#}"),
    }
}

fn skipped(gate: Gate) -> GateReport {
    GateReport {
        gate,
        status: GateStatus::Skipped,
        message: "not run: syntax gate failed".to_string(),
        line: None,
        column: None,
    }
}

fn gate_report(gate: Gate, outcome: CheckOutcome, language: Language) -> GateReport {
    match outcome {
        CheckOutcome::Pass => GateReport {
            gate,
            status: GateStatus::Pass,
            message: "passed".to_string(),
            line: None,
            column: None,
        },
        CheckOutcome::NotConfigured => GateReport {
            gate,
            status: GateStatus::Pass,
            message: format!("no {gate} checker for {language}; gate passed without checking"),
            line: None,
            column: None,
        },
        CheckOutcome::Fail {
            message,
            line,
            column,
        } => GateReport {
            gate,
            status: GateStatus::Fail,
            message,
            line,
            column,
        },
    }
}
