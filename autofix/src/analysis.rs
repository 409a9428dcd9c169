//! Analysis coordinator: static tools plus LLM review, merged into one result.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::core::language::Language;
use crate::core::merge::{
    combined_score, merge_issues, static_recommendations, static_score, union_recommendations,
};
use crate::core::parse::{LLM_SOURCE, ParseOutcome, parse_analysis_response};
use crate::core::types::{AnalysisMetadata, AnalysisResult, ParseMode, QualityScore};
use crate::error::AnalysisError;
use crate::io::artifact::{file_name, read_source};
use crate::io::llm::LlmProvider;
use crate::io::prompt::analysis_prompt;
use crate::io::static_tools::StaticAnalyzer;

/// Score used when the LLM response cannot be parsed.
pub const FALLBACK_LLM_SCORE: i64 = 5;
pub const FALLBACK_RECOMMENDATION: &str = "Review the code manually";

/// Anything that can produce an [`AnalysisResult`] for a file.
pub trait Analyze {
    fn analyze(&self, path: &Path) -> Result<AnalysisResult, AnalysisError>;
}

impl<T: Analyze + ?Sized> Analyze for &T {
    fn analyze(&self, path: &Path) -> Result<AnalysisResult, AnalysisError> {
        (**self).analyze(path)
    }
}

/// Stateless coordinator over a static provider and an LLM provider.
#[derive(Debug, Clone)]
pub struct AnalysisCoordinator<S, L> {
    static_analyzer: S,
    llm: L,
}

impl<S: StaticAnalyzer, L: LlmProvider> AnalysisCoordinator<S, L> {
    pub fn new(static_analyzer: S, llm: L) -> Self {
        Self {
            static_analyzer,
            llm,
        }
    }
}

impl<S: StaticAnalyzer, L: LlmProvider> Analyze for AnalysisCoordinator<S, L> {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn analyze(&self, path: &Path) -> Result<AnalysisResult, AnalysisError> {
        let language = Language::from_path(path).ok_or_else(|| AnalysisError::UnsupportedLanguage {
            path: path.to_path_buf(),
        })?;
        let code = read_source(path).map_err(|err| AnalysisError::Unreadable {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })?;

        let static_report = self
            .static_analyzer
            .analyze(path, language)
            .map_err(|err| AnalysisError::Provider {
                provider: "static",
                message: format!("{err:#}"),
            })?;
        let static_sub = static_score(&static_report.issues);
        debug!(
            issues = static_report.issues.len(),
            score = static_sub.get(),
            "static analysis done"
        );

        let prompt = analysis_prompt(&file_name(path), language, &code, &static_report.issues)
            .map_err(|err| AnalysisError::Provider {
                provider: LLM_SOURCE,
                message: format!("{err:#}"),
            })?;
        let response = self
            .llm
            .complete(&prompt)
            .map_err(|err| AnalysisError::Provider {
                provider: LLM_SOURCE,
                message: format!("{err:#}"),
            })?;

        let (llm_raw_score, llm_issues, llm_recommendations, llm_parse, raw_llm_response) =
            match parse_analysis_response(&response) {
                ParseOutcome::Structured(parsed) => (
                    parsed.quality_score,
                    parsed.issues,
                    parsed.recommendations,
                    ParseMode::Structured,
                    None,
                ),
                ParseOutcome::Unstructured { raw, reason } => {
                    warn!(reason = %reason, "llm analysis unparsable, using fallback score");
                    (
                        FALLBACK_LLM_SCORE,
                        Vec::new(),
                        vec![FALLBACK_RECOMMENDATION.to_string()],
                        ParseMode::Unstructured,
                        Some(raw),
                    )
                }
            };

        let static_issue_count = static_report.issues.len();
        let llm_issue_count = llm_issues.len();
        let recommendations = union_recommendations(
            static_recommendations(&static_report.issues),
            llm_recommendations,
        );
        let issues = merge_issues(static_report.issues, llm_issues);
        let quality_score = combined_score(static_sub, llm_raw_score);

        let mut tools_used = static_report.tools_used;
        tools_used.push(LLM_SOURCE.to_string());

        info!(
            quality = quality_score.get(),
            issues = issues.len(),
            "analysis complete"
        );
        Ok(AnalysisResult {
            file_path: path.to_path_buf(),
            language,
            quality_score,
            issues,
            recommendations,
            metadata: AnalysisMetadata {
                static_score: static_sub,
                llm_score: QualityScore::clamped(llm_raw_score),
                static_issues: static_issue_count,
                llm_issues: llm_issue_count,
                tools_used,
                lines_of_code: code.lines().count(),
                llm_parse,
                raw_llm_response,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IssueKind, IssueRecord, Severity};
    use crate::io::static_tools::StaticReport;
    use crate::test_support::{ScriptedLlm, ScriptedStatic};
    use std::fs;

    fn static_issue(line: u32, description: &str) -> IssueRecord {
        IssueRecord {
            kind: IssueKind::Style,
            severity: Severity::Medium,
            description: description.to_string(),
            line: Some(line),
            source_tool: "flake8".to_string(),
        }
    }

    fn source_file(name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(name);
        fs::write(&path, contents).expect("write");
        (temp, path)
    }

    #[test]
    fn merges_static_and_llm_findings() {
        let (_temp, path) = source_file("app.py", "import os\nprint( 1)\n");
        let static_analyzer = ScriptedStatic::new(StaticReport {
            issues: vec![static_issue(2, "E201 whitespace after '('")],
            tools_used: vec!["flake8".to_string()],
        });
        let llm = ScriptedLlm::new([r#"{"quality_score": 6, "issues": [
            {"type": "style", "severity": "low", "line": 2, "description": "E201 whitespace after '(' in call"},
            {"type": "bug", "severity": "medium", "line": 1, "description": "unused import os"}
        ], "recommendations": ["Remove unused imports"]}"#]);

        let coordinator = AnalysisCoordinator::new(&static_analyzer, &llm);
        let result = coordinator.analyze(&path).expect("analyze");

        assert_eq!(result.language, Language::Python);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[0].source_tool, "flake8");
        assert_eq!(result.issues[1].description, "unused import os");
        // static 8 (one medium), llm 6 -> round(3.2 + 3.6) = 7
        assert_eq!(result.metadata.static_score.get(), 8);
        assert_eq!(result.quality_score.get(), 7);
        assert_eq!(
            result.recommendations,
            vec!["Follow coding style guidelines", "Remove unused imports"]
        );
        assert_eq!(result.metadata.tools_used, vec!["flake8", "llm"]);
        assert_eq!(result.metadata.lines_of_code, 2);
        assert!(llm.prompts()[0].contains("E201 whitespace after '('"));
    }

    #[test]
    fn unparsable_llm_output_degrades_to_fallback() {
        let (_temp, path) = source_file("app.js", "let x = 1;\n");
        let static_analyzer = ScriptedStatic::new(StaticReport::default());
        let llm = ScriptedLlm::new(["Looks fine overall, nothing to report."]);

        let result = AnalysisCoordinator::new(&static_analyzer, &llm)
            .analyze(&path)
            .expect("analyze");

        assert!(result.issues.is_empty());
        assert_eq!(result.metadata.llm_parse, ParseMode::Unstructured);
        assert_eq!(result.metadata.llm_score.get(), 5);
        // static 10, llm 5 -> round(4 + 3) = 7
        assert_eq!(result.quality_score.get(), 7);
        assert_eq!(result.recommendations, vec![FALLBACK_RECOMMENDATION]);
        assert_eq!(
            result.metadata.raw_llm_response.as_deref(),
            Some("Looks fine overall, nothing to report.")
        );
    }

    #[test]
    fn out_of_range_llm_score_is_clamped() {
        let (_temp, path) = source_file("main.go", "package main\n");
        let static_analyzer = ScriptedStatic::new(StaticReport::default());
        let llm = ScriptedLlm::new([r#"{"quality_score": 42, "issues": []}"#]);
        let result = AnalysisCoordinator::new(&static_analyzer, &llm)
            .analyze(&path)
            .expect("analyze");
        assert_eq!(result.metadata.llm_score.get(), 10);
        assert_eq!(result.quality_score.get(), 10);
    }

    #[test]
    fn unsupported_extension_is_rejected_before_any_call() {
        let (_temp, path) = source_file("notes.txt", "hello");
        let static_analyzer = ScriptedStatic::new(StaticReport::default());
        let llm = ScriptedLlm::new(Vec::<&str>::new());
        let err = AnalysisCoordinator::new(&static_analyzer, &llm)
            .analyze(&path)
            .expect_err("unsupported");
        assert!(matches!(err, AnalysisError::UnsupportedLanguage { .. }));
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn unreadable_file_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let static_analyzer = ScriptedStatic::new(StaticReport::default());
        let llm = ScriptedLlm::new(Vec::<&str>::new());
        let err = AnalysisCoordinator::new(&static_analyzer, &llm)
            .analyze(&temp.path().join("missing.py"))
            .expect_err("unreadable");
        assert!(matches!(err, AnalysisError::Unreadable { .. }));
    }

    #[test]
    fn llm_failure_is_a_provider_error() {
        let (_temp, path) = source_file("lib.rs", "fn main() {}\n");
        let static_analyzer = ScriptedStatic::new(StaticReport::default());
        let llm = ScriptedLlm::failing("rate limited");
        let err = AnalysisCoordinator::new(&static_analyzer, &llm)
            .analyze(&path)
            .expect_err("provider error");
        match err {
            AnalysisError::Provider { provider, message } => {
                assert_eq!(provider, "llm");
                assert!(message.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
