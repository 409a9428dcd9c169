//! Lenient parsing of LLM responses.
//!
//! The structured block is the span from the first `{` to the last `}`. It
//! must be valid JSON and match the embedded response schema (Draft 2020-12);
//! anything else is [`ParseOutcome::Unstructured`] and callers degrade.

use jsonschema::Draft;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::types::{FixBatch, FixRecord, IssueKind, IssueRecord, Severity};

const ANALYSIS_SCHEMA: &str = include_str!("../../schemas/analysis_response.schema.json");
const FIX_SCHEMA: &str = include_str!("../../schemas/fix_response.schema.json");

/// Tool name recorded on issues that came from the LLM.
pub const LLM_SOURCE: &str = "llm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    Structured(T),
    Unstructured { raw: String, reason: String },
}

impl<T> ParseOutcome<T> {
    fn unstructured(raw: &str, reason: impl Into<String>) -> Self {
        ParseOutcome::Unstructured {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Analysis fields recovered from a structured response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmAnalysis {
    /// Unclamped; the merge step clamps before weighting.
    pub quality_score: i64,
    pub issues: Vec<IssueRecord>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    quality_score: f64,
    issues: Vec<RawIssue>,
    #[serde(default)]
    recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    description: String,
    #[serde(default)]
    line: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawFixes {
    fixes: Vec<RawFix>,
    #[serde(default)]
    complete_fixed_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFix {
    #[serde(default)]
    issue_description: String,
    #[serde(default)]
    line_number: Option<u32>,
    original_code: String,
    fixed_code: String,
    #[serde(default)]
    explanation: String,
}

/// Span from the first `{` to the last `}` inclusive.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn parse_analysis_response(text: &str) -> ParseOutcome<LlmAnalysis> {
    let raw: RawAnalysis = match parse_structured(text, ANALYSIS_SCHEMA) {
        Ok(raw) => raw,
        Err(reason) => return ParseOutcome::unstructured(text, reason),
    };

    let issues = raw
        .issues
        .into_iter()
        .map(|issue| IssueRecord {
            kind: issue
                .kind
                .as_deref()
                .map(IssueKind::parse_lenient)
                .unwrap_or(IssueKind::Bug),
            severity: issue
                .severity
                .as_deref()
                .map(Severity::parse_lenient)
                .unwrap_or(Severity::Medium),
            description: issue.description.trim().to_string(),
            line: issue.line,
            source_tool: LLM_SOURCE.to_string(),
        })
        .collect();

    ParseOutcome::Structured(LlmAnalysis {
        quality_score: raw.quality_score.round() as i64,
        issues,
        recommendations: raw.recommendations,
    })
}

pub fn parse_fix_response(text: &str) -> ParseOutcome<FixBatch> {
    let raw: RawFixes = match parse_structured(text, FIX_SCHEMA) {
        Ok(raw) => raw,
        Err(reason) => return ParseOutcome::unstructured(text, reason),
    };

    let fixes = raw
        .fixes
        .into_iter()
        .map(|fix| FixRecord {
            issue_description: fix.issue_description,
            line_number: fix.line_number,
            original_snippet: fix.original_code,
            replacement_snippet: fix.fixed_code,
            explanation: fix.explanation,
        })
        .collect();

    ParseOutcome::Structured(FixBatch {
        fixes,
        whole_file: raw.complete_fixed_file.filter(|body| !body.trim().is_empty()),
        explanation: None,
    })
}

fn parse_structured<T: DeserializeOwned>(text: &str, schema_raw: &str) -> Result<T, String> {
    let block = extract_json_block(text).ok_or_else(|| "no JSON object in response".to_string())?;
    let instance: Value = serde_json::from_str(block).map_err(|err| format!("invalid JSON: {err}"))?;
    validate_schema(&instance, schema_raw)?;
    serde_json::from_value(instance).map_err(|err| format!("unexpected shape: {err}"))
}

fn validate_schema(instance: &Value, schema_raw: &str) -> Result<(), String> {
    let schema: Value =
        serde_json::from_str(schema_raw).map_err(|err| format!("parse schema json: {err}"))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| format!("compile json schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(format!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_block_is_recovered_from_surrounding_text() {
        let outcome = parse_analysis_response(r#"blah {"quality_score":7,"issues":[]} blah"#);
        let ParseOutcome::Structured(analysis) = outcome else {
            panic!("expected structured outcome");
        };
        assert_eq!(analysis.quality_score, 7);
        assert!(analysis.issues.is_empty());
    }

    #[test]
    fn text_without_braces_is_unstructured_with_raw_preserved() {
        let outcome = parse_analysis_response("the code looks fine to me");
        match outcome {
            ParseOutcome::Unstructured { raw, reason } => {
                assert_eq!(raw, "the code looks fine to me");
                assert!(reason.contains("no JSON"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn schema_violation_is_unstructured() {
        let outcome = parse_analysis_response(r#"{"quality_score":"high","issues":[]}"#);
        assert!(matches!(
            outcome,
            ParseOutcome::Unstructured { ref reason, .. } if reason.contains("schema")
        ));
    }

    #[test]
    fn issues_are_normalized() {
        let text = r#"```json
{"quality_score": 6.6, "issues": [
  {"type": "Security", "severity": "CRITICAL", "description": " eval on input ", "line": 3},
  {"description": "no type or severity"}
], "recommendations": ["Avoid eval"]}
```"#;
        let ParseOutcome::Structured(analysis) = parse_analysis_response(text) else {
            panic!("expected structured outcome");
        };
        assert_eq!(analysis.quality_score, 7);
        assert_eq!(analysis.issues.len(), 2);
        assert_eq!(analysis.issues[0].kind, IssueKind::Security);
        assert_eq!(analysis.issues[0].severity, Severity::High);
        assert_eq!(analysis.issues[0].description, "eval on input");
        assert_eq!(analysis.issues[0].line, Some(3));
        assert_eq!(analysis.issues[1].kind, IssueKind::Bug);
        assert_eq!(analysis.issues[1].severity, Severity::Medium);
        assert_eq!(analysis.issues[1].source_tool, LLM_SOURCE);
        assert_eq!(analysis.recommendations, vec!["Avoid eval"]);
    }

    #[test]
    fn fix_response_maps_fields_and_whole_file() {
        let text = r#"Here you go: {"fixes": [{"issue_description": "unused import",
            "line_number": 1, "original_code": "import os\n", "fixed_code": "",
            "explanation": "os is never used"}], "complete_fixed_file": "print(1)\n"}"#;
        let ParseOutcome::Structured(batch) = parse_fix_response(text) else {
            panic!("expected structured outcome");
        };
        assert_eq!(batch.fixes.len(), 1);
        assert_eq!(batch.fixes[0].original_snippet, "import os\n");
        assert_eq!(batch.fixes[0].replacement_snippet, "");
        assert_eq!(batch.fixes[0].line_number, Some(1));
        assert_eq!(batch.whole_file.as_deref(), Some("print(1)\n"));
    }

    #[test]
    fn blank_whole_file_is_ignored() {
        let text = r#"{"fixes": [], "complete_fixed_file": "   "}"#;
        let ParseOutcome::Structured(batch) = parse_fix_response(text) else {
            panic!("expected structured outcome");
        };
        assert!(batch.whole_file.is_none());
        assert!(batch.is_empty());
    }

    #[test]
    fn fix_without_required_fields_is_unstructured() {
        let outcome = parse_fix_response(r#"{"fixes": [{"explanation": "x"}]}"#);
        assert!(matches!(outcome, ParseOutcome::Unstructured { .. }));
    }

    #[test]
    fn reversed_braces_have_no_block() {
        assert_eq!(extract_json_block("} nope {"), None);
        assert_eq!(extract_json_block("a {\"k\": 1} b"), Some("{\"k\": 1}"));
    }
}
