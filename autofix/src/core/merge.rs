//! Issue aggregation and scoring rules.
//!
//! Static issues always come first. An LLM issue is dropped when an
//! already-merged issue has the same kind and line and its lowercased
//! description is contained in the incoming lowercased description.

use crate::core::types::{IssueKind, IssueRecord, QualityScore, Severity};

const STATIC_WEIGHT: f64 = 0.4;
const LLM_WEIGHT: f64 = 0.6;

fn severity_penalty(severity: Severity) -> i64 {
    match severity {
        Severity::High => 3,
        Severity::Medium => 2,
        Severity::Low => 1,
    }
}

/// Static sub-score: `max(1, 10 - min(penalty, 9))`, 10 when there are no issues.
pub fn static_score(issues: &[IssueRecord]) -> QualityScore {
    let penalty: i64 = issues.iter().map(|i| severity_penalty(i.severity)).sum();
    QualityScore::clamped(10 - penalty.min(9))
}

const KIND_RECOMMENDATIONS: [(IssueKind, &str); 3] = [
    (IssueKind::Syntax, "Fix syntax errors before proceeding"),
    (IssueKind::Style, "Follow coding style guidelines"),
    (IssueKind::Security, "Address security vulnerabilities immediately"),
];

/// Recommendations derived from the kinds present among static issues.
pub fn static_recommendations(issues: &[IssueRecord]) -> Vec<String> {
    KIND_RECOMMENDATIONS
        .iter()
        .filter(|(kind, _)| issues.iter().any(|i| i.kind == *kind))
        .map(|(_, text)| text.to_string())
        .collect()
}

pub fn is_duplicate(existing: &IssueRecord, incoming: &IssueRecord) -> bool {
    existing.kind == incoming.kind
        && existing.line == incoming.line
        && incoming
            .description
            .to_lowercase()
            .contains(&existing.description.to_lowercase())
}

pub fn merge_issues(static_issues: Vec<IssueRecord>, llm_issues: Vec<IssueRecord>) -> Vec<IssueRecord> {
    let mut merged = static_issues;
    for issue in llm_issues {
        if !merged.iter().any(|existing| is_duplicate(existing, &issue)) {
            merged.push(issue);
        }
    }
    merged
}

/// Weighted score, `round(static * 0.4 + llm * 0.6)`. The LLM score is clamped first.
pub fn combined_score(static_score: QualityScore, llm_score: i64) -> QualityScore {
    let llm = QualityScore::clamped(llm_score);
    let weighted = f64::from(static_score.get()) * STATIC_WEIGHT + f64::from(llm.get()) * LLM_WEIGHT;
    QualityScore::clamped(weighted.round() as i64)
}

/// Union preserving insertion order; `first` entries come first.
pub fn union_recommendations(first: Vec<String>, second: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(first.len() + second.len());
    for rec in first.into_iter().chain(second) {
        push_unique(&mut out, rec);
    }
    out
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !value.trim().is_empty() && !out.contains(&value) {
        out.push(value);
    }
}
