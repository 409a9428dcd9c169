//! Applying a fix batch to source text.

use crate::core::types::{ApplyOutcome, FixBatch};

/// Apply `batch` to `source`.
///
/// A whole-file replacement wins over the pairs. Otherwise each pair, in
/// order, replaces every literal occurrence of its original snippet in the
/// current text; pairs with an empty or absent snippet are skipped.
pub fn apply_fixes(source: &str, batch: &FixBatch) -> ApplyOutcome {
    if let Some(body) = batch.whole_file.as_deref().filter(|b| !b.is_empty()) {
        return ApplyOutcome {
            content: body.to_string(),
            applied: 0,
            skipped: 0,
            whole_file: true,
        };
    }

    let mut content = source.to_string();
    let mut applied = 0;
    let mut skipped = 0;
    for fix in &batch.fixes {
        if fix.original_snippet.is_empty() || !content.contains(&fix.original_snippet) {
            skipped += 1;
            continue;
        }
        content = content.replace(&fix.original_snippet, &fix.replacement_snippet);
        applied += 1;
    }

    ApplyOutcome {
        content,
        applied,
        skipped,
        whole_file: false,
    }
}
