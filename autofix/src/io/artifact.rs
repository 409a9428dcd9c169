//! Source and artifact files next to the target.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

pub fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn sibling(original: &Path, suffix: &str) -> PathBuf {
    let name = match original.extension() {
        Some(ext) => format!("{}{suffix}.{}", file_stem(original), ext.to_string_lossy()),
        None => format!("{}{suffix}", file_stem(original)),
    };
    original.with_file_name(name)
}

/// `<stem>_fixed.<ext>` next to `original`.
pub fn candidate_path(original: &Path) -> PathBuf {
    sibling(original, "_fixed")
}

/// `<stem>_iter<round>.<ext>` next to `original`.
pub fn scratch_path(original: &Path, round: u32) -> PathBuf {
    sibling(original, &format!("_iter{round}"))
}

/// Write via temp file + rename so readers never see a partial artifact.
pub fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("autofix.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp artifact {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace artifact {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
    Ok(())
}

/// Move the verified candidate over the original.
pub fn promote(candidate: &Path, target: &Path) -> Result<()> {
    fs::rename(candidate, target)
        .with_context(|| format!("move {} over {}", candidate.display(), target.display()))
}
