//! Source discovery for directory runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::core::language::Language;

/// Directory names never descended into.
const IGNORED_DIRS: [&str; 5] = ["node_modules", "target", "__pycache__", "venv", "dist"];

/// Files under `root` whose extension is in the language table, sorted by
/// path. Only the top level is listed unless `recursive`. Hidden entries and
/// dependency/build directories are skipped.
pub fn discover_sources(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_entry(|e| e.depth() == 0 || !is_ignored(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err).with_context(|| format!("read directory {}", root.display()));
            }
            Err(err) => {
                warn!(err = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && Language::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    debug!(root = %root.display(), files = files.len(), recursive, "discovered sources");
    Ok(files)
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| {
            name.starts_with('.')
                || (entry.file_type().is_dir() && IGNORED_DIRS.contains(&name))
        })
        .unwrap_or(false)
}
