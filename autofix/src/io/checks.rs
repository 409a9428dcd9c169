//! Per-language syntax and load checkers.
//!
//! [`SourceChecker`] is the seam the verifier and the static analyzer use.
//! [`CommandChecker`] runs language tools (`python3 -m py_compile`,
//! `node --check`, ...) with overrides from `[languages.<name>]`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::language::Language;
use crate::io::config::{AutofixConfig, LanguageOverrides};
use crate::io::process::{ProcessLimits, command_from_argv, expand_file_argument, run_with_timeout};

const PYTHON_LOAD_SNIPPET: &str = "import importlib.util, os, sys
path = sys.argv[1]
sys.path.insert(0, os.path.dirname(os.path.abspath(path)))
spec = importlib.util.spec_from_file_location('autofix_candidate', path)
module = importlib.util.module_from_spec(spec)
spec.loader.exec_module(module)
";

const NODE_LOAD_SNIPPET: &str = "require(require('path').resolve(process.argv[1]))";

/// Longest checker message kept in a report.
const MESSAGE_LIMIT: usize = 2_000;

/// Result of one checker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },
    /// No checker exists for the language.
    NotConfigured,
}

/// Syntax and load checks. `Err` means the checker itself could not run.
pub trait SourceChecker {
    fn syntax(&self, path: &Path, language: Language) -> Result<CheckOutcome>;
    fn load(&self, path: &Path, language: Language) -> Result<CheckOutcome>;
}

impl<T: SourceChecker + ?Sized> SourceChecker for &T {
    fn syntax(&self, path: &Path, language: Language) -> Result<CheckOutcome> {
        (**self).syntax(path, language)
    }

    fn load(&self, path: &Path, language: Language) -> Result<CheckOutcome> {
        (**self).load(path, language)
    }
}

#[derive(Debug, Clone)]
pub struct CommandChecker {
    overrides: BTreeMap<String, LanguageOverrides>,
    limits: ProcessLimits,
}

impl CommandChecker {
    pub fn new(overrides: BTreeMap<String, LanguageOverrides>, limits: ProcessLimits) -> Self {
        Self { overrides, limits }
    }

    pub fn from_config(config: &AutofixConfig) -> Self {
        Self::new(config.languages.clone(), config.verify_limits())
    }

    pub fn syntax_command(&self, language: Language) -> Option<Vec<String>> {
        self.overrides
            .get(language.as_str())
            .and_then(|o| o.syntax.clone())
            .or_else(|| default_syntax_command(language))
    }

    pub fn load_command(&self, language: Language) -> Option<Vec<String>> {
        self.overrides
            .get(language.as_str())
            .and_then(|o| o.load.clone())
            .or_else(|| default_load_command(language))
    }

    #[instrument(skip_all, fields(path = %path.display(), program = template.first().map(String::as_str).unwrap_or_default()))]
    fn run_check(&self, template: &[String], path: &Path) -> Result<CheckOutcome> {
        let argv = expand_file_argument(template, path);
        let cmd = command_from_argv(&argv, None)?;
        let output = run_with_timeout(cmd, None, self.limits)
            .with_context(|| format!("run checker {}", argv.join(" ")))?;
        if output.timed_out {
            warn!("checker timed out");
            return Err(anyhow!(
                "checker {} timed out after {:?}",
                argv[0],
                self.limits.timeout
            ));
        }
        if output.status.success() {
            debug!("check passed");
            return Ok(CheckOutcome::Pass);
        }
        let text = output.combined_text();
        let (line, column) = locate(&text);
        debug!(?line, ?column, "check failed");
        Ok(CheckOutcome::Fail {
            message: truncate(&text, MESSAGE_LIMIT),
            line,
            column,
        })
    }
}

impl SourceChecker for CommandChecker {
    fn syntax(&self, path: &Path, language: Language) -> Result<CheckOutcome> {
        match self.syntax_command(language) {
            Some(template) => self.run_check(&template, path),
            None => Ok(CheckOutcome::NotConfigured),
        }
    }

    fn load(&self, path: &Path, language: Language) -> Result<CheckOutcome> {
        match self.load_command(language) {
            Some(template) => self.run_check(&template, path),
            None => Ok(CheckOutcome::NotConfigured),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn default_syntax_command(language: Language) -> Option<Vec<String>> {
    match language {
        Language::Python => Some(argv(&["python3", "-m", "py_compile", "{file}"])),
        Language::JavaScript => Some(argv(&["node", "--check", "{file}"])),
        Language::Go => Some(argv(&["gofmt", "-e", "-l", "{file}"])),
        Language::Rust => Some(argv(&["rustfmt", "--emit", "stdout", "{file}"])),
        Language::TypeScript | Language::Java => None,
    }
}

fn default_load_command(language: Language) -> Option<Vec<String>> {
    match language {
        Language::Python => Some(argv(&["python3", "-c", PYTHON_LOAD_SNIPPET, "{file}"])),
        Language::JavaScript => Some(argv(&["node", "-e", NODE_LOAD_SNIPPET, "{file}"])),
        _ => None,
    }
}

static LINE_COL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\d+):(\d+)").expect("line:col regex"));
static LINE_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bline (\d+)").expect("line regex"));
static LINE_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\w+:(\d+)\b").expect("file:line regex"));

/// Best-effort line/column from checker output.
pub fn locate(text: &str) -> (Option<u32>, Option<u32>) {
    if let Some(caps) = LINE_COL_RE.captures(text) {
        return (caps[1].parse().ok(), caps[2].parse().ok());
    }
    if let Some(caps) = LINE_WORD_RE.captures(text) {
        return (caps[1].parse().ok(), None);
    }
    if let Some(caps) = LINE_ONLY_RE.captures(text) {
        return (caps[1].parse().ok(), None);
    }
    (None, None)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn limits() -> ProcessLimits {
        ProcessLimits::new(Duration::from_secs(10), 10_000)
    }

    fn sh_override(syntax: &str, load: &str) -> BTreeMap<String, LanguageOverrides> {
        let mut map = BTreeMap::new();
        map.insert(
            "python".to_string(),
            LanguageOverrides {
                syntax: Some(argv(&["sh", "-c", syntax, "check", "{file}"])),
                load: Some(argv(&["sh", "-c", load, "check", "{file}"])),
                lint: None,
            },
        );
        map
    }

    #[test]
    fn locate_reads_common_formats() {
        assert_eq!(locate("app.go:3:7: expected '}'"), (Some(3), Some(7)));
        assert_eq!(
            locate("  File \"a.py\", line 12\n    def f(\nSyntaxError: '(' was never closed"),
            (Some(12), None)
        );
        assert_eq!(locate("/tmp/x.js:4\nfoo(\n^"), (Some(4), None));
        assert_eq!(locate("nothing useful"), (None, None));
    }

    #[test]
    fn overrides_take_precedence_and_report_failures() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("a.py");
        fs::write(&file, "x = 1\n").expect("write");
        let checker = CommandChecker::new(
            sh_override("echo \"$1:2:5: bad token\" >&2; exit 1", "exit 0"),
            limits(),
        );

        let syntax = checker.syntax(&file, Language::Python).expect("syntax");
        match syntax {
            CheckOutcome::Fail { line, column, message } => {
                assert_eq!(line, Some(2));
                assert_eq!(column, Some(5));
                assert!(message.contains("bad token"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(checker.load(&file, Language::Python).expect("load"), CheckOutcome::Pass);
    }

    #[test]
    fn relative_paths_resolve_from_the_callers_directory() {
        // Test binaries run from the package root.
        let relative = Path::new("src/lib.rs");
        let checker = CommandChecker::new(
            sh_override("test -f \"$1\" || { echo \"missing $1\"; exit 1; }", "test -f \"$1\""),
            limits(),
        );

        assert_eq!(
            checker.syntax(relative, Language::Python).expect("syntax"),
            CheckOutcome::Pass
        );
        assert_eq!(
            checker.load(relative, Language::Python).expect("load"),
            CheckOutcome::Pass
        );
    }

    #[test]
    fn unconfigured_language_is_reported() {
        let checker = CommandChecker::new(BTreeMap::new(), limits());
        let outcome = checker.syntax(Path::new("Main.java"), Language::Java).expect("syntax");
        assert_eq!(outcome, CheckOutcome::NotConfigured);
        let outcome = checker.load(Path::new("main.go"), Language::Go).expect("load");
        assert_eq!(outcome, CheckOutcome::NotConfigured);
    }

    #[test]
    fn missing_checker_binary_is_an_error() {
        let mut map = BTreeMap::new();
        map.insert(
            "go".to_string(),
            LanguageOverrides {
                syntax: Some(argv(&["autofix-no-such-checker"])),
                ..LanguageOverrides::default()
            },
        );
        let checker = CommandChecker::new(map, limits());
        assert!(checker.syntax(Path::new("main.go"), Language::Go).is_err());
    }

    #[test]
    fn timeout_is_an_error() {
        let checker = CommandChecker::new(
            sh_override("sleep 5", "exit 0"),
            ProcessLimits::new(Duration::from_millis(100), 100),
        );
        let err = checker
            .syntax(Path::new("a.py"), Language::Python)
            .expect_err("times out");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn defaults_cover_python_and_javascript() {
        let checker = CommandChecker::new(BTreeMap::new(), limits());
        assert!(checker.syntax_command(Language::Python).is_some());
        assert!(checker.load_command(Language::JavaScript).is_some());
        assert!(checker.syntax_command(Language::TypeScript).is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate(&text, 5);
        assert!(cut.ends_with("[truncated]"));
        assert!(cut.starts_with("éé"));
    }
}
