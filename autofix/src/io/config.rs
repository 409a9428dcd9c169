//! Autofix configuration (`.autofix.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::language::Language;
use crate::core::types::Severity;
use crate::io::process::ProcessLimits;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".autofix.toml";

pub const ENV_DEFAULT_BRANCH: &str = "AUTOFIX_DEFAULT_BRANCH";
pub const ENV_QUALITY_THRESHOLD: &str = "AUTOFIX_QUALITY_THRESHOLD";
pub const ENV_LLM_COMMAND: &str = "AUTOFIX_LLM_COMMAND";

/// Autofix configuration (TOML). Missing fields take the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutofixConfig {
    pub llm: LlmConfig,
    pub analysis: AnalysisConfig,
    pub verify: VerifyConfig,
    pub git: GitConfig,
    /// Per-language command overrides keyed by language name (`python`, `rust`, ...).
    pub languages: BTreeMap<String, LanguageOverrides>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    /// Command that reads a prompt on stdin and writes the response on stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Environment variables the command needs (API keys and the like).
    pub required_env: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 300,
            output_limit_bytes: 1_000_000,
            required_env: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub static_timeout_secs: u64,
    /// Cap on issues handed to the fix provider.
    pub max_issues_to_fix: usize,
    /// Files scoring below this are flagged in the summary.
    pub quality_threshold: u8,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            static_timeout_secs: 30,
            max_issues_to_fix: 10,
            quality_threshold: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyConfig {
    /// The static gate fails on any issue at or above this severity.
    pub severity_floor: Severity,
    pub timeout_secs: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            severity_floor: Severity::High,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    pub base_branch: String,
    pub remote: String,
    pub branch_prefix: String,
    /// Review-request command; `--title/--body/--head/--base` are appended.
    pub review_command: Vec<String>,
    pub timeout_secs: u64,
    /// Fixes itemized in the review description.
    pub description_fixes: usize,
    /// Fixes listed in the commit message.
    pub commit_fixes: usize,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            base_branch: "main".to_string(),
            remote: "origin".to_string(),
            branch_prefix: "auto-fix".to_string(),
            review_command: vec!["gh".to_string(), "pr".to_string(), "create".to_string()],
            timeout_secs: 120,
            description_fixes: 5,
            commit_fixes: 3,
        }
    }
}

/// Optional command overrides. `{file}` is replaced by the target path;
/// without a placeholder the path is appended.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LanguageOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lint: Option<Vec<String>>,
}

impl AutofixConfig {
    pub fn validate(&self) -> Result<()> {
        check_command("llm.command", &self.llm.command)?;
        check_command("git.review_command", &self.git.review_command)?;
        if self.llm.timeout_secs == 0 {
            bail!("llm.timeout_secs must be > 0");
        }
        if self.llm.output_limit_bytes == 0 {
            bail!("llm.output_limit_bytes must be > 0");
        }
        if self.analysis.static_timeout_secs == 0 {
            bail!("analysis.static_timeout_secs must be > 0");
        }
        if self.analysis.max_issues_to_fix == 0 {
            bail!("analysis.max_issues_to_fix must be > 0");
        }
        if !(1..=10).contains(&self.analysis.quality_threshold) {
            bail!("analysis.quality_threshold must be within 1..=10");
        }
        if self.verify.timeout_secs == 0 {
            bail!("verify.timeout_secs must be > 0");
        }
        if self.git.timeout_secs == 0 {
            bail!("git.timeout_secs must be > 0");
        }
        for (field, value) in [
            ("git.base_branch", &self.git.base_branch),
            ("git.remote", &self.git.remote),
            ("git.branch_prefix", &self.git.branch_prefix),
        ] {
            if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
                bail!("{field} must be a non-empty name without whitespace");
            }
        }
        for (name, overrides) in &self.languages {
            if Language::from_name(name).is_none() {
                bail!("languages.{name}: unknown language");
            }
            for (kind, command) in [
                ("syntax", &overrides.syntax),
                ("load", &overrides.load),
                ("lint", &overrides.lint),
            ] {
                if let Some(command) = command {
                    check_command(&format!("languages.{name}.{kind}"), command)?;
                }
            }
        }
        Ok(())
    }

    /// Apply `AUTOFIX_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(branch) = lookup(ENV_DEFAULT_BRANCH).filter(|v| !v.trim().is_empty()) {
            debug!(branch = %branch, "base branch from environment");
            self.git.base_branch = branch.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_QUALITY_THRESHOLD).filter(|v| !v.trim().is_empty()) {
            self.analysis.quality_threshold = raw
                .trim()
                .parse()
                .with_context(|| format!("parse {ENV_QUALITY_THRESHOLD}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_LLM_COMMAND).filter(|v| !v.trim().is_empty()) {
            self.llm.command = raw.split_whitespace().map(str::to_string).collect();
        }
        Ok(())
    }

    pub fn llm_limits(&self) -> ProcessLimits {
        ProcessLimits::new(
            Duration::from_secs(self.llm.timeout_secs),
            self.llm.output_limit_bytes,
        )
    }

    pub fn static_limits(&self) -> ProcessLimits {
        ProcessLimits::new(Duration::from_secs(self.analysis.static_timeout_secs), 1_000_000)
    }

    pub fn verify_limits(&self) -> ProcessLimits {
        ProcessLimits::new(Duration::from_secs(self.verify.timeout_secs), 1_000_000)
    }

    pub fn git_limits(&self) -> ProcessLimits {
        ProcessLimits::new(Duration::from_secs(self.git.timeout_secs), 1_000_000)
    }
}

fn check_command(field: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{field} must be a non-empty array")),
    }
}

/// Load config from a TOML file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<AutofixConfig> {
    if !path.exists() {
        let cfg = AutofixConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AutofixConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Resolve the effective config: `explicit` (must exist), else
/// `<cwd>/.autofix.toml`, else defaults; environment overrides last.
pub fn resolve_config(
    explicit: Option<&Path>,
    cwd: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AutofixConfig> {
    let mut cfg = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            load_config(path)?
        }
        None => load_config(&cwd.join(DEFAULT_CONFIG_FILE))?,
    };
    cfg.apply_env_overrides(lookup)?;
    cfg.validate().context("validate config after environment overrides")?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AutofixConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
