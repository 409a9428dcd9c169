//! Automated code remediation CLI.
//!
//! Analyzes one source file, generates and applies fixes, verifies the
//! candidate and opens a review request only when every gate passes.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use autofix::analysis::AnalysisCoordinator;
use autofix::core::types::WorkflowType;
use autofix::directory::analyze_directory;
use autofix::error::ConfigurationError;
use autofix::exit_codes;
use autofix::io::checks::CommandChecker;
use autofix::io::config::resolve_config;
use autofix::io::git::GitCli;
use autofix::io::llm::CommandLlm;
use autofix::io::prereq::SystemProbe;
use autofix::io::static_tools::ToolAnalyzer;
use autofix::logging;
use autofix::report::{agent_summary, directory_summary, iteration_report, run_summary};
use autofix::workflow::{Collaborators, WorkflowManager, WorkflowOptions};

#[derive(Parser)]
#[command(
    name = "autofix",
    version,
    about = "Analyze, fix, verify and publish a source file"
)]
struct Cli {
    /// Source file to process, or a directory to analyze file by file.
    path: PathBuf,
    /// Workflow variant to run (default: auto-fix; directories: analysis-only).
    #[arg(long, value_enum)]
    workflow: Option<WorkflowArg>,
    /// Descend into subdirectories when PATH is a directory.
    #[arg(short, long)]
    recursive: bool,
    /// Run up to N analyze/fix rounds, then verify and publish the result once.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    iterations: Option<u32>,
    /// Analyze and generate fixes without applying, verifying or publishing.
    #[arg(long)]
    dry_run: bool,
    /// Verify but do not open a review request.
    #[arg(long)]
    no_publish: bool,
    /// Write the run as JSON (also written when the run fails).
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Write a markdown report for the run.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
    /// Config file (default: `.autofix.toml` in the working directory).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WorkflowArg {
    AnalysisOnly,
    AutoFix,
    Coordinated,
}

impl From<WorkflowArg> for WorkflowType {
    fn from(arg: WorkflowArg) -> Self {
        match arg {
            WorkflowArg::AnalysisOnly => WorkflowType::AnalysisOnly,
            WorkflowArg::AutoFix => WorkflowType::AutoFix,
            WorkflowArg::Coordinated => WorkflowType::Coordinated,
        }
    }
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            if err.downcast_ref::<ConfigurationError>().is_some() {
                exit_codes::INVALID
            } else {
                exit_codes::FAILED
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = env::current_dir().context("resolve working directory")?;
    let config = resolve_config(cli.config.as_deref(), &cwd, |key| env::var(key).ok())
        .map_err(|err| ConfigurationError::Invalid {
            message: format!("{err:#}"),
        })?;
    let target = cwd.join(&cli.path);
    validate_invocation(&cli, target.is_dir())?;

    let llm = CommandLlm::new(config.llm.command.clone(), config.llm_limits());
    let static_analyzer = ToolAnalyzer::from_config(&config);
    let checker = CommandChecker::from_config(&config);
    let analyzer = AnalysisCoordinator::new(&static_analyzer, &llm);
    let vcs = GitCli::new(
        repo_dir(&target),
        config.git.review_command.clone(),
        config.git_limits(),
    );
    let manager = WorkflowManager::new(
        &config,
        Collaborators {
            analyzer: &analyzer,
            llm: &llm,
            static_analyzer: &static_analyzer,
            checker: &checker,
            vcs: &vcs,
            probe: &SystemProbe,
        },
    );
    let options = WorkflowOptions {
        publish: !cli.no_publish,
        dry_run: cli.dry_run,
    };

    if target.is_dir() {
        let result = analyze_directory(&manager, &target, cli.recursive)?;
        let summary = directory_summary(&result, config.analysis.quality_threshold);
        print!("{summary}");
        if let Some(path) = &cli.output {
            write_json(path, &result)?;
        }
        if let Some(path) = &cli.report {
            write_text(path, &summary)?;
        }
        return Ok(exit_code(result.success()));
    }

    match cli.iterations {
        Some(rounds) => {
            let result = manager.execute_iterative(&target, rounds, options)?;
            print!("{}", run_summary(&result.run, config.analysis.quality_threshold));
            if let Some(summary) = &result.iterations.summary {
                println!(
                    "Iterations: {} round(s), quality {} -> {}, issues {} -> {} ({})",
                    summary.iterations,
                    summary.initial_quality,
                    summary.final_quality,
                    summary.initial_issues,
                    summary.final_issues,
                    summary.progress_trend.as_str()
                );
            }
            println!("Stopped: {}", result.iterations.stop);
            if let Some(path) = &cli.output {
                write_json(path, &result)?;
            }
            if let Some(path) = &cli.report {
                let markdown = iteration_report(&target, &result.iterations)?;
                write_text(path, &markdown)?;
            }
            Ok(exit_code(result.run.success))
        }
        None => {
            let workflow = WorkflowType::from(cli.workflow.unwrap_or(WorkflowArg::AutoFix));
            let run = manager.execute(&target, workflow, options)?;
            print!("{}", run_summary(&run, config.analysis.quality_threshold));
            if let Some(path) = &cli.output {
                write_json(path, &run)?;
            }
            if let Some(path) = &cli.report {
                let markdown = match workflow {
                    WorkflowType::Coordinated => agent_summary(&run)?,
                    _ => run_summary(&run, config.analysis.quality_threshold),
                };
                write_text(path, &markdown)?;
            }
            Ok(exit_code(run.success))
        }
    }
}

/// Reject flag combinations that cannot run together.
fn validate_invocation(cli: &Cli, directory: bool) -> Result<(), ConfigurationError> {
    if directory {
        if cli.iterations.is_some()
            || cli.workflow.is_some_and(|w| w != WorkflowArg::AnalysisOnly)
        {
            return Err(invalid("directories are analyzed only; pass a single file to fix it"));
        }
    } else {
        if cli.recursive {
            return Err(invalid("--recursive applies to directories"));
        }
        if cli.iterations.is_some() && cli.workflow == Some(WorkflowArg::AnalysisOnly) {
            return Err(invalid(
                "--iterations applies fixes and cannot run with --workflow analysis-only",
            ));
        }
    }
    Ok(())
}

fn invalid(message: &str) -> ConfigurationError {
    ConfigurationError::Invalid {
        message: message.to_string(),
    }
}

fn exit_code(success: bool) -> i32 {
    if success {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    }
}

/// Directory the publisher runs git in. `target` is absolute.
fn repo_dir(target: &Path) -> PathBuf {
    target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    write_text(path, &payload)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
