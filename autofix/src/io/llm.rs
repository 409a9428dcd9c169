//! LLM provider abstraction.
//!
//! The [`LlmProvider`] trait decouples the stages from the model backend.
//! [`CommandLlm`] spawns a configured command with the prompt on stdin and
//! treats stdout as the response. Tests use scripted providers.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{ProcessLimits, command_from_argv, run_with_timeout};

/// Prompt in, response text out.
pub trait LlmProvider {
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<T: LlmProvider + ?Sized> LlmProvider for &T {
    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }
}

/// Provider that runs an external command.
#[derive(Debug, Clone)]
pub struct CommandLlm {
    command: Vec<String>,
    limits: ProcessLimits,
}

impl CommandLlm {
    pub fn new(command: Vec<String>, limits: ProcessLimits) -> Self {
        Self { command, limits }
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }
}

impl LlmProvider for CommandLlm {
    #[instrument(skip_all, fields(program = self.program(), prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        info!("invoking llm command");
        let cmd = command_from_argv(&self.command, None).context("build llm command")?;
        let output = run_with_timeout(cmd, Some(prompt.as_bytes()), self.limits)
            .with_context(|| format!("run {}", self.program()))?;

        if output.timed_out {
            warn!(timeout_secs = self.limits.timeout.as_secs(), "llm command timed out");
            return Err(anyhow!(
                "{} timed out after {:?}",
                self.program(),
                self.limits.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "llm command failed");
            return Err(anyhow!("{} failed: {}", self.program(), output.failure_summary()));
        }
        if output.stdout_truncated > 0 {
            warn!(truncated = output.stdout_truncated, "llm response truncated");
        }

        let response = output.stdout_text();
        debug!(response_bytes = response.len(), "llm command completed");
        Ok(response)
    }
}
