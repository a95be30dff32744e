//! Text-generation collaborators.
//!
//! The [`TextGenerator`] trait decouples the planner and code generator from
//! the backend that answers prompts. Tests use scripted generators that return
//! predetermined responses without spawning processes or calling the network.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::{AgentConfig, GeneratorBackend};
use crate::io::gemini::GeminiGenerator;
use crate::io::process::{
    RunLimits, command_from_template, display_command, run_command_with_timeout,
};

/// Synchronous prompt-in, text-out collaborator.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }
}

/// Generator that pipes the prompt into a command and reads the answer from stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    workdir: PathBuf,
    limits: RunLimits,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>, workdir: impl Into<PathBuf>, limits: RunLimits) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            limits,
        }
    }
}

impl TextGenerator for CommandGenerator {
    #[instrument(skip_all, fields(timeout_secs = self.limits.timeout.as_secs()))]
    fn generate(&self, prompt: &str) -> Result<String> {
        info!(command = %display_command(&self.command), "requesting generation");
        let cmd = command_from_template(&self.command, &[])?;
        let output = run_command_with_timeout(
            cmd,
            Some(&self.workdir),
            Some(prompt.as_bytes()),
            self.limits,
        )
        .context("run generator command")?;

        if !output.succeeded() {
            warn!(exit_code = ?output.status.code(), timed_out = output.timed_out, "generator failed");
            return Err(anyhow!(
                "{}\n{}",
                output.failure_summary("generator", self.limits.timeout),
                output.stderr_text("generator").trim()
            ));
        }

        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Err(anyhow!("generator returned an empty response"));
        }
        debug!(bytes = text.len(), "generator responded");
        Ok(text)
    }
}

/// Build the configured backend once per run.
pub fn build_generator(cfg: &AgentConfig, root: &Path) -> Result<Box<dyn TextGenerator>> {
    match cfg.generator.backend {
        GeneratorBackend::Command => Ok(Box::new(CommandGenerator::new(
            cfg.generator.command.clone(),
            root,
            cfg.generator_limits(),
        ))),
        GeneratorBackend::Gemini => {
            let generator = GeminiGenerator::from_config(&cfg.generator)
                .context("build gemini generator")?;
            Ok(Box::new(generator))
        }
    }
}
