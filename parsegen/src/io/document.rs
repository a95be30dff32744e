//! Source document text extraction.
//!
//! Plain-text documents are read directly. Anything else (normally a PDF
//! statement) goes through an external extraction command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::config::AgentConfig;
use crate::io::process::{RunLimits, command_from_template, run_command_with_timeout};

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md"];

/// Turns a document on disk into text.
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    command: Vec<String>,
    workdir: PathBuf,
    limits: RunLimits,
}

impl DocumentExtractor {
    pub fn new(command: Vec<String>, workdir: impl Into<PathBuf>, limits: RunLimits) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            limits,
        }
    }

    pub fn from_config(cfg: &AgentConfig, root: &Path) -> Self {
        Self::new(cfg.extract.command.clone(), root, cfg.extract_limits())
    }

    /// Extract the text of `path`. `Ok(None)` means the document does not exist.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn extract_text(&self, path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            debug!("document missing");
            return Ok(None);
        }
        if is_plain_text(path) {
            let text = fs::read_to_string(path)
                .with_context(|| format!("read document {}", path.display()))?;
            return Ok(Some(text));
        }

        let input = path.to_string_lossy();
        let cmd = command_from_template(&self.command, &[("input", input.as_ref())])?;
        let output = run_command_with_timeout(cmd, Some(&self.workdir), None, self.limits)
            .context("run document extraction")?;
        if !output.succeeded() {
            return Err(anyhow!(
                "{}\n{}",
                output.failure_summary("document extraction", self.limits.timeout),
                output.stderr_text("extraction").trim()
            ));
        }
        let text = output.stdout_text();
        debug!(bytes = text.len(), "document extracted");
        Ok(Some(text))
    }
}

fn is_plain_text(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PLAIN_TEXT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
