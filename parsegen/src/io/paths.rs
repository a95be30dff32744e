//! Canonical filesystem layout for a workspace root.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::state::RunContext;
use crate::io::config::AgentConfig;

/// All canonical paths for a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub parsers_dir: PathBuf,
    pub state_dir: PathBuf,
    pub attempts_dir: PathBuf,
    extension: String,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>, cfg: &AgentConfig) -> Self {
        let root = root.into();
        let state_dir = root.join(&cfg.paths.state_dir);
        Self {
            data_dir: root.join(&cfg.paths.data_dir),
            parsers_dir: root.join(&cfg.paths.parsers_dir),
            attempts_dir: state_dir.join("attempts"),
            state_dir,
            root,
            extension: cfg.runtime.extension.trim_start_matches('.').to_string(),
        }
    }

    /// `data/<target>/<target>_sample.pdf`
    pub fn document_path(&self, target: &str) -> PathBuf {
        self.data_dir
            .join(target)
            .join(format!("{target}_sample.pdf"))
    }

    /// `data/<target>/<target>_sample.csv`
    pub fn reference_path(&self, target: &str) -> PathBuf {
        self.data_dir
            .join(target)
            .join(format!("{target}_sample.csv"))
    }

    /// `custom_parsers/<target>_parser.<ext>`
    pub fn artifact_path(&self, target: &str) -> PathBuf {
        self.parsers_dir
            .join(format!("{target}_parser.{}", self.extension))
    }

    /// Attempt logs for one run.
    pub fn run_log_dir(&self, run_id: &str) -> PathBuf {
        self.attempts_dir.join(run_id)
    }

    /// Build the immutable run context for `target`.
    pub fn run_context(&self, target: &str) -> Result<RunContext> {
        validate_target(target)?;
        Ok(RunContext {
            target: target.to_string(),
            document_path: self.document_path(target),
            reference_path: self.reference_path(target),
            artifact_path: self.artifact_path(target),
        })
    }

    /// Path relative to the root when possible, for user-facing output.
    pub fn display<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
    }
}

/// Target identifiers become file names, so keep them to `[A-Za-z0-9._-]`.
pub fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(anyhow!("target must not be empty"));
    }
    if target.starts_with('.') {
        return Err(anyhow!("target must not start with '.' (got '{target}')"));
    }
    if target
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!(
            "target must be [A-Za-z0-9._-] only (got '{target}')"
        ));
    }
    Ok(())
}
