//! Agent configuration stored in `parsegen.toml` at the workspace root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::RunLimits;

/// File name looked up under the workspace root when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "parsegen.toml";

/// Agent configuration (TOML).
///
/// Missing fields default to values that work for the stock layout
/// (`data/<target>/`, `custom_parsers/`, Python parsers).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Initial attempt budget (generation + test iterations).
    pub max_attempts: u32,

    /// Wall-clock limit for one invocation of a generated parser.
    pub attempt_timeout_secs: u64,

    /// Truncate parser stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Maximum bytes for a rendered prompt before sections are dropped.
    pub prompt_budget_bytes: usize,

    /// Render only the most recent N failures into the generation prompt.
    /// `None` keeps the full history.
    pub history_window: Option<usize>,

    pub paths: PathsConfig,
    pub runtime: RuntimeConfig,
    pub extract: ExtractConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Holds `<target>/<target>_sample.pdf` and `<target>/<target>_sample.csv`.
    pub data_dir: PathBuf,
    /// Where generated parsers are written.
    pub parsers_dir: PathBuf,
    /// Agent bookkeeping (attempt logs).
    pub state_dir: PathBuf,
}

/// How a generated parser is executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Language named in prompts and used to pick fenced code blocks.
    pub language: String,
    /// Artifact file extension.
    pub extension: String,
    /// Line-comment prefix for placeholder sources.
    pub comment_prefix: String,
    /// Argv template; `{artifact}` and `{document}` are substituted.
    pub command: Vec<String>,
}

/// How PDF documents are turned into text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractConfig {
    /// Argv template; `{input}` is substituted. Text goes to stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// Spawn `generator.command` with the prompt on stdin.
    Command,
    /// Call the Gemini REST API.
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
    /// Argv for the `command` backend.
    pub command: Vec<String>,
    /// Per-request timeout for either backend.
    pub timeout_secs: u64,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            parsers_dir: PathBuf::from("custom_parsers"),
            state_dir: PathBuf::from(".parsegen"),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            language: "python".to_string(),
            extension: "py".to_string(),
            comment_prefix: "#".to_string(),
            command: vec![
                "python3".to_string(),
                "{artifact}".to_string(),
                "{document}".to_string(),
            ],
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "pdftotext".to_string(),
                "-layout".to_string(),
                "{input}".to_string(),
                "-".to_string(),
            ],
            timeout_secs: 60,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::Gemini,
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            timeout_secs: 5 * 60,
            gemini: GeminiConfig::default(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-pro-latest".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_secs: 120,
            output_limit_bytes: 1_000_000,
            prompt_budget_bytes: 60_000,
            history_window: None,
            paths: PathsConfig::default(),
            runtime: RuntimeConfig::default(),
            extract: ExtractConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.attempt_timeout_secs == 0 {
            return Err(anyhow!("attempt_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.history_window == Some(0) {
            return Err(anyhow!("history_window must be > 0 when set"));
        }
        if self.runtime.extension.trim().is_empty() {
            return Err(anyhow!("runtime.extension must not be empty"));
        }
        ensure_command("runtime.command", &self.runtime.command)?;
        ensure_command("extract.command", &self.extract.command)?;
        if self.extract.timeout_secs == 0 {
            return Err(anyhow!("extract.timeout_secs must be > 0"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.backend == GeneratorBackend::Command {
            ensure_command("generator.command", &self.generator.command)?;
        }
        Ok(())
    }

    /// Limits for one parser invocation.
    pub fn parser_limits(&self) -> RunLimits {
        RunLimits {
            timeout: Duration::from_secs(self.attempt_timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }

    /// Limits for the document extraction command.
    pub fn extract_limits(&self) -> RunLimits {
        RunLimits {
            timeout: Duration::from_secs(self.extract.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }

    /// Limits for the `command` generator backend.
    pub fn generator_limits(&self) -> RunLimits {
        RunLimits {
            timeout: Duration::from_secs(self.generator.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

fn ensure_command(name: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{name} must be a non-empty array"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert_eq!(cfg.max_attempts, 3);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        let cfg = AgentConfig {
            history_window: Some(2),
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "max_attempts = 5\n[generator]\nbackend = \"command\"\ncommand = [\"llm\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.generator.backend, GeneratorBackend::Command);
        assert_eq!(cfg.generator.command, vec!["llm".to_string()]);
        assert_eq!(cfg.runtime, RuntimeConfig::default());
    }

    #[test]
    fn empty_runtime_command_is_rejected() {
        let cfg = AgentConfig {
            runtime: RuntimeConfig {
                command: Vec::new(),
                ..RuntimeConfig::default()
            },
            ..AgentConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("runtime.command"));
    }
}
