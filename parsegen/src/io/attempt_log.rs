//! Attempt logs under `<state_dir>/attempts/<run-id>/<n>/`.
//!
//! Logs are write-only: the loop never reads them back. They exist so a
//! human can see what each attempt sent, produced and got judged as.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::verdict::{DefectKind, Verdict};

/// `run-<UTC %Y%m%d_%H%M%S_%3f>`
pub fn new_run_id(now: DateTime<Utc>) -> String {
    format!("run-{}", now.format("%Y%m%d_%H%M%S_%3f"))
}

/// Create a fresh run directory under `attempts_dir`.
///
/// `fs::create_dir` fails on an existing directory, so concurrent runs that
/// share a run id get `-2`, `-3`, ... suffixes instead of each other's logs.
/// Returns the final run id and its directory.
pub fn claim_run_dir(attempts_dir: &Path, run_id: &str) -> Result<(String, PathBuf)> {
    fs::create_dir_all(attempts_dir)
        .with_context(|| format!("create attempts dir {}", attempts_dir.display()))?;
    for n in 1u32.. {
        let id = if n == 1 {
            run_id.to_string()
        } else {
            format!("{run_id}-{n}")
        };
        let dir = attempts_dir.join(&id);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((id, dir)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("create run dir {}", dir.display()));
            }
        }
    }
    bail!("no free run directory for {run_id}")
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub run_id: String,
    pub target: String,
    pub attempt: u32,
    pub success: bool,
    pub kind: Option<DefectKind>,
    pub attempts_left: u32,
    pub source_sha256: String,
    pub source_bytes: usize,
    pub generator_diagnostic: Option<String>,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub prompt_path: PathBuf,
    pub source_path: PathBuf,
    pub verdict_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(run_dir: &Path, attempt: u32, extension: &str) -> Self {
        let dir = run_dir.join(attempt.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            prompt_path: dir.join("prompt.md"),
            source_path: dir.join(format!("source.{extension}")),
            verdict_path: dir.join("verdict.txt"),
            dir,
        }
    }
}

pub struct AttemptRecord<'a> {
    pub run_id: &'a str,
    pub target: &'a str,
    pub attempt: u32,
    pub attempts_left: u32,
    pub prompt: &'a str,
    pub source: &'a str,
    pub diagnostic: Option<&'a str>,
    pub verdict: &'a Verdict,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl AttemptRecord<'_> {
    fn meta(&self) -> AttemptMeta {
        let duration_ms = (self.ended_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        AttemptMeta {
            run_id: self.run_id.to_string(),
            target: self.target.to_string(),
            attempt: self.attempt,
            success: self.verdict.is_success(),
            kind: self.verdict.kind(),
            attempts_left: self.attempts_left,
            source_sha256: sha256_hex(self.source),
            source_bytes: self.source.len(),
            generator_diagnostic: self.diagnostic.map(str::to_string),
            started_at: self.started_at.to_rfc3339(),
            ended_at: self.ended_at.to_rfc3339(),
            duration_ms,
        }
    }
}

/// Writes attempt logs for one run.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    run_dir: PathBuf,
    extension: String,
}

impl AttemptLog {
    pub fn new(run_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            run_dir: run_dir.into(),
            extension: extension.into(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn write(&self, record: &AttemptRecord<'_>) -> Result<AttemptPaths> {
        let paths = AttemptPaths::new(&self.run_dir, record.attempt, &self.extension);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

        write_json(&paths.meta_path, &record.meta())?;
        write_text(&paths.prompt_path, record.prompt)?;
        write_text(&paths.source_path, record.source)?;
        let verdict = match record.verdict.description() {
            Some(description) => format!("{description}\n"),
            None => "success\n".to_string(),
        };
        write_text(&paths.verdict_path, &verdict)?;
        Ok(paths)
    }
}

pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
