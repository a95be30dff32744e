//! Scripted collaborators and fixtures for tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::state::{AgentState, GeneratedCode, RunContext};
use crate::core::verdict::{DefectKind, Verdict};
use crate::harness::Harness;
use crate::io::config::{
    AgentConfig, ExtractConfig, GeneratorBackend, GeneratorConfig, RuntimeConfig,
};
use crate::io::generator::TextGenerator;
use crate::io::paths::WorkspacePaths;

/// Reference table with three columns and five rows.
pub const SAMPLE_REFERENCE_CSV: &str = "\
Date,Description,Amount
01-08-2024,Salary Credit XYZ Pvt Ltd,1935.3
02-08-2024,Card Swipe Grocery,-1652.61
03-08-2024,UPI Transfer,-250
04-08-2024,Interest Credit,12.05
05-08-2024,ATM Withdrawal,-2000
";

/// Parser output matching [`SAMPLE_REFERENCE_CSV`].
pub const SAMPLE_TABLE_JSON: &str = r#"{"columns":["Date","Description","Amount"],"rows":[["01-08-2024","Salary Credit XYZ Pvt Ltd",1935.3],["02-08-2024","Card Swipe Grocery",-1652.61],["03-08-2024","UPI Transfer",-250],["04-08-2024","Interest Credit",12.05],["05-08-2024","ATM Withdrawal",-2000]]}"#;

/// Text generator that replays canned responses and records prompts.
///
/// `Err` entries become collaborator faults. Once the script runs out every
/// call fails.
pub struct ScriptedGenerator {
    responses: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator exhausted")),
        }
    }
}

/// Harness that returns canned verdicts and counts invocations.
pub struct ScriptedHarness {
    verdicts: RefCell<VecDeque<Verdict>>,
    invocations: Cell<usize>,
    sources: RefCell<Vec<String>>,
}

impl ScriptedHarness {
    pub fn new(verdicts: Vec<Verdict>) -> Self {
        Self {
            verdicts: RefCell::new(verdicts.into()),
            invocations: Cell::new(0),
            sources: RefCell::new(Vec::new()),
        }
    }

    /// A harness that fails every attempt with a runtime fault.
    pub fn always_failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn invocations(&self) -> usize {
        self.invocations.get()
    }

    /// Sources handed to the harness, in order.
    pub fn sources(&self) -> Vec<String> {
        self.sources.borrow().clone()
    }
}

impl Harness for ScriptedHarness {
    fn execute_and_test(&self, code: &GeneratedCode, _run: &RunContext) -> Result<Verdict> {
        let n = self.invocations.get() + 1;
        self.invocations.set(n);
        self.sources.borrow_mut().push(code.source.clone());
        Ok(self
            .verdicts
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| failure(DefectKind::Runtime, &format!("scripted failure {n}"))))
    }
}

pub fn failure(kind: DefectKind, description: &str) -> Verdict {
    Verdict::Failure {
        kind,
        description: description.to_string(),
    }
}

/// Run context rooted at `/work` for tests that never touch the disk.
pub fn run_context(target: &str) -> RunContext {
    WorkspacePaths::new("/work", &AgentConfig::default())
        .run_context(target)
        .unwrap_or_else(|err| panic!("invalid test target {target}: {err}"))
}

pub fn agent_state(target: &str, budget: u32) -> AgentState {
    AgentState::new(run_context(target), budget)
}

/// A scratch workspace whose parsers are `sh` scripts.
///
/// Documents are plain text files named like PDFs and "extracted" with `cat`,
/// so tests need neither Python nor `pdftotext`.
pub struct Workspace {
    pub dir: TempDir,
    pub config: AgentConfig,
    pub paths: WorkspacePaths,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("create tempdir: {err}"));
        let config = AgentConfig {
            attempt_timeout_secs: 5,
            output_limit_bytes: 64 * 1024,
            runtime: RuntimeConfig {
                language: "sh".to_string(),
                extension: "sh".to_string(),
                comment_prefix: "#".to_string(),
                command: vec![
                    "sh".to_string(),
                    "{artifact}".to_string(),
                    "{document}".to_string(),
                ],
            },
            extract: ExtractConfig {
                command: vec!["cat".to_string(), "{input}".to_string()],
                ..ExtractConfig::default()
            },
            generator: GeneratorConfig {
                backend: GeneratorBackend::Command,
                command: vec!["false".to_string()],
                ..GeneratorConfig::default()
            },
            ..AgentConfig::default()
        };
        let paths = WorkspacePaths::new(dir.path(), &config);
        Self { dir, config, paths }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `data/<target>/<target>_sample.{pdf,csv}`.
    pub fn with_target(self, target: &str, document: &str, reference_csv: &str) -> Self {
        write_file(&self.paths.document_path(target), document);
        write_file(&self.paths.reference_path(target), reference_csv);
        self
    }

    pub fn run_context(&self, target: &str) -> RunContext {
        self.paths
            .run_context(target)
            .unwrap_or_else(|err| panic!("invalid test target {target}: {err}"))
    }

    pub fn artifact(&self, target: &str) -> PathBuf {
        self.paths.artifact_path(target)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// `sh` script that prints `stdout` verbatim.
pub fn printing_script(stdout: &str) -> String {
    format!("cat <<'PARSEGEN_EOF'\n{stdout}\nPARSEGEN_EOF\n")
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .unwrap_or_else(|err| panic!("create {}: {err}", parent.display()));
    }
    fs::write(path, contents).unwrap_or_else(|err| panic!("write {}: {err}", path.display()));
}
