//! Turning a persisted artifact into a callable parser.
//!
//! Generated parsers run in a fresh child process per invocation. The process
//! receives the document path and prints one JSON table on stdout:
//!
//! ```json
//! {"columns": ["Date", "Amount"], "rows": [["01-08-2024", 12.5]]}
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::table::Table;
use crate::core::verdict::Defect;
use crate::io::config::AgentConfig;
use crate::io::process::{RunLimits, command_from_template, run_command_with_timeout};

const TABLE_SCHEMA: &str = include_str!("../../schemas/table.schema.json");

/// Lines of source or stdout quoted back in defect descriptions.
const HEAD_LINES: usize = 20;

static TABLE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(TABLE_SCHEMA).expect("embedded table schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("embedded table schema should compile")
});

/// The single entry point every generated parser exposes.
pub trait EntryPoint {
    fn parse(&self, document: &Path) -> Result<Table, Defect>;
}

/// Instantiates an [`EntryPoint`] from a persisted artifact.
pub trait ParserLoader {
    type Unit: EntryPoint;

    fn load(&self, artifact: &Path) -> Result<Self::Unit, Defect>;
}

/// Loads artifacts as child processes built from the runtime command template.
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    command: Vec<String>,
    comment_prefix: String,
    workdir: PathBuf,
    limits: RunLimits,
}

impl ProcessLoader {
    pub fn new(
        command: Vec<String>,
        comment_prefix: impl Into<String>,
        workdir: impl Into<PathBuf>,
        limits: RunLimits,
    ) -> Self {
        Self {
            command,
            comment_prefix: comment_prefix.into(),
            workdir: workdir.into(),
            limits,
        }
    }

    /// Loader for `[runtime]`, running parsers from the workspace root.
    pub fn from_config(cfg: &AgentConfig, root: &Path) -> Self {
        Self::new(
            cfg.runtime.command.clone(),
            cfg.runtime.comment_prefix.as_str(),
            root,
            cfg.parser_limits(),
        )
    }
}

impl ParserLoader for ProcessLoader {
    type Unit = ProcessParser;

    fn load(&self, artifact: &Path) -> Result<ProcessParser, Defect> {
        let source = fs::read_to_string(artifact).map_err(|e| Defect::EntryPointMissing {
            artifact: artifact.to_path_buf(),
            reason: format!("cannot read artifact: {e}"),
            source_head: String::new(),
        })?;

        if !has_code(&source, &self.comment_prefix) {
            return Err(Defect::EntryPointMissing {
                artifact: artifact.to_path_buf(),
                reason: "artifact contains no executable code".to_string(),
                source_head: head(&source, HEAD_LINES),
            });
        }

        Ok(ProcessParser {
            artifact: artifact.to_path_buf(),
            source_head: head(&source, HEAD_LINES),
            command: self.command.clone(),
            workdir: self.workdir.clone(),
            limits: self.limits,
        })
    }
}

/// A loaded artifact. Each [`EntryPoint::parse`] call spawns a new process.
#[derive(Debug, Clone)]
pub struct ProcessParser {
    artifact: PathBuf,
    source_head: String,
    command: Vec<String>,
    workdir: PathBuf,
    limits: RunLimits,
}

impl EntryPoint for ProcessParser {
    #[instrument(skip(self), fields(artifact = %self.artifact.display()))]
    fn parse(&self, document: &Path) -> Result<Table, Defect> {
        let artifact = self.artifact.to_string_lossy();
        let document_arg = document.to_string_lossy();
        let cmd = command_from_template(
            &self.command,
            &[
                ("artifact", artifact.as_ref()),
                ("document", document_arg.as_ref()),
            ],
        )
        .map_err(|e| Defect::RuntimeFault {
            fault: format!("invalid runtime command: {e:#}"),
            trace: String::new(),
        })?;

        let output = run_command_with_timeout(cmd, Some(&self.workdir), None, self.limits)
            .map_err(|e| Defect::RuntimeFault {
                fault: format!("could not run parser: {e:#}"),
                trace: String::new(),
            })?;

        if !output.succeeded() {
            return Err(Defect::RuntimeFault {
                fault: output.failure_summary("parser", self.limits.timeout),
                trace: output.stderr_text("parser").trim_end().to_string(),
            });
        }

        let stdout = output.stdout_text();
        debug!(stdout_bytes = stdout.len(), "parser finished");
        if stdout.trim().is_empty() {
            return Err(Defect::EntryPointMissing {
                artifact: self.artifact.clone(),
                reason: "parser exited successfully but printed no table".to_string(),
                source_head: self.source_head.clone(),
            });
        }
        if output.stdout_truncated > 0 {
            return Err(malformed(
                format!(
                    "stdout exceeded the output limit ({} bytes dropped)",
                    output.stdout_truncated
                ),
                &stdout,
            ));
        }

        table_from_stdout(&stdout)
    }
}

/// Decode and validate the JSON table a parser printed.
///
/// Parsers sometimes log before printing the table, so when the whole output
/// is not JSON the last non-empty line is tried.
pub fn table_from_stdout(stdout: &str) -> Result<Table, Defect> {
    let value = match serde_json::from_str::<Value>(stdout.trim()) {
        Ok(value) => value,
        Err(whole_err) => {
            let last_line = stdout.lines().rev().find(|line| !line.trim().is_empty());
            match last_line.map(|line| serde_json::from_str::<Value>(line.trim())) {
                Some(Ok(value)) => value,
                _ => return Err(malformed(format!("stdout is not JSON: {whole_err}"), stdout)),
            }
        }
    };

    let violations: Vec<String> = TABLE_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(malformed(
            format!(
                "output is not a {{\"columns\", \"rows\"}} table:\n- {}",
                violations.join("\n- ")
            ),
            stdout,
        ));
    }

    let table: Table = serde_json::from_value(value)
        .map_err(|e| malformed(format!("cannot decode table: {e}"), stdout))?;
    table
        .check_rectangular()
        .map_err(|reason| malformed(reason, stdout))?;
    Ok(table)
}

fn malformed(reason: String, stdout: &str) -> Defect {
    Defect::MalformedOutput {
        reason,
        stdout_head: head(stdout, HEAD_LINES),
    }
}

/// True when some line is neither blank nor a comment.
fn has_code(source: &str, comment_prefix: &str) -> bool {
    source.lines().map(str::trim).any(|line| {
        !line.is_empty() && (comment_prefix.is_empty() || !line.starts_with(comment_prefix))
    })
}

/// First `lines` lines of `text`, with a marker when more were cut.
pub fn head(text: &str, lines: usize) -> String {
    let total = text.lines().count();
    let mut out = text.lines().take(lines).collect::<Vec<_>>().join("\n");
    if total > lines {
        out.push_str(&format!("\n[... {} more lines]", total - lines));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::Cell;
    use crate::core::verdict::DefectKind;
    use std::time::Duration;

    fn loader(workdir: &Path) -> ProcessLoader {
        ProcessLoader::new(
            vec![
                "sh".to_string(),
                "{artifact}".to_string(),
                "{document}".to_string(),
            ],
            "#",
            workdir,
            RunLimits {
                timeout: Duration::from_secs(5),
                output_limit_bytes: 64 * 1024,
            },
        )
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("parser.sh");
        fs::write(&path, body).expect("write script");
        path
    }

    #[test]
    fn parses_json_table_from_stdout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = write_script(
            temp.path(),
            r#"echo '{"columns":["Date","Amount"],"rows":[["01-08-2024",12.5],["02-08-2024",null]]}'"#,
        );

        let table = loader(temp.path())
            .load(&script)
            .expect("load")
            .parse(Path::new("doc.pdf"))
            .expect("parse");
        assert_eq!(table.columns, vec!["Date", "Amount"]);
        assert_eq!(table.rows[0][1], Cell::Number(12.5));
        assert_eq!(table.rows[1][1], Cell::Null);
    }

    #[test]
    fn document_path_is_passed_as_argument() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = write_script(
            temp.path(),
            r#"printf '{"columns":["doc"],"rows":[["%s"]]}\n' "$1""#,
        );

        let table = loader(temp.path())
            .load(&script)
            .expect("load")
            .parse(Path::new("statement.pdf"))
            .expect("parse");
        assert_eq!(table.rows[0][0], Cell::Text("statement.pdf".to_string()));
    }

    #[test]
    fn comment_only_artifact_has_no_entry_point() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = write_script(temp.path(), "# generation failed: quota exceeded\n");

        let err = loader(temp.path()).load(&script).unwrap_err();
        assert_eq!(err.kind(), DefectKind::EntryPoint);
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn failing_parser_is_a_runtime_fault_with_trace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = write_script(temp.path(), "echo 'ValueError: bad date' >&2\nexit 1\n");

        let err = loader(temp.path())
            .load(&script)
            .expect("load")
            .parse(Path::new("doc.pdf"))
            .unwrap_err();
        assert_eq!(err.kind(), DefectKind::Runtime);
        let text = err.to_string();
        assert!(text.contains("parser exited with"));
        assert!(text.contains("ValueError: bad date"));
    }

    #[test]
    fn log_lines_before_the_table_are_tolerated() {
        let table = table_from_stdout("reading page 1\n{\"columns\":[\"a\"],\"rows\":[[1]]}\n")
            .expect("table");
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn non_table_json_is_malformed() {
        let err = table_from_stdout(r#"{"rows": [{"Date": "01-08-2024"}]}"#).unwrap_err();
        assert!(matches!(err, Defect::MalformedOutput { .. }));
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn ragged_rows_are_malformed() {
        let err = table_from_stdout(r#"{"columns":["a","b"],"rows":[[1]]}"#).unwrap_err();
        assert!(err.to_string().contains("row 1 has 1 cells"));
    }

    #[test]
    fn head_marks_cut_lines() {
        assert_eq!(head("a\nb\nc", 2), "a\nb\n[... 1 more lines]");
        assert_eq!(head("a", 2), "a");
    }
}
