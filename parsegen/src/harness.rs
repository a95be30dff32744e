//! `EXECUTE_TEST`: persist the generated source, run it, judge its table.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::oracle::compare_tables;
use crate::core::state::{GeneratedCode, RunContext};
use crate::core::verdict::{Defect, Verdict};
use crate::io::loader::{EntryPoint, ParserLoader};
use crate::io::reference::load_reference;

/// Runs one attempt and returns its verdict.
///
/// `Err` is reserved for problems outside the attempt itself (the artifact
/// cannot be written). Everything the generated code does wrong is a
/// [`Verdict::Failure`].
pub trait Harness {
    fn execute_and_test(&self, code: &GeneratedCode, run: &RunContext) -> Result<Verdict>;
}

/// Harness that loads artifacts through a [`ParserLoader`].
#[derive(Debug, Clone)]
pub struct ParserHarness<L: ParserLoader> {
    loader: L,
}

impl<L: ParserLoader> ParserHarness<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    /// Judge whatever artifact is currently on disk.
    #[instrument(skip_all, fields(target = %run.target))]
    pub fn check(&self, run: &RunContext) -> Verdict {
        let verdict = verdict_of(self.test_artifact(run));
        info!(success = verdict.is_success(), "artifact checked");
        verdict
    }

    fn test_artifact(&self, run: &RunContext) -> Result<(), Defect> {
        let unit = self.loader.load(&run.artifact_path)?;
        let actual = unit.parse(&run.document_path)?;
        debug!(
            columns = actual.columns.len(),
            rows = actual.row_count(),
            "parser produced table"
        );
        let expected =
            load_reference(&run.reference_path).map_err(|e| Defect::ReferenceUnavailable {
                path: run.reference_path.clone(),
                reason: format!("{e:#}"),
            })?;
        compare_tables(&actual, &expected)
    }
}

impl<L: ParserLoader> Harness for ParserHarness<L> {
    #[instrument(skip_all, fields(target = %run.target, artifact = %run.artifact_path.display()))]
    fn execute_and_test(&self, code: &GeneratedCode, run: &RunContext) -> Result<Verdict> {
        persist_artifact(&run.artifact_path, &code.source)?;
        let verdict = verdict_of(self.test_artifact(run));
        info!(success = verdict.is_success(), kind = ?verdict.kind(), "attempt judged");
        Ok(verdict)
    }
}

fn verdict_of(result: Result<(), Defect>) -> Verdict {
    match result {
        Ok(()) => Verdict::Success,
        Err(defect) => Verdict::from(defect),
    }
}

/// Replace the artifact atomically (temp file + rename).
pub fn persist_artifact(path: &Path, source: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, source)
        .with_context(|| format!("write temp artifact {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace artifact {}", path.display()))?;
    debug!(bytes = source.len(), "artifact persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::{Cell, Table};
    use crate::core::verdict::DefectKind;
    use std::cell::RefCell;

    /// Loader that hands back a fixed table and records what it loaded.
    struct FixedLoader {
        table: Table,
        loaded: RefCell<Vec<String>>,
    }

    struct FixedUnit(Table);

    impl EntryPoint for FixedUnit {
        fn parse(&self, _document: &Path) -> Result<Table, Defect> {
            Ok(self.0.clone())
        }
    }

    impl ParserLoader for FixedLoader {
        type Unit = FixedUnit;

        fn load(&self, artifact: &Path) -> Result<FixedUnit, Defect> {
            let source = fs::read_to_string(artifact).map_err(|e| Defect::EntryPointMissing {
                artifact: artifact.to_path_buf(),
                reason: e.to_string(),
                source_head: String::new(),
            })?;
            self.loaded.borrow_mut().push(source);
            Ok(FixedUnit(self.table.clone()))
        }
    }

    fn table() -> Table {
        Table::with_rows(
            vec!["Date".to_string(), "Amount".to_string()],
            vec![vec![Cell::Text("01-08-2024".to_string()), Cell::Number(12.5)]],
        )
    }

    fn run(root: &Path) -> RunContext {
        RunContext {
            target: "icici".to_string(),
            document_path: root.join("doc.pdf"),
            reference_path: root.join("ref.csv"),
            artifact_path: root.join("custom_parsers").join("icici_parser.py"),
        }
    }

    fn code(source: &str) -> GeneratedCode {
        GeneratedCode {
            source: source.to_string(),
            prompt: String::new(),
            diagnostic: None,
        }
    }

    fn harness() -> ParserHarness<FixedLoader> {
        ParserHarness::new(FixedLoader {
            table: table(),
            loaded: RefCell::new(Vec::new()),
        })
    }

    #[test]
    fn persists_each_attempt_over_the_previous_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("ref.csv"), "Date,Amount\n01-08-2024,12.50\n").expect("ref");
        let harness = harness();
        let run = run(temp.path());

        harness.execute_and_test(&code("first"), &run).expect("first");
        let verdict = harness.execute_and_test(&code("second"), &run).expect("second");

        assert_eq!(verdict, Verdict::Success);
        assert_eq!(fs::read_to_string(&run.artifact_path).expect("read"), "second");
        assert_eq!(*harness.loader.loaded.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn missing_reference_is_a_failure_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let verdict = harness()
            .execute_and_test(&code("x"), &run(temp.path()))
            .expect("verdict");
        assert_eq!(verdict.kind(), Some(DefectKind::Reference));
        assert!(verdict.description().unwrap_or_default().contains("ref.csv"));
    }

    #[test]
    fn check_judges_existing_artifact() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("ref.csv"), "Date,Amount\n01-08-2024,99\n").expect("ref");
        let run = run(temp.path());
        persist_artifact(&run.artifact_path, "existing").expect("persist");

        let verdict = harness().check(&run);
        assert_eq!(verdict.kind(), Some(DefectKind::Values));
    }

    #[test]
    fn unwritable_artifact_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("custom_parsers");
        fs::write(&blocker, "not a directory").expect("blocker");
        let err = harness()
            .execute_and_test(&code("x"), &run(temp.path()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("create directory"));
    }
}
