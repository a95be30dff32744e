//! Harness verdicts and the defect taxonomy behind failed attempts.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::table::Cell;

/// Maximum number of mismatching cells listed in a value-mismatch description.
pub const MISMATCH_SAMPLE_LIMIT: usize = 5;

/// Coarse classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    /// The artifact has no usable entry point or printed something that is not a table.
    EntryPoint,
    /// The entry point raised, crashed, or timed out.
    Runtime,
    Schema,
    Shape,
    Values,
    /// The reference table could not be loaded.
    Reference,
}

/// One cell that differs from the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CellMismatch {
    /// 1-indexed data row.
    pub row: usize,
    pub column: String,
    pub expected: Cell,
    pub actual: Cell,
}

/// Everything that can make an attempt fail.
///
/// `Display` renders the full multi-line description recorded in the error
/// history, so it must carry enough detail for the next generation attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Defect {
    #[error(
        "entry point missing: {reason}\nartifact: {}\n--- artifact head ---\n{source_head}",
        .artifact.display()
    )]
    EntryPointMissing {
        artifact: PathBuf,
        reason: String,
        source_head: String,
    },

    #[error("malformed parser output: {reason}\n--- stdout head ---\n{stdout_head}")]
    MalformedOutput { reason: String, stdout_head: String },

    #[error("runtime fault: {fault}\n--- stderr ---\n{trace}")]
    RuntimeFault { fault: String, trace: String },

    #[error("{}", schema_report(.expected, .actual))]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error(
        "shape mismatch: expected {expected_rows} rows, got {actual_rows} rows (rows are compared in order)"
    )]
    ShapeMismatch {
        expected_rows: usize,
        actual_rows: usize,
    },

    #[error("{}", values_report(.samples, .mismatches, .compared))]
    ValueMismatch {
        samples: Vec<CellMismatch>,
        mismatches: usize,
        compared: usize,
    },

    #[error("reference table unavailable: {}: {reason}", .path.display())]
    ReferenceUnavailable { path: PathBuf, reason: String },
}

impl Defect {
    pub fn kind(&self) -> DefectKind {
        match self {
            Defect::EntryPointMissing { .. } | Defect::MalformedOutput { .. } => {
                DefectKind::EntryPoint
            }
            Defect::RuntimeFault { .. } => DefectKind::Runtime,
            Defect::SchemaMismatch { .. } => DefectKind::Schema,
            Defect::ShapeMismatch { .. } => DefectKind::Shape,
            Defect::ValueMismatch { .. } => DefectKind::Values,
            Defect::ReferenceUnavailable { .. } => DefectKind::Reference,
        }
    }
}

fn schema_report(expected: &[String], actual: &[String]) -> String {
    let missing: Vec<&String> = expected.iter().filter(|c| !actual.contains(c)).collect();
    let extra: Vec<&String> = actual.iter().filter(|c| !expected.contains(c)).collect();

    let mut out = String::from("schema mismatch: columns differ from the reference\n");
    let _ = writeln!(out, "  expected columns: [{}]", expected.join(", "));
    let _ = writeln!(out, "  actual columns:   [{}]", actual.join(", "));
    let _ = writeln!(out, "  expected set: {{{}}}", expected.join(", "));
    let _ = writeln!(out, "  actual set:   {{{}}}", actual.join(", "));
    let _ = writeln!(out, "  missing: {{{}}}", join_refs(&missing));
    let _ = write!(out, "  extra:   {{{}}}", join_refs(&extra));
    if missing.is_empty() && extra.is_empty() {
        out.push_str("\n  note: same columns in a different order; order must match");
    }
    out
}

fn values_report(samples: &[CellMismatch], mismatches: &usize, compared: &usize) -> String {
    let (mismatches, compared) = (*mismatches, *compared);
    let mut out = format!(
        "value mismatch: {mismatches} of {compared} cells differ from the reference"
    );
    for (idx, cell) in samples.iter().enumerate() {
        let label = if idx == 0 { "first mismatch at" } else { "also at" };
        let _ = write!(
            out,
            "\n  {label} row {}, column {:?}: expected {}, actual {}",
            cell.row, cell.column, cell.expected, cell.actual
        );
    }
    if mismatches > samples.len() {
        let _ = write!(out, "\n  ... and {} more", mismatches - samples.len());
    }
    out
}

fn join_refs(items: &[&String]) -> String {
    items
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outcome of one harness invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failure {
        kind: DefectKind,
        description: String,
    },
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }

    /// Failure description, `None` on success.
    pub fn description(&self) -> Option<&str> {
        match self {
            Verdict::Success => None,
            Verdict::Failure { description, .. } => Some(description),
        }
    }

    pub fn kind(&self) -> Option<DefectKind> {
        match self {
            Verdict::Success => None,
            Verdict::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<Defect> for Verdict {
    fn from(defect: Defect) -> Self {
        let mut description = defect.to_string();
        if description.trim().is_empty() {
            description = format!("{:?} defect without description", defect.kind());
        }
        Verdict::Failure {
            kind: defect.kind(),
            description,
        }
    }
}
