//! Structural and value equality between a parser's table and the reference.
//!
//! Checks run in a fixed order: schema (names and order), shape (row count),
//! then cell values. The first failing check decides the defect. Cell
//! comparison is type tolerant: `"1200.50"` and `1200.5` are the same value,
//! and missing markers (null, blank, `NaN`) are equal to each other.

use crate::core::table::{Cell, Table};
use crate::core::verdict::{CellMismatch, Defect, MISMATCH_SAMPLE_LIMIT};

/// Relative tolerance for numeric cells.
pub const RELATIVE_TOLERANCE: f64 = 1e-5;
/// Absolute tolerance for numeric cells close to zero.
pub const ABSOLUTE_TOLERANCE: f64 = 1e-8;

/// Compare `actual` against `expected`; `Ok(())` means the tables are equal.
pub fn compare_tables(actual: &Table, expected: &Table) -> Result<(), Defect> {
    if actual.columns != expected.columns {
        return Err(Defect::SchemaMismatch {
            expected: expected.columns.clone(),
            actual: actual.columns.clone(),
        });
    }

    if actual.row_count() != expected.row_count() {
        return Err(Defect::ShapeMismatch {
            expected_rows: expected.row_count(),
            actual_rows: actual.row_count(),
        });
    }

    let mut samples = Vec::new();
    let mut mismatches = 0usize;
    let mut compared = 0usize;
    for (row_idx, (actual_row, expected_row)) in
        actual.rows.iter().zip(expected.rows.iter()).enumerate()
    {
        for (col_idx, column) in expected.columns.iter().enumerate() {
            let actual_cell = actual_row.get(col_idx).unwrap_or(&Cell::Null);
            let expected_cell = expected_row.get(col_idx).unwrap_or(&Cell::Null);
            compared += 1;
            if cells_equal(actual_cell, expected_cell) {
                continue;
            }
            mismatches += 1;
            if samples.len() < MISMATCH_SAMPLE_LIMIT {
                samples.push(CellMismatch {
                    row: row_idx + 1,
                    column: column.clone(),
                    expected: expected_cell.clone(),
                    actual: actual_cell.clone(),
                });
            }
        }
    }

    if mismatches > 0 {
        return Err(Defect::ValueMismatch {
            samples,
            mismatches,
            compared,
        });
    }
    Ok(())
}

/// Type-tolerant cell equality.
pub fn cells_equal(actual: &Cell, expected: &Cell) -> bool {
    match (actual.is_missing(), expected.is_missing()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    if let (Some(a), Some(e)) = (actual.as_number(), expected.as_number()) {
        return numbers_close(a, e);
    }
    if let (Cell::Bool(a), Cell::Bool(e)) = (actual, expected) {
        return a == e;
    }
    let (a, e) = (actual.as_text(), expected.as_text());
    a == e || (is_bool_pair(actual, expected) && a.eq_ignore_ascii_case(&e))
}

fn numbers_close(actual: f64, expected: f64) -> bool {
    actual == expected
        || (actual - expected).abs() <= ABSOLUTE_TOLERANCE + RELATIVE_TOLERANCE * expected.abs()
}

fn is_bool_pair(actual: &Cell, expected: &Cell) -> bool {
    matches!(actual, Cell::Bool(_)) || matches!(expected, Cell::Bool(_))
}
