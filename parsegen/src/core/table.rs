//! Tabular values exchanged between generated parsers and the oracle.
//!
//! A [`Table`] is an ordered list of named columns plus ordered rows. Cells
//! keep the loose typing of their source (CSV text, JSON scalars); the oracle
//! decides equality, not the table itself.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    /// Build a cell from a raw CSV field. Empty fields are missing values.
    pub fn from_csv_field(field: &str) -> Self {
        if field.trim().is_empty() {
            Cell::Null
        } else {
            Cell::Text(field.to_string())
        }
    }

    /// Missing values: null, blank text, or a NaN marker.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Number(n) => n.is_nan(),
            Cell::Text(s) => {
                let trimmed = s.trim();
                trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan")
            }
            Cell::Bool(_) => false,
        }
    }

    /// Finite numeric reading of the cell, if it has one.
    ///
    /// Text such as `"INF"` or `"Infinity"` parses as an `f64` but stays text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Canonical text used when neither side is numeric.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.trim().to_string(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "<missing>"),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Ordered rows under named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Every row must have exactly one cell per column.
    pub fn check_rectangular(&self) -> Result<(), String> {
        let width = self.columns.len();
        match self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != width)
        {
            Some((idx, row)) => Err(format!(
                "row {} has {} cells but the table declares {} columns",
                idx + 1,
                row.len(),
                width
            )),
            None => Ok(()),
        }
    }
}
