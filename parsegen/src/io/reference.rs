//! Reference (ground-truth) tables stored as CSV.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::table::{Cell, Table};

/// Load the full reference table. The header row names the columns.
pub fn load_reference(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("open reference {}", path.display()))?;

    let columns: Vec<String> = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = Table::new(columns);
    for (idx, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("read row {} of {}", idx + 1, path.display()))?;
        table
            .rows
            .push(record.iter().map(Cell::from_csv_field).collect());
    }

    debug!(
        path = %path.display(),
        columns = table.columns.len(),
        rows = table.row_count(),
        "reference loaded"
    );
    Ok(table)
}

/// Read only the reference column names.
pub fn read_schema(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("open reference {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?;
    Ok(headers.iter().map(|h| h.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_header_and_rows_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ref.csv");
        fs::write(
            &path,
            "Date,Description,Debit Amt,Credit Amt,Balance\n\
             01-08-2024,Salary Credit XYZ Pvt Ltd,,1935.3,6864.58\n\
             02-08-2024,\"Card Swipe, Grocery\",1652.61,,5211.97\n",
        )
        .expect("write csv");

        let table = load_reference(&path).expect("load");
        assert_eq!(
            table.columns,
            vec!["Date", "Description", "Debit Amt", "Credit Amt", "Balance"]
        );
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0][2], Cell::Null);
        assert_eq!(
            table.rows[1][1],
            Cell::Text("Card Swipe, Grocery".to_string())
        );
    }

    #[test]
    fn schema_reads_header_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ref.csv");
        fs::write(&path, "Date, Amount\n").expect("write csv");
        assert_eq!(read_schema(&path).expect("schema"), vec!["Date", "Amount"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_reference(&temp.path().join("nope.csv")).unwrap_err();
        assert!(err.to_string().contains("open reference"));
    }

    #[test]
    fn ragged_rows_are_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ref.csv");
        fs::write(&path, "Date,Amount\n01-08-2024\n").expect("write csv");
        assert!(load_reference(&path).is_err());
    }
}
