//! Columnar string table read from raw CSV bytes.
//!
//! Cells are kept as text until a later stage decides how to interpret them;
//! numeric parsing and timestamp parsing both happen per column.

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    columns: Vec<Vec<String>>,
    rows: usize,
}

impl RawTable {
    /// Builds a table from header names and column-major cells. Short columns
    /// are padded with empty cells.
    pub fn from_columns(headers: Vec<String>, mut columns: Vec<Vec<String>>) -> Self {
        columns.resize(headers.len(), Vec::new());
        let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
        for col in &mut columns {
            col.resize(rows, String::new());
        }
        Self {
            headers,
            columns,
            rows,
        }
    }

    /// Parses CSV bytes with a header row. Ragged rows are tolerated: missing
    /// trailing cells become empty strings and extra cells are ignored.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut columns = vec![Vec::new(); headers.len()];

        for record in reader.records() {
            let record = record?;
            for (idx, col) in columns.iter_mut().enumerate() {
                col.push(record.get(idx).unwrap_or("").to_string());
            }
        }

        let table = Self::from_columns(headers, columns);
        debug!(
            columns = table.headers.len(),
            rows = table.rows,
            "CSV table loaded"
        );
        Ok(table)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Position of the column named `name`. When several columns share the
    /// name, the last one wins.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.headers.iter().rposition(|h| h == name)
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|idx| self.column_at(idx))
    }

    pub fn column_at(&self, idx: usize) -> &[String] {
        &self.columns[idx]
    }

    /// Replaces every header with `f(header)`. Duplicate results are kept as
    /// separate columns; lookups by name then resolve to the last of them.
    pub fn rename_with<F>(&mut self, f: F)
    where
        F: Fn(&str) -> String,
    {
        for header in &mut self.headers {
            *header = f(header);
        }
    }
}
