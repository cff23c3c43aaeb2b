//! # Result Frames
//!
//! Named tabular structures of rows and columns produced for downstream
//! rendering. Column order is insertion order of first appearance; rows
//! missing a column are null-filled.

pub mod builder;

use serde::Serialize;
use serde_json::Value;

/// One row before it is appended to a frame: ordered (column, value) pairs
pub type ResultRow = Vec<(String, Value)>;

/// A named tabular result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultFrame {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultFrame {
    /// Creates an empty frame with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Frame name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column names in first-seen order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the frame has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row. New columns extend the frame; earlier rows are
    /// null-filled for them, and cells the row does not provide are null.
    pub fn push_row(&mut self, row: ResultRow) {
        let mut cells = vec![Value::Null; self.columns.len()];
        for (column, value) in row {
            match self.columns.iter().position(|c| c == &column) {
                Some(index) => cells[index] = value,
                None => {
                    self.columns.push(column);
                    for existing in &mut self.rows {
                        existing.push(Value::Null);
                    }
                    cells.push(value);
                }
            }
        }
        self.rows.push(cells);
    }

    /// Cell lookup by row index and column name
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// Iterates over rows as cell slices aligned with [`columns`](Self::columns)
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }
}
