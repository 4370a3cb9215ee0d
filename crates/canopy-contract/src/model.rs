use serde::{Deserialize, Serialize};

use crate::table::Table;

/// A single contract violation, pointed at the offending column and (where
/// known) the 1-based data row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub column: Option<String>,
    pub row: Option<usize>,
    pub reason: String,
}

impl Violation {
    pub fn column(column: &str, reason: impl Into<String>) -> Self {
        Self {
            column: Some(column.to_string()),
            row: None,
            reason: reason.into(),
        }
    }

    pub fn cell(column: &str, row: usize, reason: impl Into<String>) -> Self {
        Self {
            column: Some(column.to_string()),
            row: Some(row),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, self.row) {
            (Some(col), Some(row)) => write!(f, "{col} (row {row}): {}", self.reason),
            (Some(col), None) => write!(f, "{col}: {}", self.reason),
            _ => f.write_str(&self.reason),
        }
    }
}

/// Outcome of checking a TreeSum upload against the import contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub rows: usize,
    pub columns: Vec<String>,
    pub errors: Vec<Violation>,
    pub warnings: Vec<String>,
    pub stands_detected: Vec<String>,
    pub source_hash: String,
}

/// A TreeSum upload that passed the contract: the normalized table keeps the
/// original columns, the canopy table carries the remapped columns the
/// aggregation stage consumes.
#[derive(Debug, Clone)]
pub struct ValidatedImport {
    pub normalized: Table,
    pub canopy: Table,
    pub report: ImportReport,
}
