use std::io::Cursor;

use crate::errors::ContractError;

/// A small in-memory tabular dataset: named columns over string cells.
///
/// TreeSum uploads are modest (thousands of rows), so cells stay as the
/// strings the CSV carried; numeric interpretation happens at the point of
/// use via [`parse_f64`].
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Reads a delimited file. Ragged rows are padded or truncated to the
    /// header width so later column access is always in bounds.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, ContractError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(Cursor::new(bytes));

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() {
            return Err(ContractError::EmptyFile);
        }

        let width = columns.len();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        &self.rows[row][col]
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> &mut String {
        &mut self.rows[row][col]
    }

    /// Iterates a column's cells by name; `None` when the column is absent.
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, ContractError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|err| ContractError::Csv { source: err.into_error().into() })
    }
}

/// Lenient numeric cell parse: empty and `NaN` cells are "no value",
/// anything else must parse as a float.
pub fn parse_f64(cell: &str) -> Result<Option<f64>, ()> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    trimmed.parse::<f64>().map(Some).map_err(|_| ())
}
