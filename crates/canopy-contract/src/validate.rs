use chrono::NaiveDate;

use crate::contract::ImportContract;
use crate::errors::ContractError;
use crate::model::{ImportReport, ValidatedImport, Violation};
use crate::table::{parse_f64, Table};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d"];

/// Columns the contract treats as numeric; a non-empty cell that does not
/// parse is a violation, not a warning.
const NUMERIC_COLUMNS: &[&str] = &["StandAcres", "DBH", "TopDIB", "Defect"];

const DBH_MIN_IN: f64 = 1.0;
const DBH_MAX_IN: f64 = 60.0;

/// Checks a TreeSum upload against the import contract.
///
/// Normalizes in place (trim, species case, date format), then validates.
/// Any error-level violation aborts with [`ContractError::Violations`];
/// warnings ride along in the report. On success the table is remapped to
/// the canopy column set used by aggregation.
pub fn validate_treesum(
    bytes: &[u8],
    contract: &ImportContract,
) -> Result<ValidatedImport, ContractError> {
    let source_hash = blake3::hash(bytes).to_hex().to_string();

    let mut table = Table::from_csv(bytes)?;
    normalize(&mut table, contract);

    let (errors, warnings) = check(&table, contract);

    let stands_detected = match table.column_values("StandID") {
        Some(values) => {
            let mut stands: Vec<String> = values
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
                .collect();
            stands.sort();
            stands.dedup();
            stands
        }
        None => Vec::new(),
    };

    let report = ImportReport {
        rows: table.height(),
        columns: table.columns().to_vec(),
        errors,
        warnings,
        stands_detected,
        source_hash,
    };

    if !report.errors.is_empty() {
        return Err(ContractError::Violations(Box::new(report)));
    }

    let canopy = remap(&table, contract);
    Ok(ValidatedImport {
        normalized: table,
        canopy,
        report,
    })
}

fn normalize(table: &mut Table, contract: &ImportContract) {
    let width = table.columns().len();
    let height = table.height();

    if contract.normalization.strip_whitespace {
        for row in 0..height {
            for col in 0..width {
                let cell = table.cell_mut(row, col);
                let trimmed = cell.trim();
                if trimmed.len() != cell.len() {
                    *cell = trimmed.to_string();
                }
            }
        }
    }

    if contract.normalization.upper_species_codes {
        if let Some(col) = table.column_index("Species") {
            for row in 0..height {
                let cell = table.cell_mut(row, col);
                if cell.chars().any(|c| c.is_ascii_lowercase()) {
                    *cell = cell.to_ascii_uppercase();
                }
            }
        }
    }

    // Best-effort date standardization; unparseable dates become empty.
    if let Some(col) = table.column_index("CruiseDate") {
        for row in 0..height {
            let cell = table.cell_mut(row, col);
            if cell.is_empty() {
                continue;
            }
            *cell = match parse_date(cell) {
                Some(date) => date.format("%Y-%m-%d").to_string(),
                None => String::new(),
            };
        }
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn check(table: &Table, contract: &ImportContract) -> (Vec<Violation>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for required in &contract.required_columns {
        if table.column_index(required).is_none() {
            errors.push(Violation::column(required, "missing required column"));
        }
    }

    for column in NUMERIC_COLUMNS {
        let Some(col) = table.column_index(column) else {
            continue;
        };
        for row in 0..table.height() {
            let cell = table.cell(row, col);
            if parse_f64(cell).is_err() {
                errors.push(Violation::cell(
                    column,
                    row + 1,
                    format!("value '{cell}' is not numeric"),
                ));
            }
        }
    }

    for (row, value) in numeric_cells(table, "StandAcres") {
        if value <= 0.0 {
            errors.push(Violation::cell(
                "StandAcres",
                row + 1,
                "StandAcres must be > 0",
            ));
        }
    }

    if let Some(domain) = &contract.species_domain {
        if let Some(col) = table.column_index("Species") {
            for row in 0..table.height() {
                let cell = table.cell(row, col);
                if !cell.is_empty() && !domain.iter().any(|code| code == cell) {
                    errors.push(Violation::cell(
                        "Species",
                        row + 1,
                        format!("species code '{cell}' is outside the declared domain"),
                    ));
                }
            }
        }
    }

    if numeric_cells(table, "DBH").any(|(_, v)| !(DBH_MIN_IN..=DBH_MAX_IN).contains(&v)) {
        warnings.push(format!(
            "Some DBH values are outside {DBH_MIN_IN:.0}-{DBH_MAX_IN:.0} inches"
        ));
    }

    if let (Some(dib_col), Some(dbh_col)) =
        (table.column_index("TopDIB"), table.column_index("DBH"))
    {
        let exceeds = (0..table.height()).any(|row| {
            match (
                parse_f64(table.cell(row, dib_col)).ok().flatten(),
                parse_f64(table.cell(row, dbh_col)).ok().flatten(),
            ) {
                (Some(dib), Some(dbh)) => dib > dbh,
                _ => false,
            }
        });
        if exceeds {
            warnings.push("Some TopDIB > DBH rows found".to_string());
        }
    }

    if numeric_cells(table, "Defect").any(|(_, v)| !(0.0..=100.0).contains(&v)) {
        warnings.push("Some Defect values outside 0-100%".to_string());
    }

    if let Some(values) = table.column_values("CruiseType") {
        let mut bad = false;
        for value in values {
            if !value.is_empty() && value != "Plot" && value != "Point" {
                bad = true;
                break;
            }
        }
        if bad {
            warnings.push("CruiseType contains values other than 'Plot' or 'Point'".to_string());
        }
    }

    (errors, warnings)
}

/// Parseable numeric cells of a column with their 0-based row index.
fn numeric_cells<'a>(
    table: &'a Table,
    column: &str,
) -> Box<dyn Iterator<Item = (usize, f64)> + 'a> {
    match table.column_index(column) {
        Some(col) => Box::new((0..table.height()).filter_map(move |row| {
            parse_f64(table.cell(row, col))
                .ok()
                .flatten()
                .map(|value| (row, value))
        })),
        None => Box::new(std::iter::empty()),
    }
}

fn remap(table: &Table, contract: &ImportContract) -> Table {
    let columns: Vec<String> = contract.mapping_to_canopy.keys().cloned().collect();
    let sources: Vec<Option<usize>> = contract
        .mapping_to_canopy
        .values()
        .map(|src| table.column_index(src))
        .collect();

    let rows = (0..table.height())
        .map(|row| {
            sources
                .iter()
                .map(|src| match src {
                    Some(col) => table.cell(row, *col).to_string(),
                    None => String::new(),
                })
                .collect()
        })
        .collect();

    Table::new(columns, rows)
}
